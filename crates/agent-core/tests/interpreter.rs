use std::sync::Arc;
use std::time::Duration;

use agent_core::{
    InstructionInterpreter, InterpretError, InterpretationSource, Intent, LlmError,
    MockLlmProvider,
};

fn interpreter(llm: Arc<MockLlmProvider>) -> InstructionInterpreter {
    InstructionInterpreter::new(["gmail", "outlook"]).with_llm(llm)
}

#[tokio::test]
async fn llm_reply_wrapped_in_prose_is_used() {
    let llm = Arc::new(MockLlmProvider::replying(
        "Sure! Here is the task:\n```json\n{\"intent\": \"send_message\", \"provider\": \"outlook\", \
         \"recipients\": [\"ops@corp.com\", \"OPS@corp.com\"], \"subject\": \"Deploy\", \
         \"body\": \"Deploy is done\", \"confidence\": 0.97}\n```\nLet me know if you need more.",
    ));
    let task = interpreter(llm.clone())
        .interpret("tell ops@corp.com via outlook that the deploy is done")
        .await
        .unwrap();

    assert_eq!(task.source(), InterpretationSource::Llm);
    assert_eq!(task.intent(), Intent::SendMessage);
    assert_eq!(task.provider_hint(), Some("outlook"));
    assert_eq!(task.recipients(), ["ops@corp.com"]);
    assert_eq!(task.subject(), "Deploy");
    assert_eq!(task.confidence(), 0.97);
    assert_eq!(llm.calls(), 1);

    let request = llm.last_request().unwrap();
    assert_eq!(
        request.instruction,
        "tell ops@corp.com via outlook that the deploy is done"
    );
}

#[tokio::test]
async fn partial_llm_reply_is_completed() {
    let llm = Arc::new(MockLlmProvider::replying(
        r#"{"intent": "email", "recipients": "write to sam@x.org please", "body": "Standup moved to ten"}"#,
    ));
    let task = interpreter(llm)
        .interpret("email sam@x.org that standup moved to ten")
        .await
        .unwrap();

    assert_eq!(task.source(), InterpretationSource::Llm);
    assert_eq!(task.recipients(), ["sam@x.org"]);
    assert_eq!(task.subject(), "Standup moved to ten");
    assert_eq!(task.provider_hint(), None);
    assert_eq!(task.confidence(), 0.90);
}

#[tokio::test]
async fn unavailable_llm_falls_back_to_rules() {
    let llm = Arc::new(MockLlmProvider::failing(LlmError::unavailable("no api key")));
    let task = interpreter(llm)
        .interpret("send email to lee@x.com saying 'hello there'")
        .await
        .unwrap();

    assert_eq!(task.source(), InterpretationSource::RuleBased);
    assert_eq!(task.recipients(), ["lee@x.com"]);
    assert_eq!(task.body(), "hello there");
    assert!(task.confidence() <= 0.60);
}

#[tokio::test(start_paused = true)]
async fn slow_llm_times_out_into_fallback() {
    let llm = Arc::new(
        MockLlmProvider::replying(r#"{"intent":"send_message"}"#)
            .with_delay(Duration::from_secs(60)),
    );
    let task = interpreter(llm.clone())
        .with_timeout(Duration::from_secs(5))
        .interpret("send email to lee@x.com")
        .await
        .unwrap();

    assert_eq!(task.source(), InterpretationSource::RuleBased);
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn invalid_replies_fall_back() {
    let llm = Arc::new(MockLlmProvider::new());
    llm.push_reply(Ok("I cannot help with that.".into()));
    llm.push_reply(Ok(r#"{"intent": "juggle"}"#.into()));
    llm.push_reply(Ok(r#"{"intent": "send_message", "recipients": ["nobody"]}"#.into()));
    let interpreter = interpreter(llm);

    for _ in 0..3 {
        let task = interpreter
            .interpret("send email to kim@x.com")
            .await
            .unwrap();
        assert_eq!(task.source(), InterpretationSource::RuleBased);
        assert_eq!(task.recipients(), ["kim@x.com"]);
    }
}

#[tokio::test]
async fn fails_only_when_both_paths_fail() {
    let llm = Arc::new(MockLlmProvider::failing(LlmError::RateLimited("429".into())));
    let err = interpreter(llm)
        .interpret("what a lovely day")
        .await
        .unwrap_err();
    assert!(matches!(err, InterpretError::Interpretation(_)));
}

#[tokio::test]
async fn fallback_always_sets_an_intent() {
    let interpreter = InstructionInterpreter::new(["gmail", "outlook"]);
    assert!(!interpreter.has_llm());
    let instructions = [
        "send email to a@b.com",
        "a@b.com",
        "schedule standup",
        "upload the photos",
        "publish the release notes",
        "Message x@y.co: hi",
    ];
    for instruction in instructions {
        let task = interpreter.interpret(instruction).await.unwrap();
        assert!(Intent::ALL.contains(&task.intent()), "{instruction}");
        assert!(!task.subject().is_empty(), "{instruction}");
        assert!((0.0..=1.0).contains(&task.confidence()));
    }
}

#[tokio::test]
async fn empty_instruction_is_rejected() {
    let err = InstructionInterpreter::new(["gmail"])
        .interpret("   ")
        .await
        .unwrap_err();
    assert!(matches!(err, InterpretError::Interpretation(_)));
}
