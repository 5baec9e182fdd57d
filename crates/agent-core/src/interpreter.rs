//! Instruction interpretation: LLM first, rule-based extraction as fallback.

use std::sync::Arc;
use std::time::Duration;

use schemars::schema_for;
use tracing::{debug, info, warn};

use crate::errors::{InterpretError, LlmError};
use crate::llm_provider::{LlmProvider, LlmRequest};
use crate::model::{Intent, InterpretationSource, RecipientList, StructuredTask, TaskDraft};
use crate::rule_based::{find_addresses, generate_subject, is_valid_address, RuleBasedExtractor};
use crate::utils::extract_json_object;

/// Confidence assumed when the model does not report one.
pub const DEFAULT_LLM_CONFIDENCE: f64 = 0.90;
/// Accepted model replies never rank below the rule-based ceiling.
pub const MIN_LLM_CONFIDENCE: f64 = 0.61;

pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(20);

pub struct InstructionInterpreter {
    llm: Option<Arc<dyn LlmProvider>>,
    timeout: Duration,
    fallback: RuleBasedExtractor,
    system_prompt: String,
    response_schema: serde_json::Value,
}

impl InstructionInterpreter {
    /// Interpreter that only knows the given provider names.
    pub fn new<I, S>(known_providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fallback = RuleBasedExtractor::new(known_providers);
        let system_prompt = build_system_prompt(fallback.known_providers());
        let response_schema = serde_json::to_value(schema_for!(TaskDraft))
            .unwrap_or(serde_json::Value::Null);
        Self {
            llm: None,
            timeout: DEFAULT_LLM_TIMEOUT,
            fallback,
            system_prompt,
            response_schema,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    pub fn extractor(&self) -> &RuleBasedExtractor {
        &self.fallback
    }

    pub fn request_for(&self, instruction: &str) -> LlmRequest {
        LlmRequest {
            system_prompt: self.system_prompt.clone(),
            instruction: instruction.to_string(),
            response_schema: self.response_schema.clone(),
        }
    }

    pub async fn interpret(&self, instruction: &str) -> Result<StructuredTask, InterpretError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(InterpretError::interpretation("empty instruction"));
        }

        if let Some(llm) = &self.llm {
            match self.interpret_with_llm(llm.as_ref(), instruction).await {
                Ok(task) => {
                    info!(
                        provider = llm.name(),
                        intent = %task.intent(),
                        confidence = task.confidence(),
                        "Interpreted instruction"
                    );
                    return Ok(task);
                }
                Err(err) => {
                    warn!(
                        provider = llm.name(),
                        error = %err,
                        "LLM interpretation failed; using rule-based fallback"
                    );
                }
            }
        }

        let task = self.fallback.extract(instruction)?;
        info!(
            intent = %task.intent(),
            confidence = task.confidence(),
            "Interpreted instruction with rule-based fallback"
        );
        Ok(task)
    }

    async fn interpret_with_llm(
        &self,
        llm: &dyn LlmProvider,
        instruction: &str,
    ) -> Result<StructuredTask, InterpretError> {
        let request = self.request_for(instruction);
        let reply = tokio::time::timeout(self.timeout, llm.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_millis() as u64))??;
        debug!(chars = reply.len(), "LLM reply received");

        let json = extract_json_object(&reply)
            .ok_or_else(|| LlmError::invalid_response("reply contains no JSON object"))?;
        let draft: TaskDraft = serde_json::from_str(&json)
            .map_err(|err| LlmError::invalid_response(format!("reply is not a task: {err}")))?;
        validate_draft(draft, instruction)
    }
}

/// Turn a parsed reply into a task, rejecting unknown intents and malformed addresses.
pub fn validate_draft(
    draft: TaskDraft,
    instruction: &str,
) -> Result<StructuredTask, InterpretError> {
    let intent = draft
        .intent
        .as_deref()
        .ok_or_else(|| InterpretError::rejected("reply has no intent"))?
        .parse::<Intent>()
        .map_err(InterpretError::rejected)?;

    let recipients = match draft.recipients {
        RecipientList::List(list) => {
            let list: Vec<String> = list
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
            if let Some(bad) = list.iter().find(|r| !is_valid_address(r)) {
                return Err(InterpretError::rejected(format!(
                    "malformed recipient '{bad}'"
                )));
            }
            list
        }
        RecipientList::Text(text) => find_addresses(&text),
    };

    let body = draft.body.unwrap_or_default();
    let subject = draft
        .subject
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| generate_subject(&body));
    let confidence = draft
        .confidence
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_LLM_CONFIDENCE)
        .clamp(0.0, 1.0)
        .max(MIN_LLM_CONFIDENCE);

    Ok(StructuredTask::new(intent, instruction, InterpretationSource::Llm)
        .with_provider_hint(draft.provider)
        .with_recipients(recipients)
        .with_subject(subject)
        .with_body(body)
        .with_confidence(confidence))
}

fn build_system_prompt(providers: &[String]) -> String {
    let intents = Intent::ALL
        .iter()
        .map(Intent::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let providers = if providers.is_empty() {
        "auto".to_string()
    } else {
        format!("{}, auto", providers.join(", "))
    };
    format!(
        "You interpret natural-language instructions for web automation tasks.\n\
         Reply with a single JSON object matching the provided schema and nothing else.\n\
         intent must be one of: {intents}.\n\
         provider must be one of: {providers}. Use auto unless the user names a service.\n\
         recipients lists every e-mail address the message goes to.\n\
         If no subject is given, leave subject empty.\n\
         confidence is your certainty in [0, 1]."
    )
}
