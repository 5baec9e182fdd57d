use std::time::Duration;

use action_primitives::ActionStep;
use agent_core::{Intent, StructuredTask};

use super::{
    compose_message_steps, mail_login_steps, roles, unsupported, ProviderAdapter,
    ProviderCapability, MAIL_CREDENTIAL_KEYS,
};
use crate::config::Credentials;
use crate::errors::EngineError;

pub const GMAIL_LOGIN_URL: &str = "https://mail.google.com/mail/";

/// Gmail web client.
#[derive(Debug, Clone)]
pub struct GmailAdapter {
    capability: ProviderCapability,
    selector_timeout: Duration,
}

impl Default for GmailAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailAdapter {
    pub fn new() -> Self {
        Self {
            capability: gmail_capability(),
            selector_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_selector_timeout(mut self, timeout: Duration) -> Self {
        self.selector_timeout = timeout;
        self
    }
}

fn gmail_capability() -> ProviderCapability {
    ProviderCapability::new("gmail")
        .with_credential_keys(MAIL_CREDENTIAL_KEYS)
        .with_selectors(
            roles::MAILBOX_READY,
            "div[data-tooltip*='Compose'], a[href*='#inbox']",
        )
        .with_selectors(roles::LOGIN_ERROR, "div.o6cuMc, div[aria-live='assertive'] span")
        .with_selectors(roles::EMAIL_FIELD, "input[type='email'], input[name='identifier']")
        .with_selectors(roles::EMAIL_NEXT, "#identifierNext")
        .with_selectors(roles::PASSWORD_FIELD, "input[type='password'], input[name='password']")
        .with_selectors(roles::PASSWORD_NEXT, "#passwordNext")
        .with_selectors(
            roles::COMPOSE_BUTTON,
            "div[data-tooltip*='Compose'], .T-I.T-I-KE.L3, button[aria-label*='Compose']",
        )
        .with_selectors(
            roles::RECIPIENT_FIELD,
            "textarea[name='to'], input[name='to'], .aoD.az6 input",
        )
        .with_selectors(
            roles::SUBJECT_FIELD,
            "input[name='subject'], .aoD.az6 input[placeholder*='Subject']",
        )
        .with_selectors(
            roles::BODY_FIELD,
            "div[contenteditable='true'], .Am.Al.editable, iframe[title*='Message']",
        )
        .with_selectors(
            roles::SUBMIT_BUTTON,
            "div[data-tooltip*='Send'], .T-I.J-J5-Ji.aoO.T-I-atl.L3",
        )
        .with_selectors(roles::SENT_CONFIRMATION, "span.bAq, div[role='alert'] span#link_vsm")
        .with_selectors(roles::SENT_FOLDER, "a[href*='#sent'], div[data-tooltip='Sent']")
        .with_intent(
            Intent::SendMessage,
            &[
                roles::COMPOSE_BUTTON,
                roles::RECIPIENT_FIELD,
                roles::SUBJECT_FIELD,
                roles::BODY_FIELD,
                roles::SUBMIT_BUTTON,
                roles::SENT_CONFIRMATION,
                roles::SENT_FOLDER,
            ],
        )
}

impl ProviderAdapter for GmailAdapter {
    fn capability(&self) -> &ProviderCapability {
        &self.capability
    }

    fn login_url(&self) -> &str {
        GMAIL_LOGIN_URL
    }

    fn selector_timeout(&self) -> Duration {
        self.selector_timeout
    }

    fn auth_steps(&self, credentials: &Credentials) -> Result<Vec<ActionStep>, EngineError> {
        mail_login_steps(self, credentials)
    }

    fn plan_steps(&self, task: &StructuredTask) -> Result<Vec<ActionStep>, EngineError> {
        match task.intent() {
            Intent::SendMessage => compose_message_steps(self, task),
            other => Err(unsupported(self, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_primitives::ActionKind;
    use agent_core::RuleBasedExtractor;

    #[test]
    fn capability_is_valid_and_ordered() {
        let adapter = GmailAdapter::new();
        let capability = adapter.capability();
        capability.validate().unwrap();
        assert!(capability.supports(Intent::SendMessage));
        assert!(!capability.supports(Intent::PublishPost));
        assert_eq!(
            capability.candidates(roles::RECIPIENT_FIELD).unwrap(),
            ["textarea[name='to']", "input[name='to']", ".aoD.az6 input"]
        );
    }

    #[test]
    fn send_plan_joins_recipients_and_guards_the_send() {
        let task = RuleBasedExtractor::new(["gmail"])
            .extract("email a@x.com and b@y.com with subject 'Hi' saying 'Lunch?'")
            .unwrap();
        let steps = GmailAdapter::new().plan_steps(&task).unwrap();

        let labels: Vec<&str> = steps.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            ["open-compose", "fill-recipients", "fill-subject", "fill-body", "send", "verify-sent"]
        );
        assert_eq!(steps[1].payload.as_deref(), Some("a@x.com, b@y.com"));
        assert_eq!(steps[0].id.as_str(), "send-1");

        let send = &steps[4];
        assert_eq!(send.kind, ActionKind::Submit);
        assert_eq!(send.target.as_ref().unwrap().role(), roles::SUBMIT_BUTTON);
        assert!(send.completion.is_some());
    }

    #[test]
    fn other_intents_are_refused() {
        let task = RuleBasedExtractor::new(["gmail"])
            .extract("schedule a meeting tomorrow")
            .unwrap();
        let err = GmailAdapter::new().plan_steps(&task).unwrap_err();
        assert!(matches!(err, EngineError::NoProviderAvailable(_)));
    }

    #[test]
    fn login_types_credentials_in_order() {
        let credentials = Credentials::new()
            .with("email", "me@gmail.com")
            .with("password", "pw");
        let steps = GmailAdapter::new().auth_steps(&credentials).unwrap();
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].payload.as_deref(), Some("me@gmail.com"));
        assert_eq!(steps[2].payload.as_deref(), Some("pw"));
        assert_eq!(steps[3].id.as_str(), "auth-4");
    }
}
