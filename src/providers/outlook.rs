use std::time::Duration;

use action_primitives::ActionStep;
use agent_core::{Intent, StructuredTask};

use super::{
    compose_message_steps, mail_login_steps, number_steps, roles, unsupported, ProviderAdapter,
    ProviderCapability, MAIL_CREDENTIAL_KEYS,
};
use crate::config::Credentials;
use crate::errors::EngineError;

pub const OUTLOOK_LOGIN_URL: &str = "https://outlook.live.com/mail/0/";

/// Outlook on the web (consumer accounts).
#[derive(Debug, Clone)]
pub struct OutlookAdapter {
    capability: ProviderCapability,
    selector_timeout: Duration,
}

impl Default for OutlookAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OutlookAdapter {
    pub fn new() -> Self {
        Self {
            capability: outlook_capability(),
            selector_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_selector_timeout(mut self, timeout: Duration) -> Self {
        self.selector_timeout = timeout;
        self
    }
}

fn outlook_capability() -> ProviderCapability {
    ProviderCapability::new("outlook")
        .with_credential_keys(MAIL_CREDENTIAL_KEYS)
        .with_selectors(
            roles::MAILBOX_READY,
            "button[aria-label*='New message'], button[aria-label*='Inbox']",
        )
        .with_selectors(roles::LOGIN_ERROR, "#usernameError, #passwordError")
        .with_selectors(roles::EMAIL_FIELD, "input[type='email'], input[name='loginfmt']")
        .with_selectors(roles::EMAIL_NEXT, "input[type='submit'], #idSIButton9")
        .with_selectors(roles::PASSWORD_FIELD, "input[type='password'], input[name='passwd']")
        .with_selectors(roles::PASSWORD_NEXT, "input[type='submit'], button[type='submit']")
        .with_selectors(roles::STAY_SIGNED_IN, "#idBtn_Back")
        .with_selectors(
            roles::COMPOSE_BUTTON,
            "button[aria-label*='New message'], .ms-Button--primary",
        )
        .with_selectors(
            roles::RECIPIENT_FIELD,
            "input[aria-label*='To'], input[placeholder*='To'], .ms-TextField-input",
        )
        .with_selectors(
            roles::SUBJECT_FIELD,
            "input[aria-label*='Subject'], input[placeholder*='Subject'], .ms-TextField-input",
        )
        .with_selectors(
            roles::BODY_FIELD,
            "div[contenteditable='true'], .ms-Editor-content, iframe[title*='Message']",
        )
        .with_selectors(
            roles::SUBMIT_BUTTON,
            "button[aria-label*='Send'], .ms-Button--primary",
        )
        .with_selectors(roles::SENT_CONFIRMATION, "div[role='status'][aria-label*='sent']")
        .with_selectors(
            roles::SENT_FOLDER,
            "a[href*='sentitems'], div[title='Sent Items']",
        )
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

impl ProviderAdapter for OutlookAdapter {
    fn capability(&self) -> &ProviderCapability {
        &self.capability
    }

    fn login_url(&self) -> &str {
        OUTLOOK_LOGIN_URL
    }

    fn selector_timeout(&self) -> Duration {
        self.selector_timeout
    }

    /// Microsoft asks whether to stay signed in after the password; the
    /// prompt does not always appear.
    fn auth_steps(&self, credentials: &Credentials) -> Result<Vec<ActionStep>, EngineError> {
        let mut steps = mail_login_steps(self, credentials)?;
        steps.push(
            ActionStep::click("decline-stay-signed-in", self.query(roles::STAY_SIGNED_IN)?)
                .optional(),
        );
        Ok(number_steps("auth", steps))
    }

    fn plan_steps(&self, task: &StructuredTask) -> Result<Vec<ActionStep>, EngineError> {
        match task.intent() {
            Intent::SendMessage => compose_message_steps(self, task),
            other => Err(unsupported(self, other)),
        }
    }
}
