#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cdp_adapter::{DomFixture, MemoryDriver};
use taskpilot_cli::providers::roles;
use taskpilot_cli::{Credentials, EngineConfig, ExecutionOrchestrator, ProviderCapability};

/// Mail page whose elements appear as a real sign-in and compose flow would
/// reveal them. Every role uses its first candidate unless told otherwise.
pub struct MailPage<'a> {
    capability: &'a ProviderCapability,
    choice: HashMap<&'static str, Option<usize>>,
    signed_in: bool,
    rejects_login: bool,
}

impl<'a> MailPage<'a> {
    pub fn new(capability: &'a ProviderCapability) -> Self {
        Self {
            capability,
            choice: HashMap::new(),
            signed_in: false,
            rejects_login: false,
        }
    }

    /// Render `role` with its `index`-th candidate instead of the first.
    pub fn candidate(mut self, role: &'static str, index: usize) -> Self {
        self.choice.insert(role, Some(index));
        self
    }

    /// Leave `role` off the page entirely.
    pub fn without(mut self, role: &'static str) -> Self {
        self.choice.insert(role, None);
        self
    }

    /// Mailbox is open from the start.
    pub fn signed_in(mut self) -> Self {
        self.signed_in = true;
        self
    }

    /// Password step shows the error banner instead of the mailbox.
    pub fn rejecting_login(mut self) -> Self {
        self.rejects_login = true;
        self
    }

    pub fn selector(&self, role: &str) -> Option<String> {
        let index = match self.choice.get(role) {
            Some(None) => return None,
            Some(Some(index)) => *index,
            None => 0,
        };
        self.capability
            .candidates(role)
            .and_then(|list| list.get(index))
            .cloned()
    }

    fn reveal(&self, dom: DomFixture, trigger: &str, revealed: &[&str]) -> DomFixture {
        match self.selector(trigger) {
            Some(trigger) => {
                let revealed: Vec<String> =
                    revealed.iter().filter_map(|role| self.selector(role)).collect();
                dom.reveal_on(trigger, revealed)
            }
            None => dom,
        }
    }

    fn present(&self, mut dom: DomFixture, roles: &[&str]) -> DomFixture {
        for role in roles {
            if let Some(selector) = self.selector(role) {
                dom = dom.with_element(selector);
            }
        }
        dom
    }

    pub fn build(&self) -> DomFixture {
        let mut dom = DomFixture::new().with_title(self.capability.name());
        if self.signed_in {
            dom = self.present(dom, &[roles::MAILBOX_READY, roles::COMPOSE_BUTTON]);
        } else {
            dom = self.present(dom, &[roles::EMAIL_FIELD, roles::EMAIL_NEXT]);
            dom = self.reveal(
                dom,
                roles::EMAIL_NEXT,
                &[roles::PASSWORD_FIELD, roles::PASSWORD_NEXT],
            );
            let after_password: &[&str] = if self.rejects_login {
                &[roles::LOGIN_ERROR]
            } else {
                &[roles::MAILBOX_READY, roles::COMPOSE_BUTTON]
            };
            dom = self.reveal(dom, roles::PASSWORD_NEXT, after_password);
        }
        dom = self.reveal(
            dom,
            roles::COMPOSE_BUTTON,
            &[
                roles::RECIPIENT_FIELD,
                roles::SUBJECT_FIELD,
                roles::BODY_FIELD,
                roles::SUBMIT_BUTTON,
            ],
        );
        self.reveal(
            dom,
            roles::SUBMIT_BUTTON,
            &[roles::SENT_CONFIRMATION, roles::SENT_FOLDER],
        )
    }
}

pub fn mail_credentials(address: &str) -> Credentials {
    Credentials::new()
        .with("email", address)
        .with("password", "correct horse battery staple")
}

/// Credentials for both built-in providers, short waits, artifacts in `dir`.
pub fn engine_config(dir: &Path) -> EngineConfig {
    let mut config = EngineConfig {
        timeout_secs: 60,
        retry_attempts: 3,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 40,
        selector_timeout_ms: 200,
        artifacts_dir: dir.join("artifacts"),
        ..EngineConfig::default()
    };
    config
        .providers
        .insert("gmail".into(), mail_credentials("me@gmail.com"));
    config
        .providers
        .insert("outlook".into(), mail_credentials("me@outlook.com"));
    config
}

pub fn orchestrator(config: EngineConfig, driver: Arc<MemoryDriver>) -> ExecutionOrchestrator {
    ExecutionOrchestrator::from_config(config, driver, None).expect("valid test config")
}
