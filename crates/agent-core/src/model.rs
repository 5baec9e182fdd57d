use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// What the user wants done.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SendMessage,
    ScheduleEvent,
    UploadFile,
    PublishPost,
}

impl Intent {
    pub const ALL: [Intent; 4] = [
        Intent::SendMessage,
        Intent::ScheduleEvent,
        Intent::UploadFile,
        Intent::PublishPost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SendMessage => "send_message",
            Intent::ScheduleEvent => "schedule_event",
            Intent::UploadFile => "upload_file",
            Intent::PublishPost => "publish_post",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    /// Accepts the canonical names plus the loose labels models tend to emit.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "send_message" | "send_email" | "email" | "mail" | "message" | "send" => {
                Ok(Intent::SendMessage)
            }
            "schedule_event" | "schedule" | "meeting" | "calendar" => Ok(Intent::ScheduleEvent),
            "upload_file" | "upload" | "attach" => Ok(Intent::UploadFile),
            "publish_post" | "post" | "publish" | "tweet" => Ok(Intent::PublishPost),
            _ => Err(format!("unknown intent '{value}'")),
        }
    }
}

/// Which path produced a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpretationSource {
    Llm,
    RuleBased,
}

impl fmt::Display for InterpretationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretationSource::Llm => f.write_str("llm"),
            InterpretationSource::RuleBased => f.write_str("rule_based"),
        }
    }
}

/// Interpreted instruction. Built once by the interpreter, read-only after.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredTask {
    intent: Intent,
    provider_hint: Option<String>,
    recipients: Vec<String>,
    subject: String,
    body: String,
    instruction: String,
    confidence: f64,
    source: InterpretationSource,
}

impl StructuredTask {
    pub(crate) fn new(
        intent: Intent,
        instruction: impl Into<String>,
        source: InterpretationSource,
    ) -> Self {
        Self {
            intent,
            provider_hint: None,
            recipients: Vec::new(),
            subject: String::new(),
            body: String::new(),
            instruction: instruction.into(),
            confidence: 0.0,
            source,
        }
    }

    pub(crate) fn with_provider_hint(mut self, hint: Option<String>) -> Self {
        self.provider_hint = hint
            .map(|h| normalize_provider(&h))
            .filter(|h| !h.is_empty() && h != "auto");
        self
    }

    pub(crate) fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = dedup_recipients(recipients);
        self
    }

    pub(crate) fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into().trim().to_string();
        self
    }

    pub(crate) fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().trim().to_string();
        self
    }

    pub(crate) fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn provider_hint(&self) -> Option<&str> {
        self.provider_hint.as_deref()
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn source(&self) -> InterpretationSource {
        self.source
    }

    /// Whether the task carries what its intent needs to run.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.intent == Intent::SendMessage && self.recipients.is_empty() {
            missing.push("recipients");
        }
        missing
    }
}

/// Shape the model is asked to reply with. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TaskDraft {
    /// One of send_message, schedule_event, upload_file, publish_post.
    pub intent: Option<String>,
    /// Service the user named, or "auto".
    pub provider: Option<String>,
    pub recipients: RecipientList,
    pub subject: Option<String>,
    pub body: Option<String>,
    /// Model's own certainty in [0, 1].
    pub confidence: Option<f64>,
}

/// Recipients as a list, or as free text the addresses are pulled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RecipientList {
    List(Vec<String>),
    Text(String),
}

impl Default for RecipientList {
    fn default() -> Self {
        RecipientList::List(Vec::new())
    }
}

pub(crate) fn normalize_provider(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    lower
        .strip_suffix(".com")
        .unwrap_or(&lower)
        .to_string()
}

/// Order-preserving, case-insensitive dedup of trimmed addresses.
pub(crate) fn dedup_recipients<I, S>(recipients: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .map(|r| r.into().trim().to_string())
        .filter(|r| !r.is_empty())
        .filter(|r| seen.insert(r.to_ascii_lowercase()))
        .collect()
}
