//! Keyword and pattern extraction used when the LLM path is unavailable.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::errors::InterpretError;
use crate::model::{normalize_provider, Intent, InterpretationSource, StructuredTask};

pub const DEFAULT_SUBJECT: &str = "Message from TaskPilot";

const BASE_CONFIDENCE: f64 = 0.20;
const KEYWORD_BONUS: f64 = 0.15;
const RECIPIENT_BONUS: f64 = 0.15;
const SUBJECT_BONUS: f64 = 0.05;
const BODY_BONUS: f64 = 0.05;

pub(crate) static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex")
});

static EMAIL_EXACT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email regex")
});

/// What may follow a closing single quote. An apostrophe inside a word
/// ("It's", "Bob's") is followed by a letter and never closes the quote.
const QUOTE_END: &str = r"(?P<end>\s*[,.;:!?]|\s+(?:saying|that\s+says|with|body|message|via|using|on|through|to|and)\b|\s*$)";

static SUBJECT_QUOTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)\b(?:subject|titled)\s*(?::|is)?\s*(?:'(?P<single>.*?)'{QUOTE_END}|"(?P<double>[^"]*)")"#
    ))
    .expect("subject regex")
});

static SUBJECT_BARE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:subject\s*:|titled)\s*(?P<text>.+?)(?:\s+(?:saying|that says|with body|body\s*:|message\s*:)|[.;]?\s*$)",
    )
    .expect("subject regex")
});

static BODY_QUOTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"(?i)(?:\bsaying|\bthat says|\bmessage\s*:|\bbody\s*:)\s*(?:'(?P<single>.*?)'{QUOTE_END}|"(?P<double>[^"]*)")"#
    ))
    .expect("body regex")
});

static BODY_BARE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bsaying|\bthat says|\bmessage\s*:|\bbody\s*:)\s*(?P<text>.+?)\s*$")
        .expect("body regex")
});

static PROVIDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:via|using|with|on|through)\s+(?P<name>[A-Za-z][\w.-]*)")
        .expect("provider regex")
});

static DOUBLE_QUOTED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*""#).expect("quoted regex"));

/// A single-quoted span opening at a word start. `lead` and `end` are kept
/// when the span is blanked out.
static SINGLE_QUOTED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?P<lead>^|[^\w'])'(?P<inner>.*?)'{QUOTE_END}")).expect("quoted regex")
});

static KEYWORD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?P<kw>e-?mail|mail|message|send|schedule|meeting|calendar|upload|attach|post|publish|tweet)\b",
    )
    .expect("keyword regex")
});

fn keyword_intent(keyword: &str) -> Option<Intent> {
    match keyword.to_ascii_lowercase().as_str() {
        "email" | "e-mail" | "mail" | "message" | "send" => Some(Intent::SendMessage),
        "schedule" | "meeting" | "calendar" => Some(Intent::ScheduleEvent),
        "upload" | "attach" => Some(Intent::UploadFile),
        "post" | "publish" | "tweet" => Some(Intent::PublishPost),
        _ => None,
    }
}

/// Every well-formed address in `text`, in order of appearance.
pub fn find_addresses(text: &str) -> Vec<String> {
    EMAIL_REGEX
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn is_valid_address(address: &str) -> bool {
    EMAIL_EXACT_REGEX.is_match(address.trim())
}

/// Subject from the first five words of the body, at most 50 characters.
pub fn generate_subject(body: &str) -> String {
    let words: Vec<&str> = body.split_whitespace().take(5).collect();
    if words.is_empty() {
        return DEFAULT_SUBJECT.to_string();
    }
    let subject = words.join(" ");
    if subject.chars().count() > 50 {
        let truncated: String = subject.chars().take(47).collect();
        format!("{truncated}...")
    } else {
        subject
    }
}

fn first_capture(regex: &Regex, text: &str, groups: &[&str]) -> Option<String> {
    let caps = regex.captures(text)?;
    groups
        .iter()
        .find_map(|group| caps.name(group))
        .map(|m| m.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Pattern-based extractor.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedExtractor {
    known_providers: Vec<String>,
}

impl RuleBasedExtractor {
    pub fn new<I, S>(known_providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known_providers: known_providers
                .into_iter()
                .map(|name| normalize_provider(name.as_ref()))
                .collect(),
        }
    }

    pub fn known_providers(&self) -> &[String] {
        &self.known_providers
    }

    fn subject(&self, text: &str) -> Option<String> {
        first_capture(&SUBJECT_QUOTED_REGEX, text, &["single", "double"])
            .or_else(|| first_capture(&SUBJECT_BARE_REGEX, text, &["text"]))
    }

    fn body(&self, text: &str) -> Option<String> {
        first_capture(&BODY_QUOTED_REGEX, text, &["single", "double"])
            .or_else(|| first_capture(&BODY_BARE_REGEX, text, &["text"]))
    }

    fn provider_hint(&self, text: &str) -> Option<String> {
        PROVIDER_REGEX
            .captures_iter(text)
            .filter_map(|caps| caps.name("name"))
            .map(|m| normalize_provider(m.as_str()))
            .find(|name| self.known_providers.iter().any(|known| known == name))
    }

    /// Earliest intent keyword outside quotes and outside the message body.
    fn keyword_intent(&self, text: &str) -> Option<Intent> {
        let unquoted = DOUBLE_QUOTED_REGEX.replace_all(text, " ");
        let unquoted = SINGLE_QUOTED_REGEX.replace_all(&unquoted, "${lead} ${end}");
        let scope = BODY_BARE_REGEX
            .find(&unquoted)
            .map(|m| &unquoted[..m.start()])
            .unwrap_or(&unquoted);
        KEYWORD_REGEX
            .captures_iter(scope)
            .filter_map(|caps| caps.name("kw"))
            .find_map(|m| keyword_intent(m.as_str()))
    }

    pub fn extract(&self, instruction: &str) -> Result<StructuredTask, InterpretError> {
        let text = instruction.trim();
        let keyword = self.keyword_intent(text);
        let recipients = find_addresses(text);

        let intent = match (keyword, recipients.is_empty()) {
            (Some(intent), _) => intent,
            (None, false) => Intent::SendMessage,
            (None, true) => {
                return Err(InterpretError::interpretation(format!(
                    "no intent keyword or address in '{text}'"
                )))
            }
        };

        let subject = self.subject(text);
        let body = self.body(text);

        let mut confidence = BASE_CONFIDENCE;
        if keyword.is_some() {
            confidence += KEYWORD_BONUS;
        }
        if !recipients.is_empty() {
            confidence += RECIPIENT_BONUS;
        }
        if subject.is_some() {
            confidence += SUBJECT_BONUS;
        }
        if body.is_some() {
            confidence += BODY_BONUS;
        }

        let body = body.unwrap_or_default();
        let subject = subject.unwrap_or_else(|| generate_subject(&body));
        let provider_hint = self.provider_hint(text);
        debug!(
            %intent,
            recipients = recipients.len(),
            provider_hint = provider_hint.as_deref().unwrap_or("-"),
            confidence,
            "rule-based extraction"
        );

        Ok(
            StructuredTask::new(intent, text, InterpretationSource::RuleBased)
                .with_provider_hint(provider_hint)
                .with_recipients(recipients)
                .with_subject(subject)
                .with_body(body)
                .with_confidence(confidence),
        )
    }
}
