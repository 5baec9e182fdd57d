use std::fmt;

use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde-full", serde(transparent))]
        #[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// One end-to-end execution of an instruction.
    TaskId
);

string_id!(
    /// Engine-side session owning one browser context.
    SessionId
);

string_id!(
    /// Driver-side isolated browser context (own cookies and storage).
    ContextId
);

string_id!(StepId);

impl StepId {
    /// Deterministic step id derived from its position in a plan.
    pub fn indexed(prefix: &str, index: usize) -> Self {
        Self(format!("{prefix}-{}", index + 1))
    }
}
