use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Declares a string newtype identifier with the usual conversions
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Document id of a conversation message, generated client-side
    MessageId
);

string_id!(
    /// Provider model identifier, e.g. `gemini-1.5-pro`
    ModelId
);

string_id!(
    /// Document id of a knowledge base item
    KnowledgeId
);

impl MessageId {
    /// Fresh random id, assigned before the message is appended
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl KnowledgeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
