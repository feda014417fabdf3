use std::fmt;

use serde::{Deserialize, Serialize};

/// The name an order or authorization is for.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum Identifier {
    /// A DNS name, such as `www.example.com`
    Dns {
        /// The hostname
        value: String,
    },
}

impl Identifier {
    /// An identifier for a DNS hostname.
    pub fn dns(hostname: impl Into<String>) -> Identifier {
        Self::Dns {
            value: hostname.into(),
        }
    }

    /// The name, without its type.
    pub fn value(&self) -> &str {
        match self {
            Identifier::Dns { value } => value,
        }
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dns { value } => f.debug_tuple("Identifier::DNS").field(value).finish(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}
