//! # ACME Challenges
//!
//! Challenges used to validate ownership of an identifier, as part
//! of an authorization. Only HTTP-01 is answered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::errors::AcmeErrorDocument;
use crate::protocol::Url;

/// ACME challenge variety.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[non_exhaustive]
pub enum Challenge {
    /// HTTP-01 challenge where the client must serve a file at a specific URL.
    #[serde(rename = "http-01")]
    Http01(Http01Challenge),

    /// Any challenge type this crate does not answer.
    #[serde(other)]
    Unsupported,
}

impl Challenge {
    /// Get the inner HTTP-01 challenge, if this is an HTTP-01 challenge.
    pub fn http01(&self) -> Option<&Http01Challenge> {
        match self {
            Challenge::Http01(http) => Some(http),
            _ => None,
        }
    }
}

/// An HTTP-01 challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Http01Challenge {
    /// The URL used to tell the provider the challenge is ready.
    pub url: Url,

    /// Status of the challenge.
    pub status: ChallengeStatus,

    /// The token to serve under `/.well-known/acme-challenge/`.
    pub token: String,

    /// When the provider validated this challenge.
    #[serde(default)]
    pub validated: Option<DateTime<Utc>>,

    /// Why validation failed.
    #[serde(default)]
    pub error: Option<AcmeErrorDocument>,
}

/// State of the ACME challenge.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    /// This challenge has not been submitted.
    Pending,
    /// The client has indicated that this challenge is ready to be validated, but
    /// the server has not yet validated it.
    Processing,
    /// The server has validated this challenge.
    Valid,
    /// The server has validated this challenge, but the validation failed.
    Invalid,
}

/// The (empty) payload which asks the provider to validate a challenge.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ChallengeReadiness {}
