//! # Authorizations
//!
//! One authorization exists per identifier of an order. It lists the
//! challenges the provider will accept as proof of control.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::challenges::{Challenge, Http01Challenge};
use super::identifier::Identifier;

/// An ACME authorization object, which represents the server's
/// authorization for an account to represent an identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// The identifier that the account is authorized to represent.
    pub identifier: Identifier,

    /// The status of this authorization.
    pub status: AuthorizationStatus,

    /// The timestamp after which the server will consider this
    /// authorization invalid.
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,

    /// The challenges the client can fulfill to prove control of the
    /// identifier.
    #[serde(default)]
    pub challenges: Vec<Challenge>,

    /// Whether the authorization is for a wildcard domain.
    #[serde(default)]
    pub wildcard: bool,
}

impl Authorization {
    /// The HTTP-01 challenge, if the provider offered one.
    pub fn http01(&self) -> Option<&Http01Challenge> {
        self.challenges.iter().find_map(Challenge::http01)
    }
}

/// The status of this authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    /// The authorization is waiting for a challenge to be fulfilled.
    Pending,
    /// A challenge succeeded.
    Valid,
    /// A challenge failed, or the authorization errored.
    Invalid,
    /// The client deactivated this authorization.
    Deactivated,
    /// The authorization expired.
    Expired,
    /// The server revoked this authorization.
    Revoked,
}
