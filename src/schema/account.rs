//! # Account creation and lookup
//!
//! Accounts are identified by their signing key for ACME. A client which
//! only holds the key looks its account up with `onlyReturnExisting`.

use serde::{Deserialize, Serialize};

use crate::protocol::Url;

/// Payload for the `newAccount` endpoint.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccount {
    /// Contact URLs, usually `mailto:` addresses.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<Url>,

    /// Agreement to the provider's terms of service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms_of_service_agreed: Option<bool>,

    /// Ask the provider to return an existing account for the signing
    /// key, rather than creating one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_return_existing: Option<bool>,
}

impl CreateAccount {
    /// The lookup request: no account is created.
    pub fn lookup() -> Self {
        CreateAccount {
            only_return_existing: Some(true),
            ..Default::default()
        }
    }
}

/// State of an ACME account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// The account is usable.
    Valid,
    /// The client deactivated the account.
    Deactivated,
    /// The provider revoked the account.
    Revoked,
}

/// An ACME account resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Account state.
    pub status: AccountStatus,

    /// Contacts on record.
    #[serde(default)]
    pub contact: Vec<Url>,

    /// Whether the terms of service were agreed to.
    #[serde(default)]
    pub terms_of_service_agreed: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_only_returns_existing() {
        let json = serde_json::to_value(CreateAccount::lookup()).unwrap();
        assert_eq!(json, serde_json::json!({"onlyReturnExisting": true}));
    }

    #[test]
    fn create_with_terms() {
        let request = CreateAccount {
            contact: vec!["mailto:cert-admin@example.org".parse().unwrap()],
            terms_of_service_agreed: Some(true),
            only_return_existing: None,
        };
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "contact": ["mailto:cert-admin@example.org"],
                "termsOfServiceAgreed": true,
            })
        );
    }

    #[test]
    fn account() {
        let raw = crate::fixtures::text("account.json");
        let account: Account = serde_json::from_str(&raw).unwrap();
        assert_eq!(account.status, AccountStatus::Valid);
        assert_eq!(account.contact.len(), 1);
    }
}
