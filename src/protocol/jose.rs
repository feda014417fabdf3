//! JSON Object Signing and Encryption primitives used by RFC 8555.
//!
//! Every ACME request body is a JWS in the flattened JSON serialization:
//!
//! ```text
//! {
//!   "protected": base64url({"alg": "ES256", "kid"|"jwk": ..., "nonce": ..., "url": ...}),
//!   "payload": base64url(<json>) | "",
//!   "signature": base64url(r || s)
//! }
//! ```
//!
//! Only ES256 is produced, since account keys are always NIST P-256.

use base64ct::Encoding;
use serde::Serialize;

use super::errors::AcmeError;
use super::Url;
use crate::key::{AccountKey, Jwk};

/// Anti-replay nonce
///
/// An opaque token provided by the ACME server in the `Replay-Nonce` header.
/// Each nonce may be used exactly once.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Nonce(String);

impl AsRef<str> for Nonce {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for Nonce {
    fn from(value: String) -> Self {
        Nonce(value)
    }
}

/// How the signer identifies itself to the ACME server.
///
/// Before an account exists, the public key is embedded as a JWK. Afterwards,
/// the account URL is sent as the `kid`.
#[derive(Debug, Clone, Copy)]
pub enum KeyIdentity<'k> {
    /// Embed the public key (new account / account lookup requests).
    Jwk,
    /// Identify by account URL.
    Kid(&'k Url),
}

/// The protected header of an ACME JWS.
#[derive(Debug, Serialize)]
pub struct ProtectedHeader<'k> {
    alg: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    jwk: Option<Jwk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'k str>,
    nonce: &'k Nonce,
    url: &'k str,
}

impl<'k> ProtectedHeader<'k> {
    /// Build the header for a request to `url`, signed by `key`.
    pub fn new(key: &AccountKey, identity: KeyIdentity<'k>, url: &'k Url, nonce: &'k Nonce) -> Self {
        let (jwk, kid) = match identity {
            KeyIdentity::Jwk => (Some(key.jwk()), None),
            KeyIdentity::Kid(account) => (None, Some(account.as_str())),
        };

        ProtectedHeader {
            alg: "ES256",
            jwk,
            kid,
            nonce,
            url: url.as_str(),
        }
    }
}

/// A signed JWS, ready to be sent as an `application/jose+json` body.
#[derive(Debug, Clone, Serialize)]
pub struct SignedToken {
    protected: String,
    payload: String,
    signature: String,
}

impl SignedToken {
    /// Sign `payload` under `header`.
    ///
    /// A `None` payload produces the empty-string payload used by
    /// POST-as-GET requests.
    pub fn sign<P>(
        header: &ProtectedHeader<'_>,
        payload: Option<&P>,
        key: &AccountKey,
    ) -> Result<Self, AcmeError>
    where
        P: Serialize,
    {
        let protected = base64url_json(header)?;
        let payload = match payload {
            Some(payload) => base64url_json(payload)?,
            None => String::new(),
        };

        let message = format!("{protected}.{payload}");
        let signature = key.sign(message.as_bytes()).map_err(AcmeError::Signing)?;

        Ok(SignedToken {
            protected,
            payload,
            signature: base64ct::Base64UrlUnpadded::encode_string(&signature),
        })
    }

    /// The encoded protected header.
    pub fn protected(&self) -> &str {
        &self.protected
    }

    /// The encoded payload (empty for POST-as-GET).
    pub fn payload(&self) -> &str {
        &self.payload
    }
}

fn base64url_json<T: Serialize>(value: &T) -> Result<String, AcmeError> {
    let json = serde_json::to_vec(value).map_err(AcmeError::ser)?;
    Ok(base64ct::Base64UrlUnpadded::encode_string(&json))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(part: &str) -> serde_json::Value {
        let bytes = base64ct::Base64UrlUnpadded::decode_vec(part).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn header_embeds_jwk_for_new_accounts() {
        let key = AccountKey::generate();
        let url: Url = "https://example.com/acme/new-account".parse().unwrap();
        let nonce = Nonce::from("6S8IqOGY7eL2lsGoTZYifg".to_owned());

        let header = ProtectedHeader::new(&key, KeyIdentity::Jwk, &url, &nonce);
        let token = SignedToken::sign(&header, Some(&serde_json::json!({"a": 1})), &key).unwrap();

        let protected = decode(token.protected());
        assert_eq!(protected["alg"], "ES256");
        assert_eq!(protected["jwk"]["crv"], "P-256");
        assert!(protected.get("kid").is_none());
        assert_eq!(protected["nonce"], "6S8IqOGY7eL2lsGoTZYifg");
        assert_eq!(protected["url"], "https://example.com/acme/new-account");
    }

    #[test]
    fn post_as_get_has_empty_payload() {
        let key = AccountKey::generate();
        let account: Url = "https://example.com/acme/acct/1".parse().unwrap();
        let url: Url = "https://example.com/acme/order/1".parse().unwrap();
        let nonce = Nonce::from("abc".to_owned());

        let header = ProtectedHeader::new(&key, KeyIdentity::Kid(&account), &url, &nonce);
        let token = SignedToken::sign::<()>(&header, None, &key).unwrap();

        assert_eq!(token.payload(), "");
        let protected = decode(token.protected());
        assert_eq!(protected["kid"], "https://example.com/acme/acct/1");
        assert!(protected.get("jwk").is_none());
    }
}
