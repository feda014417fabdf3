//! JSON Web Keys and RFC 7638 thumbprints
use std::fmt;

use base64ct::Encoding;
use p256::elliptic_curve::sec1::Coordinates;
use serde::Serialize;
use sha2::Digest;

/// JSON Web Key for the public half of a P-256 account key.
///
/// The JWK is embedded in the protected header of requests which are sent
/// before the account URL is known (account lookup and creation), and its
/// thumbprint is the second half of every HTTP-01 key authorization.
///
/// Members are declared in lexicographic order, which is also the order
/// RFC 7638 requires for the thumbprint input.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Jwk {
    crv: &'static str,
    kty: &'static str,
    x: String,
    y: String,
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("crv", &self.crv)
            .field("x", &self.x)
            .finish_non_exhaustive()
    }
}

impl Jwk {
    pub(crate) fn from_verifying_key(key: &p256::ecdsa::VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let (x, y) = match point.coordinates() {
            Coordinates::Uncompressed { x, y } => (x.as_slice(), y.as_slice()),
            _ => unreachable!("requested an uncompressed point"),
        };

        Jwk {
            crv: "P-256",
            kty: "EC",
            x: base64ct::Base64UrlUnpadded::encode_string(x),
            y: base64ct::Base64UrlUnpadded::encode_string(y),
        }
    }

    /// An RFC 7638 thumbprint, which uniquely identifies this key.
    ///
    /// The thumbprint is the base64url-encoded SHA-256 digest of the
    /// required members, serialized without whitespace in lexicographic
    /// order.
    pub fn thumbprint(&self) -> String {
        let canonical = format!(
            r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
            self.crv, self.kty, self.x, self.y
        );

        let digest = sha2::Sha256::digest(canonical.as_bytes());
        base64ct::Base64UrlUnpadded::encode_string(&digest)
    }
}
