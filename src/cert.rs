//! X.509 certificate signing requests and certificate chains
//!
//! The CSR names the domain twice: as the subject common name and as the
//! only DNS entry in the SubjectAltName extension. ACME providers only look
//! at the SAN, while some TLS clients still inspect the subject.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use der::asn1::{Any, BitString, Ia5String, OctetString, SetOfVec};
use der::{Decode as _, Encode};
use pkcs8::EncodePublicKey;
use signature::Signer;
use thiserror::Error;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::SubjectAltName;
use x509_cert::ext::Extension;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::Certificate;

use crate::key::DomainKey;
use crate::protocol::AcmeError;

const PEM_DOCUMENT_BEGIN: &str = "-----BEGIN";

/// Failure to build a certificate signing request.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// A structure could not be DER encoded, or the domain is not a valid
    /// IA5 string.
    #[error("DER encoding: {0}")]
    Der(#[from] der::Error),

    /// The public key could not be encoded as SubjectPublicKeyInfo.
    #[error("encoding public key: {0}")]
    PublicKey(#[from] x509_cert::spki::Error),

    /// The signer failed.
    #[error("signing the request: {0}")]
    Signing(#[from] signature::Error),
}

/// The informational data in a certificate signing request sufficient to
/// fulfill an ACME certificate signing order's finalize step.
#[derive(Debug, Clone)]
pub struct CertificateSigningRequest {
    domain: String,
}

impl CertificateSigningRequest {
    /// A request for a certificate covering exactly `domain`.
    pub fn new(domain: impl Into<String>) -> Self {
        CertificateSigningRequest {
            domain: domain.into(),
        }
    }

    /// The domain named by this request.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Sign this request with the domain key, producing the DER encoded
    /// PKCS#10 request.
    ///
    /// The key here must not be the account key.
    pub fn sign(&self, key: &DomainKey) -> Result<SignedCertificateRequest, CertificateError> {
        let public_key: SubjectPublicKeyInfoOwned =
            key.public_key().to_public_key_der()?.decode_msg()?;

        let subject = x509_cert::name::Name::from_str(&format!("CN={}", self.domain))?;

        let san = SubjectAltName(vec![GeneralName::DnsName(Ia5String::new(&self.domain)?)]);
        let extensions = vec![Extension {
            extn_id: const_oid::db::rfc5912::ID_CE_SUBJECT_ALT_NAME,
            critical: false,
            extn_value: OctetString::new(san.to_der()?)?,
        }];

        let request = x509_cert::attr::Attribute {
            oid: const_oid::db::rfc5912::ID_EXTENSION_REQ,
            values: SetOfVec::try_from(vec![Any::encode_from(&extensions)?])?,
        };

        let info = x509_cert::request::CertReqInfo {
            version: x509_cert::request::Version::V1,
            subject,
            public_key,
            attributes: SetOfVec::try_from(vec![request])?,
        };

        let signature: p256::ecdsa::DerSignature = key.signing_key().try_sign(&info.to_der()?)?;

        let csr = x509_cert::request::CertReq {
            info,
            algorithm: AlgorithmIdentifierOwned {
                oid: const_oid::db::rfc5912::ECDSA_WITH_SHA_256,
                parameters: None,
            },
            signature: BitString::from_bytes(signature.as_bytes())?,
        };

        #[cfg(feature = "trace-requests")]
        tracing::trace!(domain = %self.domain, "Signed certificate request");

        Ok(SignedCertificateRequest(csr.to_der()?.into_boxed_slice()))
    }
}

/// A certificate request, cryptographically signed, and encoded as ASN.1 DER
#[derive(Debug, Clone)]
pub struct SignedCertificateRequest(Box<[u8]>);

impl AsRef<[u8]> for SignedCertificateRequest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A chain of certificates, leaf first, as issued for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateChain {
    chain: Vec<Certificate>,
}

impl CertificateChain {
    /// Wrap an ordered list of certificates, leaf first.
    pub fn new(chain: Vec<Certificate>) -> Self {
        CertificateChain { chain }
    }

    /// The certificates, leaf first.
    pub fn chain(&self) -> &[Certificate] {
        &self.chain
    }

    /// The end-entity certificate.
    pub fn leaf(&self) -> Option<&Certificate> {
        self.chain.first()
    }

    /// Decode a concatenation of PEM `CERTIFICATE` documents.
    pub fn from_pem(data: &str) -> Result<Self, AcmeError> {
        let documents_text = data.trim();

        let chain = documents_text
            .split(PEM_DOCUMENT_BEGIN)
            .filter(|doc| !doc.trim().is_empty())
            .map(|part| {
                let doc = format!("{PEM_DOCUMENT_BEGIN}{part}");
                let (label, der) = pem_rfc7468::decode_vec(doc.trim().as_bytes())?;
                if label != "CERTIFICATE" {
                    return Err(AcmeError::PemDecode(pem_rfc7468::Error::Label));
                }
                Ok(Certificate::from_der(&der)?)
            })
            .collect::<Result<Vec<_>, AcmeError>>()
            .inspect_err(|error| {
                tracing::error!("Error {error} decoding certificate chain {documents_text}")
            })?;

        Ok(CertificateChain { chain })
    }
}

impl crate::protocol::response::Decode for CertificateChain {
    fn decode(data: &[u8]) -> Result<Self, AcmeError> {
        CertificateChain::from_pem(std::str::from_utf8(data)?)
    }
}

/// The instant a certificate stops being valid.
///
/// `None` when the encoded time cannot be represented.
pub fn not_after(certificate: &Certificate) -> Option<DateTime<Utc>> {
    let expiry = certificate
        .tbs_certificate
        .validity
        .not_after
        .to_unix_duration();
    DateTime::from_timestamp(i64::try_from(expiry.as_secs()).ok()?, 0)
}
