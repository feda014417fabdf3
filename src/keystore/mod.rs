//! # PKCS#12 keystore
//!
//! The keystore is the durable artifact of a renewal: the certificate chain
//! and the encrypted domain key, under an alias, readable by the TLS server
//! which terminates connections for the domain.
//!
//! The layout is the one Java's `keytool` and OpenSSL produce by default:
//!
//! - the certificates, each in a `certBag`, inside an `EncryptedData`
//!   content protected with `pbeWithSHAAnd40BitRC2-CBC`;
//! - the private key in a `pkcs8ShroudedKeyBag` encrypted with
//!   `pbeWithSHAAnd3-KeyTripleDES-CBC`, inside a plain `Data` content;
//! - an HMAC-SHA1 over both contents.
//!
//! The leaf certificate and the key share the alias as `friendlyName` and a
//! random `localKeyId`. Other certificates of the chain are named
//! `"root"`. The password is always empty: the file is protected by its
//! permissions, since the server has to load it unattended.

use der::asn1::{Any, OctetString, SetOfVec};
use der::{Decode, Encode, Tag, Tagged};
use rand::RngCore;
use thiserror::Error;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

use crate::cert::CertificateChain;
use crate::key::{DomainKey, KeyError};

mod asn1;
mod pbe;

use self::asn1::{
    CertBag, ContentInfo, EncryptedContentInfo, EncryptedData, Pfx, SafeBag, ShroudedKeyBag,
};
use self::pbe::Scheme;

/// Friendly name of every certificate in the chain except the leaf.
pub const CHAIN_FRIENDLY_NAME: &str = "root";

const PFX_VERSION: u8 = 3;
const LOCAL_KEY_ID_LEN: usize = 20;

/// Failure to encode or decode a keystore.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// A keystore must hold at least the leaf certificate.
    #[error("the certificate chain is empty")]
    EmptyChain,

    /// A structure could not be DER encoded or decoded.
    #[error("DER: {0}")]
    Der(#[from] der::Error),

    /// The private key could not be encoded or decoded.
    #[error("private key: {0}")]
    Key(#[from] KeyError),

    /// A cipher or MAC rejected its key or IV.
    #[error("cipher initialization failed")]
    Cipher,

    /// Decrypted content had invalid padding.
    #[error("decryption failed")]
    Decrypt,

    /// The integrity check did not match the contents.
    #[error("MAC verification failed")]
    MacMismatch,

    /// An algorithm other than the ones this crate writes.
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(der::asn1::ObjectIdentifier),

    /// A required part of the structure is missing or has the wrong shape.
    #[error("malformed keystore: {0}")]
    Malformed(&'static str),
}

/// Assembles keystores for a fixed alias.
#[derive(Debug, Clone)]
pub struct KeystoreBuilder {
    alias: String,
}

impl KeystoreBuilder {
    /// A builder which files the key and leaf certificate under `alias`.
    pub fn new(alias: impl Into<String>) -> Self {
        KeystoreBuilder {
            alias: alias.into(),
        }
    }

    /// The alias entries are filed under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Encode `chain` (leaf first) and `key` as a DER PKCS#12 file.
    ///
    /// Salts and the local key id are fresh for every call, so two builds
    /// of the same inputs differ byte for byte.
    pub fn build(&self, chain: &CertificateChain, key: &DomainKey) -> Result<Vec<u8>, KeystoreError> {
        if chain.chain().is_empty() {
            return Err(KeystoreError::EmptyChain);
        }

        let password = pbe::password("");

        let mut local_key_id = vec![0u8; LOCAL_KEY_ID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut local_key_id);

        let certificates = chain
            .chain()
            .iter()
            .enumerate()
            .map(|(index, certificate)| {
                let attributes = if index == 0 {
                    vec![friendly_name(&self.alias)?, local_key_id_attribute(&local_key_id)?]
                } else {
                    vec![friendly_name(CHAIN_FRIENDLY_NAME)?]
                };
                certificate_bag(certificate, attributes)
            })
            .collect::<Result<Vec<_>, KeystoreError>>()?;

        let (algorithm, encrypted) =
            pbe::encrypt(Scheme::Rc2With40BitKey, &password, &certificates.to_der()?)?;
        let certificates = ContentInfo::encrypted(&EncryptedData {
            version: 0,
            encrypted_content_info: EncryptedContentInfo {
                content_type: asn1::ID_DATA,
                content_encryption_algorithm: algorithm,
                encrypted_content: Some(OctetString::new(encrypted)?),
            },
        })?;

        let (algorithm, encrypted) =
            pbe::encrypt(Scheme::TripleDes, &password, key.to_pkcs8_der()?.as_bytes())?;
        let shrouded = ShroudedKeyBag {
            encryption_algorithm: algorithm,
            encrypted_data: OctetString::new(encrypted)?,
        };
        let key_bag = SafeBag {
            bag_id: asn1::SHROUDED_KEY_BAG,
            bag_value: Any::encode_from(&shrouded)?,
            bag_attributes: Some(SetOfVec::try_from(vec![
                friendly_name(&self.alias)?,
                local_key_id_attribute(&local_key_id)?,
            ])?),
        };
        let keys = ContentInfo::data(vec![key_bag].to_der()?)?;

        let auth_safe = vec![certificates, keys].to_der()?;
        let mac_data = pbe::mac(&password, &auth_safe)?;

        let pfx = Pfx {
            version: PFX_VERSION,
            auth_safe: ContentInfo::data(auth_safe)?,
            mac_data: Some(mac_data),
        };

        tracing::debug!(alias = %self.alias, certificates = chain.chain().len(), "Built keystore");
        Ok(pfx.to_der()?)
    }
}

fn friendly_name(name: &str) -> Result<Attribute, KeystoreError> {
    let bmp: Vec<u8> = name.encode_utf16().flat_map(u16::to_be_bytes).collect();
    Ok(Attribute {
        oid: asn1::FRIENDLY_NAME,
        values: SetOfVec::try_from(vec![Any::new(Tag::BmpString, bmp)?])?,
    })
}

fn local_key_id_attribute(id: &[u8]) -> Result<Attribute, KeystoreError> {
    Ok(Attribute {
        oid: asn1::LOCAL_KEY_ID,
        values: SetOfVec::try_from(vec![Any::encode_from(&OctetString::new(id)?)?])?,
    })
}

fn certificate_bag(
    certificate: &Certificate,
    attributes: Vec<Attribute>,
) -> Result<SafeBag, KeystoreError> {
    let bag = CertBag {
        cert_id: asn1::X509_CERTIFICATE,
        cert_value: OctetString::new(certificate.to_der()?)?,
    };

    Ok(SafeBag {
        bag_id: asn1::CERT_BAG,
        bag_value: Any::encode_from(&bag)?,
        bag_attributes: Some(SetOfVec::try_from(attributes)?),
    })
}

/// An entry of a decoded keystore.
#[derive(Debug, Clone)]
pub struct Entry<T> {
    /// The `friendlyName` attribute.
    pub friendly_name: Option<String>,
    /// The `localKeyId` attribute.
    pub local_key_id: Option<Vec<u8>>,
    /// The certificate or key.
    pub value: T,
}

impl<T> Entry<T> {
    fn is_named(&self, alias: &str) -> bool {
        self.friendly_name.as_deref() == Some(alias)
    }
}

/// A decoded, integrity checked and decrypted keystore.
#[derive(Debug, Clone, Default)]
pub struct Keystore {
    certificates: Vec<Entry<Certificate>>,
    keys: Vec<Entry<DomainKey>>,
}

impl Keystore {
    /// Decode a keystore written with the empty password.
    ///
    /// The MAC is verified before anything is decrypted. Bags of other types
    /// are skipped.
    pub fn parse(data: &[u8]) -> Result<Self, KeystoreError> {
        let password = pbe::password("");
        let pfx = Pfx::from_der(data)?;
        if pfx.version != PFX_VERSION {
            return Err(KeystoreError::Malformed("unsupported PFX version"));
        }

        let auth_safe = data_content(&pfx.auth_safe)?;
        let mac_data = pfx
            .mac_data
            .as_ref()
            .ok_or(KeystoreError::Malformed("missing MAC"))?;
        pbe::verify(&password, mac_data, auth_safe.as_bytes())?;

        let mut keystore = Keystore::default();
        for content in Vec::<ContentInfo>::from_der(auth_safe.as_bytes())? {
            let bags = if content.content_type == asn1::ID_DATA {
                data_content(&content)?.as_bytes().to_vec()
            } else if content.content_type == asn1::ID_ENCRYPTED_DATA {
                let encrypted: EncryptedData = asn1::decode_any(
                    content
                        .content
                        .as_ref()
                        .ok_or(KeystoreError::Malformed("empty encrypted content"))?,
                )?;
                let info = encrypted.encrypted_content_info;
                let ciphertext = info
                    .encrypted_content
                    .ok_or(KeystoreError::Malformed("missing ciphertext"))?;
                pbe::decrypt(
                    &info.content_encryption_algorithm,
                    &password,
                    ciphertext.as_bytes(),
                )?
            } else {
                tracing::warn!(content_type = %content.content_type, "Skipping unknown content");
                continue;
            };

            for bag in Vec::<SafeBag>::from_der(&bags)? {
                keystore.add(bag, &password)?;
            }
        }

        Ok(keystore)
    }

    fn add(&mut self, bag: SafeBag, password: &[u8]) -> Result<(), KeystoreError> {
        let friendly_name = bag
            .attribute(asn1::FRIENDLY_NAME)
            .map(decode_bmp_string)
            .transpose()?;
        let local_key_id = bag
            .attribute(asn1::LOCAL_KEY_ID)
            .map(asn1::decode_any::<OctetString>)
            .transpose()?
            .map(OctetString::into_bytes);

        if bag.bag_id == asn1::CERT_BAG {
            let cert_bag: CertBag = asn1::decode_any(&bag.bag_value)?;
            if cert_bag.cert_id != asn1::X509_CERTIFICATE {
                return Err(KeystoreError::UnsupportedAlgorithm(cert_bag.cert_id));
            }
            self.certificates.push(Entry {
                friendly_name,
                local_key_id,
                value: Certificate::from_der(cert_bag.cert_value.as_bytes())?,
            });
        } else if bag.bag_id == asn1::SHROUDED_KEY_BAG {
            let shrouded: ShroudedKeyBag = asn1::decode_any(&bag.bag_value)?;
            let pkcs8 = pbe::decrypt(
                &shrouded.encryption_algorithm,
                password,
                shrouded.encrypted_data.as_bytes(),
            )?;
            self.keys.push(Entry {
                friendly_name,
                local_key_id,
                value: DomainKey::from_pkcs8_der(&pkcs8)?,
            });
        } else if bag.bag_id == asn1::KEY_BAG {
            self.keys.push(Entry {
                friendly_name,
                local_key_id,
                value: DomainKey::from_pkcs8_der(&bag.bag_value.to_der()?)?,
            });
        } else {
            tracing::debug!(bag = %bag.bag_id, "Skipping unsupported bag");
        }

        Ok(())
    }

    /// All certificates, in file order.
    pub fn certificates(&self) -> &[Entry<Certificate>] {
        &self.certificates
    }

    /// All private keys, in file order.
    pub fn keys(&self) -> &[Entry<DomainKey>] {
        &self.keys
    }

    /// The private key filed under `alias`.
    pub fn key(&self, alias: &str) -> Option<&DomainKey> {
        self.keys
            .iter()
            .find(|entry| entry.is_named(alias))
            .map(|entry| &entry.value)
    }

    /// The certificate filed under `alias`: the one carrying the alias as
    /// its friendly name, or else the one sharing a local key id with the
    /// key of that alias.
    pub fn certificate(&self, alias: &str) -> Option<&Certificate> {
        if let Some(entry) = self.certificates.iter().find(|entry| entry.is_named(alias)) {
            return Some(&entry.value);
        }

        let id = self
            .keys
            .iter()
            .find(|entry| entry.is_named(alias))?
            .local_key_id
            .as_ref()?;
        self.certificates
            .iter()
            .find(|entry| entry.local_key_id.as_ref() == Some(id))
            .map(|entry| &entry.value)
    }
}

fn data_content(content: &ContentInfo) -> Result<OctetString, KeystoreError> {
    if content.content_type != asn1::ID_DATA {
        return Err(KeystoreError::Malformed("expected a data content"));
    }
    let any = content
        .content
        .as_ref()
        .ok_or(KeystoreError::Malformed("empty data content"))?;
    Ok(asn1::decode_any(any)?)
}

fn decode_bmp_string(any: &Any) -> Result<String, KeystoreError> {
    if any.tag() != Tag::BmpString {
        return Err(KeystoreError::Malformed("friendly name is not a BMPString"));
    }
    let units: Vec<u16> = any
        .value()
        .chunks(2)
        .map(|pair| match pair {
            [high, low] => Ok(u16::from_be_bytes([*high, *low])),
            _ => Err(KeystoreError::Malformed("odd length BMPString")),
        })
        .collect::<Result<_, _>>()?;
    String::from_utf16(&units).map_err(|_| KeystoreError::Malformed("invalid BMPString"))
}

/// Recover the domain key filed under `alias` from an existing keystore.
pub fn extract_key_pair(data: &[u8], alias: &str) -> Result<Option<DomainKey>, KeystoreError> {
    Ok(Keystore::parse(data)?.key(alias).cloned())
}

/// Read the certificate filed under `alias` from an existing keystore.
pub fn read_certificate(data: &[u8], alias: &str) -> Result<Option<Certificate>, KeystoreError> {
    Ok(Keystore::parse(data)?.certificate(alias).cloned())
}

/// Check the integrity of a keystore without decrypting it.
pub fn verify_mac(data: &[u8]) -> Result<(), KeystoreError> {
    let pfx = Pfx::from_der(data)?;
    let mac_data = pfx
        .mac_data
        .as_ref()
        .ok_or(KeystoreError::Malformed("missing MAC"))?;
    let auth_safe = data_content(&pfx.auth_safe)?;
    pbe::verify(&pbe::password(""), mac_data, auth_safe.as_bytes())
}
