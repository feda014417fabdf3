//! PKCS#12 (RFC 7292) and the PKCS#7 content types it is built from.

use der::asn1::{Any, ObjectIdentifier, OctetString, SetOfVec};
use der::{Decode, Encode, Sequence};
use x509_cert::attr::Attribute;
use x509_cert::spki::AlgorithmIdentifierOwned;

pub const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
pub const ID_ENCRYPTED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.6");

pub const KEY_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.1");
pub const SHROUDED_KEY_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.2");
pub const CERT_BAG: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.3");
pub const X509_CERTIFICATE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");

pub const FRIENDLY_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.20");
pub const LOCAL_KEY_ID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.21");

pub const PBE_SHA1_3DES: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.1.3");
pub const PBE_SHA1_RC2_40: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.1.6");
pub const SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");

/// ```text
/// PFX ::= SEQUENCE {
///     version     INTEGER {v3(3)}(v3,...),
///     authSafe    ContentInfo,
///     macData     MacData OPTIONAL
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct Pfx {
    pub version: u8,
    pub auth_safe: ContentInfo,
    pub mac_data: Option<MacData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct ContentInfo {
    pub content_type: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT", optional = "true")]
    pub content: Option<Any>,
}

impl ContentInfo {
    /// An id-data content wrapping `data` in an OCTET STRING.
    pub fn data(data: Vec<u8>) -> der::Result<Self> {
        Ok(ContentInfo {
            content_type: ID_DATA,
            content: Some(Any::encode_from(&OctetString::new(data)?)?),
        })
    }

    pub fn encrypted(data: &EncryptedData) -> der::Result<Self> {
        Ok(ContentInfo {
            content_type: ID_ENCRYPTED_DATA,
            content: Some(Any::encode_from(data)?),
        })
    }
}

/// PKCS#7 `EncryptedData`, version 0.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EncryptedData {
    pub version: u8,
    pub encrypted_content_info: EncryptedContentInfo,
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct EncryptedContentInfo {
    pub content_type: ObjectIdentifier,
    pub content_encryption_algorithm: AlgorithmIdentifierOwned,
    #[asn1(context_specific = "0", tag_mode = "IMPLICIT", optional = "true")]
    pub encrypted_content: Option<OctetString>,
}

/// ```text
/// SafeBag ::= SEQUENCE {
///     bagId          BAG-TYPE.&id ({PKCS12BagSet})
///     bagValue       [0] EXPLICIT BAG-TYPE.&Type({PKCS12BagSet}{@bagId}),
///     bagAttributes  SET OF PKCS12Attribute OPTIONAL
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct SafeBag {
    pub bag_id: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    pub bag_value: Any,
    pub bag_attributes: Option<SetOfVec<Attribute>>,
}

impl SafeBag {
    /// The value of the first attribute with `oid`.
    pub fn attribute(&self, oid: ObjectIdentifier) -> Option<&Any> {
        self.bag_attributes
            .as_ref()?
            .iter()
            .find(|attribute| attribute.oid == oid)
            .and_then(|attribute| attribute.values.iter().next())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct CertBag {
    pub cert_id: ObjectIdentifier,
    #[asn1(context_specific = "0", tag_mode = "EXPLICIT")]
    pub cert_value: OctetString,
}

/// `EncryptedPrivateKeyInfo`, with the PKCS#12 PBE algorithm identifiers
/// which the PKCS#5 types do not cover.
#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct ShroudedKeyBag {
    pub encryption_algorithm: AlgorithmIdentifierOwned,
    pub encrypted_data: OctetString,
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct PbeParameters {
    pub salt: OctetString,
    pub iterations: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct MacData {
    pub mac: DigestInfo,
    pub mac_salt: OctetString,
    pub iterations: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Sequence)]
pub struct DigestInfo {
    pub digest_algorithm: AlgorithmIdentifierOwned,
    pub digest: OctetString,
}

/// Decode an `ANY` (or an `[0] EXPLICIT` payload) as a concrete type.
pub fn decode_any<T>(any: &Any) -> der::Result<T>
where
    T: for<'a> Decode<'a>,
{
    T::from_der(&any.to_der()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_content_wraps_octets() {
        let info = ContentInfo::data(vec![1, 2, 3]).unwrap();
        let der = info.to_der().unwrap();

        // SEQUENCE { OID 1.2.840.113549.1.7.1, [0] { OCTET STRING 010203 } }
        assert_eq!(
            der,
            [
                0x30, 0x12, 0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x01, 0xa0,
                0x05, 0x04, 0x03, 0x01, 0x02, 0x03
            ]
        );

        let decoded = ContentInfo::from_der(&der).unwrap();
        let octets: OctetString = decode_any(decoded.content.as_ref().unwrap()).unwrap();
        assert_eq!(octets.as_bytes(), &[1, 2, 3]);
    }
}
