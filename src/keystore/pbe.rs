//! Password based encryption and integrity for PKCS#12 (RFC 7292 appendix B).
//!
//! Key, IV and MAC key material is derived from the password with the
//! PKCS#12 KDF over SHA-1. Passwords are encoded as a NUL terminated
//! BMPString, so the empty password is the two bytes `00 00`.

use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, InnerIvInit, KeyIvInit};
use der::asn1::{Any, AnyRef, ObjectIdentifier, OctetString};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::{Digest, Sha1};
use x509_cert::spki::AlgorithmIdentifierOwned;

use super::asn1::{self, DigestInfo, MacData, PbeParameters};
use super::KeystoreError;

/// Iterations for both the PBE ciphers and the MAC.
pub const ITERATIONS: u32 = 2048;

const SALT_LEN: usize = 8;
const MAC_SALT_LEN: usize = 20;

// SHA-1 output and block sizes.
const U: usize = 20;
const V: usize = 64;

#[derive(Debug, Clone, Copy)]
enum Purpose {
    Key = 1,
    Iv = 2,
    Mac = 3,
}

/// The supported PBE schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// pbeWithSHAAnd3-KeyTripleDES-CBC, used for the private key.
    TripleDes,
    /// pbeWithSHAAnd40BitRC2-CBC, used for the certificates.
    Rc2With40BitKey,
}

impl Scheme {
    fn oid(self) -> ObjectIdentifier {
        match self {
            Scheme::TripleDes => asn1::PBE_SHA1_3DES,
            Scheme::Rc2With40BitKey => asn1::PBE_SHA1_RC2_40,
        }
    }

    fn key_len(self) -> usize {
        match self {
            Scheme::TripleDes => 24,
            Scheme::Rc2With40BitKey => 5,
        }
    }

    fn from_oid(oid: ObjectIdentifier) -> Result<Self, KeystoreError> {
        if oid == asn1::PBE_SHA1_3DES {
            Ok(Scheme::TripleDes)
        } else if oid == asn1::PBE_SHA1_RC2_40 {
            Ok(Scheme::Rc2With40BitKey)
        } else {
            Err(KeystoreError::UnsupportedAlgorithm(oid))
        }
    }
}

/// Encode a password as a NUL terminated BMPString.
pub fn password(password: &str) -> Vec<u8> {
    password
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_be_bytes)
        .collect()
}

fn derive(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    purpose: Purpose,
    size: usize,
) -> Vec<u8> {
    fn fill(data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        let len = V * data.len().div_ceil(V);
        data.iter().copied().cycle().take(len).collect()
    }

    let diversifier = [purpose as u8; V];
    let mut input = fill(salt);
    input.extend(fill(password));

    let mut output = Vec::with_capacity(size + U);
    loop {
        let mut block = Sha1::new().chain_update(diversifier).chain_update(&input).finalize();
        for _ in 1..iterations {
            block = Sha1::digest(block);
        }
        output.extend_from_slice(&block);

        if output.len() >= size {
            output.truncate(size);
            return output;
        }

        // I_j = (I_j + B + 1) mod 2^(8v) for each v-byte chunk of I.
        let b: Vec<u8> = block.iter().copied().cycle().take(V).collect();
        for chunk in input.chunks_mut(V) {
            let mut carry = 1u16;
            for (byte, add) in chunk.iter_mut().zip(&b).rev() {
                let sum = u16::from(*byte) + u16::from(*add) + carry;
                *byte = sum as u8;
                carry = sum >> 8;
            }
        }
    }
}

fn random_salt(len: usize) -> Vec<u8> {
    let mut salt = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Encrypt `data` under `scheme` with a fresh salt, returning the algorithm
/// identifier (carrying salt and iteration count) and the ciphertext.
pub fn encrypt(
    scheme: Scheme,
    password: &[u8],
    data: &[u8],
) -> Result<(AlgorithmIdentifierOwned, Vec<u8>), KeystoreError> {
    let salt = random_salt(SALT_LEN);
    let key = derive(password, &salt, ITERATIONS, Purpose::Key, scheme.key_len());
    let iv = derive(password, &salt, ITERATIONS, Purpose::Iv, 8);

    let ciphertext = match scheme {
        Scheme::TripleDes => cbc::Encryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
            .map_err(|_| KeystoreError::Cipher)?
            .encrypt_padded_vec_mut::<Pkcs7>(data),
        Scheme::Rc2With40BitKey => {
            let cipher = rc2::Rc2::new_with_eff_key_len(&key, 40);
            cbc::Encryptor::<rc2::Rc2>::inner_iv_slice_init(cipher, &iv)
                .map_err(|_| KeystoreError::Cipher)?
                .encrypt_padded_vec_mut::<Pkcs7>(data)
        }
    };

    let parameters = PbeParameters {
        salt: OctetString::new(salt)?,
        iterations: ITERATIONS,
    };
    let algorithm = AlgorithmIdentifierOwned {
        oid: scheme.oid(),
        parameters: Some(Any::encode_from(&parameters)?),
    };

    Ok((algorithm, ciphertext))
}

/// Decrypt `data` with the scheme, salt and iteration count named by
/// `algorithm`.
pub fn decrypt(
    algorithm: &AlgorithmIdentifierOwned,
    password: &[u8],
    data: &[u8],
) -> Result<Vec<u8>, KeystoreError> {
    let scheme = Scheme::from_oid(algorithm.oid)?;
    let parameters: PbeParameters = asn1::decode_any(
        algorithm
            .parameters
            .as_ref()
            .ok_or(KeystoreError::Malformed("PBE parameters"))?,
    )?;

    let salt = parameters.salt.as_bytes();
    let key = derive(password, salt, parameters.iterations, Purpose::Key, scheme.key_len());
    let iv = derive(password, salt, parameters.iterations, Purpose::Iv, 8);

    let plaintext = match scheme {
        Scheme::TripleDes => cbc::Decryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
            .map_err(|_| KeystoreError::Cipher)?
            .decrypt_padded_vec_mut::<Pkcs7>(data),
        Scheme::Rc2With40BitKey => {
            let cipher = rc2::Rc2::new_with_eff_key_len(&key, 40);
            cbc::Decryptor::<rc2::Rc2>::inner_iv_slice_init(cipher, &iv)
                .map_err(|_| KeystoreError::Cipher)?
                .decrypt_padded_vec_mut::<Pkcs7>(data)
        }
    };

    plaintext.map_err(|_| KeystoreError::Decrypt)
}

fn hmac(password: &[u8], salt: &[u8], iterations: u32) -> Result<Hmac<Sha1>, KeystoreError> {
    let key = derive(password, salt, iterations, Purpose::Mac, U);
    Hmac::<Sha1>::new_from_slice(&key).map_err(|_| KeystoreError::Cipher)
}

/// HMAC-SHA1 over the encoded `AuthenticatedSafe`.
pub fn mac(password: &[u8], auth_safe: &[u8]) -> Result<MacData, KeystoreError> {
    let salt = random_salt(MAC_SALT_LEN);
    let mut mac = hmac(password, &salt, ITERATIONS)?;
    mac.update(auth_safe);
    let digest = mac.finalize().into_bytes();

    Ok(MacData {
        mac: DigestInfo {
            digest_algorithm: AlgorithmIdentifierOwned {
                oid: asn1::SHA1,
                parameters: Some(Any::from(AnyRef::NULL)),
            },
            digest: OctetString::new(digest.to_vec())?,
        },
        mac_salt: OctetString::new(salt)?,
        iterations: ITERATIONS,
    })
}

/// Check `mac_data` against the encoded `AuthenticatedSafe`.
pub fn verify(password: &[u8], mac_data: &MacData, auth_safe: &[u8]) -> Result<(), KeystoreError> {
    let algorithm = mac_data.mac.digest_algorithm.oid;
    if algorithm != asn1::SHA1 {
        return Err(KeystoreError::UnsupportedAlgorithm(algorithm));
    }

    let mut mac = hmac(password, mac_data.mac_salt.as_bytes(), mac_data.iterations)?;
    mac.update(auth_safe);
    mac.verify_slice(mac_data.mac.digest.as_bytes())
        .map_err(|_| KeystoreError::MacMismatch)
}
