//! Hash primitives for the SCRAM family.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use getrandom::{getrandom, Error as RngError};
use hmac::{digest::InvalidLength, Hmac, Mac};
use pbkdf2::pbkdf2;
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};

/// Generate a nonce for SCRAM authentication.
pub fn generate_nonce() -> Result<String, RngError> {
    let mut data = [0u8; 32];
    getrandom(&mut data)?;
    Ok(Base64.encode(data))
}

/// The hash function backing a SCRAM mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScramHash {
    /// SHA-1, RFC 5802.
    Sha1,
    /// SHA-256, RFC 7677.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl ScramHash {
    /// The name as it appears in the SASL mechanism, e.g. `SHA-256`.
    pub fn name(self) -> &'static str {
        match self {
            ScramHash::Sha1 => "SHA-1",
            ScramHash::Sha256 => "SHA-256",
            ScramHash::Sha512 => "SHA-512",
        }
    }

    /// Output size in bytes.
    pub fn output_len(self) -> usize {
        match self {
            ScramHash::Sha1 => 20,
            ScramHash::Sha256 => 32,
            ScramHash::Sha512 => 64,
        }
    }

    /// `H(data)`
    pub fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            ScramHash::Sha1 => Sha1::digest(data).to_vec(),
            ScramHash::Sha256 => Sha256::digest(data).to_vec(),
            ScramHash::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// `HMAC(key, data)`
    pub fn hmac(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvalidLength> {
        fn run<M: Mac + hmac::digest::KeyInit>(
            key: &[u8],
            data: &[u8],
        ) -> Result<Vec<u8>, InvalidLength> {
            let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key)?;
            mac.update(data);
            Ok(mac.finalize().into_bytes().to_vec())
        }
        match self {
            ScramHash::Sha1 => run::<Hmac<Sha1>>(key, data),
            ScramHash::Sha256 => run::<Hmac<Sha256>>(key, data),
            ScramHash::Sha512 => run::<Hmac<Sha512>>(key, data),
        }
    }

    /// `Hi(password, salt, iterations)`, i.e. PBKDF2 with HMAC of this hash.
    pub fn derive(
        self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
    ) -> Result<Vec<u8>, InvalidLength> {
        let mut result = vec![0u8; self.output_len()];
        match self {
            ScramHash::Sha1 => pbkdf2::<Hmac<Sha1>>(password, salt, iterations, &mut result)?,
            ScramHash::Sha256 => pbkdf2::<Hmac<Sha256>>(password, salt, iterations, &mut result)?,
            ScramHash::Sha512 => pbkdf2::<Hmac<Sha512>>(password, salt, iterations, &mut result)?,
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salted_password_rfc5802() {
        // SaltedPassword for user/pencil from RFC 5802 section 5.
        let salt = Base64.decode("QSXCR+Q6sek8bf92").unwrap();
        let salted = ScramHash::Sha1.derive(b"pencil", &salt, 4096).unwrap();
        assert_eq!(salted.len(), 20);
        assert_eq!(
            salted,
            [
                0x1d, 0x96, 0xee, 0x3a, 0x52, 0x9b, 0x5a, 0x5f, 0x9e, 0x47, 0xc0, 0x1f, 0x22,
                0x9a, 0x2c, 0xb8, 0xa6, 0xe1, 0x5f, 0x7d
            ]
        );
    }

    #[test]
    fn output_sizes() {
        for hash in [ScramHash::Sha1, ScramHash::Sha256, ScramHash::Sha512] {
            assert_eq!(hash.hash(b"").len(), hash.output_len());
            assert_eq!(hash.hmac(b"k", b"d").unwrap().len(), hash.output_len());
        }
    }

    #[test]
    fn nonces_differ() {
        assert_ne!(generate_nonce().unwrap(), generate_nonce().unwrap());
    }
}
