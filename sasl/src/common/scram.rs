//! Hash functions and key derivation backing the SCRAM mechanisms.

use base64::{engine::general_purpose::STANDARD as Base64, Engine};
use getrandom::{getrandom, Error as RngError};
use hmac::{digest::InvalidLength, Hmac, Mac};
use pbkdf2::pbkdf2;
use sha1::{Digest, Sha1 as Sha1_hash};
use sha2::{Sha256 as Sha256_hash, Sha384 as Sha384_hash, Sha512 as Sha512_hash};
use std::error::Error as StdError;
use std::fmt;

use crate::client::Priority;
use crate::common::Password;

/// Generate a nonce for SCRAM authentication.
pub fn generate_nonce() -> Result<String, RngError> {
    let mut data = [0u8; 32];
    getrandom(&mut data)?;
    Ok(Base64.encode(data))
}

/// Why a salted password couldn’t be obtained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeriveError {
    /// The stored digest was made with another hash function.
    IncompatibleHashingMethod(String, &'static str),
    /// The stored digest was made with another salt than the server’s.
    IncorrectSalt,
    /// The stored digest was made with another iteration count than the server’s.
    IncompatibleIterationCount(u32, u32),
    /// The password is invalid according to SASLprep.
    SaslPrep,
    /// PBKDF2 refused the output length.
    InvalidLength,
}

impl fmt::Display for DeriveError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeriveError::IncompatibleHashingMethod(one, two) => {
                write!(fmt, "incompatible hashing method, {} is not {}", one, two)
            }
            DeriveError::IncorrectSalt => write!(fmt, "incorrect salt"),
            DeriveError::IncompatibleIterationCount(one, two) => {
                write!(fmt, "incompatible iteration count, {} is not {}", one, two)
            }
            DeriveError::SaslPrep => write!(fmt, "password rejected by SASLprep"),
            DeriveError::InvalidLength => write!(fmt, "invalid PBKDF2 output length"),
        }
    }
}

impl StdError for DeriveError {}

/// A trait which defines the needed methods for SCRAM.
pub trait ScramProvider {
    /// The name of the hash function.
    fn name() -> &'static str;

    /// The default priority of the SCRAM variant built on this hash function.
    fn default_priority() -> Priority;

    /// A function which hashes the data using the hash function.
    fn hash(data: &[u8]) -> Vec<u8>;

    /// A function which performs an HMAC using the hash function.
    fn hmac(data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength>;

    /// Checks in constant time that `tag` is the HMAC of `data` under `key`.
    fn verify(data: &[u8], key: &[u8], tag: &[u8]) -> Result<bool, InvalidLength>;

    /// A function which does PBKDF2 key derivation using the hash function.
    fn derive(password: &Password, salt: &[u8], iterations: u32) -> Result<Vec<u8>, DeriveError>;
}

fn check_pbkdf2(
    expected_method: &'static str,
    method: &str,
    stored_salt: &[u8],
    stored_iterations: u32,
    data: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Vec<u8>, DeriveError> {
    if method != expected_method {
        Err(DeriveError::IncompatibleHashingMethod(
            method.to_owned(),
            expected_method,
        ))
    } else if stored_salt != salt {
        Err(DeriveError::IncorrectSalt)
    } else if stored_iterations != iterations {
        Err(DeriveError::IncompatibleIterationCount(
            stored_iterations,
            iterations,
        ))
    } else {
        Ok(data.to_vec())
    }
}

macro_rules! impl_scram_provider {
    ( $(#[$meta:meta])* $provider:ident, $hash:ty, $name:expr, $priority:expr ) => {
        $(#[$meta])*
        pub struct $provider;

        impl ScramProvider for $provider {
            fn name() -> &'static str {
                $name
            }

            fn default_priority() -> Priority {
                $priority
            }

            fn hash(data: &[u8]) -> Vec<u8> {
                <$hash as Digest>::digest(data).to_vec()
            }

            fn hmac(data: &[u8], key: &[u8]) -> Result<Vec<u8>, InvalidLength> {
                let mut mac = Hmac::<$hash>::new_from_slice(key)?;
                mac.update(data);
                Ok(mac.finalize().into_bytes().to_vec())
            }

            fn verify(data: &[u8], key: &[u8], tag: &[u8]) -> Result<bool, InvalidLength> {
                let mut mac = Hmac::<$hash>::new_from_slice(key)?;
                mac.update(data);
                Ok(mac.verify_slice(tag).is_ok())
            }

            fn derive(
                password: &Password,
                salt: &[u8],
                iterations: u32,
            ) -> Result<Vec<u8>, DeriveError> {
                match *password {
                    Password::Plain(ref plain) => {
                        let plain =
                            stringprep::saslprep(plain).map_err(|_| DeriveError::SaslPrep)?;
                        let mut result = vec![0; <$hash as Digest>::output_size()];
                        pbkdf2::<Hmac<$hash>>(plain.as_bytes(), salt, iterations, &mut result)
                            .map_err(|_| DeriveError::InvalidLength)?;
                        Ok(result)
                    }
                    Password::Pbkdf2 {
                        ref method,
                        salt: ref stored_salt,
                        iterations: stored_iterations,
                        ref data,
                    } => check_pbkdf2(
                        Self::name(),
                        method,
                        stored_salt,
                        stored_iterations,
                        data,
                        salt,
                        iterations,
                    ),
                }
            }
        }
    };
}

impl_scram_provider!(
    /// A `ScramProvider` which provides SCRAM-SHA-1
    Sha1,
    Sha1_hash,
    "SHA-1",
    60
);

impl_scram_provider!(
    /// A `ScramProvider` which provides SCRAM-SHA-256
    Sha256,
    Sha256_hash,
    "SHA-256",
    70
);

impl_scram_provider!(
    /// A `ScramProvider` which provides SCRAM-SHA-384
    Sha384,
    Sha384_hash,
    "SHA-384",
    71
);

impl_scram_provider!(
    /// A `ScramProvider` which provides SCRAM-SHA-512
    Sha512,
    Sha512_hash,
    "SHA-512",
    72
);

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // Digests from FIPS 180-2 appendix D, HMACs from RFC 4231 test case 2.
    #[test]
    fn sha384_vectors() {
        assert_eq!(
            Sha384::hash(b"abc"),
            hex("cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed8086072ba1e7cc2358baeca134c825a7")
        );
        assert_eq!(
            Sha384::hmac(b"what do ya want for nothing?", b"Jefe").unwrap(),
            hex("af45d2e376484031617f78d2b58a6b1b9c7ef464f5a01b47e42ec3736322445e8e2240ca5e69e2c78b3239ecfab21649")
        );
        assert_eq!(
            Sha384::derive(&"pencil".into(), b"salt", 4096).unwrap(),
            hex("fb6795591839e98bdf4906be7e7731c44e5fe22eab8be77d88bb93a37deefff7f5c2322c26236a042bbb9cac04d60d12")
        );
    }

    #[test]
    fn sha512_vectors() {
        assert_eq!(
            Sha512::hash(b"abc"),
            hex("ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f")
        );
        assert_eq!(
            Sha512::hmac(b"what do ya want for nothing?", b"Jefe").unwrap(),
            hex("164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea2505549758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737")
        );
        assert_eq!(
            Sha512::derive(&"pencil".into(), b"salt", 4096).unwrap(),
            hex("2cfe3a1c151662b1ea49d13f595674a1c666add70df15d3d02254e9905993878261da7407fd11c2fee4b0a30df5154b1a752f86a13380ddd4bdd9a7c958ec769")
        );
    }

    #[test]
    fn nonce_is_printable_and_unique() {
        let one = generate_nonce().unwrap();
        let two = generate_nonce().unwrap();
        assert_eq!(one.len(), 44);
        assert!(!one.contains(','));
        assert_ne!(one, two);
    }

    #[test]
    fn stored_digest_must_match_server_parameters() {
        let salt = Base64.decode("QSXCR+Q6sek8bf92").unwrap();
        let salted = Sha1::derive(&Password::from("pencil"), &salt, 4096).unwrap();
        let stored = Password::Pbkdf2 {
            method: "SHA-1".to_owned(),
            salt: salt.clone(),
            iterations: 4096,
            data: salted.clone(),
        };
        assert_eq!(Sha1::derive(&stored, &salt, 4096).unwrap(), salted);
        assert_eq!(
            Sha1::derive(&stored, &salt, 4095),
            Err(DeriveError::IncompatibleIterationCount(4096, 4095))
        );
        assert_eq!(
            Sha1::derive(&stored, b"another salt", 4096),
            Err(DeriveError::IncorrectSalt)
        );
        assert_eq!(
            Sha256::derive(&stored, &salt, 4096),
            Err(DeriveError::IncompatibleHashingMethod(
                "SHA-1".to_owned(),
                "SHA-256"
            ))
        );
    }

    #[test]
    fn output_sizes() {
        let salt = b"salt";
        assert_eq!(Sha1::derive(&"p".into(), salt, 1).unwrap().len(), 20);
        assert_eq!(Sha256::derive(&"p".into(), salt, 1).unwrap().len(), 32);
        assert_eq!(Sha384::derive(&"p".into(), salt, 1).unwrap().len(), 48);
        assert_eq!(Sha512::derive(&"p".into(), salt, 1).unwrap().len(), 64);
    }

    #[test]
    fn verify_rejects_other_tags() {
        let tag = Sha256::hmac(b"data", b"key").unwrap();
        assert!(Sha256::verify(b"data", b"key", &tag).unwrap());
        let mut bad = tag.clone();
        bad[0] ^= 1;
        assert!(!Sha256::verify(b"data", b"key", &bad).unwrap());
        assert!(!Sha256::verify(b"data", b"key", &tag[..31]).unwrap());
    }
}
