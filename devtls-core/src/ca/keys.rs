use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use rcgen::{KeyPair, SerialNumber};

use super::{CaError, Result};

/// RSA modulus size for the root CA key
const CA_KEY_BITS: u32 = 3072;

/// RSA modulus size for leaf keys
const LEAF_KEY_BITS: u32 = 2048;

/// Which kind of certificate a key pair is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrength {
    Ca,
    Leaf,
}

impl KeyStrength {
    pub fn bits(self) -> u32 {
        match self {
            KeyStrength::Ca => CA_KEY_BITS,
            KeyStrength::Leaf => LEAF_KEY_BITS,
        }
    }
}

/// A freshly generated RSA key pair.
pub struct RsaKey {
    key_pair: KeyPair,
    /// DER `RSAPublicKey`, i.e. the contents of the SPKI bit string
    public_key_der: Vec<u8>,
}

impl RsaKey {
    pub fn generate(strength: KeyStrength) -> Result<Self> {
        let rsa = Rsa::generate(strength.bits())
            .map_err(|e| CaError::KeypairGeneration(e.to_string()))?;
        let public_key_der = rsa
            .public_key_to_der_pkcs1()
            .map_err(|e| CaError::KeypairGeneration(e.to_string()))?;

        let pkey = PKey::from_rsa(rsa).map_err(|e| CaError::KeypairGeneration(e.to_string()))?;
        let pkcs8_pem = pkey
            .private_key_to_pem_pkcs8()
            .map_err(|e| CaError::KeypairGeneration(e.to_string()))?;
        let pkcs8_pem = String::from_utf8(pkcs8_pem)
            .map_err(|e| CaError::KeypairGeneration(e.to_string()))?;

        let key_pair = KeyPair::from_pem(&pkcs8_pem).map_err(|e| {
            CaError::KeypairGeneration(format!("Failed to load generated RSA key: {}", e))
        })?;

        Ok(Self {
            key_pair,
            public_key_der,
        })
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    pub fn into_key_pair(self) -> KeyPair {
        self.key_pair
    }

    /// RFC 5280 method (1): SHA-1 over the subject public key bit string.
    ///
    /// SHA-1 is only an identifier here, validators look the issuer up by it.
    pub fn subject_key_identifier(&self) -> Vec<u8> {
        openssl::sha::sha1(&self.public_key_der).to_vec()
    }

    pub fn serialize_pem(&self) -> String {
        self.key_pair.serialize_pem()
    }
}

/// Random certificate serial numbers in `[1, 2^128)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialNumberSource;

impl SerialNumberSource {
    pub fn next_value(&self) -> Result<u128> {
        loop {
            let mut bytes = [0u8; 16];
            getrandom::fill(&mut bytes).map_err(|e| {
                CaError::CertificateGeneration(format!("Failed to generate serial number: {}", e))
            })?;
            let value = u128::from_be_bytes(bytes);
            // Serial numbers must be positive.
            if value != 0 {
                return Ok(value);
            }
        }
    }

    pub fn next_serial(&self) -> Result<SerialNumber> {
        self.next_value().map(serial_from_u128)
    }
}

/// Minimal big-endian encoding, no leading zero octets.
pub(crate) fn serial_from_u128(value: u128) -> SerialNumber {
    let bytes = value.to_be_bytes();
    let first = bytes
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(bytes.len() - 1);
    SerialNumber::from_slice(&bytes[first..])
}
