//! Sifted key material.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

/// Append-only sequence of sifted key bits owned by one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiftedKey {
    bits: Vec<bool>,
}

impl SiftedKey {
    /// An empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty key with room for `target` bits.
    pub fn with_capacity(target: usize) -> Self {
        Self {
            bits: Vec::with_capacity(target),
        }
    }

    /// Append one confirmed bit.
    pub fn push(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether no bits have been sifted yet.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The bits in order.
    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Pack the bits MSB-first into bytes, zero-padding the last byte.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, bit)| acc | ((*bit as u8) << (7 - i)))
            })
            .collect()
    }

    /// Deterministic fingerprint of the key.
    ///
    /// Domain-separated Blake3 over the bit length and packed bits, so two
    /// peers can confirm agreement without exchanging the key itself.
    pub fn fingerprint(&self) -> KeyFingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"entqkd-sifted-key-v0:");
        hasher.update(&(self.bits.len() as u64).to_le_bytes());
        hasher.update(&self.to_bytes());
        KeyFingerprint(*hasher.finalize().as_bytes())
    }

    /// Count positions where the two keys disagree.
    ///
    /// Keys of different length cannot be compared.
    pub fn bit_errors(&self, other: &SiftedKey) -> Result<usize> {
        if self.len() != other.len() {
            return Err(CoreError::KeyLengthMismatch {
                alice: self.len(),
                bob: other.len(),
            });
        }
        Ok(self
            .bits
            .iter()
            .zip(&other.bits)
            .filter(|(a, b)| a != b)
            .count())
    }
}

impl FromIterator<bool> for SiftedKey {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self {
            bits: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for SiftedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in &self.bits {
            f.write_str(if *bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// Blake3 fingerprint of a sifted key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyFingerprint(pub [u8; 32]);

impl KeyFingerprint {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFingerprint({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_bytes() {
        let key: SiftedKey = [true, false, true, true, false, false, false, false, true]
            .into_iter()
            .collect();
        assert_eq!(key.to_string(), "101100001");
        assert_eq!(key.to_bytes(), vec![0b1011_0000, 0b1000_0000]);
    }

    #[test]
    fn test_fingerprint_covers_length() {
        // Same packed bytes, different bit length.
        let short: SiftedKey = [true].into_iter().collect();
        let long: SiftedKey = [true, false].into_iter().collect();
        assert_eq!(short.to_bytes(), long.to_bytes());
        assert_ne!(short.fingerprint(), long.fingerprint());
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let a: SiftedKey = [true, false, true].into_iter().collect();
        let b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().to_string().len(), 16);
    }

    #[test]
    fn test_bit_errors() {
        let a: SiftedKey = [true, false, true, false].into_iter().collect();
        let b: SiftedKey = [true, true, true, true].into_iter().collect();
        assert_eq!(a.bit_errors(&b).unwrap(), 2);

        let c: SiftedKey = [true].into_iter().collect();
        assert_eq!(
            a.bit_errors(&c),
            Err(CoreError::KeyLengthMismatch { alice: 4, bob: 1 })
        );
    }
}
