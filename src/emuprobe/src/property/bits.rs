//! Bit selection
//!
//! The `bits` attribute picks individual bits out of a property's bytes:
//! a single index (`"3"`), an inclusive range (`"2-5"`) or a comma list
//! (`"1,3,5"`). Bit `n` is bit `n % 8` of byte `n / 8`, counting from the
//! least significant bit of the first byte.

use super::PropertyError;

/// Highest bit index a selection may name (a 256-byte property)
pub const MAX_BIT_INDEX: usize = 256 * 8 - 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSelection {
    spec: String,
    indices: Vec<usize>,
}

impl BitSelection {
    pub fn parse(spec: &str) -> Result<Self, PropertyError> {
        let invalid = |reason: String| PropertyError::InvalidBitSpecification {
            spec: spec.to_string(),
            reason,
        };
        let index = |text: &str| -> Result<usize, PropertyError> {
            let text = text.trim();
            let i = text
                .parse::<usize>()
                .map_err(|_| invalid(format!("'{}' is not a bit index", text)))?;
            if i > MAX_BIT_INDEX {
                return Err(invalid(format!("bit {} is above the maximum of {}", i, MAX_BIT_INDEX)));
            }
            Ok(i)
        };

        let mut indices = Vec::new();
        let mut seen = vec![false; MAX_BIT_INDEX + 1];
        let mut select = |i: usize, indices: &mut Vec<usize>| -> Result<(), PropertyError> {
            if std::mem::replace(&mut seen[i], true) {
                return Err(invalid(format!("bit {} is selected twice", i)));
            }
            indices.push(i);
            Ok(())
        };
        for part in spec.split(',') {
            match part.split_once('-') {
                Some((from, to)) => {
                    let (from, to) = (index(from)?, index(to)?);
                    if from > to {
                        return Err(invalid(format!("range {}-{} is reversed", from, to)));
                    }
                    for i in from..=to {
                        select(i, &mut indices)?;
                    }
                }
                None => select(index(part)?, &mut indices)?,
            }
        }

        Ok(Self {
            spec: spec.to_string(),
            indices,
        })
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    fn check(&self, len: usize) -> Result<(), PropertyError> {
        match self.indices.iter().find(|&&i| i >= len * 8) {
            Some(i) => Err(PropertyError::InvalidBitSpecification {
                spec: self.spec.clone(),
                reason: format!("bit {} is outside a {}-byte value", i, len),
            }),
            None => Ok(()),
        }
    }

    /// Pack the selected bits into the low bits of a buffer the same length as `bytes`
    pub fn extract(&self, bytes: &[u8]) -> Result<Vec<u8>, PropertyError> {
        self.check(bytes.len())?;
        let mut out = vec![0u8; bytes.len()];
        for (k, &i) in self.indices.iter().enumerate() {
            let bit = (bytes[i / 8] >> (i % 8)) & 1;
            out[k / 8] |= bit << (k % 8);
        }
        Ok(out)
    }

    /// Write the low bits of `packed` into the selected positions of `current`,
    /// leaving every other bit of `current` as it was
    pub fn overlay(&self, current: &[u8], packed: &[u8]) -> Result<Vec<u8>, PropertyError> {
        self.check(current.len())?;
        let mut out = current.to_vec();
        for (k, &i) in self.indices.iter().enumerate() {
            let bit = packed.get(k / 8).map_or(0, |b| (b >> (k % 8)) & 1);
            let mask = 1u8 << (i % 8);
            if bit == 1 {
                out[i / 8] |= mask;
            } else {
                out[i / 8] &= !mask;
            }
        }
        Ok(out)
    }
}
