//! Content hashing for change detection.
//!
//! A 32-bit rolling polynomial digest over the Unicode scalars of a text.
//! It is only used for equality checks between captures of the same page,
//! never for anything security-relevant.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compact digest of a content blob.
///
/// Rendered as 8 lower-case hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct HashToken(u32);

impl HashToken {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

impl From<HashToken> for String {
    fn from(token: HashToken) -> Self {
        token.to_string()
    }
}

impl TryFrom<String> for HashToken {
    type Error = hex::FromHexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut bytes = [0u8; 4];
        hex::decode_to_slice(value, &mut bytes)?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

/// Hash a text blob.
///
/// `h = h * 31 + c` with wrapping arithmetic, one step per character.
pub fn hash_content(text: &str) -> HashToken {
    let digest = text
        .chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32));
    HashToken(digest)
}
