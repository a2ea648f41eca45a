//! Identity keys for partners, members, owners and payout accounts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{contexts, IDENTITY_LEN};

/// Error parsing an [`Identity`] from its hex form.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdentityParseError {
    /// Input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Input decoded to the wrong number of bytes.
    #[error("identity must be {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length.
        expected: usize,
        /// Decoded length.
        actual: usize,
    },
}

/// An authenticated identity as presented by the host environment.
///
/// Serialized as a lowercase hex string, which also makes it usable as a
/// JSON map key in ledger snapshots.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(#[serde_as(as = "serde_with::hex::Hex")] [u8; IDENTITY_LEN]);

impl Identity {
    /// Wrap raw identity bytes.
    pub const fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic identity from a label.
    ///
    /// Intended for tooling and tests; production identities come from the
    /// host's authentication layer.
    pub fn derive(label: &str) -> Self {
        Self(blake3::derive_key(contexts::IDENTITY_LABEL, label.as_bytes()))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Full lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", hex::encode(&self.0[..4]))
    }
}

impl FromStr for Identity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| IdentityParseError::InvalidHex(e.to_string()))?;
        let array: [u8; IDENTITY_LEN] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityParseError::InvalidLength {
                    expected: IDENTITY_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(array))
    }
}

impl From<[u8; IDENTITY_LEN]> for Identity {
    fn from(bytes: [u8; IDENTITY_LEN]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_deterministic() {
        assert_eq!(Identity::derive("alice"), Identity::derive("alice"));
        assert_ne!(Identity::derive("alice"), Identity::derive("bob"));
    }

    #[test]
    fn test_hex_parse() {
        let id = Identity::derive("carol");
        let parsed: Identity = id.to_hex().parse().expect("parse hex");
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<Identity>(),
            Err(IdentityParseError::InvalidHex(_))
        ));
        assert_eq!(
            "abcd".parse::<Identity>(),
            Err(IdentityParseError::InvalidLength {
                expected: IDENTITY_LEN,
                actual: 2,
            })
        );
    }

    #[test]
    fn test_serializes_as_hex_string() {
        let id = Identity::from_bytes([0xAB; IDENTITY_LEN]);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", "ab".repeat(IDENTITY_LEN)));
        let back: Identity = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_usable_as_map_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(Identity::derive("dave"), 7u32);
        let json = serde_json::to_string(&map).expect("serialize map");
        let back: std::collections::BTreeMap<Identity, u32> =
            serde_json::from_str(&json).expect("deserialize map");
        assert_eq!(back, map);
    }

    #[test]
    fn test_debug_is_short() {
        let id = Identity::from_bytes([0x01; IDENTITY_LEN]);
        assert_eq!(format!("{id:?}"), "Identity(01010101)");
    }
}
