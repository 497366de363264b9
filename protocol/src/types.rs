//! # Identifiers
//!
//! Fixed-size identifiers shared by every vault component:
//!
//! - [`Address`]: a 32-byte principal. Depositors, operators, assets,
//!   strategy adapters, and external protocol targets are all addresses.
//!   The all-zero address is the null address and is rejected wherever a
//!   real participant is required.
//! - [`FeedId`]: a 32-byte price-feed identifier. The all-zero feed is the
//!   "no oracle" sentinel reserved for the base asset.
//! - [`FunctionId`]: a 4-byte selector naming an entry point on an external
//!   protocol, derived from a call signature string.
//!
//! All three serialize as hex strings in human-readable formats (TOML, JSON)
//! and as raw bytes in bincode, so config files stay legible and the on-disk
//! encoding stays compact.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Amounts and share counts, in the smallest unit of their denomination.
pub type Amount = u128;

macro_rules! fixed_bytes_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Byte length of this identifier.
            pub const LEN: usize = $len;

            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            /// Wraps raw bytes.
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Returns the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Returns `true` for the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            /// Hex encoding without a prefix.
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parses a hex string, with or without a `0x` prefix.
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                if bytes.len() != $len {
                    return Err(hex::FromHexError::InvalidStringLength);
                }
                let mut arr = [0u8; $len];
                arr.copy_from_slice(&bytes);
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let hex = self.to_hex();
                write!(f, "{}({}...)", stringify!($name), &hex[..hex.len().min(12)])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl std::str::FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_string())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    Self::from_hex(&s).map_err(serde::de::Error::custom)
                } else {
                    <[u8; $len]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

fixed_bytes_id!(
    /// A 32-byte principal: a holder, an operator, an asset, a strategy, or
    /// an external protocol target.
    Address,
    32
);

fixed_bytes_id!(
    /// A 32-byte price-feed identifier understood by the oracle.
    FeedId,
    32
);

fixed_bytes_id!(
    /// A 4-byte external entry-point selector.
    FunctionId,
    4
);

impl Address {
    /// Derives a deterministic address from a human label.
    ///
    /// Handy for fixtures and for naming well-known accounts in config:
    /// `Address::derive("vault")` is the same on every machine.
    pub fn derive(label: &str) -> Self {
        Self(sha256_array(label.as_bytes()))
    }
}

impl FeedId {
    /// The "no oracle" sentinel: the asset is valued 1:1 against the base.
    pub const NO_ORACLE: Self = Self::ZERO;

    /// Derives a deterministic feed id from a human label (e.g. `"BTC/USD"`).
    pub fn derive(label: &str) -> Self {
        Self(sha256_array(label.as_bytes()))
    }
}

impl FunctionId {
    /// Derives a selector from a call signature such as `"deposit(uint128)"`.
    ///
    /// The selector is the first four bytes of SHA-256 over the signature.
    /// Callers and protocol bindings only need to agree on the string.
    pub fn from_signature(signature: &str) -> Self {
        let digest = sha256_array(signature.as_bytes());
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest[..4]);
        Self(out)
    }
}

fn sha256_array(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_address_is_null() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::derive("alice").is_zero());
    }

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(Address::derive("vault"), Address::derive("vault"));
        assert_ne!(Address::derive("vault"), Address::derive("vault2"));
    }

    #[test]
    fn hex_parse_accepts_prefix() {
        let a = Address::derive("alice");
        let shown = a.to_string();
        assert!(shown.starts_with("0x"));
        assert_eq!(shown.parse::<Address>().unwrap(), a);
        assert_eq!(Address::from_hex(&a.to_hex()).unwrap(), a);
    }

    #[test]
    fn hex_parse_rejects_wrong_length() {
        assert!(Address::from_hex("abcd").is_err());
        assert!(FunctionId::from_hex("0x0102030405").is_err());
    }

    #[test]
    fn selectors_differ_by_signature() {
        let deposit = FunctionId::from_signature("deposit(uint128)");
        let withdraw = FunctionId::from_signature("withdraw(uint128)");
        assert_ne!(deposit, withdraw);
        assert_eq!(deposit, FunctionId::from_signature("deposit(uint128)"));
    }

    #[test]
    fn json_uses_hex_and_bincode_uses_bytes() {
        let a = Address::derive("alice");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{}\"", a));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);

        let bytes = bincode::serialize(&a).unwrap();
        assert_eq!(bytes.len(), 32);
        let back: Address = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, a);
    }
}
