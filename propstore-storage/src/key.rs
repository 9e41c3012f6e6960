//! Composite `(kind, identity)` storage key.
//!
//! Storage partitions records by kind first, so the key puts the kind in
//! front. A key cannot be built without a kind, which keeps items of
//! different kinds that share an identity apart.

use propstore_core::Kind;

/// Separator byte between kind and identity.
///
/// 0xFF never appears in UTF-8, so a key splits unambiguously at the first
/// separator no matter what the kind or identity contain.
const SEPARATOR: u8 = 0xFF;

/// Storage key for a propagated record.
///
/// # Binary Format
///
/// `[kind: utf-8 bytes][separator: 0xFF][identity: utf-8 bytes]`
///
/// This format ensures:
/// - Keys sort by kind first
/// - LMDB prefix scans can walk every record of one kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    kind: Kind,
    item_id: String,
}

impl RecordKey {
    pub fn new(kind: Kind, item_id: impl Into<String>) -> Self {
        Self {
            kind,
            item_id: item_id.into(),
        }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Encode this key for byte-keyed stores.
    pub fn encode(&self) -> Vec<u8> {
        let kind = self.kind.as_str().as_bytes();
        let id = self.item_id.as_bytes();

        let mut bytes = Vec::with_capacity(kind.len() + 1 + id.len());
        bytes.extend_from_slice(kind);
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(id);
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if:
    /// - The separator byte is missing
    /// - Either half is not valid UTF-8
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let split = bytes.iter().position(|b| *b == SEPARATOR)?;
        let kind = std::str::from_utf8(&bytes[..split]).ok()?;
        let item_id = std::str::from_utf8(&bytes[split + 1..]).ok()?;

        Some(Self::new(Kind::new(kind), item_id))
    }

    /// Prefix shared by every key of `kind`.
    pub fn kind_prefix(kind: &Kind) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(kind.as_str().len() + 1);
        prefix.extend_from_slice(kind.as_str().as_bytes());
        prefix.push(SEPARATOR);
        prefix
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let key = RecordKey::new(Kind::new("user"), "u-1");
        assert_eq!(key.encode(), b"user\xFFu-1".to_vec());
    }

    #[test]
    fn test_decode_rejects_missing_separator() {
        assert!(RecordKey::decode(b"useru-1").is_none());
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert!(RecordKey::decode(&[b'u', SEPARATOR, 0xC3]).is_none());
    }

    #[test]
    fn test_kind_prefix_matches_keys_of_that_kind_only() {
        let user = RecordKey::new(Kind::new("user"), "1").encode();
        let users = RecordKey::new(Kind::new("users"), "1").encode();
        let prefix = RecordKey::kind_prefix(&Kind::new("user"));

        assert!(user.starts_with(&prefix));
        assert!(!users.starts_with(&prefix));
    }

    #[test]
    fn test_same_id_different_kind_differs() {
        let a = RecordKey::new(Kind::new("user"), "42");
        let b = RecordKey::new(Kind::new("team"), "42");
        assert_ne!(a, b);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_display() {
        let key = RecordKey::new(Kind::new("team"), "t-7");
        assert_eq!(key.to_string(), "team/t-7");
    }

    mod prop_tests {
        use super::super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            /// Decoding an encoded key yields the same key, for any strings.
            #[test]
            fn prop_decode_inverts_encode(kind in ".*", id in ".*") {
                let key = RecordKey::new(Kind::new(kind), id);
                let decoded = RecordKey::decode(&key.encode());
                prop_assert_eq!(decoded, Some(key));
            }
        }
    }
}
