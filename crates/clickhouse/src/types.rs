//! Fixed-width column wrappers.

use alloy_primitives::B256;
use derive_more::Deref;
use serde::{Deserialize, Serialize};

/// A 32-byte hash stored as a `FixedString(32)` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, Deref)]
pub struct HashBytes(pub [u8; 32]);

impl From<B256> for HashBytes {
    fn from(hash: B256) -> Self {
        Self(hash.0)
    }
}

impl From<HashBytes> for B256 {
    fn from(column: HashBytes) -> Self {
        Self(column.0)
    }
}

impl AsRef<[u8]> for HashBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
