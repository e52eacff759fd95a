//! Identity types for Lotgate entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash. Used for release-token secret digests: only the
/// digest of a secret is ever persisted.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_sortable_by_creation() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert!(a <= b);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let h1 = compute_content_hash(b"secret-token-material");
        let h2 = compute_content_hash(b"secret-token-material");
        let h3 = compute_content_hash(b"other");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }
}
