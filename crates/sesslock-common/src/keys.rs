//! Storage key derivation
//!
//! Session records live under `sess:<md5(name)>:<id>` and lock records under
//! `lock:<md5(md5(name)-id-field)>`. Every process sharing a store must derive
//! keys identically, so these formats are part of the persisted layout.

use md5::{Digest, Md5};

/// Prefix of session hash records
pub const SESSION_KEY_PREFIX: &str = "sess";

/// Prefix of lock string records
pub const LOCK_KEY_PREFIX: &str = "lock";

/// Compute the MD5 hex digest of a string
pub fn md5_hex(content: &str) -> String {
    const_hex::encode(Md5::digest(content.as_bytes()))
}

/// Key of the hash record holding one session's fields
pub fn record_key(session_name: &str, session_id: &str) -> String {
    format!(
        "{}:{}:{}",
        SESSION_KEY_PREFIX,
        md5_hex(session_name),
        session_id
    )
}

/// Key of the advisory lock guarding `field` of one session
pub fn lock_key(session_name: &str, session_id: &str, field: &str) -> String {
    let scope = format!("{}-{}-{}", md5_hex(session_name), session_id, field);
    format!("{}:{}", LOCK_KEY_PREFIX, md5_hex(&scope))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex("hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_record_key_layout() {
        let key = record_key("PHPSESSID", "abc123");
        let digest = md5_hex("PHPSESSID");
        assert_eq!(key, format!("sess:{}:abc123", digest));
    }

    #[test]
    fn test_lock_key_layout() {
        let key = lock_key("PHPSESSID", "abc123", "profile");
        let expected = md5_hex(&format!("{}-abc123-profile", md5_hex("PHPSESSID")));
        assert_eq!(key, format!("lock:{}", expected));
    }

    #[test]
    fn test_lock_key_differs_per_field_and_session() {
        let a = lock_key("s", "id1", "cart");
        assert_ne!(a, lock_key("s", "id1", "profile"));
        assert_ne!(a, lock_key("s", "id2", "cart"));
        assert_ne!(a, lock_key("t", "id1", "cart"));
        assert_eq!(a, lock_key("s", "id1", "cart"));
    }
}
