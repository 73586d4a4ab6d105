use sha2::{Digest, Sha256};

/// Length of the hex fingerprint used to identify tenants in logs.
const FINGERPRINT_LEN: usize = 12;

/// Short, non-reversible identifier for a tenant credential.
///
/// Credentials are secrets; logs only ever carry this fingerprint.
pub fn fingerprint(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(credential.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint() {
        let a = fingerprint("VE9LRU46cy5hYmM=");
        assert_eq!(a.len(), FINGERPRINT_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        // Stable for the same credential
        assert_eq!(a, fingerprint("VE9LRU46cy5hYmM="));

        // Different credential, different fingerprint
        assert_ne!(a, fingerprint("VE9LRU46cy5kZWY="));

        // Never echoes the credential
        assert!(!a.contains("VE9L"));
    }
}
