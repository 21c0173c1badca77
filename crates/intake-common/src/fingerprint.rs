//! Content fingerprints used as the deduplication key

use crate::error::{IntakeError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 digest of a file's bytes, lowercase hex.
///
/// Two uploads with identical bytes share a fingerprint regardless of their
/// name, location or arrival time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileFingerprint(String);

impl FileFingerprint {
    /// Fingerprint an in-memory buffer
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for FileFingerprint {
    type Err = IntakeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let valid = s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !valid {
            return Err(IntakeError::InvalidFingerprint(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for FileFingerprint {
    type Error = IntakeError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileFingerprint> for String {
    fn from(value: FileFingerprint) -> Self {
        value.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        let fp = FileFingerprint::of(b"hello world");
        assert_eq!(
            fp.as_str(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_single_byte_changes_fingerprint() {
        let a = FileFingerprint::of(b"id,amount\n1,10\n");
        let b = FileFingerprint::of(b"id,amount\n1,11\n");
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_bytes_share_fingerprint() {
        let upload = b"a,b\n1,2\n".to_vec();
        let renamed_copy = upload.clone();
        assert_eq!(FileFingerprint::of(&upload), FileFingerprint::of(&renamed_copy));
    }

    #[test]
    fn test_parse_rejects_non_digest() {
        assert!("abc".parse::<FileFingerprint>().is_err());
        assert!("B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
            .parse::<FileFingerprint>()
            .is_err());
        let fp = FileFingerprint::of(b"x");
        assert_eq!(fp.as_str().parse::<FileFingerprint>().unwrap(), fp);
    }
}
