use std::fmt;

use sha2::{Digest, Sha256};

/// Content address of a flow log record: hex encoded SHA-256 of its canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn from_canonical(canonical: &[u8]) -> DedupKey {
        DedupKey(hex::encode(Sha256::digest(canonical)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::flow_log::{FlowLogRecord, ProcessedRecord};

    fn key_for(line: &str) -> String {
        let record: FlowLogRecord = line.parse().unwrap();
        ProcessedRecord::new(record).unwrap().key.to_string()
    }

    const LINE: &str = "2 783023365380 eni-00fe26c107412e170 67.220.247.194 172.31.32.151 443 49782 6 6 306 1732010760 1732010788 ACCEPT OK";

    #[test]
    fn identical_records_share_a_key() {
        assert_eq!(key_for(LINE), key_for(LINE));
    }

    #[test]
    fn key_ignores_whitespace_in_the_source_line() {
        assert_eq!(key_for(LINE), key_for(&format!("{}\n", LINE.replace(' ', "\t"))));
    }

    #[test]
    fn single_field_change_changes_the_key() {
        let other_port = LINE.replacen(" 443 ", " 444 ", 1);
        let other_status = LINE.replacen(" OK", " SKIPDATA", 1);
        assert_ne!(key_for(LINE), key_for(&other_port));
        assert_ne!(key_for(LINE), key_for(&other_status));
    }

    #[test]
    fn key_is_hex_sha256() {
        let key = key_for(LINE);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
