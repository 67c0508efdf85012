use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::DedupKey;

pub const CLOUD: &str = "aws";
pub const LOG_TYPE: &str = "vpc";

/// Number of space separated fields in a version 2 flow log line.
pub const FIELD_COUNT: usize = 14;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected} fields in flow log line, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("field {field} is not an integer: {value:?}")]
    InvalidInteger { field: &'static str, value: String },
}

/// A parsed VPC flow log line.
///
/// Field order is the canonical order: it is the order of keys in the
/// published JSON and the input of the dedup fingerprint. Do not reorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlowLogRecord {
    pub cloud: String,
    #[serde(rename = "Type")]
    pub log_type: String,
    pub version: i64,
    #[serde(rename = "AccountID")]
    pub account_id: String,
    #[serde(rename = "InterfaceID")]
    pub interface_id: String,
    #[serde(rename = "SourceIP")]
    pub source_ip: String,
    #[serde(rename = "DestinationIP")]
    pub destination_ip: String,
    pub destination_port: i64,
    pub source_port: i64,
    pub protocol: i64,
    pub packets: i64,
    pub bytes: i64,
    pub start_time: i64,
    pub end_time: i64,
    pub action: String,
    pub log_status: String,
}

fn integer(field: &'static str, token: &str) -> Result<i64, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidInteger {
        field,
        value: token.to_string(),
    })
}

impl FromStr for FlowLogRecord {
    type Err = ParseError;

    /// Tokenizes on whitespace only. Addresses, ports and enum fields are
    /// taken as-is, the producer owns their validity.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let [version, account_id, interface_id, source_ip, destination_ip, destination_port, source_port, protocol, packets, bytes, start_time, end_time, action, log_status] =
            tokens[..]
        else {
            return Err(ParseError::FieldCount {
                expected: FIELD_COUNT,
                found: tokens.len(),
            });
        };

        Ok(FlowLogRecord {
            cloud: CLOUD.to_string(),
            log_type: LOG_TYPE.to_string(),
            version: integer("Version", version)?,
            account_id: account_id.to_string(),
            interface_id: interface_id.to_string(),
            source_ip: source_ip.to_string(),
            destination_ip: destination_ip.to_string(),
            // The 6th token is published as the destination port and the 7th
            // as the source port, downstream consumers rely on this mapping.
            destination_port: integer("DestinationPort", destination_port)?,
            source_port: integer("SourcePort", source_port)?,
            protocol: integer("Protocol", protocol)?,
            packets: integer("Packets", packets)?,
            bytes: integer("Bytes", bytes)?,
            start_time: integer("StartTime", start_time)?,
            end_time: integer("EndTime", end_time)?,
            action: action.to_string(),
            log_status: log_status.to_string(),
        })
    }
}

/// A record in canonical form, ready to be claimed and published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    pub record: FlowLogRecord,
    /// Compact JSON in struct field order, used both as message body and fingerprint input
    pub payload: String,
    pub key: DedupKey,
}

impl ProcessedRecord {
    pub fn new(record: FlowLogRecord) -> Result<ProcessedRecord, serde_json::Error> {
        let payload = serde_json::to_string(&record)?;
        let key = DedupKey::from_canonical(payload.as_bytes());
        Ok(ProcessedRecord {
            record,
            payload,
            key,
        })
    }
}
