use base64::Engine;
use serde::Deserialize;
use thiserror::Error;

use crate::firehose::RawRecord;
use crate::flow_log::{FlowLogRecord, ParseError};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("record data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("record data is not valid UTF-8")]
    Utf8,
    #[error("record data is not a log envelope: {0}")]
    Envelope(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

// CloudWatch Logs subscription envelope, one flow log line per record
#[derive(Deserialize)]
struct LogEnvelope {
    message: String,
}

/// Unwraps a record's base64 payload down to the raw flow log line.
pub fn decode(data: &str) -> Result<String, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    let text = String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;
    let envelope: LogEnvelope = serde_json::from_str(&text)?;
    Ok(envelope.message)
}

pub fn decode_and_parse(record: &RawRecord) -> Result<FlowLogRecord, RecordError> {
    let line = decode(&record.data)?;
    Ok(line.parse()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "eyJtZXNzYWdlIjoiMiA3ODMwMjMzNjUzODAgZW5pLTAwZmUyNmMxMDc0MTJlMTcwIDY3LjIyMC4yNDcuMTk0IDE3Mi4zMS4zMi4xNTEgNDQzIDQ5NzgyIDYgNiAzMDYgMTczMjAxMDc2MCAxNzMyMDEwNzg4IEFDQ0VQVCBPSyJ9Cg==";

    #[test]
    fn decodes_envelope_message() {
        let line = decode(SAMPLE).unwrap();
        assert_eq!(
            line,
            "2 783023365380 eni-00fe26c107412e170 67.220.247.194 172.31.32.151 443 49782 6 6 306 1732010760 1732010788 ACCEPT OK"
        );
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            decode("invalid_base64_data"),
            Err(DecodeError::Base64(_))
        ));
    }

    #[test]
    fn rejects_non_utf8_payload() {
        let data = base64::engine::general_purpose::STANDARD.encode([0xff, 0xfe, 0x00]);
        assert!(matches!(decode(&data), Err(DecodeError::Utf8)));
    }

    #[test]
    fn rejects_payload_without_message() {
        let data = base64::engine::general_purpose::STANDARD.encode(r#"{"msg": "2 1 eni"}"#);
        assert!(matches!(decode(&data), Err(DecodeError::Envelope(_))));

        let data = base64::engine::general_purpose::STANDARD.encode("2 783023365380 eni-1");
        assert!(matches!(decode(&data), Err(DecodeError::Envelope(_))));
    }

    #[test]
    fn decode_and_parse_reports_grammar_errors() {
        let data = base64::engine::general_purpose::STANDARD.encode(r#"{"message": "2 1 eni"}"#);
        let record = RawRecord { data };
        assert!(matches!(
            decode_and_parse(&record),
            Err(RecordError::Parse(ParseError::FieldCount { found: 3, .. }))
        ));
    }
}
