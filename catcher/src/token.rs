use subtle::ConstantTimeEq;

use crate::api::CatcherError;

/// Checks the Firehose access key header against the configured secret.
///
/// The comparison runs in constant time over the key bytes.
pub fn verify_access_key(expected: &str, provided: Option<&str>) -> Result<(), CatcherError> {
    let Some(provided) = provided else {
        return Err(CatcherError::Unauthorized);
    };
    if expected.is_empty() {
        return Err(CatcherError::Unauthorized);
    }
    if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
        Ok(())
    } else {
        Err(CatcherError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_matching_key() {
        assert!(verify_access_key("s3cret", Some("s3cret")).is_ok());
    }

    #[test]
    fn rejects_missing_or_wrong_key() {
        assert!(matches!(
            verify_access_key("s3cret", None),
            Err(CatcherError::Unauthorized)
        ));
        assert!(matches!(
            verify_access_key("s3cret", Some("s3cre")),
            Err(CatcherError::Unauthorized)
        ));
        assert!(matches!(
            verify_access_key("s3cret", Some("")),
            Err(CatcherError::Unauthorized)
        ));
    }

    #[test]
    fn empty_secret_never_matches() {
        assert!(matches!(
            verify_access_key("", Some("")),
            Err(CatcherError::Unauthorized)
        ));
    }
}
