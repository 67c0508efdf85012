use async_trait::async_trait;
use thiserror::Error;

use crate::fingerprint::DedupKey;

pub mod memory;
pub mod redis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The key was absent and is now recorded, the caller owns publishing the record
    FirstSeen,
    /// Another caller already claimed the key, the record must be dropped
    AlreadySeen,
}

#[derive(Error, Debug)]
pub enum DedupError {
    #[error("dedup store did not answer in time")]
    Timeout,
    #[error("dedup store error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Persistent set of fingerprints of records already published.
///
/// Implementations must make `claim` atomic: when several requests claim the
/// same key concurrently, exactly one of them gets `Claim::FirstSeen`.
#[async_trait]
pub trait DedupStore {
    async fn claim(&self, key: &DedupKey) -> Result<Claim, DedupError>;

    /// Forgets a claim whose record could not be published, so a redelivery
    /// of the batch can claim it again.
    async fn release(&self, key: &DedupKey) -> Result<(), DedupError>;

    /// Round trip to the backing service, drives the liveness check.
    async fn ping(&self) -> Result<(), DedupError> {
        Ok(())
    }
}
