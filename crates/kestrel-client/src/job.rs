//! Retry-counted job wrapper and its wire envelope.
//!
//! Jobs on an error queue are stored as a small JSON envelope:
//!
//! ```json
//! {"kestrel_job": 1, "retries": 2, "payload": "aGVsbG8="}
//! ```
//!
//! Anything read from a queue that is not such an envelope is a fresh job
//! with no retries.

use crate::error::SerializationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

const ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobEnvelope {
    kestrel_job: u32,
    retries: u32,
    payload: String,
}

/// A dequeued payload tagged with the number of failed attempts so far
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryableJob {
    retries: u32,
    payload: Bytes,
}

impl RetryableJob {
    /// Wrap a payload that has never been retried
    pub fn new(payload: Bytes) -> Self {
        Self::with_retries(0, payload)
    }

    /// Wrap a payload that has already failed `retries` times
    pub fn with_retries(retries: u32, payload: Bytes) -> Self {
        Self { retries, payload }
    }

    /// Failed attempts so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Attempt number of the current delivery (1 for a fresh job)
    pub fn current_try(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The same job after one more failure.
    ///
    /// The count saturates at `u32::MAX`.
    pub fn next_retry(&self) -> Self {
        Self::with_retries(self.retries.saturating_add(1), self.payload.clone())
    }

    /// A replacement payload carrying this job's retry count plus one
    pub fn retry_with(&self, payload: Bytes) -> Self {
        Self::with_retries(self.retries.saturating_add(1), payload)
    }

    /// Encode as an error-queue envelope
    pub fn encode(&self) -> Result<Bytes, SerializationError> {
        let envelope = JobEnvelope {
            kestrel_job: ENVELOPE_VERSION,
            retries: self.retries,
            payload: STANDARD.encode(&self.payload),
        };

        Ok(Bytes::from(serde_json::to_vec(&envelope)?))
    }

    /// Decode a dequeued value.
    ///
    /// Values that are not envelopes become fresh jobs.
    pub fn decode(value: Bytes) -> Self {
        match Self::decode_envelope(&value) {
            Some(job) => job,
            None => Self::new(value),
        }
    }

    /// Check if `value` is an encoded job envelope
    pub fn is_envelope(value: &[u8]) -> bool {
        Self::decode_envelope(value).is_some()
    }

    fn decode_envelope(value: &[u8]) -> Option<Self> {
        if value.first() != Some(&b'{') {
            return None;
        }

        let envelope: JobEnvelope = serde_json::from_slice(value).ok()?;
        if envelope.kestrel_job != ENVELOPE_VERSION {
            return None;
        }

        let payload = STANDARD.decode(envelope.payload.as_bytes()).ok()?;
        Some(Self::with_retries(envelope.retries, Bytes::from(payload)))
    }
}
