//! Error taxonomy shared across the orchestrator (spec §7).
//!
//! Each variant below is the condition, not a wrapper for a single
//! downstream crate's error type — adapters and storage crates define
//! their own `thiserror` enums and convert into these at the boundary
//! where a caller needs the taxonomy rather than the mechanism.

use thiserror::Error;

/// Bad input at the edge. Surfaced to the caller; never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("validation error: {0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Credential decryption or device login failure. Per-device terminal;
/// the job continues with other devices.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("auth error: {0}")]
pub struct AuthError(pub String);

/// TCP/SSH/Telnet failure or read timeout. Per-command terminal (or
/// per-device during the connect phase).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// Disk I/O failure writing artifacts or job rows. Per-command terminal;
/// the batch continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

/// Ciphertext cannot be decrypted. The device is treated as unauthenticated;
/// there is no plaintext fallback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("crypto error: {0}")]
pub struct CryptoError(pub String);

/// Precondition failure when enabling the jumphost. The config write is
/// rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("jumphost probe error: {0}")]
pub struct JumphostProbeError(pub String);

/// Cooperative cancellation. Always expected after `stop_job`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cancelled")]
pub struct Cancelled;
