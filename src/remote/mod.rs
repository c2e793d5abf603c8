//! # Remote Execution Engine
//!
//! Runs commands and uploads files on target hosts over authenticated SSH
//! sessions. The failure policy is two-tier and deliberate:
//!
//! - **Authentication failures are fatal.** Bad credentials never get better
//!   by waiting; they surface immediately, annotated with the host, with zero
//!   retries.
//! - **Socket-level connection failures are transient.** A machine that was
//!   just created may take minutes to start answering on its SSH port, so
//!   refused/reset/unreachable/timed-out connections are retried with a fixed
//!   short delay under an overall bound, and only escalate to a fatal error
//!   once the bound elapses.
//!
//! The policy lives in [`retry`] independent of the transport; the production
//! transport is the russh-backed [`SshExecutor`].

pub mod retry;
pub mod ssh;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use retry::{wait_for_port, RetryPolicy};
pub use ssh::SshExecutor;

/// Credentials for an SSH session. Exactly one of `password` or
/// `private_key` (PEM) is expected; `private_key` wins when both are set.
#[derive(Clone, Serialize, Deserialize)]
pub struct SshCredentials {
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
}

// Secrets stay out of logs; Debug shows only their presence.
impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Captured output of one remote command.
#[derive(Debug, Clone, Default)]
pub struct RemoteOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: u32,
}

impl RemoteOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Remote-layer errors, split along the retry policy boundary.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Fatal: never retried.
    #[error("authentication failed for {user}@{host}: {reason}")]
    AuthenticationFailed {
        host: String,
        user: String,
        reason: String,
    },

    /// Transient: retried with fixed delay under the policy bound.
    #[error("connection to {host}:{port} failed: {source}")]
    Connection {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Fatal: the transient-retry bound elapsed.
    #[error("{host}:{port} did not become reachable within {waited:?}")]
    Unreachable {
        host: String,
        port: u16,
        waited: Duration,
    },

    /// Fatal: the session was established but the protocol exchange failed.
    #[error("ssh session error on {host}: {message}")]
    Session { host: String, message: String },

    /// Fatal: unusable key material.
    #[error("invalid private key material: {reason}")]
    InvalidKey { reason: String },
}

impl RemoteError {
    /// Whether the retry loop may try again. Only socket-level connection
    /// errors of the kinds a booting host produces qualify.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::HostUnreachable
                    | std::io::ErrorKind::NetworkUnreachable
            ),
            _ => false,
        }
    }
}

/// Executes commands and uploads files on a target host.
///
/// Implementations own connection management and apply the two-tier retry
/// policy internally; callers see either a completed [`RemoteOutput`] (any
/// exit code) or a fatal [`RemoteError`].
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on the host, capturing stdout, stderr and exit code.
    async fn run(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
        command: &str,
    ) -> Result<RemoteOutput, RemoteError>;

    /// Write `content` to `remote_path` on the host, creating parent
    /// directories as needed.
    async fn upload(
        &self,
        host: &str,
        port: u16,
        credentials: &SshCredentials,
        content: &[u8],
        remote_path: &str,
    ) -> Result<(), RemoteError>;
}
