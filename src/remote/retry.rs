//! Transient-failure retry policy and TCP reachability probe.
//!
//! A freshly created instance can take minutes before sshd answers, so the
//! connect path waits with a fixed short delay between attempts, bounded by
//! an overall deadline. Anything that is not a socket-level connection
//! failure (authentication above all) aborts the loop on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use super::RemoteError;

/// Per-attempt timeout for the raw TCP probe.
const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed-delay retry policy for transient connection failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Sleep between attempts.
    pub delay: Duration,
    /// Overall bound; once elapsed the last transient error escalates to
    /// [`RemoteError::Unreachable`].
    pub bound: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(crate::constants::remote::RETRY_DELAY_SECS),
            bound: Duration::from_secs(crate::constants::remote::RETRY_BOUND_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(delay: Duration, bound: Duration) -> Self {
        Self { delay, bound }
    }
}

/// Run `operation` until it succeeds, fails fatally, or the policy bound
/// elapses. Only [`RemoteError::is_transient`] failures are retried.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let started = Instant::now();
    let deadline = started + policy.bound;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() => {
                if Instant::now() + policy.delay >= deadline {
                    warn!(
                        attempt,
                        waited = ?started.elapsed(),
                        %error,
                        "transient connection failures exhausted retry bound"
                    );
                    return Err(escalate(error, policy.bound));
                }
                debug!(attempt, %error, delay = ?policy.delay, "transient connection failure, retrying");
                sleep(policy.delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

/// Wait for `host:port` to accept a TCP connection, polling under the
/// policy. Used by provider `confirm` before attempting a real login.
pub async fn wait_for_port(host: &str, port: u16, policy: RetryPolicy) -> Result<(), RemoteError> {
    retry_transient(policy, || async {
        let connect = timeout(PORT_PROBE_TIMEOUT, TcpStream::connect((host, port))).await;
        match connect {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(source)) => Err(RemoteError::Connection {
                host: host.to_string(),
                port,
                source,
            }),
            Err(_elapsed) => Err(RemoteError::Connection {
                host: host.to_string(),
                port,
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    })
    .await
}

/// Convert the last transient error into the fatal bound-elapsed form.
fn escalate(last: RemoteError, waited: Duration) -> RemoteError {
    match last {
        RemoteError::Connection { host, port, .. } => RemoteError::Unreachable { host, port, waited },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(10), Duration::from_millis(500))
    }

    fn refused() -> RemoteError {
        RemoteError::Connection {
            host: "10.0.0.5".to_string(),
            port: 22,
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = retry_transient(quick_policy(), || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(refused())
            } else {
                Ok("up")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "up");
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_bound_elapses_into_unreachable() {
        let result: Result<(), _> =
            retry_transient(quick_policy(), || async { Err(refused()) }).await;

        match result {
            Err(RemoteError::Unreachable { host, port, .. }) => {
                assert_eq!(host, "10.0.0.5");
                assert_eq!(port, 22);
            }
            other => panic!("expected Unreachable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authentication_failure_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(quick_policy(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::AuthenticationFailed {
                host: "10.0.0.5".to_string(),
                user: "root".to_string(),
                reason: "rejected by server".to_string(),
            })
        })
        .await;

        assert!(matches!(
            result,
            Err(RemoteError::AuthenticationFailed { .. })
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_for_port_listener_accepts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // keep the listener alive for the duration of the probe
        let _guard = tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        wait_for_port("127.0.0.1", port, quick_policy())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_port_refusing_then_accepting() {
        // Reserve a port, release it, probe it while nothing listens, then
        // bind again after a few refusals.
        let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let binder = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
                .await
                .unwrap();
            loop {
                let _ = listener.accept().await;
            }
        });

        wait_for_port("127.0.0.1", port, quick_policy())
            .await
            .unwrap();
        binder.abort();
    }

    #[tokio::test]
    async fn test_wait_for_port_never_accepting_times_out() {
        let reserved = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        let result = wait_for_port("127.0.0.1", port, quick_policy()).await;
        assert!(matches!(result, Err(RemoteError::Unreachable { .. })));
    }
}
