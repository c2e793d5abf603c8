//! Shared constants and system-wide defaults.

/// Remote execution engine defaults.
pub mod remote {
    /// Default SSH port on provisioned instances.
    pub const SSH_PORT: u16 = 22;

    /// Fixed delay between transient-connection retries, in seconds.
    pub const RETRY_DELAY_SECS: u64 = 2;

    /// Overall bound on waiting for a host to become reachable, in seconds.
    /// Newly created instances can take several minutes to boot.
    pub const RETRY_BOUND_SECS: u64 = 600;

    /// Per-attempt SSH connect timeout, in seconds.
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
}

/// Automator-side conventions on target hosts.
pub mod automator {
    /// Cache directory staged on every target node; task configs and the
    /// wrapper entry point live underneath.
    pub const REMOTE_CACHE_DIR: &str = "/var/cache/provisioner";

    /// Wrapper entry point every non-bootstrap operation runs through.
    pub const WRAPPER_FILE_NAME: &str = "launcher.sh";
}

/// Web server defaults.
pub mod server {
    pub const BIND_ADDRESS: &str = "0.0.0.0";
    pub const PORT: u16 = 55055;
}

/// System identification.
pub mod system {
    pub const SERVICE_NAME: &str = "provisioner-core";
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}
