//! # Plugin Contracts
//!
//! Capability-tagged interfaces for the two plugin kinds:
//!
//! - [`ProviderPlugin`] - cloud-instance lifecycle: `create`, `confirm`,
//!   `delete`.
//! - [`AutomatorPlugin`] - node software convergence: `bootstrap`,
//!   `install`, `configure`, `initialize`, `start`, `stop`, `remove`.
//!
//! Operations return a [`TaskResult`] on the happy path (including remote
//! commands that exited non-zero) and a [`PluginError`] for conditions the
//! plugin could not handle - connection/authentication failures above all.
//! The worker owns the boundary: any `PluginError` is converted into a
//! failed result and never crosses the worker loop.

pub mod host_pool;
pub mod shell;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Task, TaskOperation, TaskResult, AUTOMATOR_OPERATIONS, PROVIDER_OPERATIONS};
use crate::remote::{RemoteError, SshCredentials};

pub use host_pool::{HostPoolProvider, PooledHost};
pub use shell::ShellAutomator;

/// The two plugin kinds a task can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginKind {
    Provider,
    Automator,
}

impl PluginKind {
    /// Which kind of plugin handles the given operation.
    pub fn for_operation(operation: TaskOperation) -> Self {
        if operation.is_provider_operation() {
            Self::Provider
        } else {
            Self::Automator
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider => write!(f, "provider"),
            Self::Automator => write!(f, "automator"),
        }
    }
}

/// Errors raised by plugin operations.
///
/// These are conditions the plugin cannot turn into a meaningful result:
/// unusable task config, an unreachable or unauthenticatable target, or a
/// backend refusing the request outright.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("task config missing required field '{field}'")]
    MissingField { field: String },

    #[error("invalid task config: {reason}")]
    InvalidConfig { reason: String },

    #[error("backend error: {message}")]
    Backend { message: String },
}

impl PluginError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The slice of a task a plugin operation sees: identity plus the opaque
/// config payload, passed verbatim from submission.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: Uuid,
    pub cluster_id: String,
    pub node_id: Option<String>,
    pub tenant_id: String,
    pub operation: TaskOperation,
    pub config: Value,
}

impl TaskContext {
    pub fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id,
            cluster_id: task.cluster_id.clone(),
            node_id: task.node_id.clone(),
            tenant_id: task.tenant_id.clone(),
            operation: task.operation,
            config: task.config.clone(),
        }
    }

    /// Required string field from the config payload.
    pub fn str_field(&self, field: &str) -> Result<&str, PluginError> {
        self.config
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::missing_field(field))
    }

    /// Optional string field from the config payload.
    pub fn opt_str_field(&self, field: &str) -> Option<&str> {
        self.config.get(field).and_then(Value::as_str)
    }

    /// The target host remote operations connect to.
    pub fn target_host(&self) -> Result<&str, PluginError> {
        self.str_field("host")
    }

    /// SSH port for the target host, defaulting to 22.
    pub fn ssh_port(&self) -> u16 {
        self.config
            .get("port")
            .and_then(Value::as_u64)
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(crate::constants::remote::SSH_PORT)
    }

    /// SSH credentials from the config's `ssh` object.
    pub fn credentials(&self) -> Result<SshCredentials, PluginError> {
        let ssh = self
            .config
            .get("ssh")
            .ok_or_else(|| PluginError::missing_field("ssh"))?;
        serde_json::from_value(ssh.clone())
            .map_err(|e| PluginError::invalid_config(format!("ssh credentials: {e}")))
    }
}

/// Cloud-instance lifecycle plugin.
///
/// `create` must be safe to retry after a transient failure but is not
/// required to de-duplicate instances on a blind retry - a caller that
/// retries a create whose outcome it never observed may allocate twice.
#[async_trait]
pub trait ProviderPlugin: Send + Sync {
    /// Registry name tasks select this plugin by.
    fn name(&self) -> &str;

    /// Operations this plugin declares; resolution rejects anything else.
    fn capabilities(&self) -> &[TaskOperation] {
        PROVIDER_OPERATIONS
    }

    /// Allocate a compute instance; the result carries the provider-assigned
    /// id and the credentials needed to reach it.
    async fn create(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;

    /// Block until the instance is ready and demonstrably reachable: TCP on
    /// the SSH port, a real login, and a connectivity probe from inside.
    async fn confirm(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;

    /// Tear the instance down. Idempotent: an already-absent instance and a
    /// never-registered one both succeed.
    async fn delete(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
}

/// Node software convergence plugin.
#[async_trait]
pub trait AutomatorPlugin: Send + Sync {
    /// Registry name tasks select this plugin by.
    fn name(&self) -> &str;

    /// Operations this plugin declares; resolution rejects anything else.
    fn capabilities(&self) -> &[TaskOperation] {
        AUTOMATOR_OPERATIONS
    }

    /// Prepare a target host for later operations; must be re-runnable.
    async fn bootstrap(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;

    async fn install(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
    async fn configure(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
    async fn initialize(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
    async fn start(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
    async fn stop(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
    async fn remove(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(config: Value) -> TaskContext {
        TaskContext {
            task_id: Uuid::new_v4(),
            cluster_id: "cluster-1".to_string(),
            node_id: Some("node-1".to_string()),
            tenant_id: "acme".to_string(),
            operation: TaskOperation::Bootstrap,
            config,
        }
    }

    #[test]
    fn test_kind_for_operation() {
        assert_eq!(
            PluginKind::for_operation(TaskOperation::Create),
            PluginKind::Provider
        );
        assert_eq!(
            PluginKind::for_operation(TaskOperation::Start),
            PluginKind::Automator
        );
    }

    #[test]
    fn test_context_field_access() {
        let ctx = context(json!({
            "host": "10.0.0.5",
            "port": 2222,
            "ssh": {"user": "root", "password": "secret"}
        }));

        assert_eq!(ctx.target_host().unwrap(), "10.0.0.5");
        assert_eq!(ctx.ssh_port(), 2222);

        let creds = ctx.credentials().unwrap();
        assert_eq!(creds.user, "root");
        assert_eq!(creds.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_context_missing_fields() {
        let ctx = context(json!({}));
        assert!(matches!(
            ctx.target_host(),
            Err(PluginError::MissingField { .. })
        ));
        assert!(matches!(
            ctx.credentials(),
            Err(PluginError::MissingField { .. })
        ));
        assert_eq!(ctx.ssh_port(), 22);
    }
}
