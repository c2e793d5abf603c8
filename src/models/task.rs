//! Task model: the unit of provisioning or configuration work.
//!
//! A task is created by the external cluster planner, enqueued for its
//! tenant, and owned by exactly one worker from assignment until it reports
//! a terminal result. Terminal tasks are immutable and read back through the
//! web API for status reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Provisioning and configuration operations a task can carry.
///
/// `Create`/`Confirm`/`Delete` are provider operations (cloud instance
/// lifecycle); the remaining seven are automator operations (software
/// convergence on an existing node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOperation {
    Create,
    Confirm,
    Delete,
    Bootstrap,
    Install,
    Configure,
    Initialize,
    Start,
    Stop,
    Remove,
}

/// Provider-handled operations, in lifecycle order.
pub const PROVIDER_OPERATIONS: &[TaskOperation] = &[
    TaskOperation::Create,
    TaskOperation::Confirm,
    TaskOperation::Delete,
];

/// Automator-handled operations, in lifecycle order.
pub const AUTOMATOR_OPERATIONS: &[TaskOperation] = &[
    TaskOperation::Bootstrap,
    TaskOperation::Install,
    TaskOperation::Configure,
    TaskOperation::Initialize,
    TaskOperation::Start,
    TaskOperation::Stop,
    TaskOperation::Remove,
];

impl TaskOperation {
    /// Whether this operation is handled by a provider plugin.
    pub fn is_provider_operation(&self) -> bool {
        PROVIDER_OPERATIONS.contains(self)
    }

    /// Whether this operation is handled by an automator plugin.
    pub fn is_automator_operation(&self) -> bool {
        AUTOMATOR_OPERATIONS.contains(self)
    }
}

impl fmt::Display for TaskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Confirm => write!(f, "confirm"),
            Self::Delete => write!(f, "delete"),
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::Install => write!(f, "install"),
            Self::Configure => write!(f, "configure"),
            Self::Initialize => write!(f, "initialize"),
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

impl std::str::FromStr for TaskOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "confirm" => Ok(Self::Confirm),
            "delete" => Ok(Self::Delete),
            "bootstrap" => Ok(Self::Bootstrap),
            "install" => Ok(Self::Install),
            "configure" => Ok(Self::Configure),
            "initialize" => Ok(Self::Initialize),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "remove" => Ok(Self::Remove),
            _ => Err(format!("Invalid task operation: {s}")),
        }
    }
}

/// Task state definitions.
///
/// Transitions are monotonic: `Queued → Assigned → Running → {Succeeded |
/// Failed}`. A task is never re-queued automatically; retry is the caller's
/// responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in its tenant's FIFO queue
    Queued,
    /// Handed to a worker, not yet executing
    Assigned,
    /// A worker is executing the plugin operation
    Running,
    /// Terminal: the plugin reported success
    Succeeded,
    /// Terminal: the plugin reported failure or raised an error
    Failed,
}

impl TaskStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Check if this is an active state (a worker owns the task)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Assigned | Self::Running)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, TaskStatus::Assigned)
                | (Self::Assigned, TaskStatus::Running)
                | (Self::Running, TaskStatus::Succeeded)
                | (Self::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Assigned => write!(f, "assigned"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "assigned" => Ok(Self::Assigned),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {s}")),
        }
    }
}

/// Structured output of one plugin operation.
///
/// `status` follows shell conventions: `0` is success, anything else is
/// failure. The default is failure (`1`) so an operation that forgets to set
/// a terminal status reports as failed rather than silently succeeding; the
/// happy path must call [`TaskResult::success`] or set `status` to `0`
/// explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub status: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    /// Plugin-specific derived fields (assigned IP address, provider id, ...)
    #[serde(default)]
    pub fields: serde_json::Map<String, Value>,
}

impl Default for TaskResult {
    fn default() -> Self {
        Self {
            status: 1,
            stdout: String::new(),
            stderr: String::new(),
            fields: serde_json::Map::new(),
        }
    }
}

impl TaskResult {
    /// A successful, empty result.
    pub fn success() -> Self {
        Self {
            status: 0,
            ..Self::default()
        }
    }

    /// A failed result carrying the cause text in `stderr`.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            status: 1,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Attach a derived field to the result.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Task submission shape accepted by the web API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub cluster_id: String,
    /// Cluster-level tasks carry no node
    #[serde(default)]
    pub node_id: Option<String>,
    pub operation: TaskOperation,
    /// Names the provider or automator plugin that must handle the task
    pub provisioner_type: String,
    pub tenant_id: String,
    /// Opaque payload passed verbatim to the plugin
    #[serde(default)]
    pub config: Value,
}

/// One unit of provisioning or configuration work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub cluster_id: String,
    pub node_id: Option<String>,
    pub operation: TaskOperation,
    pub provisioner_type: String,
    pub tenant_id: String,
    pub config: Value,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a queued task from an API submission.
    pub fn from_request(request: TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cluster_id: request.cluster_id,
            node_id: request.node_id,
            operation: request.operation,
            provisioner_type: request.provisioner_type,
            tenant_id: request.tenant_id,
            config: request.config,
            status: TaskStatus::Queued,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Advance the task state, enforcing monotonic transitions.
    pub fn transition_to(&mut self, next: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "Invalid task transition: {} -> {} for task {}",
                self.status, next, self.id
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a terminal result; the terminal status follows the result's
    /// exit status.
    pub fn complete(&mut self, result: TaskResult) -> Result<(), String> {
        let terminal = if result.is_success() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        self.transition_to(terminal)?;
        self.result = Some(result);
        Ok(())
    }
}
