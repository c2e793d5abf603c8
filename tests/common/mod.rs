//! Shared fixtures for integration tests: scripted plugins and core
//! builders that exercise the full dispatch pipeline without a network.

// not every test binary uses every fixture
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use uuid::Uuid;

use provisioner_core::core::ProvisionerCore;
use provisioner_core::models::{TaskOperation, TaskRequest, TaskResult, TaskStatus};
use provisioner_core::plugins::{
    AutomatorPlugin, PluginError, ProviderPlugin, TaskContext,
};
use provisioner_core::registry::PluginRegistry;
use provisioner_core::ProvisionerConfig;

/// Provider that succeeds instantly and records the operations it saw.
#[derive(Default)]
pub struct ScriptedProvider {
    pub invocations: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn record(&self, ctx: &TaskContext) -> TaskResult {
        self.invocations.lock().push(ctx.operation.to_string());
        TaskResult::success()
            .with_field("provider_id", format!("instance-{}", ctx.task_id))
            .with_field("operation", ctx.operation.to_string())
    }
}

#[async_trait]
impl ProviderPlugin for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn create(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Ok(self.record(ctx))
    }

    async fn confirm(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Ok(self.record(ctx))
    }

    async fn delete(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Ok(self.record(ctx))
    }
}

/// Automator that succeeds instantly for every operation.
#[derive(Default)]
pub struct InstantAutomator {
    pub invocations: Mutex<Vec<String>>,
}

impl InstantAutomator {
    fn record(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.invocations.lock().push(ctx.operation.to_string());
        Ok(TaskResult::success().with_field("operation", ctx.operation.to_string()))
    }
}

#[async_trait]
impl AutomatorPlugin for InstantAutomator {
    fn name(&self) -> &str {
        "instant"
    }

    async fn bootstrap(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
    async fn install(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
    async fn configure(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
    async fn initialize(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
    async fn start(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
    async fn stop(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
    async fn remove(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.record(ctx)
    }
}

/// Automator whose operations block until the test opens the gate; used to
/// hold a worker in RUNNING deterministically.
pub struct GatedAutomator {
    pub started: Arc<Notify>,
    pub gate: Arc<Semaphore>,
}

impl Default for GatedAutomator {
    fn default() -> Self {
        Self {
            started: Arc::new(Notify::new()),
            gate: Arc::new(Semaphore::new(0)),
        }
    }
}

impl GatedAutomator {
    /// Let one blocked operation finish.
    pub fn open(&self) {
        self.gate.add_permits(1);
    }

    async fn run_gated(&self) -> Result<TaskResult, PluginError> {
        self.started.notify_one();
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| PluginError::backend("gate closed"))?;
        permit.forget();
        Ok(TaskResult::success())
    }
}

#[async_trait]
impl AutomatorPlugin for GatedAutomator {
    fn name(&self) -> &str {
        "gated"
    }

    async fn bootstrap(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
    async fn install(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
    async fn configure(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
    async fn initialize(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
    async fn start(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
    async fn stop(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
    async fn remove(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_gated().await
    }
}

/// Automator whose every operation raises a plugin error.
#[derive(Default)]
pub struct FailingAutomator;

#[async_trait]
impl AutomatorPlugin for FailingAutomator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn bootstrap(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
    async fn install(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
    async fn configure(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
    async fn initialize(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
    async fn start(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
    async fn stop(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
    async fn remove(&self, _ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        Err(PluginError::backend("backend exploded"))
    }
}

/// A core wired with the scripted plugins above.
pub struct TestHarness {
    pub core: Arc<ProvisionerCore>,
    pub provider: Arc<ScriptedProvider>,
    pub automator: Arc<InstantAutomator>,
    pub gated: Arc<GatedAutomator>,
}

pub fn test_harness() -> TestHarness {
    let provider = Arc::new(ScriptedProvider::default());
    let automator = Arc::new(InstantAutomator::default());
    let gated = Arc::new(GatedAutomator::default());

    let mut registry = PluginRegistry::new();
    registry.register_provider(provider.clone());
    registry.register_automator(automator.clone());
    registry.register_automator(gated.clone());
    registry.register_automator(Arc::new(FailingAutomator));

    let core = ProvisionerCore::new(ProvisionerConfig::default(), registry);
    TestHarness {
        core,
        provider,
        automator,
        gated,
    }
}

/// Task submission against a named plugin.
pub fn task_request(tenant_id: &str, provisioner_type: &str, operation: TaskOperation) -> TaskRequest {
    TaskRequest {
        cluster_id: "cluster-1".to_string(),
        node_id: Some("node-1".to_string()),
        operation,
        provisioner_type: provisioner_type.to_string(),
        tenant_id: tenant_id.to_string(),
        config: serde_json::json!({"host": "10.0.0.5"}),
    }
}

/// Poll until the task reaches `status` or the timeout elapses.
pub async fn wait_for_task_status(core: &ProvisionerCore, task_id: Uuid, status: TaskStatus) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(task) = core.task(task_id) {
                if task.status == status {
                    return;
                }
                assert!(
                    !task.status.is_terminal(),
                    "task {task_id} terminal in {} while waiting for {status}",
                    task.status
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {task_id} did not reach {status} in time"));
}
