//! # Worker
//!
//! A long-lived execution unit bound to one tenant and one worker slot. The
//! loop pulls the next task for its tenant, routes it through the plugin
//! registry, and reports the result back to the dispatcher.
//!
//! Shutdown is cooperative and non-preemptive: the signal is a latched flag
//! checked only at the idle point of the loop, never delivered mid-task.
//! Interrupting a provisioning operation in flight can strand unmanaged
//! cloud resources, so a task that has started always runs to completion.
//!
//! Every plugin failure - including resolution of an unregistered plugin -
//! is converted into a FAILED result here at the boundary; a single bad task
//! never terminates the worker.

use std::sync::Arc;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capacity::{SlotRelease, TenantCapacityManager};
use crate::dispatcher::Dispatcher;
use crate::models::{Task, TaskOperation, TaskResult};
use crate::plugins::{PluginKind, TaskContext};
use crate::registry::PluginRegistry;

/// One provisioning worker, bound to a tenant and a worker slot.
pub struct Worker {
    slot_id: Uuid,
    tenant_id: String,
    dispatcher: Arc<Dispatcher>,
    capacity: Arc<TenantCapacityManager>,
    registry: Arc<PluginRegistry>,
    shutdown: watch::Receiver<bool>,
    work: Arc<Notify>,
}

impl Worker {
    pub fn new(
        slot_id: Uuid,
        tenant_id: String,
        dispatcher: Arc<Dispatcher>,
        capacity: Arc<TenantCapacityManager>,
        registry: Arc<PluginRegistry>,
        shutdown: watch::Receiver<bool>,
        work: Arc<Notify>,
    ) -> Self {
        Self {
            slot_id,
            tenant_id,
            dispatcher,
            capacity,
            registry,
            shutdown,
            work,
        }
    }

    /// Spawn the worker loop onto the runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        debug!(slot_id = %self.slot_id, tenant_id = %self.tenant_id, "worker started");

        loop {
            // Idle point: a pending shutdown or a retired slot is honored
            // here and only here.
            if *self.shutdown.borrow() {
                info!(slot_id = %self.slot_id, "worker stopping: shutdown requested");
                break;
            }
            if !self.capacity.is_active(self.slot_id).await {
                info!(slot_id = %self.slot_id, "worker stopping: slot retired");
                break;
            }

            match self.dispatcher.next_task(&self.tenant_id).await {
                Ok(Some(task)) => self.execute(task).await,
                Ok(None) => {
                    tokio::select! {
                        _ = self.work.notified() => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
                Err(error) => {
                    // queue gone: the tenant was deleted while we idled
                    debug!(slot_id = %self.slot_id, %error, "worker stopping: queue unavailable");
                    break;
                }
            }
        }
    }

    async fn execute(&self, task: Task) {
        let task_id = task.id;

        if let Err(error) = self.capacity.acquire(self.slot_id, task_id).await {
            // The slot vanished between idle check and assignment; the task
            // stays assigned, matching the no-requeue policy.
            error!(slot_id = %self.slot_id, %task_id, %error, "worker lost its slot before execution");
            return;
        }
        if let Err(error) = self.dispatcher.mark_running(task_id).await {
            error!(%task_id, %error, "task could not enter running state");
            let _ = self.capacity.release(self.slot_id).await;
            return;
        }

        info!(
            %task_id,
            tenant_id = %task.tenant_id,
            operation = %task.operation,
            provisioner_type = %task.provisioner_type,
            "task execution started"
        );

        // The plugin boundary: errors become failed results, never panics
        // or loop exits.
        let result = match self.invoke_plugin(&task).await {
            Ok(result) => result,
            Err(message) => {
                warn!(%task_id, error = %message, "plugin raised an error, recording failed result");
                TaskResult::failure(message)
            }
        };

        match self.dispatcher.report_result(task_id, self.slot_id, result).await {
            Ok(SlotRelease::Idle) => {}
            Ok(SlotRelease::Retired) => {
                debug!(slot_id = %self.slot_id, "slot retired on release");
            }
            Err(error) => {
                error!(%task_id, %error, "failed to report task result");
            }
        }
    }

    /// Route the task to its plugin by `(provisioner_type, operation)`.
    async fn invoke_plugin(&self, task: &Task) -> Result<TaskResult, String> {
        let ctx = TaskContext::from_task(task);
        let name = task.provisioner_type.as_str();

        let outcome = match PluginKind::for_operation(task.operation) {
            PluginKind::Provider => {
                let plugin = self
                    .registry
                    .resolve_provider(name, task.operation)
                    .map_err(|e| e.to_string())?;
                match task.operation {
                    TaskOperation::Create => plugin.create(&ctx).await,
                    TaskOperation::Confirm => plugin.confirm(&ctx).await,
                    TaskOperation::Delete => plugin.delete(&ctx).await,
                    other => return Err(format!("operation '{other}' is not a provider operation")),
                }
            }
            PluginKind::Automator => {
                let plugin = self
                    .registry
                    .resolve_automator(name, task.operation)
                    .map_err(|e| e.to_string())?;
                match task.operation {
                    TaskOperation::Bootstrap => plugin.bootstrap(&ctx).await,
                    TaskOperation::Install => plugin.install(&ctx).await,
                    TaskOperation::Configure => plugin.configure(&ctx).await,
                    TaskOperation::Initialize => plugin.initialize(&ctx).await,
                    TaskOperation::Start => plugin.start(&ctx).await,
                    TaskOperation::Stop => plugin.stop(&ctx).await,
                    TaskOperation::Remove => plugin.remove(&ctx).await,
                    other => {
                        return Err(format!("operation '{other}' is not an automator operation"))
                    }
                }
            }
        };

        outcome.map_err(|e| e.to_string())
    }
}
