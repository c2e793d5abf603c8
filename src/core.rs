//! # Provisioner Core
//!
//! Composition root wiring the plugin registry, tenant capacity manager,
//! dispatcher and worker pool together. The web API talks to this type and
//! nothing below it.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capacity::{TenantCapacity, TenantCapacityManager};
use crate::config::ProvisionerConfig;
use crate::dispatcher::{Dispatcher, QueueStats};
use crate::error::Result;
use crate::models::{Task, TaskRequest, Tenant, TenantSpec};
use crate::plugins::{HostPoolProvider, ShellAutomator};
use crate::registry::PluginRegistry;
use crate::remote::{RemoteExecutor, SshExecutor};
use crate::worker::Worker;

/// A tenant joined with its live capacity and queue counters.
#[derive(Debug, Clone)]
pub struct TenantStatus {
    pub tenant: Tenant,
    pub capacity: TenantCapacity,
    pub queue: QueueStats,
}

/// The provisioning core: tenant admission, task dispatch, worker pool.
pub struct ProvisionerCore {
    config: ProvisionerConfig,
    registry: Arc<PluginRegistry>,
    capacity: Arc<TenantCapacityManager>,
    dispatcher: Arc<Dispatcher>,
    tenants: DashMap<String, Tenant>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ProvisionerCore {
    /// Build a core around an already-populated plugin registry.
    pub fn new(config: ProvisionerConfig, registry: PluginRegistry) -> Arc<Self> {
        let capacity = Arc::new(TenantCapacityManager::new());
        let dispatcher = Arc::new(Dispatcher::new(capacity.clone()));
        let (shutdown_tx, _) = watch::channel(false);

        Arc::new(Self {
            config,
            registry: Arc::new(registry),
            capacity,
            dispatcher,
            tenants: DashMap::new(),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Registry with the in-tree plugins wired to the SSH transport, as
    /// configured. External deployments register their own plugins instead.
    pub fn standard_registry(config: &ProvisionerConfig) -> PluginRegistry {
        let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(
            config.remote.retry_policy(),
            config.remote.connect_timeout(),
        ));

        let mut registry = PluginRegistry::new();
        registry.register_provider(Arc::new(HostPoolProvider::new(
            config.host_pool.hosts.clone(),
            config.host_pool.probe_command.clone(),
            config.remote.retry_policy(),
            executor.clone(),
        )));
        registry.register_automator(Arc::new(ShellAutomator::new(
            config.automator.cache_dir.clone(),
            executor,
        )));
        registry
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Create a tenant and spawn its worker pool.
    pub async fn create_tenant(&self, spec: TenantSpec) -> Result<Tenant> {
        let tenant = Tenant::from_spec(spec);
        let slots = self
            .capacity
            .register_tenant(&tenant.id, tenant.max_workers)
            .await?;
        self.dispatcher.register_tenant(&tenant.id).await;
        self.spawn_workers(&tenant.id, &slots).await;

        self.tenants.insert(tenant.id.clone(), tenant.clone());
        info!(tenant_id = %tenant.id, workers = tenant.max_workers, "tenant created");
        Ok(tenant)
    }

    /// Resize a tenant's worker allocation.
    pub async fn update_tenant(&self, tenant_id: &str, spec: TenantSpec) -> Result<Tenant> {
        let change = self.capacity.set_capacity(tenant_id, spec.workers).await?;
        self.spawn_workers(tenant_id, &change.created).await;
        // idle workers whose slots just retired need a nudge to observe it
        self.dispatcher.wake_tenant(tenant_id).await;

        let tenant = {
            let mut entry = self
                .tenants
                .entry(tenant_id.to_string())
                .or_insert_with(|| Tenant::from_spec(spec.clone()));
            entry.apply_spec(spec);
            entry.clone()
        };
        Ok(tenant)
    }

    /// Delete a tenant. Fails with a busy error while any of its workers is
    /// running a task; queued-but-unassigned tasks are left orphaned.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<()> {
        self.capacity.delete_tenant(tenant_id).await?;
        let orphaned = self.dispatcher.remove_tenant(tenant_id).await;
        if !orphaned.is_empty() {
            warn!(tenant_id, orphaned = orphaned.len(), "tenant deleted with queued tasks");
        }
        self.tenants.remove(tenant_id);
        Ok(())
    }

    /// A tenant joined with its live counters.
    pub async fn tenant_status(&self, tenant_id: &str) -> Option<TenantStatus> {
        let tenant = self.tenants.get(tenant_id)?.clone();
        let capacity = self.capacity.tenant_capacity(tenant_id).await?;
        let queue = self
            .dispatcher
            .queue_stats(tenant_id)
            .await
            .unwrap_or_default();
        Some(TenantStatus {
            tenant,
            capacity,
            queue,
        })
    }

    /// Status for every tenant.
    pub async fn all_tenant_status(&self) -> Vec<TenantStatus> {
        let mut statuses = Vec::new();
        let ids: Vec<String> = self.tenants.iter().map(|e| e.key().clone()).collect();
        for tenant_id in ids {
            if let Some(status) = self.tenant_status(&tenant_id).await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Accept a task submission and queue it for its tenant.
    pub async fn submit_task(&self, request: TaskRequest) -> Result<Task> {
        let task = Task::from_request(request);
        let snapshot = task.clone();
        self.dispatcher.enqueue(task).await?;
        Ok(snapshot)
    }

    /// Read a task by id, including its result once terminal.
    pub fn task(&self, task_id: Uuid) -> Option<Task> {
        self.dispatcher.task(task_id)
    }

    /// Graceful drain: latch the shutdown flag, wake idle workers, and wait
    /// for every worker to finish its in-flight task and exit.
    pub async fn shutdown(&self) {
        info!("shutdown requested, draining workers");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().await;
            workers.drain(..).collect()
        };
        join_all(handles).await;
        info!("all workers drained");
    }

    async fn spawn_workers(&self, tenant_id: &str, slots: &[Uuid]) {
        if slots.is_empty() {
            return;
        }
        let Some(work) = self.dispatcher.work_signal(tenant_id).await else {
            warn!(tenant_id, "no task queue for tenant, workers not spawned");
            return;
        };

        let mut workers = self.workers.lock().await;
        for slot_id in slots {
            let worker = Worker::new(
                *slot_id,
                tenant_id.to_string(),
                self.dispatcher.clone(),
                self.capacity.clone(),
                self.registry.clone(),
                self.shutdown_tx.subscribe(),
                work.clone(),
            );
            workers.push(worker.spawn());
        }
    }
}
