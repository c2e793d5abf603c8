//! # Dispatcher / Task Queue
//!
//! Holds queued tasks per tenant and hands the oldest eligible task to a
//! requesting idle worker of that tenant. Assignment is at-most-once: the
//! pop and the QUEUED→ASSIGNED transition happen under one lock, so no two
//! workers can receive the same task. Within a tenant, tasks are offered in
//! arrival order; across tenants there is no ordering guarantee.
//!
//! A worker that dies mid-task leaves its task ASSIGNED/RUNNING forever -
//! deliberately at-most-once rather than at-least-once. Detecting and
//! recovering such tasks belongs to an external reconciliation process; the
//! in-flight counters exposed here are what it would watch.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capacity::{CapacityError, SlotRelease, TenantCapacityManager};
use crate::models::{Task, TaskResult, TaskStatus};

/// Dispatcher errors.
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("task {task_id} does not exist")]
    UnknownTask { task_id: Uuid },

    #[error("tenant '{tenant_id}' has no task queue")]
    UnknownTenant { tenant_id: String },

    #[error("invalid task state: {reason}")]
    InvalidTransition { reason: String },

    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

/// Per-tenant queue observability counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Tasks waiting for a worker
    pub queued: usize,
    /// Tasks assigned or running
    pub in_flight: usize,
}

struct TenantQueue {
    queue: VecDeque<Uuid>,
    in_flight: usize,
    work: Arc<Notify>,
}

impl TenantQueue {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: 0,
            work: Arc::new(Notify::new()),
        }
    }
}

/// Tenant-aware task dispatcher.
pub struct Dispatcher {
    queues: Mutex<HashMap<String, TenantQueue>>,
    tasks: DashMap<Uuid, Task>,
    capacity: Arc<TenantCapacityManager>,
}

impl Dispatcher {
    pub fn new(capacity: Arc<TenantCapacityManager>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            tasks: DashMap::new(),
            capacity,
        }
    }

    /// Create the task queue for a tenant.
    pub async fn register_tenant(&self, tenant_id: &str) {
        let mut queues = self.queues.lock().await;
        queues
            .entry(tenant_id.to_string())
            .or_insert_with(TenantQueue::new);
    }

    /// Drop a tenant's queue and wake its parked workers so they observe
    /// their retired slots. Tasks still queued stay QUEUED; they were never
    /// assigned and no worker will pick them up.
    pub async fn remove_tenant(&self, tenant_id: &str) -> Vec<Uuid> {
        let mut queues = self.queues.lock().await;
        match queues.remove(tenant_id) {
            Some(entry) => {
                entry.work.notify_waiters();
                let orphaned: Vec<Uuid> = entry.queue.into_iter().collect();
                if !orphaned.is_empty() {
                    warn!(
                        tenant_id,
                        orphaned = orphaned.len(),
                        "tenant removed with tasks still queued"
                    );
                }
                orphaned
            }
            None => Vec::new(),
        }
    }

    /// Append a task to its tenant's FIFO queue.
    pub async fn enqueue(&self, task: Task) -> Result<Uuid, DispatcherError> {
        let tenant_id = task.tenant_id.clone();
        let task_id = task.id;

        let mut queues = self.queues.lock().await;
        let entry = queues
            .get_mut(&tenant_id)
            .ok_or_else(|| DispatcherError::UnknownTenant {
                tenant_id: tenant_id.clone(),
            })?;

        self.tasks.insert(task_id, task);
        entry.queue.push_back(task_id);
        entry.work.notify_one();

        debug!(%task_id, tenant_id, queued = entry.queue.len(), "task enqueued");
        Ok(task_id)
    }

    /// Hand the oldest queued task for the tenant to the caller, atomically
    /// transitioning it to ASSIGNED. Returns `None` when the queue is empty.
    pub async fn next_task(&self, tenant_id: &str) -> Result<Option<Task>, DispatcherError> {
        let mut queues = self.queues.lock().await;
        let entry = queues
            .get_mut(tenant_id)
            .ok_or_else(|| DispatcherError::UnknownTenant {
                tenant_id: tenant_id.to_string(),
            })?;

        let Some(task_id) = entry.queue.pop_front() else {
            return Ok(None);
        };

        let mut task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(DispatcherError::UnknownTask { task_id })?;
        task.transition_to(TaskStatus::Assigned)
            .map_err(|reason| DispatcherError::InvalidTransition { reason })?;
        entry.in_flight += 1;

        debug!(%task_id, tenant_id, "task assigned");
        Ok(Some(task.clone()))
    }

    /// Record that the owning worker started executing the task.
    pub async fn mark_running(&self, task_id: Uuid) -> Result<(), DispatcherError> {
        let mut task = self
            .tasks
            .get_mut(&task_id)
            .ok_or(DispatcherError::UnknownTask { task_id })?;
        task.transition_to(TaskStatus::Running)
            .map_err(|reason| DispatcherError::InvalidTransition { reason })?;
        Ok(())
    }

    /// Record the terminal result and free the owning worker slot. The
    /// terminal status follows the result's exit status.
    pub async fn report_result(
        &self,
        task_id: Uuid,
        slot_id: Uuid,
        result: TaskResult,
    ) -> Result<SlotRelease, DispatcherError> {
        let tenant_id = {
            let mut task = self
                .tasks
                .get_mut(&task_id)
                .ok_or(DispatcherError::UnknownTask { task_id })?;
            let status = if result.is_success() {
                "succeeded"
            } else {
                "failed"
            };
            task.complete(result)
                .map_err(|reason| DispatcherError::InvalidTransition { reason })?;
            info!(%task_id, tenant_id = %task.tenant_id, status, "task finished");
            task.tenant_id.clone()
        };

        {
            let mut queues = self.queues.lock().await;
            if let Some(entry) = queues.get_mut(&tenant_id) {
                entry.in_flight = entry.in_flight.saturating_sub(1);
            }
        }

        Ok(self.capacity.release(slot_id).await?)
    }

    /// The tenant's new-work signal; workers park on it when the queue is
    /// empty.
    pub async fn work_signal(&self, tenant_id: &str) -> Option<Arc<Notify>> {
        let queues = self.queues.lock().await;
        queues.get(tenant_id).map(|entry| entry.work.clone())
    }

    /// Wake every parked worker of a tenant so it can re-check its slot.
    pub async fn wake_tenant(&self, tenant_id: &str) {
        let queues = self.queues.lock().await;
        if let Some(entry) = queues.get(tenant_id) {
            entry.work.notify_waiters();
        }
    }

    /// Read a task by id.
    pub fn task(&self, task_id: Uuid) -> Option<Task> {
        self.tasks.get(&task_id).map(|t| t.clone())
    }

    /// Queue counters for one tenant.
    pub async fn queue_stats(&self, tenant_id: &str) -> Option<QueueStats> {
        let queues = self.queues.lock().await;
        queues.get(tenant_id).map(|entry| QueueStats {
            queued: entry.queue.len(),
            in_flight: entry.in_flight,
        })
    }

    /// Queue counters for every tenant.
    pub async fn all_queue_stats(&self) -> HashMap<String, QueueStats> {
        let queues = self.queues.lock().await;
        queues
            .iter()
            .map(|(tenant_id, entry)| {
                (
                    tenant_id.clone(),
                    QueueStats {
                        queued: entry.queue.len(),
                        in_flight: entry.in_flight,
                    },
                )
            })
            .collect()
    }
}
