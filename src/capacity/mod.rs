//! # Tenant Capacity Manager
//!
//! Owns every [`WorkerSlot`] and is the sole mutator of slot state. All
//! operations go through one async mutex, which serializes
//! acquire/release/resize for a tenant (single-writer) and keeps the
//! capacity invariant `0 <= worker_count <= max_workers` observable at every
//! step - except the documented transient over-allocation while a shrink
//! waits for running slots to drain.
//!
//! Shrinking never kills a slot mid-task: idle slots retire immediately,
//! running slots retire at release time once the tenant is over its new
//! allocation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Worker slot states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Running,
}

/// One unit of provisioning concurrency, bound to a tenant.
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    pub id: Uuid,
    pub tenant_id: String,
    pub state: SlotState,
    pub current_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl WorkerSlot {
    fn new(tenant_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            state: SlotState::Idle,
            current_task_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Capacity and admission errors, rejected synchronously to the caller.
#[derive(Debug, Error)]
pub enum CapacityError {
    #[error("tenant '{tenant_id}' already has a worker pool")]
    TenantExists { tenant_id: String },

    #[error("tenant '{tenant_id}' has no worker pool")]
    UnknownTenant { tenant_id: String },

    #[error("tenant '{tenant_id}' has workers running tasks")]
    TenantBusy { tenant_id: String },

    #[error("worker slot {slot_id} does not exist")]
    UnknownSlot { slot_id: Uuid },

    #[error("worker slot {slot_id} is not idle")]
    SlotNotIdle { slot_id: Uuid },
}

/// Outcome of a capacity change.
#[derive(Debug, Default)]
pub struct CapacityChange {
    /// Freshly created idle slots; the core spawns a worker per entry.
    pub created: Vec<Uuid>,
    /// Idle slots retired immediately.
    pub retired: Vec<Uuid>,
}

/// Outcome of releasing a slot after a task completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRelease {
    /// Back to idle, ready for the next task.
    Idle,
    /// The tenant shrank while this slot was running; the slot is gone and
    /// its worker must exit.
    Retired,
}

/// Per-tenant capacity counters for observability.
#[derive(Debug, Clone, Copy, Default)]
pub struct TenantCapacity {
    pub max_workers: u32,
    pub worker_count: u32,
    pub idle: u32,
    pub running: u32,
}

struct TenantPool {
    max_workers: u32,
    slots: HashMap<Uuid, WorkerSlot>,
}

impl TenantPool {
    fn counters(&self) -> TenantCapacity {
        let running = self
            .slots
            .values()
            .filter(|s| s.state == SlotState::Running)
            .count() as u32;
        TenantCapacity {
            max_workers: self.max_workers,
            worker_count: self.slots.len() as u32,
            idle: self.slots.len() as u32 - running,
            running,
        }
    }
}

/// Tracks worker slots per tenant and enforces the capacity invariant.
#[derive(Default)]
pub struct TenantCapacityManager {
    pools: Mutex<HashMap<String, TenantPool>>,
}

impl TenantCapacityManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tenant's pool with `workers` idle slots.
    pub async fn register_tenant(
        &self,
        tenant_id: &str,
        workers: u32,
    ) -> Result<Vec<Uuid>, CapacityError> {
        let mut pools = self.pools.lock().await;
        if pools.contains_key(tenant_id) {
            return Err(CapacityError::TenantExists {
                tenant_id: tenant_id.to_string(),
            });
        }

        let mut slots = HashMap::new();
        let mut created = Vec::with_capacity(workers as usize);
        for _ in 0..workers {
            let slot = WorkerSlot::new(tenant_id);
            created.push(slot.id);
            slots.insert(slot.id, slot);
        }

        pools.insert(
            tenant_id.to_string(),
            TenantPool {
                max_workers: workers,
                slots,
            },
        );

        info!(tenant_id, workers, "tenant worker pool registered");
        Ok(created)
    }

    /// Grow or shrink a tenant's pool to `workers` slots.
    ///
    /// Growth takes effect immediately. Shrink retires idle slots now; if
    /// fewer idle slots exist than the reduction requires, the tenant stays
    /// over-allocated until running slots are released.
    pub async fn set_capacity(
        &self,
        tenant_id: &str,
        workers: u32,
    ) -> Result<CapacityChange, CapacityError> {
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(tenant_id)
            .ok_or_else(|| CapacityError::UnknownTenant {
                tenant_id: tenant_id.to_string(),
            })?;

        pool.max_workers = workers;
        let mut change = CapacityChange::default();

        let current = pool.slots.len() as u32;
        if workers > current {
            for _ in current..workers {
                let slot = WorkerSlot::new(tenant_id);
                change.created.push(slot.id);
                pool.slots.insert(slot.id, slot);
            }
        } else {
            let mut surplus = current - workers;
            // oldest idle slots retire first
            let mut idle: Vec<(DateTime<Utc>, Uuid)> = pool
                .slots
                .values()
                .filter(|s| s.state == SlotState::Idle)
                .map(|s| (s.created_at, s.id))
                .collect();
            idle.sort();
            for (_, slot_id) in idle {
                if surplus == 0 {
                    break;
                }
                pool.slots.remove(&slot_id);
                change.retired.push(slot_id);
                surplus -= 1;
            }
            if surplus > 0 {
                debug!(
                    tenant_id,
                    surplus, "shrink deferred: running slots retire on release"
                );
            }
        }

        info!(
            tenant_id,
            max_workers = workers,
            created = change.created.len(),
            retired = change.retired.len(),
            "tenant capacity updated"
        );
        Ok(change)
    }

    /// Mark an idle slot running with the task it now owns.
    pub async fn acquire(&self, slot_id: Uuid, task_id: Uuid) -> Result<(), CapacityError> {
        let mut pools = self.pools.lock().await;
        let slot = pools
            .values_mut()
            .find_map(|pool| pool.slots.get_mut(&slot_id))
            .ok_or(CapacityError::UnknownSlot { slot_id })?;

        if slot.state != SlotState::Idle {
            return Err(CapacityError::SlotNotIdle { slot_id });
        }

        slot.state = SlotState::Running;
        slot.current_task_id = Some(task_id);
        Ok(())
    }

    /// Return a slot to idle after its task reached a terminal state; the
    /// slot retires instead when the tenant shrank below its live count.
    pub async fn release(&self, slot_id: Uuid) -> Result<SlotRelease, CapacityError> {
        let mut pools = self.pools.lock().await;
        let pool = pools
            .values_mut()
            .find(|pool| pool.slots.contains_key(&slot_id))
            .ok_or(CapacityError::UnknownSlot { slot_id })?;

        if pool.slots.len() as u32 > pool.max_workers {
            if let Some(slot) = pool.slots.remove(&slot_id) {
                debug!(tenant_id = %slot.tenant_id, %slot_id, "released slot retired after shrink");
            }
            return Ok(SlotRelease::Retired);
        }

        if let Some(slot) = pool.slots.get_mut(&slot_id) {
            slot.state = SlotState::Idle;
            slot.current_task_id = None;
        }
        Ok(SlotRelease::Idle)
    }

    /// Remove a tenant's pool. Fails while any slot is running a task;
    /// tenants with zero workers delete trivially.
    pub async fn delete_tenant(&self, tenant_id: &str) -> Result<Vec<Uuid>, CapacityError> {
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get(tenant_id)
            .ok_or_else(|| CapacityError::UnknownTenant {
                tenant_id: tenant_id.to_string(),
            })?;

        if pool
            .slots
            .values()
            .any(|s| s.state == SlotState::Running)
        {
            return Err(CapacityError::TenantBusy {
                tenant_id: tenant_id.to_string(),
            });
        }

        let retired: Vec<Uuid> = pools
            .remove(tenant_id)
            .map(|pool| pool.slots.keys().copied().collect())
            .unwrap_or_default();
        info!(tenant_id, slots = retired.len(), "tenant worker pool deleted");
        Ok(retired)
    }

    /// Whether the slot still exists. Workers check this at their idle
    /// point and exit once their slot has been retired.
    pub async fn is_active(&self, slot_id: Uuid) -> bool {
        let pools = self.pools.lock().await;
        pools.values().any(|pool| pool.slots.contains_key(&slot_id))
    }

    /// Capacity counters for one tenant.
    pub async fn tenant_capacity(&self, tenant_id: &str) -> Option<TenantCapacity> {
        let pools = self.pools.lock().await;
        pools.get(tenant_id).map(TenantPool::counters)
    }

    /// Capacity counters for every tenant.
    pub async fn all_capacities(&self) -> HashMap<String, TenantCapacity> {
        let pools = self.pools.lock().await;
        pools
            .iter()
            .map(|(id, pool)| (id.clone(), pool.counters()))
            .collect()
    }
}
