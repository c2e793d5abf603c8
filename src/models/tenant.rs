//! Tenant model: the isolation and accounting boundary for provisioning work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant creation/resize shape accepted by the web API.
///
/// `workers` is the requested worker allocation and becomes the tenant's
/// `max_workers`; the live worker count is owned by the capacity manager and
/// may lag behind during a shrink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantSpec {
    pub id: String,
    pub workers: u32,
    #[serde(default)]
    pub max_nodes: Option<u32>,
    #[serde(default)]
    pub max_clusters: Option<u32>,
}

/// A tenant as stored by the core and reported by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    /// Requested worker allocation; the capacity invariant is
    /// `0 <= worker_count <= max_workers` once any shrink has drained.
    pub max_workers: u32,
    /// Node quota consulted by the external cluster planner
    pub max_nodes: Option<u32>,
    /// Cluster quota consulted by the external cluster planner
    pub max_clusters: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn from_spec(spec: TenantSpec) -> Self {
        let now = Utc::now();
        Self {
            id: spec.id,
            max_workers: spec.workers,
            max_nodes: spec.max_nodes,
            max_clusters: spec.max_clusters,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a resize/update, keeping the original creation time.
    pub fn apply_spec(&mut self, spec: TenantSpec) {
        self.max_workers = spec.workers;
        self.max_nodes = spec.max_nodes.or(self.max_nodes);
        self.max_clusters = spec.max_clusters.or(self.max_clusters);
        self.updated_at = Utc::now();
    }
}
