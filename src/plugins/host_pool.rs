//! Host-pool provider: allocates nodes from a statically configured pool of
//! pre-existing machines.
//!
//! The pool stands in for a cloud backend in bare-metal and lab deployments:
//! `create` claims a free host, `confirm` proves it reachable, `delete`
//! releases the claim. Claims live in process memory; the pool is the
//! system of record only for the lifetime of the provisioner.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{PluginError, ProviderPlugin, TaskContext};
use crate::models::TaskResult;
use crate::remote::{wait_for_port, RemoteExecutor, RetryPolicy, SshCredentials};

/// Field names used in task configs and result fields.
const PROVIDER_ID_FIELD: &str = "provider_id";

/// One machine in the configured pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledHost {
    pub id: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub ssh: SshCredentials,
}

fn default_ssh_port() -> u16 {
    crate::constants::remote::SSH_PORT
}

/// Provider plugin backed by a static host pool.
pub struct HostPoolProvider {
    hosts: Vec<PooledHost>,
    claimed: Mutex<HashSet<String>>,
    probe_command: String,
    confirm_policy: RetryPolicy,
    executor: Arc<dyn RemoteExecutor>,
}

impl HostPoolProvider {
    pub fn new(
        hosts: Vec<PooledHost>,
        probe_command: String,
        confirm_policy: RetryPolicy,
        executor: Arc<dyn RemoteExecutor>,
    ) -> Self {
        Self {
            hosts,
            claimed: Mutex::new(HashSet::new()),
            probe_command,
            confirm_policy,
            executor,
        }
    }

    fn pool_entry(&self, id: &str) -> Option<&PooledHost> {
        self.hosts.iter().find(|h| h.id == id)
    }
}

#[async_trait]
impl ProviderPlugin for HostPoolProvider {
    fn name(&self) -> &str {
        "host-pool"
    }

    async fn create(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        let claimed_entry = {
            let mut claimed = self.claimed.lock();
            let free = self.hosts.iter().find(|h| !claimed.contains(&h.id));
            match free {
                Some(entry) => {
                    claimed.insert(entry.id.clone());
                    entry.clone()
                }
                None => {
                    return Err(PluginError::backend(format!(
                        "host pool exhausted ({} hosts, all claimed)",
                        self.hosts.len()
                    )))
                }
            }
        };

        info!(
            task_id = %ctx.task_id,
            provider_id = %claimed_entry.id,
            host = %claimed_entry.host,
            "claimed host from pool"
        );

        let ssh = serde_json::to_value(&claimed_entry.ssh)
            .map_err(|e| PluginError::invalid_config(format!("ssh credentials: {e}")))?;

        Ok(TaskResult::success()
            .with_field(PROVIDER_ID_FIELD, claimed_entry.id)
            .with_field("host", claimed_entry.host)
            .with_field("port", claimed_entry.port)
            .with_field("ssh", ssh))
    }

    async fn confirm(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        let provider_id = ctx.str_field(PROVIDER_ID_FIELD)?;
        let entry = self
            .pool_entry(provider_id)
            .ok_or_else(|| PluginError::backend(format!("unknown provider id '{provider_id}'")))?;

        debug!(
            task_id = %ctx.task_id,
            provider_id,
            host = %entry.host,
            port = entry.port,
            "waiting for host to become reachable"
        );
        wait_for_port(&entry.host, entry.port, self.confirm_policy).await?;

        // Real login plus an in-instance connectivity probe; a reachable port
        // alone does not prove the machine can do useful work.
        let probe = self
            .executor
            .run(&entry.host, entry.port, &entry.ssh, &self.probe_command)
            .await?;

        if !probe.is_success() {
            warn!(
                task_id = %ctx.task_id,
                provider_id,
                exit_code = probe.exit_code,
                "connectivity probe failed"
            );
            return Ok(TaskResult {
                status: probe.exit_code as i32,
                stdout: probe.stdout,
                stderr: probe.stderr,
                ..TaskResult::default()
            });
        }

        Ok(TaskResult::success()
            .with_field(PROVIDER_ID_FIELD, provider_id)
            .with_field("ipaddress", entry.host.clone()))
    }

    async fn delete(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        // No provider id recorded means the create never registered the
        // node; there is nothing to tear down.
        let Some(provider_id) = ctx.opt_str_field(PROVIDER_ID_FIELD) else {
            debug!(task_id = %ctx.task_id, "delete with no provider id, nothing to do");
            return Ok(TaskResult::success());
        };

        let released = self.claimed.lock().remove(provider_id);
        if released {
            info!(task_id = %ctx.task_id, provider_id, "released host back to pool");
        } else {
            // Already absent: deletion is idempotent by design.
            debug!(task_id = %ctx.task_id, provider_id, "host already released");
        }

        Ok(TaskResult::success())
    }
}
