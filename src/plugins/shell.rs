//! Shell automator: converges node software by staging a wrapper entry point
//! and running opaque script payloads through it over SSH.
//!
//! All non-bootstrap operations follow the same run-remote-then-collect
//! shape: upload the task's JSON config to the cache path on the target,
//! execute the wrapper with the designated action, capture stdout, stderr
//! and exit code. A non-zero exit is a failed result, not an error;
//! connection and authentication failures surface as errors.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AutomatorPlugin, PluginError, TaskContext};
use crate::constants::automator::{REMOTE_CACHE_DIR, WRAPPER_FILE_NAME};
use crate::models::TaskResult;
use crate::remote::RemoteExecutor;

/// Wrapper staged on every target by `bootstrap`. It is the single entry
/// point later operations run through; the script it dispatches to comes
/// from the task config and stays opaque to this system.
const LAUNCHER_SCRIPT: &str = r#"#!/bin/sh
# provisioner launcher: single entry point for automator operations.
# usage: launcher.sh <action> <config-path> [script]
set -eu
action="$1"
config_path="$2"
script="${3:-}"
if [ -n "$script" ]; then
    exec "$script" "$action" "$config_path"
fi
echo "no script designated for action $action" >&2
exit 1
"#;

/// Automator plugin executing shell payloads through the staged wrapper.
pub struct ShellAutomator {
    cache_dir: String,
    executor: Arc<dyn RemoteExecutor>,
}

impl ShellAutomator {
    pub fn new(cache_dir: impl Into<String>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            executor,
        }
    }

    pub fn with_defaults(executor: Arc<dyn RemoteExecutor>) -> Self {
        Self::new(REMOTE_CACHE_DIR, executor)
    }

    fn wrapper_path(&self) -> String {
        format!("{}/{}", self.cache_dir, WRAPPER_FILE_NAME)
    }

    fn config_path(&self, ctx: &TaskContext) -> String {
        format!("{}/tasks/{}.json", self.cache_dir, ctx.task_id)
    }

    /// Upload the task config and run the wrapper for `action`.
    async fn run_action(&self, ctx: &TaskContext, action: &str) -> Result<TaskResult, PluginError> {
        let host = ctx.target_host()?;
        let port = ctx.ssh_port();
        let credentials = ctx.credentials()?;

        let config_path = self.config_path(ctx);
        let payload = serde_json::to_vec(&ctx.config)
            .map_err(|e| PluginError::invalid_config(format!("config payload: {e}")))?;
        self.executor
            .upload(host, port, &credentials, &payload, &config_path)
            .await?;

        let mut command = format!(
            "sh {} {} {}",
            escape(&self.wrapper_path()),
            escape(action),
            escape(&config_path),
        );
        if let Some(script) = ctx.opt_str_field("script") {
            command.push(' ');
            command.push_str(&escape(script));
        }

        debug!(task_id = %ctx.task_id, host, action, "running automator action");
        let output = self
            .executor
            .run(host, port, &credentials, &command)
            .await?;

        Ok(TaskResult {
            status: output.exit_code as i32,
            stdout: output.stdout,
            stderr: output.stderr,
            ..TaskResult::default()
        })
    }
}

fn escape(value: &str) -> Cow<'_, str> {
    shell_escape::escape(Cow::Borrowed(value))
}

#[async_trait]
impl AutomatorPlugin for ShellAutomator {
    fn name(&self) -> &str {
        "shell"
    }

    /// Stage the wrapper entry point. Safe to re-run: the upload overwrites
    /// whatever is already there.
    async fn bootstrap(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        let host = ctx.target_host()?;
        let port = ctx.ssh_port();
        let credentials = ctx.credentials()?;

        let wrapper_path = self.wrapper_path();
        self.executor
            .upload(
                host,
                port,
                &credentials,
                LAUNCHER_SCRIPT.as_bytes(),
                &wrapper_path,
            )
            .await?;

        let command = format!(
            "chmod 0755 {} && mkdir -p {}/tasks",
            escape(&wrapper_path),
            escape(&self.cache_dir),
        );
        let output = self
            .executor
            .run(host, port, &credentials, &command)
            .await?;

        if output.is_success() {
            info!(task_id = %ctx.task_id, host, "target bootstrapped");
        }

        Ok(TaskResult {
            status: output.exit_code as i32,
            stdout: output.stdout,
            stderr: output.stderr,
            ..TaskResult::default()
        })
    }

    async fn install(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_action(ctx, "install").await
    }

    async fn configure(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_action(ctx, "configure").await
    }

    async fn initialize(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_action(ctx, "initialize").await
    }

    async fn start(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_action(ctx, "start").await
    }

    async fn stop(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_action(ctx, "stop").await
    }

    async fn remove(&self, ctx: &TaskContext) -> Result<TaskResult, PluginError> {
        self.run_action(ctx, "remove").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskOperation;
    use crate::remote::{RemoteError, RemoteOutput, SshCredentials};
    use parking_lot::Mutex;
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingExecutor {
        commands: Mutex<Vec<String>>,
        uploads: Mutex<Vec<(String, Vec<u8>)>>,
        exit_code: u32,
    }

    #[async_trait]
    impl RemoteExecutor for RecordingExecutor {
        async fn run(
            &self,
            _host: &str,
            _port: u16,
            _credentials: &SshCredentials,
            command: &str,
        ) -> Result<RemoteOutput, RemoteError> {
            self.commands.lock().push(command.to_string());
            Ok(RemoteOutput {
                stdout: "out".to_string(),
                stderr: String::new(),
                exit_code: self.exit_code,
            })
        }

        async fn upload(
            &self,
            _host: &str,
            _port: u16,
            _credentials: &SshCredentials,
            content: &[u8],
            remote_path: &str,
        ) -> Result<(), RemoteError> {
            self.uploads
                .lock()
                .push((remote_path.to_string(), content.to_vec()));
            Ok(())
        }
    }

    fn context(operation: TaskOperation, config: serde_json::Value) -> TaskContext {
        TaskContext {
            task_id: Uuid::new_v4(),
            cluster_id: "cluster-1".to_string(),
            node_id: Some("node-1".to_string()),
            tenant_id: "acme".to_string(),
            operation,
            config,
        }
    }

    fn node_config() -> serde_json::Value {
        json!({
            "host": "10.0.0.5",
            "ssh": {"user": "root", "password": "secret"},
            "script": "/opt/services/hadoop/setup.sh"
        })
    }

    #[tokio::test]
    async fn test_bootstrap_stages_wrapper() {
        let executor = Arc::new(RecordingExecutor::default());
        let automator = ShellAutomator::new("/var/cache/provisioner", executor.clone());
        let ctx = context(TaskOperation::Bootstrap, node_config());

        let result = automator.bootstrap(&ctx).await.unwrap();
        assert!(result.is_success());

        let uploads = executor.uploads.lock();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "/var/cache/provisioner/launcher.sh");
        assert!(String::from_utf8_lossy(&uploads[0].1).contains("provisioner launcher"));

        let commands = executor.commands.lock();
        assert!(commands[0].contains("chmod 0755"));
        assert!(commands[0].contains("mkdir -p"));
    }

    #[tokio::test]
    async fn test_install_uploads_config_then_runs_wrapper() {
        let executor = Arc::new(RecordingExecutor::default());
        let automator = ShellAutomator::new("/var/cache/provisioner", executor.clone());
        let ctx = context(TaskOperation::Install, node_config());

        let result = automator.install(&ctx).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.stdout, "out");

        let uploads = executor.uploads.lock();
        let expected_config = format!("/var/cache/provisioner/tasks/{}.json", ctx.task_id);
        assert_eq!(uploads[0].0, expected_config);

        let commands = executor.commands.lock();
        assert!(commands[0].starts_with("sh /var/cache/provisioner/launcher.sh install"));
        assert!(commands[0].contains(&expected_config));
        assert!(commands[0].contains("/opt/services/hadoop/setup.sh"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed_result_not_error() {
        let executor = Arc::new(RecordingExecutor {
            exit_code: 3,
            ..RecordingExecutor::default()
        });
        let automator = ShellAutomator::new("/var/cache/provisioner", executor);
        let ctx = context(TaskOperation::Configure, node_config());

        let result = automator.configure(&ctx).await.unwrap();
        assert!(!result.is_success());
        assert_eq!(result.status, 3);
    }

    #[tokio::test]
    async fn test_missing_host_is_config_error() {
        let executor = Arc::new(RecordingExecutor::default());
        let automator = ShellAutomator::new("/var/cache/provisioner", executor);
        let ctx = context(TaskOperation::Start, json!({"ssh": {"user": "root"}}));

        let result = automator.start(&ctx).await;
        assert!(matches!(result, Err(PluginError::MissingField { .. })));
    }
}
