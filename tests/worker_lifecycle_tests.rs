//! End-to-end worker pool behavior through the core: admission, FIFO
//! dispatch, failure containment, capacity changes, and graceful drain.

mod common;

use common::{task_request, test_harness, wait_for_task_status};
use provisioner_core::models::{TaskOperation, TaskStatus, TenantSpec};
use provisioner_core::ProvisionerError;

fn tenant(id: &str, workers: u32) -> TenantSpec {
    TenantSpec {
        id: id.to_string(),
        workers,
        max_nodes: None,
        max_clusters: None,
    }
}

#[tokio::test]
async fn test_task_flows_through_worker_to_success() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();

    let task = harness
        .core
        .submit_task(task_request("acme", "scripted", TaskOperation::Create))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Queued);

    wait_for_task_status(&harness.core, task.id, TaskStatus::Succeeded).await;

    let stored = harness.core.task(task.id).unwrap();
    let result = stored.result.unwrap();
    assert!(result.is_success());
    assert_eq!(result.fields["operation"], "create");
    assert_eq!(harness.provider.invocations.lock().as_slice(), ["create"]);
}

#[tokio::test]
async fn test_second_task_waits_for_single_worker() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();

    let first = harness
        .core
        .submit_task(task_request("acme", "gated", TaskOperation::Bootstrap))
        .await
        .unwrap();
    let second = harness
        .core
        .submit_task(task_request("acme", "gated", TaskOperation::Install))
        .await
        .unwrap();

    // first task is being executed and held at the gate
    harness.gated.started.notified().await;
    wait_for_task_status(&harness.core, first.id, TaskStatus::Running).await;

    // with one worker slot the second task must still be queued
    let waiting = harness.core.task(second.id).unwrap();
    assert_eq!(waiting.status, TaskStatus::Queued);

    // finishing the first frees the slot for the second
    harness.gated.open();
    wait_for_task_status(&harness.core, first.id, TaskStatus::Succeeded).await;
    harness.gated.started.notified().await;
    harness.gated.open();
    wait_for_task_status(&harness.core, second.id, TaskStatus::Succeeded).await;
}

#[tokio::test]
async fn test_plugin_error_becomes_failed_result_and_worker_survives() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();

    let failing = harness
        .core
        .submit_task(task_request("acme", "failing", TaskOperation::Configure))
        .await
        .unwrap();
    wait_for_task_status(&harness.core, failing.id, TaskStatus::Failed).await;

    let stored = harness.core.task(failing.id).unwrap();
    let result = stored.result.unwrap();
    assert!(!result.is_success());
    assert!(result.stderr.contains("backend exploded"));

    // the worker that caught the error keeps processing tasks
    let next = harness
        .core
        .submit_task(task_request("acme", "instant", TaskOperation::Start))
        .await
        .unwrap();
    wait_for_task_status(&harness.core, next.id, TaskStatus::Succeeded).await;
}

#[tokio::test]
async fn test_unregistered_plugin_fails_task_not_worker() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();

    let task = harness
        .core
        .submit_task(task_request("acme", "no-such-plugin", TaskOperation::Bootstrap))
        .await
        .unwrap();
    wait_for_task_status(&harness.core, task.id, TaskStatus::Failed).await;

    let stored = harness.core.task(task.id).unwrap();
    assert!(stored.result.unwrap().stderr.contains("not registered"));

    let next = harness
        .core
        .submit_task(task_request("acme", "instant", TaskOperation::Stop))
        .await
        .unwrap();
    wait_for_task_status(&harness.core, next.id, TaskStatus::Succeeded).await;
}

#[tokio::test]
async fn test_tenants_run_independently() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();
    harness
        .core
        .create_tenant(tenant("globex", 1))
        .await
        .unwrap();

    // acme's only worker is held at the gate; globex keeps flowing
    let held = harness
        .core
        .submit_task(task_request("acme", "gated", TaskOperation::Bootstrap))
        .await
        .unwrap();
    harness.gated.started.notified().await;

    let free = harness
        .core
        .submit_task(task_request("globex", "instant", TaskOperation::Install))
        .await
        .unwrap();
    wait_for_task_status(&harness.core, free.id, TaskStatus::Succeeded).await;

    harness.gated.open();
    wait_for_task_status(&harness.core, held.id, TaskStatus::Succeeded).await;
}

#[tokio::test]
async fn test_delete_tenant_with_zero_workers_succeeds() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 0)).await.unwrap();
    harness.core.delete_tenant("acme").await.unwrap();
    assert!(harness.core.tenant_status("acme").await.is_none());
}

#[tokio::test]
async fn test_delete_busy_tenant_rejected_until_drained() {
    let harness = test_harness();
    harness
        .core
        .create_tenant(tenant("acme2", 2))
        .await
        .unwrap();

    let task = harness
        .core
        .submit_task(task_request("acme2", "gated", TaskOperation::Bootstrap))
        .await
        .unwrap();
    harness.gated.started.notified().await;
    wait_for_task_status(&harness.core, task.id, TaskStatus::Running).await;

    let rejected = harness.core.delete_tenant("acme2").await;
    assert!(matches!(
        rejected,
        Err(ProvisionerError::Capacity(
            provisioner_core::capacity::CapacityError::TenantBusy { .. }
        ))
    ));

    harness.gated.open();
    wait_for_task_status(&harness.core, task.id, TaskStatus::Succeeded).await;

    // the slot is released after the terminal state; deletion now succeeds,
    // allowing for the release to land just after the result is recorded
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if harness.core.delete_tenant("acme2").await.is_ok() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("tenant did not become deletable after drain");
}

#[tokio::test]
async fn test_shrink_defers_until_running_slot_releases() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 2)).await.unwrap();

    let task = harness
        .core
        .submit_task(task_request("acme", "gated", TaskOperation::Bootstrap))
        .await
        .unwrap();
    harness.gated.started.notified().await;
    wait_for_task_status(&harness.core, task.id, TaskStatus::Running).await;

    // shrink to zero: the idle slot goes now, the running one stays
    harness
        .core
        .update_tenant("acme", tenant("acme", 0))
        .await
        .unwrap();
    let status = harness.core.tenant_status("acme").await.unwrap();
    assert_eq!(status.capacity.worker_count, 1);
    assert_eq!(status.capacity.running, 1);

    // task completes untouched, then the surplus slot retires
    harness.gated.open();
    wait_for_task_status(&harness.core, task.id, TaskStatus::Succeeded).await;

    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            let status = harness.core.tenant_status("acme").await.unwrap();
            if status.capacity.worker_count == 0 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("surplus slot did not retire after release");
}

#[tokio::test]
async fn test_grow_adds_concurrency() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();

    // hold the only worker, then grow; the new worker picks up new work
    let held = harness
        .core
        .submit_task(task_request("acme", "gated", TaskOperation::Bootstrap))
        .await
        .unwrap();
    harness.gated.started.notified().await;

    harness
        .core
        .update_tenant("acme", tenant("acme", 2))
        .await
        .unwrap();

    let fresh = harness
        .core
        .submit_task(task_request("acme", "instant", TaskOperation::Install))
        .await
        .unwrap();
    wait_for_task_status(&harness.core, fresh.id, TaskStatus::Succeeded).await;

    harness.gated.open();
    wait_for_task_status(&harness.core, held.id, TaskStatus::Succeeded).await;
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_task() {
    let harness = test_harness();
    harness.core.create_tenant(tenant("acme", 1)).await.unwrap();

    let task = harness
        .core
        .submit_task(task_request("acme", "gated", TaskOperation::Bootstrap))
        .await
        .unwrap();
    harness.gated.started.notified().await;

    let core = harness.core.clone();
    let drain = tokio::spawn(async move { core.shutdown().await });

    // the drain must not complete while the task is still held
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!drain.is_finished());
    assert_eq!(
        harness.core.task(task.id).unwrap().status,
        TaskStatus::Running
    );

    harness.gated.open();
    drain.await.unwrap();

    // the deferred shutdown let the task finish cleanly
    assert_eq!(
        harness.core.task(task.id).unwrap().status,
        TaskStatus::Succeeded
    );
}
