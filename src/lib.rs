#![allow(clippy::doc_markdown)] // Allow technical terms like SSH, YAML in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Provisioner Core
//!
//! Tenant-aware cluster provisioning core: a task dispatcher with per-tenant
//! admission control, a bounded worker pool, and a plugin execution contract
//! for cloud providers and configuration automators, backed by an SSH remote
//! execution engine.
//!
//! ## Overview
//!
//! A task is enqueued for a tenant, the dispatcher hands it to an idle
//! worker of that tenant, the worker routes it through the plugin registry
//! by `(provisioner_type, operation)`, the plugin executes - possibly over
//! SSH - and the worker reports the result back, freeing its slot.
//!
//! ## Key Properties
//!
//! - **Per-tenant admission control**: a tenant never runs more concurrent
//!   tasks than its allocated worker slots; capacity changes never interrupt
//!   in-flight work.
//! - **At-most-once assignment**: the dispatcher hands each task to exactly
//!   one worker; tasks are never re-queued automatically.
//! - **Two-tier remote failure policy**: transient connection failures are
//!   retried patiently, authentication failures fail immediately.
//! - **Plugin boundary containment**: plugin errors become failed task
//!   results; a bad task never takes a worker down.
//!
//! ## Module Organization
//!
//! - [`models`] - Task and tenant data model
//! - [`dispatcher`] - Per-tenant FIFO task queues and the task store
//! - [`capacity`] - Worker slot accounting and tenant admission
//! - [`worker`] - The worker execution loop with cooperative shutdown
//! - [`registry`] - Plugin registration and capability-checked resolution
//! - [`plugins`] - Provider/automator contracts and the in-tree plugins
//! - [`remote`] - SSH remote execution with the two-tier retry policy
//! - [`core`] - Composition root the web API drives
//! - [`web`] - Axum REST surface
//! - [`config`] - YAML configuration with environment overlays
//! - [`error`] - Structured error handling

pub mod capacity;
pub mod config;
pub mod constants;
pub mod core;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod models;
pub mod plugins;
pub mod registry;
pub mod remote;
pub mod web;
pub mod worker;

pub use crate::core::ProvisionerCore;
pub use config::{ConfigManager, ProvisionerConfig};
pub use error::{ProvisionerError, Result};
pub use models::{Task, TaskOperation, TaskRequest, TaskResult, TaskStatus, Tenant, TenantSpec};
