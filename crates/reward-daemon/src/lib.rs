#![warn(clippy::all)]

//! The reward daemon: reads pool and position state from chain, stores
//! enrollment and accrual state relationally, runs the reconciler,
//! validator and accountant loops under a shared supervisor, and serves
//! claim authorizations and analytics over HTTP.

pub mod accounting;
pub mod analytics;
pub mod api;
pub mod claims;
pub mod config;
pub mod contracts;
pub mod lifecycle;
pub mod oracle;
pub mod storage;
pub mod supervisor;
pub mod validator;

pub use config::DaemonConfig;
pub use supervisor::{CancellationToken, RestartPolicy, SupervisorStats, TaskHealth, TaskSupervisor};
