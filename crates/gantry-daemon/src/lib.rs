//! Gantry daemon library
//!
//! The daemon ties the convergence engine to its surroundings:
//! - resource store holding the declared desired state
//! - reconciliation controller and per-resource workers
//! - REST admin API for declaring resources and watching progress
//! - configuration and server lifecycle

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod server;
pub mod store;

pub use config::DaemonConfig;
pub use error::{ApiError, DaemonError, StoreError};
pub use server::Server;
pub use store::{MemoryStore, Store};
