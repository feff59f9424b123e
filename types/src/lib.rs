//! Core domain types for PNCP deferred results.
//!
//! This crate contains the wire shapes shared by the client and its callers:
//! the [`Resource`] a long-running operation ultimately produces and the
//! [`TaskStatus`] record returned by each poll of a status endpoint.
//!
//! No IO, no async. Everything here can be used from any layer.

#![allow(clippy::missing_errors_doc)]

mod resource;
mod task;

pub use resource::Resource;
pub use task::{TaskState, TaskStatus};
