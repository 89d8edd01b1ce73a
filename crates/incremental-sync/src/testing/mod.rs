//! Testing utilities for the incremental sync engine
//!
//! Docker containers for a MySQL staging database and a PostgreSQL source
//! database, used by the ignored integration tests.

pub mod container;

pub use container::{ContainerKind, TestContainer};
