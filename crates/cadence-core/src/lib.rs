//! # Cadence Core Library
//!
//! A recurring event materialization engine: declarative recurrence rules
//! are expanded into concrete, editable instance rows within a rolling
//! forward-looking window per organization, so queries never expand rules
//! on the fly.
//!
//! ## Features
//!
//! - **Windowed Materialization**: per-organization hot windows with
//!   idempotent, batched instance generation
//! - **Workload Discovery**: due and stale organizations found and ranked,
//!   never-ending series scheduled preferentially
//! - **Bounded Concurrency**: jobs partition disjoint instance rows and run
//!   under a bounded worker pool
//! - **Series Splitting**: transactional "this and all following" edits
//!   that truncate the old rule and carry the future into a new series
//! - **Retention Cleanup**: instances past their organization's retention
//!   horizon are removed after a run
//!
//! ## Core Modules
//!
//! - [`db`]: Database connection and migration management
//! - [`models`]: Core data structures and transfer objects
//! - [`repository`]: Data access layer with Repository pattern
//! - [`recurrence`]: Recurrence codec and pure rule helpers
//! - [`occurrence`]: Deterministic occurrence expansion
//! - [`discovery`]: Workload discovery and prioritization
//! - [`execution`]: Bounded-concurrency batch execution
//! - [`window`]: Generation window bookkeeping and statistics
//! - [`cleanup`]: Retention post-processing
//! - [`pipeline`]: Worker entry points for scheduling tooling
//! - [`split`]: The "update this and following" edit
//! - [`error`]: Error types with a stable transport taxonomy
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use cadence_core::{
//!     db,
//!     pipeline::{run_materialization_worker, WorkerConfig},
//!     repository::SqliteRepository,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("cadence.db").await?;
//!     let repo = SqliteRepository::new(pool);
//!
//!     let result = run_materialization_worker(&WorkerConfig::default(), &repo).await;
//!     println!(
//!         "created {} instances across {} organizations",
//!         result.instances_created, result.organizations_processed
//!     );
//!
//!     Ok(())
//! }
//! ```

pub mod cleanup;
pub mod db;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod models;
pub mod occurrence;
pub mod pipeline;
pub mod recurrence;
pub mod repository;
pub mod split;
pub mod window;
