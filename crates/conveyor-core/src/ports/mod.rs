//! Ports: the seams between the scheduling engine and its collaborators.
//!
//! Each trait hides an external concern behind an interface the engine
//! can be tested against:
//! - [`TaskStore`]: durable record storage (memory / JSON file here,
//!   anything else behind the same trait)
//! - [`TaskExecutor`]: the actual unit of work, one per task kind
//! - [`Notifier`]: user-visible status, fire-and-forget
//! - [`ConditionsProvider`]: battery/charging/storage/network snapshot

pub mod conditions;
pub mod executor;
pub mod notifier;
pub mod store;

pub use conditions::{ConditionsProvider, SharedConditions};
pub use executor::{ExecutionOutcome, ProgressReporter, ProgressUpdate, StopSignal, TaskExecutor};
pub use notifier::{ForegroundToken, NoopNotifier, Notifier};
pub use store::TaskStore;
