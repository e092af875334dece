//! Domain model (ids, payloads, definitions, records, states, policies).

pub mod constraints;
pub mod definition;
pub mod errors;
pub mod ids;
pub mod payload;
pub mod record;
pub mod retry;
pub mod state;

pub use constraints::{Constraints, SystemConditions};
pub use definition::{Priority, Schedule, TaskDefinition};
pub use errors::SchedulerError;
pub use ids::TaskId;
pub use payload::Payload;
pub use record::TaskRecord;
pub use retry::{BackoffKind, RetryPolicy, MAX_BACKOFF};
pub use state::TaskState;
