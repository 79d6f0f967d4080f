pub mod rule;
pub mod status;
pub mod task;

pub use rule::{RecurrenceKind, RecurrenceRule};
pub use status::TaskStatus;
pub use task::{CompletionEntry, Priority, SeriesState, Task};
