mod interaction;
mod run_record;
mod task;
mod usage;

pub use interaction::{Interaction, InteractionKind};
pub use run_record::{
    ImageRef, ResultContent, ResultItem, ResultItemType, RunMetadata, RunRecord, RunStatus,
    TRUNCATION_MARKER,
};
pub use task::{Task, TaskStatus};
pub use usage::UsageTotals;
