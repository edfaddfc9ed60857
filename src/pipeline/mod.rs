//! Stage pipeline for beneficiary processing
//!
//! Each stage reads the history of the stage before it, subtracts the serial
//! numbers it has already completed, and appends enriched records to its own
//! history, which in turn feeds the next stage.
//!
//! ```text
//! intake ─▶ registration ─▶ work_order ─▶ sanction ─▶ ... ─▶ payment
//!              history         history       history            history
//! ```
//!
//! Stages are plain data ([`StageDefinition`]) collected in a
//! [`StageCatalog`]; one generic [`Pipeline`] drives all of them.

pub mod catalog;
pub mod clock;
pub mod engine;
pub mod serial;
pub mod stage;
pub mod view;

// Re-export main types
pub use catalog::StageCatalog;
pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{Pipeline, PipelineBuilder};
pub use serial::{SequentialSerials, SerialGenerator, UuidSerials};
pub use stage::{StageDefinition, StageDefinitionBuilder, INTAKE_COLLECTION};
pub use view::{derive_pending, PipelineSummary, RecordTrace, StageSummary, StageView};
