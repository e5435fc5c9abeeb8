//! Multi-stage rule classification.
//!
//! ```text
//! Initialized → RequestInfoProcessed → UsageProcessed → VendorProcessed
//!             → DuplicatesAnalyzed → ReportsGenerated
//! ```

pub mod request;
pub mod stage;
pub mod usage;
pub mod vendor;
pub mod workflow;

pub use stage::{Stage, StageRecord, StageStatus, StatusTable};
pub use workflow::{Workflow, WorkflowInputs};
