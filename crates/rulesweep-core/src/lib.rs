pub mod config;
pub mod duplicates;
pub mod error;
pub mod impact;
pub mod lifecycle;
pub mod model;
pub mod normalize;
pub mod overlap;
pub mod report;
pub mod snapshot;
pub mod sync;
pub mod table;
pub mod util;

pub use error::{Error, Result};

pub const TOOL_NAME: &str = "rulesweep";

/// JSON schema version of snapshots and reports.
/// This must be bumped only when a persisted field changes meaning.
pub const SCHEMA_VERSION: &str = "0.1.0";
