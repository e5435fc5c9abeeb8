//! Typed records shared by every stage of the analysis.

pub mod request;
pub mod rule;
pub mod state;
pub mod usage;

pub use request::{RequestInfo, RequestOrigin, RequestRecord, RequestType};
pub use rule::{Action, FieldSet, RuleRecord, Vendor, WILDCARD};
pub use state::{
    ClassificationState, ClassifiedRule, DuplicateRole, Expiration, ExceptionTag, UsageFlag,
    UsageSource,
};
pub use usage::UsageRecord;
