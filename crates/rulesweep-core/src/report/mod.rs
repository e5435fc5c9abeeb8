//! Report buckets over the final snapshot.

pub mod assemble;
pub mod model;
pub mod render;

pub use assemble::{assemble, belongs};
pub use model::{Bucket, BucketTable, Report, ReportRow, RowShade};
