pub mod deterministic;
pub mod time;
