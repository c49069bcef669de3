pub mod average;
pub mod serde;
pub mod tracing;
