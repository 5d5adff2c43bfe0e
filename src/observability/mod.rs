pub(crate) mod structured_log;
pub mod tracing;
