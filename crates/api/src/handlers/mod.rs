pub mod escalations;
pub mod metrics;
