pub mod driver_kind;
pub mod endpoint;
pub mod error;
pub mod flush_plan;
pub mod record;
