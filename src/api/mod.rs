pub mod handlers;

pub use handlers::{audit_batch, health_check};
