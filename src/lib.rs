pub mod api;
pub mod classifier;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod report;
pub mod rules;
pub mod service;
pub mod validators;

pub use config::AppConfig;
pub use db::{create_pool, RuleStore};
pub use error::AuditError;
pub use rules::{OverrideLayer, RuleResolver};
pub use service::AuditService;
