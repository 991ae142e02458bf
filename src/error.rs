//! 基础设施错误类型
//!
//! 校验器对 "规则未收录" 一律降级为 WARNING/INFO 记录, 不走这里;
//! 这里只承载数据库/覆盖层/分类器等真正的基础设施失败。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("rule store query failed: {0}")]
    Store(#[from] sqlx::Error),

    #[error("override layer load failed: {0}")]
    OverrideLoad(#[from] csv::Error),

    #[error("override layer io failed: {0}")]
    OverrideIo(#[from] std::io::Error),

    #[error("classifier call exceeded {timeout_secs}s timeout")]
    ClassifierTimeout { timeout_secs: u64 },

    #[error("classifier call failed: {0}")]
    Classifier(String),
}
