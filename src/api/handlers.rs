use crate::models::{BatchSummary, Invoice, InvoiceReport};
use crate::service::AuditService;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 请求体: 已归一化的发票列表 (解析协作方产出的类型化记录)
#[derive(Debug, Deserialize)]
pub struct BatchAuditRequest {
    pub invoices: Vec<Invoice>,
}

/// 响应体: 按访问密钥键控的逐张报告 + 批汇总
#[derive(Debug, Serialize)]
pub struct BatchAuditResponse {
    pub success: bool,
    pub message: String,
    pub summary: BatchSummary,
    pub reports: Vec<InvoiceReport>,
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

/// 批量审计接口
pub async fn audit_batch(
    State(service): State<Arc<AuditService>>,
    Json(req): Json<BatchAuditRequest>,
) -> Response {
    let count = req.invoices.len();
    let outcome = service.audit_batch(req.invoices).await;

    let response = BatchAuditResponse {
        success: true,
        message: format!(
            "Audited {} invoice(s): {} valid, {} invalid, {} system error",
            count, outcome.summary.valid, outcome.summary.invalid, outcome.summary.system_error
        ),
        summary: outcome.summary,
        reports: outcome.reports,
    };
    (StatusCode::OK, Json(response)).into_response()
}
