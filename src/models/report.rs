use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierSuggestion;

use super::error::{Severity, ValidationError};
use super::invoice::{OperationNature, Party, TaxFields, Totals};

/// 单张发票的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Valid,
    Invalid,
    SystemError,
}

impl InvoiceStatus {
    /// 错误列表为空才是 VALID; 任何记录 (含 INFO) 都按计数判 INVALID。
    /// SYSTEM_ERROR 只由批处理隔离边界设置。
    pub fn from_errors(errors: &[ValidationError]) -> Self {
        if errors.is_empty() {
            InvoiceStatus::Valid
        } else {
            InvoiceStatus::Invalid
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            InvoiceStatus::Valid => "VALID",
            InvoiceStatus::Invalid => "INVALID",
            InvoiceStatus::SystemError => "SYSTEM_ERROR",
        };
        f.write_str(s)
    }
}

/// 按严重级别的计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub error: usize,
    pub warning: usize,
    pub info: usize,
}

impl SeverityCounts {
    pub fn tally(errors: &[ValidationError]) -> Self {
        let mut counts = SeverityCounts::default();
        for e in errors {
            match e.severity {
                Severity::Critical => counts.critical += 1,
                Severity::Error => counts.error += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Info => counts.info += 1,
            }
        }
        counts
    }
}

/// 聚合结果 (聚合器的纯函数输出)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total_errors: usize,
    pub by_severity: SeverityCounts,
    pub total_impact: BigDecimal,
    /// 按固定规则求值顺序排列, 可叠加
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub report_version: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationView {
    pub nature: OperationNature,
    pub interstate: bool,
    pub origin_uf: String,
    pub destination_uf: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceHeader {
    pub access_key: String,
    pub number: String,
    pub series: String,
    pub issued_at: DateTime<Utc>,
    pub issuer: Party,
    pub recipient: Party,
    pub operation: OperationView,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialImpact {
    pub total: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub status: InvoiceStatus,
    pub total_errors: usize,
    pub by_severity: SeverityCounts,
    pub financial_impact: FinancialImpact,
}

/// 明细行视图 (保持源顺序)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub number: u32,
    pub product_code: String,
    pub description: String,
    pub ncm: String,
    pub cfop: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub line_total: BigDecimal,
    pub pis: TaxFields,
    pub cofins: TaxFields,
    pub error_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegalCitation {
    pub reference: String,
    pub occurrences: usize,
}

/// 结构化报告树 (叙述性文档只能由它投影而来)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTree {
    pub metadata: ReportMetadata,
    pub invoice: InvoiceHeader,
    pub summary: ValidationSummary,
    /// 校验器执行顺序, 永不重排
    pub errors: Vec<ValidationError>,
    /// 按错误码命名空间分组, 保持首次出现顺序
    pub errors_by_type: IndexMap<String, usize>,
    pub items: Vec<ItemView>,
    pub totals: Totals,
    pub recommendations: Vec<String>,
    pub legal_references: Vec<LegalCitation>,
    /// 显式请求的分类器建议, 与确定性错误列表分离
    pub suggestions: Vec<ClassifierSuggestion>,
}

/// 单张发票的产出: 状态 + 结构树 + 叙述文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceReport {
    pub access_key: String,
    pub status: InvoiceStatus,
    pub tree: ReportTree,
    pub narrative: String,
}

/// 批处理汇总 (批次退出状态契约)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub system_error: usize,
    pub total_impact: BigDecimal,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self {
            total: 0,
            valid: 0,
            invalid: 0,
            system_error: 0,
            total_impact: BigDecimal::zero(),
        }
    }

    pub fn record(&mut self, status: InvoiceStatus, impact: &BigDecimal) {
        self.total += 1;
        match status {
            InvoiceStatus::Valid => self.valid += 1,
            InvoiceStatus::Invalid => self.invalid += 1,
            InvoiceStatus::SystemError => self.system_error += 1,
        }
        self.total_impact = &self.total_impact + impact;
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub reports: Vec<InvoiceReport>,
    pub summary: BatchSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_error_list_is_valid_anything_else_invalid() {
        assert_eq!(InvoiceStatus::from_errors(&[]), InvoiceStatus::Valid);
        let info = ValidationError::new("NCM_002", "ncm", Severity::Info, "not cataloged");
        assert_eq!(
            InvoiceStatus::from_errors(&[info]),
            InvoiceStatus::Invalid
        );
    }

    #[test]
    fn batch_summary_counts_statuses() {
        let mut summary = BatchSummary::new();
        summary.record(InvoiceStatus::Valid, &BigDecimal::zero());
        summary.record(InvoiceStatus::Invalid, &BigDecimal::from(30));
        summary.record(InvoiceStatus::SystemError, &BigDecimal::zero());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.valid, 1);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.system_error, 1);
        assert_eq!(summary.total_impact, BigDecimal::from(30));
    }
}
