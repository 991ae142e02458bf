use chrono::Utc;
use indexmap::IndexMap;

use crate::classifier::ClassifierSuggestion;
use crate::models::error::Severity;
use crate::models::invoice::Invoice;
use crate::models::money::fmt_money;
use crate::models::report::{
    AuditSummary, FinancialImpact, InvoiceHeader, InvoiceStatus, ItemView, LegalCitation,
    OperationView, ReportMetadata, ReportTree, ValidationSummary,
};

/// 报告组装器 (Report Assembler)
///
/// 同一聚合状态的两个确定性视图: 结构树与叙述文档。
/// 叙述文档是结构树的纯投影, 永远不是独立事实来源。
pub struct ReportAssembler {
    version: String,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn assemble(
        &self,
        invoice: &Invoice,
        summary: &AuditSummary,
        status: InvoiceStatus,
        suggestions: Vec<ClassifierSuggestion>,
    ) -> ReportTree {
        let mut errors_by_type: IndexMap<String, usize> = IndexMap::new();
        for error in &invoice.validation_errors {
            *errors_by_type
                .entry(error.namespace().to_string())
                .or_insert(0) += 1;
        }

        let mut citations: IndexMap<String, usize> = IndexMap::new();
        for error in &invoice.validation_errors {
            if !error.legal_reference.is_empty() {
                *citations.entry(error.legal_reference.clone()).or_insert(0) += 1;
            }
        }

        let items = invoice
            .items
            .iter()
            .map(|item| ItemView {
                number: item.number,
                product_code: item.product_code.clone(),
                description: item.description.clone(),
                ncm: item.normalized_ncm(),
                cfop: item.normalized_cfop(),
                quantity: item.quantity.clone(),
                unit_price: item.unit_price.clone(),
                line_total: item.line_total.clone(),
                pis: item.pis.clone(),
                cofins: item.cofins.clone(),
                error_count: invoice
                    .validation_errors
                    .iter()
                    .filter(|e| e.item_number == Some(item.number))
                    .count(),
            })
            .collect();

        ReportTree {
            metadata: ReportMetadata {
                report_version: self.version.clone(),
                generated_at: Utc::now(),
            },
            invoice: InvoiceHeader {
                access_key: invoice.access_key.clone(),
                number: invoice.number.clone(),
                series: invoice.series.clone(),
                issued_at: invoice.issued_at,
                issuer: invoice.issuer.clone(),
                recipient: invoice.recipient.clone(),
                operation: OperationView {
                    nature: invoice.nature,
                    interstate: invoice.is_interstate(),
                    origin_uf: invoice.issuer.uf.clone(),
                    destination_uf: invoice.recipient.uf.clone(),
                },
            },
            summary: ValidationSummary {
                status,
                total_errors: summary.total_errors,
                by_severity: summary.by_severity.clone(),
                financial_impact: FinancialImpact {
                    total: summary.total_impact.clone(),
                    currency: "BRL".to_string(),
                },
            },
            errors: invoice.validation_errors.clone(),
            errors_by_type,
            items,
            totals: invoice.totals.clone(),
            recommendations: summary.recommendations.clone(),
            legal_references: citations
                .into_iter()
                .map(|(reference, occurrences)| LegalCitation {
                    reference,
                    occurrences,
                })
                .collect(),
            suggestions,
        }
    }

    /// 叙述文档: 只读取结构树, 固定节序
    /// (摘要 -> 按严重级别降序的错误明细 -> 按源顺序的行明细 -> 建议 -> 合计)
    pub fn render_markdown(tree: &ReportTree) -> String {
        let mut md = Vec::new();

        md.push("# FISCAL AUDIT REPORT".to_string());
        md.push(format!(
            "*Version {} - generated at {}*",
            tree.metadata.report_version,
            tree.metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        md.push(String::new());
        md.push(format!("**Access key:** `{}`  ", tree.invoice.access_key));
        md.push(format!(
            "**Invoice:** {} / series {}  ",
            tree.invoice.number, tree.invoice.series
        ));
        md.push(format!(
            "**Issuer:** {} ({})  ",
            tree.invoice.issuer.legal_name, tree.invoice.issuer.uf
        ));
        md.push(format!(
            "**Recipient:** {} ({})  ",
            tree.invoice.recipient.legal_name, tree.invoice.recipient.uf
        ));
        let operation = if tree.invoice.operation.interstate {
            format!(
                "INTERSTATE ({} -> {})",
                tree.invoice.operation.origin_uf, tree.invoice.operation.destination_uf
            )
        } else {
            format!("INTERNAL ({})", tree.invoice.operation.origin_uf)
        };
        md.push(format!(
            "**Operation:** {} - {}",
            tree.invoice.operation.nature, operation
        ));
        md.push(String::new());

        // 摘要
        md.push("## Summary".to_string());
        md.push(String::new());
        md.push(format!("**Status:** {}", tree.summary.status));
        md.push(format!(
            "**Total findings:** {}",
            tree.summary.total_errors
        ));
        if tree.summary.total_errors > 0 {
            md.push(String::new());
            md.push("| Severity | Count |".to_string());
            md.push("|----------|-------|".to_string());
            md.push(format!("| CRITICAL | {} |", tree.summary.by_severity.critical));
            md.push(format!("| ERROR | {} |", tree.summary.by_severity.error));
            md.push(format!("| WARNING | {} |", tree.summary.by_severity.warning));
            md.push(format!("| INFO | {} |", tree.summary.by_severity.info));
        }
        md.push(String::new());
        md.push(format!(
            "**Financial impact:** R$ {} ({})",
            fmt_money(&tree.summary.financial_impact.total),
            tree.summary.financial_impact.currency
        ));
        md.push(String::new());

        // 错误明细: 最严重的在前
        if !tree.errors.is_empty() {
            md.push("## Findings".to_string());
            md.push(String::new());
            for severity in [
                Severity::Critical,
                Severity::Error,
                Severity::Warning,
                Severity::Info,
            ] {
                let group: Vec<_> = tree
                    .errors
                    .iter()
                    .filter(|e| e.severity == severity)
                    .collect();
                if group.is_empty() {
                    continue;
                }
                md.push(format!("### {}", severity));
                md.push(String::new());
                for (i, error) in group.iter().enumerate() {
                    md.push(format!("{}. **{}** - {}", i + 1, error.code, error.message));
                    md.push(format!("   - field: `{}`", error.field));
                    if let Some(item) = error.item_number {
                        md.push(format!("   - item: #{}", item));
                    }
                    if let Some(actual) = &error.actual_value {
                        md.push(format!("   - actual: `{}`", actual));
                    }
                    if let Some(expected) = &error.expected_value {
                        md.push(format!("   - expected: `{}`", expected));
                    }
                    if let Some(impact) = &error.financial_impact {
                        md.push(format!("   - impact: R$ {}", fmt_money(impact)));
                    }
                    if !error.legal_reference.is_empty() {
                        md.push(format!("   - legal basis: {}", error.legal_reference));
                    }
                    if let Some(suggestion) = &error.suggestion {
                        md.push(format!("   - suggestion: {}", suggestion));
                    }
                }
                md.push(String::new());
            }
        }

        // 行明细: 源顺序
        md.push("## Items".to_string());
        md.push(String::new());
        for item in &tree.items {
            md.push(format!("### Item {}: {}", item.number, item.description));
            md.push(format!(
                "- NCM {} | CFOP {} | {} x R$ {} = R$ {}",
                item.ncm,
                item.cfop,
                item.quantity,
                fmt_money(&item.unit_price),
                fmt_money(&item.line_total)
            ));
            md.push(format!(
                "- PIS: CST {} | {}% | R$ {}",
                item.pis.cst,
                item.pis.rate,
                fmt_money(&item.pis.value)
            ));
            md.push(format!(
                "- COFINS: CST {} | {}% | R$ {}",
                item.cofins.cst,
                item.cofins.rate,
                fmt_money(&item.cofins.value)
            ));
            if item.error_count > 0 {
                md.push(format!("- findings on this item: {}", item.error_count));
            }
            md.push(String::new());
        }

        // 建议
        if !tree.recommendations.is_empty() {
            md.push("## Recommendations".to_string());
            md.push(String::new());
            for (i, rec) in tree.recommendations.iter().enumerate() {
                md.push(format!("{}. {}", i + 1, rec));
            }
            md.push(String::new());
        }

        // 分类器建议 (显式请求时才存在)
        if !tree.suggestions.is_empty() {
            md.push("## Classifier suggestions".to_string());
            md.push(String::new());
            for s in &tree.suggestions {
                md.push(format!(
                    "- item #{}: {} -> {} (confidence {}%) - {}",
                    s.item_number,
                    s.current_code,
                    s.verdict.suggested_code,
                    s.verdict.confidence,
                    s.verdict.rationale
                ));
            }
            md.push(String::new());
        }

        // 合计
        md.push("## Invoice totals".to_string());
        md.push(String::new());
        md.push("| Description | Value |".to_string());
        md.push("|-------------|------:|".to_string());
        md.push(format!(
            "| Products | R$ {} |",
            fmt_money(&tree.totals.products_total)
        ));
        if let Some(pis) = &tree.totals.pis_total {
            md.push(format!("| PIS | R$ {} |", fmt_money(pis)));
        }
        if let Some(cofins) = &tree.totals.cofins_total {
            md.push(format!("| COFINS | R$ {} |", fmt_money(cofins)));
        }
        if let Some(icms) = &tree.totals.icms_total {
            md.push(format!("| ICMS | R$ {} |", fmt_money(icms)));
        }
        if let Some(total) = &tree.totals.invoice_total {
            md.push(format!("| **Invoice total** | **R$ {}** |", fmt_money(total)));
        }

        md.join("\n")
    }
}

impl Default for ReportAssembler {
    fn default() -> Self {
        Self::new()
    }
}
