use bigdecimal::BigDecimal;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::db::RuleStore;
use crate::error::AuditError;
use crate::models::error::{Severity, ValidationError};
use crate::models::invoice::Invoice;
use crate::models::report::{BatchOutcome, BatchSummary, InvoiceReport, InvoiceStatus};
use crate::report::{Aggregator, ReportAssembler};
use crate::rules::{OverrideLayer, RuleResolver};
use crate::validators::ValidatorPipeline;

/// 审计服务 (批处理入口)
///
/// 规则库与覆盖层进程内打开一次; 规则解析器按批构造, 生命周期归本次运行。
/// 批内逐张顺序处理, 每张发票独立隔离: 意外失败折算为该发票上的一条
/// SYS_001 CRITICAL 与 SYSTEM_ERROR 状态, 绝不中断后续发票 —— 每张发票
/// 总会产出报告。
pub struct AuditService {
    store: RuleStore,
    overrides: Arc<OverrideLayer>,
    aggregator: Aggregator,
    assembler: ReportAssembler,
}

impl AuditService {
    pub fn new(
        store: RuleStore,
        overrides: Arc<OverrideLayer>,
        amendment_threshold: BigDecimal,
    ) -> Self {
        Self {
            store,
            overrides,
            aggregator: Aggregator::new(amendment_threshold),
            assembler: ReportAssembler::new(),
        }
    }

    /// 审计单张发票 (独立运行: 自带解析器)
    pub async fn audit_invoice(&self, invoice: Invoice) -> Result<InvoiceReport, AuditError> {
        let resolver = RuleResolver::new(self.overrides.clone(), self.store.clone());
        self.audit_with_resolver(&resolver, invoice).await
    }

    async fn audit_with_resolver(
        &self,
        resolver: &RuleResolver,
        mut invoice: Invoice,
    ) -> Result<InvoiceReport, AuditError> {
        ValidatorPipeline::new(resolver).run(&mut invoice).await?;
        let summary = self.aggregator.aggregate(&invoice.validation_errors);
        let status = InvoiceStatus::from_errors(&invoice.validation_errors);
        let tree = self
            .assembler
            .assemble(&invoice, &summary, status, Vec::new());
        let narrative = ReportAssembler::render_markdown(&tree);
        Ok(InvoiceReport {
            access_key: invoice.access_key,
            status,
            tree,
            narrative,
        })
    }

    /// 批量审计: 逐张隔离, 汇总状态计数与影响额
    pub async fn audit_batch(&self, invoices: Vec<Invoice>) -> BatchOutcome {
        let resolver = RuleResolver::new(self.overrides.clone(), self.store.clone());
        let total = invoices.len();
        let mut reports = Vec::with_capacity(total);
        let mut summary = BatchSummary::new();

        for (idx, invoice) in invoices.into_iter().enumerate() {
            let access_key = invoice.access_key.clone();
            // 隔离边界需要在失败后重建报告, 先留一份
            let preserved = invoice.clone();

            let outcome = AssertUnwindSafe(self.audit_with_resolver(&resolver, invoice))
                .catch_unwind()
                .await;

            let report = match outcome {
                Ok(Ok(report)) => report,
                Ok(Err(e)) => {
                    tracing::error!("invoice {} failed with {}, isolating", access_key, e);
                    self.system_error_report(preserved, e.to_string())
                }
                Err(_) => {
                    tracing::error!("invoice {} panicked during validation, isolating", access_key);
                    self.system_error_report(preserved, "unexpected panic during validation".into())
                }
            };

            tracing::info!(
                "invoice {}/{} {}: {} ({} finding(s))",
                idx + 1,
                total,
                report.access_key,
                report.status,
                report.tree.summary.total_errors
            );
            summary.record(report.status, &report.tree.summary.financial_impact.total);
            reports.push(report);
        }

        tracing::info!(
            "batch finished: {} valid, {} invalid, {} system error, impact {}",
            summary.valid,
            summary.invalid,
            summary.system_error,
            summary.total_impact
        );
        BatchOutcome { reports, summary }
    }

    /// 意外失败折算为单条 CRITICAL 系统错误, 仍产出完整报告
    fn system_error_report(&self, mut invoice: Invoice, reason: String) -> InvoiceReport {
        invoice.add_validation_error(
            ValidationError::new(
                "SYS_001",
                "invoice",
                Severity::Critical,
                format!("internal failure while validating this invoice: {}", reason),
            )
            .legal_reference("Sistema de Validacao"),
        );
        let summary = self.aggregator.aggregate(&invoice.validation_errors);
        let tree = self.assembler.assemble(
            &invoice,
            &summary,
            InvoiceStatus::SystemError,
            Vec::new(),
        );
        let narrative = ReportAssembler::render_markdown(&tree);
        InvoiceReport {
            access_key: invoice.access_key,
            status: InvoiceStatus::SystemError,
            tree,
            narrative,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_cfop, insert_cst, insert_ncm, memory_store};
    use crate::validators::test_support::{dec, sample_invoice_with_items, sample_item};

    async fn service() -> AuditService {
        let store = memory_store().await;
        insert_ncm(
            &store,
            "17019900",
            "Acucar de cana refinado",
            "acucar;cristal;refinado",
            Some("01"),
            None,
            None,
        )
        .await;
        insert_cst(&store, "01", "TAXABLE", "1.65", "7.60").await;
        insert_cfop(&store, "5102", "INTERNAL", Some("SALE")).await;
        AuditService::new(store, Arc::new(OverrideLayer::empty()), dec("100.00"))
    }

    #[tokio::test]
    async fn valid_invoice_reports_valid_status() {
        let service = service().await;
        let invoice =
            sample_invoice_with_items(vec![sample_item(1, "17019900", "Acucar cristal")]);
        let report = service.audit_invoice(invoice).await.unwrap();
        assert_eq!(report.status, InvoiceStatus::Valid);
        assert!(report.tree.errors.is_empty());
        assert!(report.narrative.contains("**Status:** VALID"));
    }

    #[tokio::test]
    async fn batch_summary_accumulates_per_invoice_statuses() {
        let service = service().await;
        let good = sample_invoice_with_items(vec![sample_item(1, "17019900", "Acucar cristal")]);
        let mut bad_item = sample_item(1, "17019900", "Acucar cristal");
        bad_item.pis.rate = dec("3.00");
        bad_item.pis.value = dec("24.00");
        let mut bad = sample_invoice_with_items(vec![bad_item]);
        bad.access_key = "35240112345678000199550010000099991000099990".into();
        bad.totals.pis_total = Some(dec("24.00"));

        let outcome = service.audit_batch(vec![good, bad]).await;
        assert_eq!(outcome.summary.total, 2);
        assert_eq!(outcome.summary.valid, 1);
        assert_eq!(outcome.summary.invalid, 1);
        assert_eq!(outcome.summary.system_error, 0);
        assert_eq!(outcome.summary.total_impact, dec("10.80"));
        assert_eq!(outcome.reports.len(), 2);
    }

    #[tokio::test]
    async fn infrastructure_failure_isolates_the_invoice_not_the_batch() {
        // 关闭连接池制造基础设施失败
        let store = memory_store().await;
        store.pool().close().await;
        let broken = AuditService::new(store, Arc::new(OverrideLayer::empty()), dec("100.00"));

        let first = sample_invoice_with_items(vec![sample_item(1, "17019900", "Acucar")]);
        let mut second = first.clone();
        second.access_key = "35240112345678000199550010000099991000099990".into();

        let outcome = broken.audit_batch(vec![first, second]).await;
        // 两张都失败, 但都产出报告, 批处理跑完
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.summary.system_error, 2);
        for report in &outcome.reports {
            assert_eq!(report.status, InvoiceStatus::SystemError);
            let sys = report.tree.errors.last().unwrap();
            assert_eq!(sys.code, "SYS_001");
            assert_eq!(sys.severity, Severity::Critical);
            assert!(report.narrative.contains("SYS_001"));
        }
    }
}
