use bigdecimal::{BigDecimal, Zero};

use crate::error::AuditError;
use crate::models::error::{Severity, ValidationError};
use crate::models::invoice::Invoice;
use crate::models::money::{abs_diff, percent_of, round2, totals_tolerance, within};
use crate::models::rule::OverrideKind;
use crate::rules::RuleResolver;

/// 合计校验器 (发票级, 所有行级校验之后执行一次)
///
/// 固定检查顺序: 商品合计 (含行合计重算) -> 各税种合计 -> 州级税基排除规则。
/// 固定容差 0.01, 吸收行级取整。
pub struct TotalsValidator<'a> {
    resolver: &'a RuleResolver,
}

impl<'a> TotalsValidator<'a> {
    pub fn new(resolver: &'a RuleResolver) -> Self {
        Self { resolver }
    }

    pub async fn validate(&self, invoice: &Invoice) -> Result<Vec<ValidationError>, AuditError> {
        let mut errors = Vec::new();
        let tolerance = totals_tolerance();

        // 1. 行合计 = 数量 × 单价
        for item in &invoice.items {
            let recomputed = round2(&item.base_amount());
            if !within(&item.line_total, &recomputed, &tolerance) {
                errors.push(
                    ValidationError::new(
                        "TOTAL_001",
                        "line_total",
                        Severity::Error,
                        format!(
                            "line total diverges: declared {}, quantity x unit price = {}",
                            item.line_total, recomputed
                        ),
                    )
                    .actual(item.line_total.to_string())
                    .expected(recomputed.to_string())
                    .legal_reference("Manual NF-e, Item 7.2")
                    .impact(abs_diff(&item.line_total, &recomputed))
                    .item(item.number),
                );
            }
        }

        // 2. 商品合计 = 行合计之和
        let line_sum = invoice
            .items
            .iter()
            .fold(BigDecimal::zero(), |acc, i| acc + &i.line_total);
        if !within(&line_sum, &invoice.totals.products_total, &tolerance) {
            errors.push(
                ValidationError::new(
                    "TOTAL_002",
                    "products_total",
                    Severity::Error,
                    format!(
                        "products total diverges: sum of lines {}, declared {}",
                        line_sum, invoice.totals.products_total
                    ),
                )
                .actual(invoice.totals.products_total.to_string())
                .expected(line_sum.to_string())
                .legal_reference("Manual NF-e, Item 7.2")
                .impact(abs_diff(&line_sum, &invoice.totals.products_total)),
            );
        }

        // 3. 发票总额 (运费/保险/折扣不在模型内, 期望即行合计之和)
        if let Some(declared_total) = &invoice.totals.invoice_total {
            if !within(&line_sum, declared_total, &tolerance) {
                errors.push(
                    ValidationError::new(
                        "TOTAL_003",
                        "invoice_total",
                        Severity::Error,
                        format!(
                            "invoice total diverges: recomputed {}, declared {}",
                            line_sum, declared_total
                        ),
                    )
                    .actual(declared_total.to_string())
                    .expected(line_sum.to_string())
                    .legal_reference("Manual NF-e, Item 7.2")
                    .impact(abs_diff(&line_sum, declared_total)),
                );
            }
        }

        // 4. 各税种合计 (发票级申报缺席时不校验)
        self.check_tax_total(
            &mut errors,
            "TOTAL_004",
            "pis_total",
            "PIS",
            invoice.totals.pis_total.as_ref(),
            invoice
                .items
                .iter()
                .fold(BigDecimal::zero(), |acc, i| acc + &i.pis.value),
        );
        self.check_tax_total(
            &mut errors,
            "TOTAL_005",
            "cofins_total",
            "COFINS",
            invoice.totals.cofins_total.as_ref(),
            invoice
                .items
                .iter()
                .fold(BigDecimal::zero(), |acc, i| acc + &i.cofins.value),
        );
        self.check_tax_total(
            &mut errors,
            "TOTAL_006",
            "icms_total",
            "ICMS",
            invoice.totals.icms_total.as_ref(),
            invoice.items.iter().fold(BigDecimal::zero(), |acc, i| {
                match &i.icms {
                    Some(icms) => acc + &icms.value,
                    None => acc,
                }
            }),
        );

        // 5. 州级税基排除 (如 ICMS 不并入 PIS/COFINS 税基), 按发货方 UF 的覆盖规则
        errors.extend(self.check_base_exclusion(invoice).await?);

        Ok(errors)
    }

    #[allow(clippy::too_many_arguments)]
    fn check_tax_total(
        &self,
        errors: &mut Vec<ValidationError>,
        code: &str,
        field: &str,
        label: &str,
        declared: Option<&BigDecimal>,
        item_sum: BigDecimal,
    ) {
        let Some(declared) = declared else {
            return;
        };
        let tolerance = totals_tolerance();
        if !within(&item_sum, declared, &tolerance) {
            errors.push(
                ValidationError::new(
                    code,
                    field,
                    Severity::Error,
                    format!(
                        "{} total diverges: sum of items {}, declared {}",
                        label, item_sum, declared
                    ),
                )
                .actual(declared.to_string())
                .expected(item_sum.to_string())
                .legal_reference("Manual NF-e")
                .impact(abs_diff(&item_sum, declared)),
            );
        }
    }

    async fn check_base_exclusion(
        &self,
        invoice: &Invoice,
    ) -> Result<Vec<ValidationError>, AuditError> {
        let mut errors = Vec::new();
        let tolerance = totals_tolerance();

        for item in &invoice.items {
            let Some(icms) = &item.icms else { continue };
            let rules = self
                .resolver
                .state_rules(&invoice.issuer.uf, &item.normalized_ncm())
                .await?;
            let Some(rule) = rules
                .iter()
                .find(|r| r.kind == OverrideKind::BaseExclusion)
            else {
                continue;
            };

            let reduced_base = &item.line_total - &icms.value;
            for (fields, field_name) in [(&item.pis, "pis_value"), (&item.cofins, "cofins_value")]
            {
                let expected = percent_of(&reduced_base, &fields.rate);
                if fields.value > &expected + &tolerance {
                    errors.push(
                        ValidationError::new(
                            "TOTAL_007",
                            field_name,
                            Severity::Warning,
                            format!(
                                "contribution base should exclude ICMS: expected at most {}, declared {}",
                                expected, fields.value
                            ),
                        )
                        .actual(fields.value.to_string())
                        .expected(expected.to_string())
                        .legal_reference(
                            rule.legal_reference
                                .clone()
                                .unwrap_or_else(|| "RE 574.706 (Tema 69)".to_string()),
                        )
                        .impact(abs_diff(&fields.value, &expected))
                        .item(item.number),
                    );
                }
            }
        }

        Ok(errors)
    }
}
