use bigdecimal::BigDecimal;

use crate::error::AuditError;
use crate::models::error::{Severity, ValidationError};
use crate::models::invoice::{Invoice, Item, TaxFields};
use crate::models::money::{abs_diff, percent_of, value_tolerance, within};
use crate::models::rule::{Contribution, NcmRule};
use crate::rules::RuleResolver;

/// PIS/COFINS 税率校验器
///
/// 两个贡献税种各自独立校验: CST 成员 -> 税率 -> 税额重算。
/// 规则未命中不得静默放行, 记 WARNING 后继续能做的检查。
pub struct TaxRateValidator<'a> {
    resolver: &'a RuleResolver,
}

impl<'a> TaxRateValidator<'a> {
    pub fn new(resolver: &'a RuleResolver) -> Self {
        Self { resolver }
    }

    pub async fn validate(
        &self,
        item: &Item,
        _invoice: &Invoice,
    ) -> Result<Vec<ValidationError>, AuditError> {
        let mut errors = Vec::new();
        let ncm = item.normalized_ncm();
        let ncm_rule = self.resolver.ncm_rule(&ncm).await?;

        for contribution in [Contribution::Pis, Contribution::Cofins] {
            errors.extend(
                self.validate_contribution(item, &ncm, ncm_rule.as_ref(), contribution)
                    .await?,
            );
        }

        // PIS 与 COFINS 的 CST 通常一致, 背离提示核对
        if item.pis.cst != item.cofins.cst {
            errors.push(
                ValidationError::new(
                    "PISCOFINS_001",
                    "pis_cst,cofins_cst",
                    Severity::Warning,
                    format!(
                        "PIS CST ({}) and COFINS CST ({}) diverge on the same line",
                        item.pis.cst, item.cofins.cst
                    ),
                )
                .actual(format!("PIS:{}, COFINS:{}", item.pis.cst, item.cofins.cst))
                .legal_reference("Leis 10.637/2002 e 10.833/2003")
                .suggestion("PIS and COFINS usually share the same tax situation")
                .item(item.number),
            );
        }

        Ok(errors)
    }

    async fn validate_contribution(
        &self,
        item: &Item,
        ncm: &str,
        ncm_rule: Option<&NcmRule>,
        contribution: Contribution,
    ) -> Result<Vec<ValidationError>, AuditError> {
        let mut errors = Vec::new();
        let prefix = contribution.prefix();
        let fields = match contribution {
            Contribution::Pis => &item.pis,
            Contribution::Cofins => &item.cofins,
        };

        let Some(rule) = ncm_rule else {
            // 分类编码无规则: 不静默放行, 记警告并继续自洽性检查
            errors.push(
                ValidationError::new(
                    format!("{}_999", prefix),
                    format!("{}_cst", contribution.field()),
                    Severity::Warning,
                    format!(
                        "no rate rule cataloged for NCM {} - {} rate validation not possible",
                        ncm, prefix
                    ),
                )
                .actual(fields.cst.clone())
                .expected("rule cataloged for the classification code")
                .legal_reference("Sistema de Validacao")
                .suggestion("confirm the NCM or add a rule to the override file")
                .item(item.number),
            );
            if let Some(e) = self.check_value(item, fields, &fields.rate, contribution) {
                errors.push(e);
            }
            return Ok(errors);
        };

        // 1. CST 必须属于该分类税制允许的集合
        if !rule.allowed_csts.is_empty() && !rule.allowed_csts.contains(&fields.cst) {
            errors.push(
                ValidationError::new(
                    format!("{}_001", prefix),
                    format!("{}_cst", contribution.field()),
                    Severity::Critical,
                    format!(
                        "{} CST {} is not valid for NCM {} regime",
                        prefix, fields.cst, ncm
                    ),
                )
                .actual(fields.cst.clone())
                .expected(rule.allowed_csts.join(";"))
                .legal_reference(
                    rule.legal_reference
                        .clone()
                        .unwrap_or_else(|| "Leis 10.637/2002 e 10.833/2003".to_string()),
                )
                .item(item.number),
            );
            return Ok(errors);
        }

        // 期望税率: 分类规则钉住的税率优先, 否则 CST 规则的标准税率
        let cst_rule = self.resolver.cst_rule(&fields.cst).await?;
        let pinned = match contribution {
            Contribution::Pis => rule.pis_rate.clone(),
            Contribution::Cofins => rule.cofins_rate.clone(),
        };
        let expected_rate = pinned.or_else(|| {
            cst_rule
                .as_ref()
                .and_then(|r| r.standard_rate(contribution).cloned())
        });

        if cst_rule.is_none() && expected_rate.is_none() {
            errors.push(
                ValidationError::new(
                    format!("{}_999", prefix),
                    format!("{}_cst", contribution.field()),
                    Severity::Warning,
                    format!(
                        "situation code {} is not cataloged - {} rate validation not possible",
                        fields.cst, prefix
                    ),
                )
                .actual(fields.cst.clone())
                .expected("rule cataloged for the situation code")
                .legal_reference("Sistema de Validacao")
                .suggestion("confirm the CST or add a rule to the override file")
                .item(item.number),
            );
        }

        // 2. 税率比对; 影响额 = |申报税额 − 申报行合计 × 期望税率|, 末步取整
        if let Some(expected) = &expected_rate {
            if fields.rate != *expected {
                let recomputed = percent_of(&item.line_total, expected);
                let impact = abs_diff(&fields.value, &recomputed);
                errors.push(
                    ValidationError::new(
                        format!("{}_002", prefix),
                        format!("{}_rate", contribution.field()),
                        Severity::Critical,
                        format!("incorrect {} rate: {}%", prefix, fields.rate),
                    )
                    .actual(fields.rate.to_string())
                    .expected(expected.to_string())
                    .legal_reference(
                        cst_rule
                            .as_ref()
                            .and_then(|r| r.legal_reference.clone())
                            .or_else(|| rule.legal_reference.clone())
                            .unwrap_or_default(),
                    )
                    .impact(impact)
                    .suggestion(format!("correct rate: {}%", expected))
                    .item(item.number),
                );
                // 税率已判错, 税额重算不再重复报告
                return Ok(errors);
            }
        }

        // 3. 税额重算 (数量 × 单价 × 税率)
        let rate = expected_rate.as_ref().unwrap_or(&fields.rate);
        if let Some(e) = self.check_value(item, fields, rate, contribution) {
            errors.push(e);
        }

        Ok(errors)
    }

    /// 独立重算税额并按容差比对: min(重算值 1%, 0.02)
    fn check_value(
        &self,
        item: &Item,
        fields: &TaxFields,
        rate: &BigDecimal,
        contribution: Contribution,
    ) -> Option<ValidationError> {
        let recomputed = percent_of(&item.base_amount(), rate);
        let tolerance = value_tolerance(&recomputed);
        if within(&fields.value, &recomputed, &tolerance) {
            return None;
        }
        let prefix = contribution.prefix();
        Some(
            ValidationError::new(
                format!("{}_003", prefix),
                format!("{}_value", contribution.field()),
                Severity::Error,
                format!(
                    "incorrect {} value: recomputed {}, declared {}",
                    prefix, recomputed, fields.value
                ),
            )
            .actual(fields.value.to_string())
            .expected(recomputed.to_string())
            .legal_reference("Manual NF-e")
            .impact(abs_diff(&fields.value, &recomputed))
            .item(item.number),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_cst, insert_ncm, memory_store};
    use crate::rules::OverrideLayer;
    use crate::validators::test_support::{dec, sample_invoice, sample_item};
    use std::sync::Arc;

    async fn resolver() -> RuleResolver {
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
        RuleResolver::new(Arc::new(OverrideLayer::empty()), store)
    }

    #[tokio::test]
    async fn conformant_line_passes() {
        let resolver = resolver().await;
        let validator = TaxRateValidator::new(&resolver);
        let invoice = sample_invoice("SP", "SP");
        let item = sample_item(1, "17019900", "Acucar cristal");
        let errors = validator.validate(&item, &invoice).await.unwrap();
        assert!(errors.is_empty(), "unexpected: {:?}", errors);
    }

    #[tokio::test]
    async fn wrong_rates_are_critical_with_reference_impacts() {
        let resolver = resolver().await;
        let validator = TaxRateValidator::new(&resolver);
        let invoice = sample_invoice("SP", "SP");
        let mut item = sample_item(1, "17019900", "Acucar cristal");
        // 申报 PIS 3.00% / 24.00, COFINS 10.00% / 80.00, 行合计 800.00
        item.pis.rate = dec("3.00");
        item.pis.value = dec("24.00");
        item.cofins.rate = dec("10.00");
        item.cofins.value = dec("80.00");

        let errors = validator.validate(&item, &invoice).await.unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.severity == Severity::Critical));

        let pis = errors.iter().find(|e| e.code == "PIS_002").unwrap();
        assert_eq!(pis.financial_impact, Some(dec("10.80")));
        let cofins = errors.iter().find(|e| e.code == "COFINS_002").unwrap();
        assert_eq!(cofins.financial_impact, Some(dec("19.20")));
    }

    #[tokio::test]
    async fn cst_outside_regime_set_is_critical() {
        let resolver = resolver().await;
        let validator = TaxRateValidator::new(&resolver);
        let invoice = sample_invoice("SP", "SP");
        let mut item = sample_item(1, "17019900", "Acucar cristal");
        item.pis.cst = "49".into();

        let errors = validator.validate(&item, &invoice).await.unwrap();
        let cst = errors.iter().find(|e| e.code == "PIS_001").unwrap();
        assert_eq!(cst.severity, Severity::Critical);
        assert_eq!(cst.expected_value.as_deref(), Some("01"));
        // CST 背离也会被关系检查提示
        assert!(errors.iter().any(|e| e.code == "PISCOFINS_001"));
    }

    #[tokio::test]
    async fn uncataloged_ncm_warns_instead_of_silently_passing() {
        let resolver = resolver().await;
        let validator = TaxRateValidator::new(&resolver);
        let invoice = sample_invoice("SP", "SP");
        let item = sample_item(1, "20089900", "Castanha processada");

        let errors = validator.validate(&item, &invoice).await.unwrap();
        assert!(errors.iter().any(|e| e.code == "PIS_999"));
        assert!(errors.iter().any(|e| e.code == "COFINS_999"));
        assert!(errors
            .iter()
            .all(|e| e.severity == Severity::Warning));
    }

    #[tokio::test]
    async fn declared_value_off_recomputation_is_an_error() {
        let resolver = resolver().await;
        let validator = TaxRateValidator::new(&resolver);
        let invoice = sample_invoice("SP", "SP");
        let mut item = sample_item(1, "17019900", "Acucar cristal");
        // 税率正确, 税额偏离: 正确 13.20, 申报 20.00
        item.pis.value = dec("20.00");

        let errors = validator.validate(&item, &invoice).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "PIS_003");
        assert_eq!(errors[0].severity, Severity::Error);
        assert_eq!(errors[0].financial_impact, Some(dec("6.80")));
    }

    #[tokio::test]
    async fn tolerance_absorbs_rounding_noise() {
        let resolver = resolver().await;
        let validator = TaxRateValidator::new(&resolver);
        let invoice = sample_invoice("SP", "SP");
        let mut item = sample_item(1, "17019900", "Acucar cristal");
        // 正确 13.20, 申报 13.21 (差 0.01 <= 0.02)
        item.pis.value = dec("13.21");

        let errors = validator.validate(&item, &invoice).await.unwrap();
        assert!(errors.is_empty(), "unexpected: {:?}", errors);
    }
}
