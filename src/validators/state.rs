use bigdecimal::{BigDecimal, Zero};

use crate::error::AuditError;
use crate::models::error::{Severity, ValidationError};
use crate::models::invoice::{Invoice, Item};
use crate::models::money::{abs_diff, percent_of};
use crate::models::rule::{OverrideKind, StateOverride};
use crate::rules::RuleResolver;

/// 州级校验器 (jurisdiction validator)
///
/// 按出现在任一方的 UF 各实例化一次, 逐行独立执行。州级解读存在法律不确定性,
/// 因此发出的所有条目被封顶在 WARNING/INFO, 只提示不阻断; 无州级规则不是错误。
pub struct JurisdictionValidator<'a> {
    resolver: &'a RuleResolver,
    uf: String,
}

impl<'a> JurisdictionValidator<'a> {
    pub fn new(resolver: &'a RuleResolver, uf: impl Into<String>) -> Self {
        Self {
            resolver,
            uf: uf.into().to_ascii_uppercase(),
        }
    }

    pub async fn validate(
        &self,
        item: &Item,
        _invoice: &Invoice,
    ) -> Result<Vec<ValidationError>, AuditError> {
        let rules = self
            .resolver
            .state_rules(&self.uf, &item.normalized_ncm())
            .await?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let mut errors = Vec::new();
        for rule in &rules {
            match rule.kind {
                OverrideKind::IcmsRate => {
                    if let Some(e) = self.check_icms_rate(item, rule) {
                        errors.push(e);
                    }
                }
                OverrideKind::BaseReduction => {
                    if let Some(e) = self.advise_base_reduction(item, rule) {
                        errors.push(e);
                    }
                }
                OverrideKind::PresumedCredit => {
                    if let Some(e) = self.advise_presumed_credit(item, rule) {
                        errors.push(e);
                    }
                }
                OverrideKind::Exemption => {
                    if let Some(e) = self.check_exemption(item, rule) {
                        errors.push(e);
                    }
                }
                // 税基排除在合计校验器处理
                OverrideKind::BaseExclusion => {}
            }
        }
        Ok(errors)
    }

    /// ICMS 税率与州规则背离 -> WARNING (含影响额)
    fn check_icms_rate(&self, item: &Item, rule: &StateOverride) -> Option<ValidationError> {
        let expected_rate = rule.rate.as_ref()?;
        let icms = item.icms.as_ref()?;
        if abs_diff(&icms.rate, expected_rate) <= tolerance_hundredth() {
            return None;
        }
        let expected_value = percent_of(&item.line_total, expected_rate);
        let impact = abs_diff(&icms.value, &expected_value);
        Some(
            self.capped(
                ValidationError::new(
                    format!("{}_ICMS_001", self.uf),
                    "icms_rate",
                    Severity::Warning,
                    format!(
                        "ICMS rate diverges from {} rule for NCM {}: declared {}%, rule {}%",
                        self.uf,
                        item.normalized_ncm(),
                        icms.rate,
                        expected_rate
                    ),
                )
                .actual(format!("{}%", icms.rate))
                .expected(format!("{}%", expected_rate))
                .legal_reference(self.reference(rule))
                .impact(impact)
                .item(item.number),
                rule,
            ),
        )
    }

    /// 税基削减优惠可用 -> INFO (提示核对是否已适用)
    fn advise_base_reduction(&self, item: &Item, rule: &StateOverride) -> Option<ValidationError> {
        let reduction = rule.reduction_rate.as_ref()?;
        item.icms.as_ref()?;
        Some(
            self.capped(
                ValidationError::new(
                    format!("{}_RED_001", self.uf),
                    "icms_value",
                    Severity::Info,
                    format!(
                        "fiscal benefit available in {} for NCM {}: {}% base reduction",
                        self.uf,
                        item.normalized_ncm(),
                        reduction
                    ),
                )
                .expected(format!("base reduced by {}%", reduction))
                .actual("verify whether the reduction was applied")
                .legal_reference(self.reference(rule))
                .item(item.number),
                rule,
            ),
        )
    }

    /// 推定抵免可用 -> INFO
    fn advise_presumed_credit(&self, item: &Item, rule: &StateOverride) -> Option<ValidationError> {
        let rate = rule.rate.as_ref()?;
        Some(
            self.capped(
                ValidationError::new(
                    format!("{}_CRED_001", self.uf),
                    "icms_value",
                    Severity::Info,
                    format!(
                        "presumed credit of {}% available in {} for NCM {}",
                        rate,
                        self.uf,
                        item.normalized_ncm()
                    ),
                )
                .expected(format!("presumed credit {}%", rate))
                .legal_reference(self.reference(rule))
                .item(item.number),
                rule,
            ),
        )
    }

    /// 州规则豁免但仍申报 ICMS -> WARNING
    fn check_exemption(&self, item: &Item, rule: &StateOverride) -> Option<ValidationError> {
        let icms = item.icms.as_ref()?;
        if icms.value <= BigDecimal::zero() {
            return None;
        }
        Some(
            self.capped(
                ValidationError::new(
                    format!("{}_EXEMPT_001", self.uf),
                    "icms_value",
                    Severity::Warning,
                    format!(
                        "NCM {} is ICMS-exempt in {} but {} was charged",
                        item.normalized_ncm(),
                        self.uf,
                        icms.value
                    ),
                )
                .actual(icms.value.to_string())
                .expected("0.00")
                .legal_reference(self.reference(rule))
                .impact(icms.value.clone())
                .item(item.number),
                rule,
            ),
        )
    }

    /// 硬封顶 WARNING, 再按规则自带的 severity_ceiling 压低
    fn capped(&self, mut error: ValidationError, rule: &StateOverride) -> ValidationError {
        let mut severity = error.severity.min(Severity::Warning);
        if let Some(ceiling) = rule.severity_ceiling {
            severity = severity.min(ceiling);
        }
        error.severity = severity;
        error
    }

    fn reference(&self, rule: &StateOverride) -> String {
        rule.legal_reference
            .clone()
            .unwrap_or_else(|| format!("RICMS/{}", self.uf))
    }
}

fn tolerance_hundredth() -> BigDecimal {
    BigDecimal::new(1.into(), 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{insert_state_override, memory_store};
    use crate::models::invoice::IcmsFields;
    use crate::rules::OverrideLayer;
    use crate::validators::test_support::{dec, sample_invoice, sample_item};
    use std::sync::Arc;

    async fn resolver() -> RuleResolver {
        let store = memory_store().await;
        insert_state_override(
            &store,
            "SP",
            Some("17019900"),
            "ICMS_RATE",
            Some("18.00"),
            None,
            None,
        )
        .await;
        insert_state_override(
            &store,
            "PE",
            Some("17019900"),
            "BASE_REDUCTION",
            None,
            Some("33.33"),
            Some("INFO"),
        )
        .await;
        insert_state_override(
            &store,
            "PE",
            Some("17019900"),
            "EXEMPTION",
            None,
            None,
            Some("INFO"),
        )
        .await;
        RuleResolver::new(Arc::new(OverrideLayer::empty()), store)
    }

    fn item_with_icms(rate: &str, value: &str) -> crate::models::Item {
        let mut item = sample_item(1, "17019900", "Acucar cristal");
        item.icms = Some(IcmsFields {
            rate: dec(rate),
            value: dec(value),
        });
        item
    }

    #[tokio::test]
    async fn no_state_rules_is_silent() {
        let resolver = resolver().await;
        let validator = JurisdictionValidator::new(&resolver, "MG");
        let invoice = sample_invoice("MG", "MG");
        let errors = validator
            .validate(&item_with_icms("18.00", "144.00"), &invoice)
            .await
            .unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn icms_rate_divergence_is_a_warning_with_impact() {
        let resolver = resolver().await;
        let validator = JurisdictionValidator::new(&resolver, "SP");
        let invoice = sample_invoice("SP", "SP");
        // 申报 12%, 规则 18%: 期望 144.00, 申报 96.00
        let errors = validator
            .validate(&item_with_icms("12.00", "96.00"), &invoice)
            .await
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "SP_ICMS_001");
        assert_eq!(errors[0].severity, Severity::Warning);
        assert_eq!(errors[0].financial_impact, Some(dec("48.00")));
    }

    #[tokio::test]
    async fn matching_rate_is_silent() {
        let resolver = resolver().await;
        let validator = JurisdictionValidator::new(&resolver, "SP");
        let invoice = sample_invoice("SP", "SP");
        let errors = validator
            .validate(&item_with_icms("18.00", "144.00"), &invoice)
            .await
            .unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn ceiling_caps_exemption_to_info() {
        let resolver = resolver().await;
        let validator = JurisdictionValidator::new(&resolver, "PE");
        let invoice = sample_invoice("SP", "PE");
        let errors = validator
            .validate(&item_with_icms("18.00", "144.00"), &invoice)
            .await
            .unwrap();
        // BASE_REDUCTION 提示 + EXEMPTION, 都被压到 INFO
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.severity == Severity::Info));
        assert!(errors.iter().any(|e| e.code == "PE_RED_001"));
        assert!(errors.iter().any(|e| e.code == "PE_EXEMPT_001"));
    }

    #[tokio::test]
    async fn item_without_icms_fields_is_never_flagged() {
        let resolver = resolver().await;
        let validator = JurisdictionValidator::new(&resolver, "SP");
        let invoice = sample_invoice("SP", "SP");
        let item = sample_item(1, "17019900", "Acucar cristal");
        let errors = validator.validate(&item, &invoice).await.unwrap();
        assert!(errors.is_empty());
    }
}
