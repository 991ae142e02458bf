use bigdecimal::{BigDecimal, Zero};

use crate::models::error::{Severity, ValidationError};
use crate::models::money::fmt_money;
use crate::models::report::{AuditSummary, SeverityCounts};

/// 严重性与影响聚合器
///
/// 对错误列表的纯函数: 按级别计数, 影响额求和 (null 视为零),
/// 按固定规则顺序派生建议 (可叠加, 顺序跟随规则求值而非错误插入)。
pub struct Aggregator {
    amendment_threshold: BigDecimal,
}

impl Aggregator {
    pub fn new(amendment_threshold: BigDecimal) -> Self {
        Self {
            amendment_threshold,
        }
    }

    pub fn aggregate(&self, errors: &[ValidationError]) -> AuditSummary {
        let by_severity = SeverityCounts::tally(errors);
        let total_impact = errors
            .iter()
            .filter_map(|e| e.financial_impact.as_ref())
            .fold(BigDecimal::zero(), |acc, v| acc + v);

        let mut recommendations = Vec::new();

        // 规则 1: 存在 CRITICAL
        if by_severity.critical > 0 {
            recommendations.push(
                "Critical findings detected; immediate correction of the invoice is recommended \
                 to avoid a tax assessment."
                    .to_string(),
            );
        }

        // 规则 2: 影响额超过可配置阈值
        if total_impact > self.amendment_threshold {
            recommendations.push(format!(
                "Estimated financial impact of R$ {} exceeds the configured threshold; \
                 consider requesting a formal invoice amendment.",
                fmt_money(&total_impact)
            ));
        }

        // 规则 3: 存在 NCM 描述类警告
        let has_ncm_warning = errors
            .iter()
            .any(|e| e.namespace() == "NCM" && e.severity == Severity::Warning);
        if has_ncm_warning {
            recommendations.push(
                "NCM description inconsistencies found; review the product classification \
                 table (NCM/TIPI)."
                    .to_string(),
            );
        }

        AuditSummary {
            total_errors: errors.len(),
            by_severity,
            total_impact,
            recommendations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(dec("100.00"))
    }

    fn critical(code: &str, impact: &str) -> ValidationError {
        ValidationError::new(code, "rate", Severity::Critical, "wrong rate")
            .impact(dec(impact))
    }

    #[test]
    fn empty_error_list_aggregates_to_nothing() {
        let summary = aggregator().aggregate(&[]);
        assert_eq!(summary.total_errors, 0);
        assert_eq!(summary.total_impact, BigDecimal::zero());
        assert!(summary.recommendations.is_empty());
    }

    #[test]
    fn null_impact_counts_as_zero() {
        let errors = vec![
            ValidationError::new("NCM_002", "ncm", Severity::Info, "not cataloged"),
            critical("PIS_002", "10.80"),
        ];
        let summary = aggregator().aggregate(&errors);
        assert_eq!(summary.total_impact, dec("10.80"));
        assert_eq!(summary.by_severity.info, 1);
        assert_eq!(summary.by_severity.critical, 1);
    }

    #[test]
    fn recommendations_follow_rule_evaluation_order() {
        let errors = vec![
            // 插入顺序故意与规则顺序相反
            ValidationError::new("NCM_003", "description", Severity::Warning, "mismatch"),
            critical("PIS_002", "80.00"),
            critical("COFINS_002", "70.00"),
        ];
        let summary = aggregator().aggregate(&errors);
        assert_eq!(summary.recommendations.len(), 3);
        assert!(summary.recommendations[0].contains("immediate correction"));
        assert!(summary.recommendations[1].contains("150.00"));
        assert!(summary.recommendations[2].contains("classification"));
    }

    #[test]
    fn threshold_is_strictly_above() {
        let errors = vec![critical("PIS_002", "100.00")];
        let summary = aggregator().aggregate(&errors);
        // 恰等于阈值不触发
        assert_eq!(summary.recommendations.len(), 1);
        assert!(summary.recommendations[0].contains("immediate correction"));
    }
}
