use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::Severity;
use super::invoice::OperationNature;

/// 税务情形类别 (CST situation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SituationKind {
    Taxable,
    ZeroRate,
    Exempt,
    Suspended,
    NoIncidence,
}

impl SituationKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TAXABLE" => Some(SituationKind::Taxable),
            "ZERO_RATE" => Some(SituationKind::ZeroRate),
            "EXEMPT" => Some(SituationKind::Exempt),
            "SUSPENDED" => Some(SituationKind::Suspended),
            "NO_INCIDENCE" => Some(SituationKind::NoIncidence),
            _ => None,
        }
    }
}

/// CFOP 作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationScope {
    Internal,
    Interstate,
    Export,
}

impl OperationScope {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTERNAL" => Some(OperationScope::Internal),
            "INTERSTATE" => Some(OperationScope::Interstate),
            "EXPORT" => Some(OperationScope::Export),
            _ => None,
        }
    }
}

impl fmt::Display for OperationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationScope::Internal => "INTERNAL",
            OperationScope::Interstate => "INTERSTATE",
            OperationScope::Export => "EXPORT",
        };
        f.write_str(s)
    }
}

/// 州级覆盖规则类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideKind {
    IcmsRate,
    BaseReduction,
    PresumedCredit,
    Exemption,
    BaseExclusion,
}

impl OverrideKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ICMS_RATE" => Some(OverrideKind::IcmsRate),
            "BASE_REDUCTION" => Some(OverrideKind::BaseReduction),
            "PRESUMED_CREDIT" => Some(OverrideKind::PresumedCredit),
            "EXEMPTION" => Some(OverrideKind::Exemption),
            "BASE_EXCLUSION" => Some(OverrideKind::BaseExclusion),
            _ => None,
        }
    }
}

/// NCM 分类规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NcmRule {
    pub ncm: String,
    pub description: String,
    /// 描述关键词 (大小写不敏感的子串匹配)
    pub keywords: Vec<String>,
    pub regime: Option<String>,
    /// 该分类允许的 CST 集合; 为空表示信息不足, 跳过成员校验
    pub allowed_csts: Vec<String>,
    /// 覆盖层可钉住的标准税率; 缺席时回落到 CST 规则 (不同查询键, 非字段回落)
    pub pis_rate: Option<BigDecimal>,
    pub cofins_rate: Option<BigDecimal>,
    pub legal_reference: Option<String>,
}

/// CST 税务情形规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CstRule {
    pub cst: String,
    pub description: String,
    pub situation: Option<SituationKind>,
    pub pis_rate: Option<BigDecimal>,
    pub cofins_rate: Option<BigDecimal>,
    pub legal_reference: Option<String>,
}

impl CstRule {
    /// 仅 TAXABLE 情形携带标准税率
    pub fn standard_rate(&self, contribution: Contribution) -> Option<&BigDecimal> {
        if self.situation != Some(SituationKind::Taxable) {
            return None;
        }
        match contribution {
            Contribution::Pis => self.pis_rate.as_ref(),
            Contribution::Cofins => self.cofins_rate.as_ref(),
        }
    }
}

/// 贡献税种标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    Pis,
    Cofins,
}

impl Contribution {
    pub fn prefix(&self) -> &'static str {
        match self {
            Contribution::Pis => "PIS",
            Contribution::Cofins => "COFINS",
        }
    }

    pub fn field(&self) -> &'static str {
        match self {
            Contribution::Pis => "pis",
            Contribution::Cofins => "cofins",
        }
    }
}

/// CFOP 操作编码规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CfopRule {
    pub cfop: String,
    pub description: String,
    pub scope: Option<OperationScope>,
    /// 规则约束的交易性质; None 表示不约束
    pub nature: Option<OperationNature>,
    pub legal_reference: Option<String>,
}

/// 州级覆盖规则 (jurisdiction override)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateOverride {
    pub uf: String,
    /// None 表示全州适用
    pub ncm: Option<String>,
    pub kind: OverrideKind,
    pub rule_name: Option<String>,
    pub rate: Option<BigDecimal>,
    pub reduction_rate: Option<BigDecimal>,
    /// 该规则允许发出的最高严重级别
    pub severity_ceiling: Option<Severity>,
    pub legal_reference: Option<String>,
}

/// 规则查询键 (四种查询类型)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleLookup {
    Ncm(String),
    Cst(String),
    Cfop(String),
    State { uf: String, ncm: String },
}

/// 解析结果: 单一规则记录
#[derive(Debug, Clone, PartialEq)]
pub enum RuleRecord {
    Ncm(NcmRule),
    Cst(CstRule),
    Cfop(CfopRule),
    State(Vec<StateOverride>),
}

impl RuleRecord {
    pub fn as_ncm(&self) -> Option<&NcmRule> {
        match self {
            RuleRecord::Ncm(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_cst(&self) -> Option<&CstRule> {
        match self {
            RuleRecord::Cst(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_cfop(&self) -> Option<&CfopRule> {
        match self {
            RuleRecord::Cfop(rule) => Some(rule),
            _ => None,
        }
    }

    pub fn as_state(&self) -> Option<&[StateOverride]> {
        match self {
            RuleRecord::State(rules) => Some(rules),
            _ => None,
        }
    }
}

/// 分号分隔列表 (keywords / allowed_csts 的平面存储格式)
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn standard_rate_only_for_taxable() {
        let mut rule = CstRule {
            cst: "01".into(),
            description: "Tributavel".into(),
            situation: Some(SituationKind::Taxable),
            pis_rate: Some(BigDecimal::from_str("1.65").unwrap()),
            cofins_rate: Some(BigDecimal::from_str("7.60").unwrap()),
            legal_reference: None,
        };
        assert!(rule.standard_rate(Contribution::Pis).is_some());
        rule.situation = Some(SituationKind::Exempt);
        assert!(rule.standard_rate(Contribution::Pis).is_none());
    }

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(
            split_list("acucar; cristal ;;refinado"),
            vec!["acucar", "cristal", "refinado"]
        );
        assert!(split_list("").is_empty());
    }
}
