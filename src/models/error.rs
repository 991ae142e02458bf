use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误严重级别 (按法律阻断性升序排列, CRITICAL 最高)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Some(Severity::Info),
            "WARNING" => Some(Severity::Warning),
            "ERROR" => Some(Severity::Error),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// 校验错误记录 (ValidationError)
///
/// 一旦构造即不可变; 追加到 Invoice.validation_errors 后永不重排/去重。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: String,
    pub field: String,
    pub message: String,
    pub severity: Severity,
    pub actual_value: Option<String>,
    pub expected_value: Option<String>,
    pub suggestion: Option<String>,
    pub legal_reference: String,
    pub financial_impact: Option<BigDecimal>,
    pub item_number: Option<u32>,
}

impl ValidationError {
    pub fn new(
        code: impl Into<String>,
        field: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            field: field.into(),
            message: message.into(),
            severity,
            actual_value: None,
            expected_value: None,
            suggestion: None,
            legal_reference: String::new(),
            financial_impact: None,
            item_number: None,
        }
    }

    pub fn actual(mut self, value: impl Into<String>) -> Self {
        self.actual_value = Some(value.into());
        self
    }

    pub fn expected(mut self, value: impl Into<String>) -> Self {
        self.expected_value = Some(value.into());
        self
    }

    pub fn suggestion(mut self, value: impl Into<String>) -> Self {
        self.suggestion = Some(value.into());
        self
    }

    pub fn legal_reference(mut self, value: impl Into<String>) -> Self {
        self.legal_reference = value.into();
        self
    }

    pub fn impact(mut self, value: BigDecimal) -> Self {
        self.financial_impact = Some(value);
        self
    }

    pub fn item(mut self, number: u32) -> Self {
        self.item_number = Some(number);
        self
    }

    /// 错误码命名空间 (如 NCM_003 -> NCM)
    pub fn namespace(&self) -> &str {
        self.code.split('_').next().unwrap_or(&self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered_by_blocking_power() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn severity_parse_roundtrip() {
        for s in [
            Severity::Info,
            Severity::Warning,
            Severity::Error,
            Severity::Critical,
        ] {
            assert_eq!(Severity::parse(&s.to_string()), Some(s));
        }
        assert_eq!(Severity::parse("FATAL"), None);
    }

    #[test]
    fn error_namespace_comes_from_code_prefix() {
        let e = ValidationError::new("COFINS_002", "cofins_rate", Severity::Critical, "rate");
        assert_eq!(e.namespace(), "COFINS");
    }
}
