use crate::error::AuditError;
use crate::models::error::{Severity, ValidationError};
use crate::models::invoice::{Invoice, Item};
use crate::models::rule::OperationScope;
use crate::rules::RuleResolver;

/// CFOP 方位替换表 (同族换方位, 查表而非推断):
/// 州内 {1,5} <-> 州际 {2,6}; 出口位 {3,7} 回落到州内位 {1,5}
fn remap_to_interstate(cfop: &str) -> Option<String> {
    let leading = match cfop.as_bytes().first()? {
        b'1' => '2',
        b'5' => '6',
        _ => return None,
    };
    Some(format!("{}{}", leading, &cfop[1..]))
}

fn remap_to_internal(cfop: &str) -> Option<String> {
    let leading = match cfop.as_bytes().first()? {
        b'2' | b'3' => '1',
        b'6' | b'7' => '5',
        _ => return None,
    };
    Some(format!("{}{}", leading, &cfop[1..]))
}

/// 首位数字隐含的作用域 (规则未命中时的回落判断)
fn digit_scope(cfop: &str) -> Option<OperationScope> {
    match cfop.as_bytes().first()? {
        b'1' | b'5' => Some(OperationScope::Internal),
        b'2' | b'6' => Some(OperationScope::Interstate),
        b'3' | b'7' => Some(OperationScope::Export),
        _ => None,
    }
}

/// CFOP 操作编码校验器
pub struct CfopValidator<'a> {
    resolver: &'a RuleResolver,
}

impl<'a> CfopValidator<'a> {
    pub fn new(resolver: &'a RuleResolver) -> Self {
        Self { resolver }
    }

    pub async fn validate(
        &self,
        item: &Item,
        invoice: &Invoice,
    ) -> Result<Vec<ValidationError>, AuditError> {
        let mut errors = Vec::new();
        let cfop = item.normalized_cfop();

        // 1. 格式: 4 位数字
        if !is_valid_format(&cfop) {
            let citation = self.resolver.citation("SINIEF_0705").await?;
            errors.push(
                ValidationError::new(
                    "CFOP_001",
                    "cfop",
                    Severity::Error,
                    format!("invalid CFOP '{}': must be exactly 4 digits", item.cfop),
                )
                .actual(item.cfop.clone())
                .expected("4 numeric digits")
                .legal_reference(citation)
                .item(item.number),
            );
            return Ok(errors);
        }

        // 2. 规则命中; 未收录是 ERROR, 但首位数字的方位检查仍然进行
        let rule = self.resolver.cfop_rule(&cfop).await?;
        if rule.is_none() {
            errors.push(
                ValidationError::new(
                    "CFOP_002",
                    "cfop",
                    Severity::Error,
                    format!("operation code {} not recognized", cfop),
                )
                .actual(cfop.clone())
                .legal_reference("Tabela CFOP - Ajuste SINIEF 07/05")
                .suggestion("check the full CFOP table")
                .item(item.number),
            );
        }

        // 3. 属地规则: 州际要求州际位 (出口位亦可), 州内要求州内位
        let scope = rule
            .as_ref()
            .and_then(|r| r.scope)
            .or_else(|| digit_scope(&cfop));
        let legal_reference = rule
            .as_ref()
            .and_then(|r| r.legal_reference.clone())
            .unwrap_or_else(|| "Tabela CFOP".to_string());

        if let Some(scope) = scope {
            if invoice.is_interstate() {
                if scope == OperationScope::Internal {
                    let expected = remap_to_interstate(&cfop).unwrap_or_else(|| cfop.clone());
                    errors.push(
                        ValidationError::new(
                            "CFOP_003",
                            "cfop",
                            Severity::Critical,
                            format!(
                                "interstate operation ({} -> {}) with internal CFOP {}",
                                invoice.issuer.uf, invoice.recipient.uf, cfop
                            ),
                        )
                        .actual(cfop.clone())
                        .expected(format!("{} (interstate)", expected))
                        .legal_reference(legal_reference.clone())
                        .suggestion(format!("use CFOP {} for interstate operations", expected))
                        .item(item.number),
                    );
                }
            } else if scope != OperationScope::Internal {
                let expected = remap_to_internal(&cfop).unwrap_or_else(|| cfop.clone());
                errors.push(
                    ValidationError::new(
                        "CFOP_004",
                        "cfop",
                        Severity::Critical,
                        format!(
                            "internal operation ({}) with non-internal CFOP {}",
                            invoice.issuer.uf, cfop
                        ),
                    )
                    .actual(cfop.clone())
                    .expected(format!("{} (internal)", expected))
                    .legal_reference(legal_reference.clone())
                    .suggestion(format!("use CFOP {} for internal operations", expected))
                    .item(item.number),
                );
            }
        }

        // 4. 规则约束交易性质时比对
        if let Some(rule) = &rule {
            if let Some(nature) = rule.nature {
                if nature != invoice.nature {
                    errors.push(
                        ValidationError::new(
                            "CFOP_005",
                            "cfop",
                            Severity::Error,
                            format!(
                                "CFOP {} is reserved for {} operations, invoice declares {}",
                                cfop, nature, invoice.nature
                            ),
                        )
                        .actual(invoice.nature.to_string())
                        .expected(nature.to_string())
                        .legal_reference(legal_reference)
                        .item(item.number),
                    );
                }
            }
        }

        Ok(errors)
    }
}

fn is_valid_format(cfop: &str) -> bool {
    cfop.len() == 4 && cfop.chars().all(|c| c.is_ascii_digit())
}
