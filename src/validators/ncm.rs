use crate::error::AuditError;
use crate::models::error::{Severity, ValidationError};
use crate::models::invoice::{Invoice, Item};
use crate::rules::RuleResolver;

/// NCM 分类校验器
///
/// 对每个明细行无条件执行: 格式 -> 规则命中 -> 描述关键词。
pub struct NcmValidator<'a> {
    resolver: &'a RuleResolver,
}

impl<'a> NcmValidator<'a> {
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

        // 1. 格式: 右侧补零后必须恰为 8 位数字
        if !is_valid_format(&ncm) {
            let citation = self.resolver.citation("IN_2121").await?;
            errors.push(
                ValidationError::new(
                    "NCM_001",
                    "ncm",
                    Severity::Error,
                    format!("invalid NCM '{}': must be exactly 8 digits", item.ncm),
                )
                .actual(item.ncm.clone())
                .expected("8 numeric digits")
                .legal_reference(citation)
                .item(item.number),
            );
            return Ok(errors);
        }

        // 2. 规则命中; 未收录降级为 INFO, 不阻断
        let rule = match self.resolver.ncm_rule(&ncm).await? {
            Some(rule) => rule,
            None => {
                errors.push(
                    ValidationError::new(
                        "NCM_002",
                        "ncm",
                        Severity::Info,
                        format!("NCM {} is not cataloged in the rule base", ncm),
                    )
                    .actual(ncm)
                    .legal_reference("Tabela NCM/TIPI")
                    .suggestion("check the full NCM table or add the code to the override file")
                    .item(item.number),
                );
                return Ok(errors);
            }
        };

        // 3. 描述与关键词 (大小写不敏感子串); 无关键词则无从判断
        if !rule.keywords.is_empty() {
            let description = item.description.to_lowercase();
            let matched = rule
                .keywords
                .iter()
                .any(|kw| description.contains(&kw.to_lowercase()));
            if !matched {
                errors.push(
                    ValidationError::new(
                        "NCM_003",
                        "description",
                        Severity::Warning,
                        format!(
                            "description '{}' may not correspond to NCM {} ({})",
                            item.description, ncm, rule.description
                        ),
                    )
                    .actual(item.description.clone())
                    .expected(rule.description.clone())
                    .legal_reference(
                        rule.legal_reference
                            .clone()
                            .unwrap_or_else(|| "Tabela NCM/TIPI".to_string()),
                    )
                    .suggestion(format!(
                        "expected description for NCM {}: {}",
                        ncm, rule.description
                    ))
                    .item(item.number),
                );
            }
        }

        Ok(errors)
    }
}

fn is_valid_format(ncm: &str) -> bool {
    ncm.len() == 8 && ncm.chars().all(|c| c.is_ascii_digit())
}
