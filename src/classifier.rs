//! NCM 分类器接口 (可选能力)
//!
//! 只能被调用方显式触发, 永不进入确定性校验管线; 结果作为建议附在报告上,
//! 不写回任何规则层, 也不覆盖明细行的申报编码。

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::AuditError;
use crate::models::Item;

/// 分类器判定结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierVerdict {
    pub suggested_code: String,
    /// 置信度 0–100
    pub confidence: u8,
    pub rationale: String,
    pub is_consistent: bool,
}

/// 附加到报告上的单行建议
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSuggestion {
    pub item_number: u32,
    pub current_code: String,
    pub verdict: ClassifierVerdict,
}

/// 外部分类能力 (LLM 等实现在本仓库之外)
pub trait NcmClassifier: Send + Sync {
    fn classify(
        &self,
        description: &str,
        current_code: &str,
    ) -> impl Future<Output = Result<ClassifierVerdict, AuditError>> + Send;
}

/// 显式按行调用分类器, 强制超时; 网络阻塞只可能发生在这里
pub async fn classify_item<C: NcmClassifier>(
    classifier: &C,
    item: &Item,
    timeout: Duration,
) -> Result<ClassifierSuggestion, AuditError> {
    let ncm = item.normalized_ncm();
    let verdict = tokio::time::timeout(timeout, classifier.classify(&item.description, &ncm))
        .await
        .map_err(|_| AuditError::ClassifierTimeout {
            timeout_secs: timeout.as_secs(),
        })??;
    Ok(ClassifierSuggestion {
        item_number: item.number,
        current_code: ncm,
        verdict,
    })
}

/// 批量封装: 任一行超时/失败即整体返回错误, 由调用方决定是否附加
pub async fn classify_items<C: NcmClassifier>(
    classifier: &C,
    items: &[Item],
    timeout: Duration,
) -> Result<Vec<ClassifierSuggestion>, AuditError> {
    let mut suggestions = Vec::with_capacity(items.len());
    for item in items {
        suggestions.push(classify_item(classifier, item, timeout).await?);
    }
    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaxFields;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    struct FixedClassifier {
        delay: Duration,
    }

    impl NcmClassifier for FixedClassifier {
        fn classify(
            &self,
            _description: &str,
            current_code: &str,
        ) -> impl Future<Output = Result<ClassifierVerdict, AuditError>> + Send {
            let delay = self.delay;
            let code = current_code.to_string();
            async move {
                tokio::time::sleep(delay).await;
                Ok(ClassifierVerdict {
                    suggested_code: code,
                    confidence: 90,
                    rationale: "description matches heading".into(),
                    is_consistent: true,
                })
            }
        }
    }

    fn item() -> Item {
        let dec = |s: &str| BigDecimal::from_str(s).unwrap();
        Item {
            number: 1,
            product_code: "P001".into(),
            description: "Acucar cristal".into(),
            ncm: "17019900".into(),
            cfop: "5102".into(),
            unit: "KG".into(),
            quantity: dec("1"),
            unit_price: dec("10.00"),
            line_total: dec("10.00"),
            pis: TaxFields {
                cst: "01".into(),
                rate: dec("1.65"),
                value: dec("0.17"),
            },
            cofins: TaxFields {
                cst: "01".into(),
                rate: dec("7.60"),
                value: dec("0.76"),
            },
            icms: None,
        }
    }

    #[tokio::test]
    async fn suggestion_carries_item_and_verdict() {
        let classifier = FixedClassifier {
            delay: Duration::from_millis(0),
        };
        let suggestion = classify_item(&classifier, &item(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(suggestion.item_number, 1);
        assert_eq!(suggestion.current_code, "17019900");
        assert!(suggestion.verdict.is_consistent);
    }

    #[tokio::test]
    async fn slow_classifier_hits_timeout() {
        let classifier = FixedClassifier {
            delay: Duration::from_millis(200),
        };
        let result = classify_item(&classifier, &item(), Duration::from_millis(10)).await;
        assert!(matches!(
            result,
            Err(AuditError::ClassifierTimeout { .. })
        ));
    }
}
