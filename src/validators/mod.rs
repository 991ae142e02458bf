pub mod cfop;
pub mod ncm;
pub mod pis_cofins;
pub mod state;
pub mod totals;

pub use cfop::CfopValidator;
pub use ncm::NcmValidator;
pub use pis_cofins::TaxRateValidator;
pub use state::JurisdictionValidator;
pub use totals::TotalsValidator;

use crate::error::AuditError;
use crate::models::invoice::Invoice;
use crate::rules::RuleResolver;

/// 校验管线 (Validator Pipeline)
///
/// 固定顺序: NCM -> PIS/COFINS -> CFOP (逐行) -> 合计 (发票级) -> 州级 (逐 UF 逐行)。
/// 错误按执行顺序拼接到 invoice.validation_errors, 永不去重/重排;
/// 单张发票的校验是同步顺序的, 规则数据全程只读。
pub struct ValidatorPipeline<'a> {
    resolver: &'a RuleResolver,
}

impl<'a> ValidatorPipeline<'a> {
    pub fn new(resolver: &'a RuleResolver) -> Self {
        Self { resolver }
    }

    pub async fn run(&self, invoice: &mut Invoice) -> Result<(), AuditError> {
        let mut collected = Vec::new();

        let ncm = NcmValidator::new(self.resolver);
        for item in &invoice.items {
            collected.extend(ncm.validate(item, invoice).await?);
        }

        let tax = TaxRateValidator::new(self.resolver);
        for item in &invoice.items {
            collected.extend(tax.validate(item, invoice).await?);
        }

        let cfop = CfopValidator::new(self.resolver);
        for item in &invoice.items {
            collected.extend(cfop.validate(item, invoice).await?);
        }

        let totals = TotalsValidator::new(self.resolver);
        collected.extend(totals.validate(invoice).await?);

        for uf in jurisdictions(invoice) {
            let validator = JurisdictionValidator::new(self.resolver, uf);
            for item in &invoice.items {
                collected.extend(validator.validate(item, invoice).await?);
            }
        }

        tracing::debug!(
            "invoice {} validated: {} finding(s)",
            invoice.access_key,
            collected.len()
        );
        invoice.validation_errors.extend(collected);
        Ok(())
    }
}

/// 触发州级校验的 UF 列表: 发货方在前, 收货方不同则随后
fn jurisdictions(invoice: &Invoice) -> Vec<String> {
    let mut ufs = vec![invoice.issuer.uf.clone()];
    if invoice.recipient.uf != invoice.issuer.uf {
        ufs.push(invoice.recipient.uf.clone());
    }
    ufs
}

/// 校验器单元测试共用的夹具
#[cfg(test)]
pub(crate) mod test_support {
    use bigdecimal::BigDecimal;
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    use crate::models::invoice::{Invoice, Item, OperationNature, Party, TaxFields, Totals};

    pub(crate) fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    /// 合规基准行: NCM 17019900, CFOP 5102, 100 × 8.00 = 800.00,
    /// PIS 1.65% = 13.20, COFINS 7.60% = 60.80
    pub(crate) fn sample_item(number: u32, ncm: &str, description: &str) -> Item {
        Item {
            number,
            product_code: format!("P{:03}", number),
            description: description.to_string(),
            ncm: ncm.to_string(),
            cfop: "5102".to_string(),
            unit: "KG".to_string(),
            quantity: dec("100"),
            unit_price: dec("8.00"),
            line_total: dec("800.00"),
            pis: TaxFields {
                cst: "01".to_string(),
                rate: dec("1.65"),
                value: dec("13.20"),
            },
            cofins: TaxFields {
                cst: "01".to_string(),
                rate: dec("7.60"),
                value: dec("60.80"),
            },
            icms: None,
        }
    }

    pub(crate) fn sample_item_with_cfop(number: u32, cfop: &str) -> Item {
        let mut item = sample_item(number, "17019900", "Acucar cristal");
        item.cfop = cfop.to_string();
        item
    }

    pub(crate) fn sample_invoice(issuer_uf: &str, recipient_uf: &str) -> Invoice {
        Invoice {
            access_key: "35240112345678000199550010000012341000012349".to_string(),
            number: "1234".to_string(),
            series: "1".to_string(),
            issued_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            issuer: Party {
                tax_id: "12345678000199".to_string(),
                legal_name: "Usina Alfa SA".to_string(),
                uf: issuer_uf.to_string(),
            },
            recipient: Party {
                tax_id: "98765432000188".to_string(),
                legal_name: "Distribuidora Beta Ltda".to_string(),
                uf: recipient_uf.to_string(),
            },
            nature: OperationNature::Sale,
            items: Vec::new(),
            totals: Totals {
                products_total: dec("0.00"),
                invoice_total: None,
                pis_total: None,
                cofins_total: None,
                icms_total: None,
            },
            validation_errors: Vec::new(),
        }
    }

    /// 合计与行数据自洽的发票
    pub(crate) fn sample_invoice_with_items(items: Vec<Item>) -> Invoice {
        let mut invoice = sample_invoice("SP", "SP");
        let mut products = dec("0");
        let mut pis = dec("0");
        let mut cofins = dec("0");
        for item in &items {
            products += &item.line_total;
            pis += &item.pis.value;
            cofins += &item.cofins.value;
        }
        invoice.totals.products_total = products;
        invoice.totals.pis_total = Some(pis);
        invoice.totals.cofins_total = Some(cofins);
        invoice.items = items;
        invoice
    }
}
