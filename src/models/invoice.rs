use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{Severity, ValidationError};

/// 企业主体 (发货方/收货方)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// 税号 (CNPJ, 固定宽度字符串, 保留前导零)
    pub tax_id: String,
    pub legal_name: String,
    /// 州代码 (UF)
    pub uf: String,
}

/// 单一贡献税字段 (PIS / COFINS)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxFields {
    /// 税务情形代码 (CST, 2 位)
    pub cst: String,
    /// 申报税率 (定点, 2 位小数)
    pub rate: BigDecimal,
    /// 申报税额
    pub value: BigDecimal,
}

/// ICMS 税率/税额对; 源数据缺列时整体缺席, 不得与零混同
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IcmsFields {
    pub rate: BigDecimal,
    pub value: BigDecimal,
}

/// 交易性质
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationNature {
    Sale,
    Purchase,
    Transfer,
    Return,
}

impl OperationNature {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SALE" => Some(OperationNature::Sale),
            "PURCHASE" => Some(OperationNature::Purchase),
            "TRANSFER" => Some(OperationNature::Transfer),
            "RETURN" => Some(OperationNature::Return),
            _ => None,
        }
    }
}

impl fmt::Display for OperationNature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationNature::Sale => "SALE",
            OperationNature::Purchase => "PURCHASE",
            OperationNature::Transfer => "TRANSFER",
            OperationNature::Return => "RETURN",
        };
        f.write_str(s)
    }
}

/// 发票明细行 (Item)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub number: u32,
    pub product_code: String,
    pub description: String,
    /// 商品分类编码 (NCM, 8 位)
    pub ncm: String,
    /// 业务操作编码 (CFOP, 4 位)
    pub cfop: String,
    #[serde(default)]
    pub unit: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    /// 申报行合计
    pub line_total: BigDecimal,
    pub pis: TaxFields,
    pub cofins: TaxFields,
    #[serde(default)]
    pub icms: Option<IcmsFields>,
}

impl Item {
    /// 规范化 NCM: 去掉分隔符, 纯数字不足 8 位时右侧补零
    pub fn normalized_ncm(&self) -> String {
        let cleaned: String = self
            .ncm
            .chars()
            .filter(|c| *c != '.' && *c != '-')
            .collect();
        if !cleaned.is_empty()
            && cleaned.len() < 8
            && cleaned.chars().all(|c| c.is_ascii_digit())
        {
            format!("{:0<8}", cleaned)
        } else {
            cleaned
        }
    }

    /// 规范化 CFOP: 去掉分隔符
    pub fn normalized_cfop(&self) -> String {
        self.cfop.chars().filter(|c| *c != '.').collect()
    }

    /// 税基 (数量 × 单价)
    pub fn base_amount(&self) -> BigDecimal {
        &self.quantity * &self.unit_price
    }
}

/// 发票合计 (Totals); 发票级税额合计可缺席, 缺席不参与校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub products_total: BigDecimal,
    #[serde(default)]
    pub invoice_total: Option<BigDecimal>,
    #[serde(default)]
    pub pis_total: Option<BigDecimal>,
    #[serde(default)]
    pub cofins_total: Option<BigDecimal>,
    #[serde(default)]
    pub icms_total: Option<BigDecimal>,
}

/// 电子发票 (Invoice)
///
/// 由外部解析器构造一次; 校验管线只追加 validation_errors, 其余字段只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// 访问密钥 (44 位数字字符串, 永不按数值解析)
    pub access_key: String,
    pub number: String,
    pub series: String,
    pub issued_at: DateTime<Utc>,
    pub issuer: Party,
    pub recipient: Party,
    pub nature: OperationNature,
    pub items: Vec<Item>,
    pub totals: Totals,
    #[serde(default)]
    pub validation_errors: Vec<ValidationError>,
}

impl Invoice {
    /// 州际交易: 双方 UF 不同
    pub fn is_interstate(&self) -> bool {
        self.issuer.uf != self.recipient.uf
    }

    /// 追加校验错误 (只追加, 永不覆盖)
    pub fn add_validation_error(&mut self, error: ValidationError) {
        self.validation_errors.push(error);
    }

    pub fn errors_with_severity(&self, severity: Severity) -> usize {
        self.validation_errors
            .iter()
            .filter(|e| e.severity == severity)
            .count()
    }

    /// 全部错误的财务影响合计 (null 视为零)
    pub fn total_financial_impact(&self) -> BigDecimal {
        self.validation_errors
            .iter()
            .filter_map(|e| e.financial_impact.as_ref())
            .fold(BigDecimal::zero(), |acc, v| acc + v)
    }
}
