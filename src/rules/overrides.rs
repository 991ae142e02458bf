use bigdecimal::BigDecimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::error::AuditError;
use crate::models::error::Severity;
use crate::models::invoice::OperationNature;
use crate::models::rule::{
    split_list, CfopRule, CstRule, NcmRule, OperationScope, OverrideKind, SituationKind,
    StateOverride,
};

/// 覆盖规则文件的平面行; 除判别列外全部可缺席
#[derive(Debug, Deserialize)]
struct OverrideRow {
    /// NCM | CST | CFOP | STATE
    rule_type: String,
    /// 与规则库同语义的查询键 (NCM/CST/CFOP 编码; STATE 行为 NCM 编码)
    key: String,
    #[serde(default)]
    uf: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Option<String>,
    #[serde(default)]
    regime: Option<String>,
    #[serde(default)]
    allowed_csts: Option<String>,
    #[serde(default)]
    situation: Option<String>,
    #[serde(default)]
    pis_rate: Option<String>,
    #[serde(default)]
    cofins_rate: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    nature: Option<String>,
    #[serde(default)]
    override_type: Option<String>,
    #[serde(default)]
    rate: Option<String>,
    #[serde(default)]
    reduction_rate: Option<String>,
    #[serde(default)]
    severity_ceiling: Option<String>,
    #[serde(default)]
    rule_name: Option<String>,
    #[serde(default)]
    legal_reference: Option<String>,
}

fn parse_dec(raw: &Option<String>) -> Option<BigDecimal> {
    let raw = raw.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    match BigDecimal::from_str(raw) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("override rate '{}' is not a decimal, ignoring", raw);
            None
        }
    }
}

/// 内存覆盖规则层 (Override Layer)
///
/// 从可编辑的 CSV 加载一次, 相同查询键优先于规则库并整条生效;
/// 刷新只发生在会话边界 (重新构造), 批处理中途不变。
#[derive(Debug, Default)]
pub struct OverrideLayer {
    ncm: HashMap<String, NcmRule>,
    cst: HashMap<String, CstRule>,
    cfop: HashMap<String, CfopRule>,
    state: HashMap<(String, String), Vec<StateOverride>>,
}

impl OverrideLayer {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 从文件加载; 文件缺失时告警并返回空层 (覆盖层是可选的)
    pub fn load(path: &Path) -> Result<Self, AuditError> {
        if !path.exists() {
            tracing::warn!(
                "override file {} not found, override layer disabled",
                path.display()
            );
            return Ok(Self::empty());
        }
        let file = std::fs::File::open(path)?;
        let layer = Self::from_reader(file)?;
        tracing::info!(
            "override layer loaded: {} rules from {}",
            layer.len(),
            path.display()
        );
        Ok(layer)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AuditError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut layer = Self::empty();
        for (idx, record) in csv_reader.deserialize::<OverrideRow>().enumerate() {
            let row = record?;
            // 注释行与空键跳过
            if row.key.is_empty() || row.key.starts_with('#') || row.rule_type.starts_with('#') {
                continue;
            }
            if !layer.ingest(row) {
                tracing::warn!("override row {} has unknown rule_type, skipping", idx + 2);
            }
        }
        Ok(layer)
    }

    fn ingest(&mut self, row: OverrideRow) -> bool {
        match row.rule_type.trim().to_ascii_uppercase().as_str() {
            "NCM" => {
                let rule = NcmRule {
                    ncm: row.key.clone(),
                    description: row.description.clone().unwrap_or_default(),
                    keywords: row.keywords.as_deref().map(split_list).unwrap_or_default(),
                    regime: row.regime.clone(),
                    allowed_csts: row
                        .allowed_csts
                        .as_deref()
                        .map(split_list)
                        .unwrap_or_default(),
                    pis_rate: parse_dec(&row.pis_rate),
                    cofins_rate: parse_dec(&row.cofins_rate),
                    legal_reference: row.legal_reference.clone(),
                };
                self.ncm.insert(row.key, rule);
            }
            "CST" => {
                let rule = CstRule {
                    cst: row.key.clone(),
                    description: row.description.clone().unwrap_or_default(),
                    situation: row.situation.as_deref().and_then(SituationKind::parse),
                    pis_rate: parse_dec(&row.pis_rate),
                    cofins_rate: parse_dec(&row.cofins_rate),
                    legal_reference: row.legal_reference.clone(),
                };
                self.cst.insert(row.key, rule);
            }
            "CFOP" => {
                let rule = CfopRule {
                    cfop: row.key.clone(),
                    description: row.description.clone().unwrap_or_default(),
                    scope: row.scope.as_deref().and_then(OperationScope::parse),
                    nature: row.nature.as_deref().and_then(OperationNature::parse),
                    legal_reference: row.legal_reference.clone(),
                };
                self.cfop.insert(row.key, rule);
            }
            "STATE" => {
                let uf = match row.uf.as_deref() {
                    Some(uf) if !uf.is_empty() => uf.to_ascii_uppercase(),
                    _ => {
                        tracing::warn!("STATE override for ncm {} has no uf, skipping", row.key);
                        return true;
                    }
                };
                let kind = row
                    .override_type
                    .as_deref()
                    .and_then(OverrideKind::parse)
                    .unwrap_or(OverrideKind::IcmsRate);
                let rule = StateOverride {
                    uf: uf.clone(),
                    ncm: Some(row.key.clone()),
                    kind,
                    rule_name: row.rule_name.clone(),
                    rate: parse_dec(&row.rate),
                    reduction_rate: parse_dec(&row.reduction_rate),
                    severity_ceiling: row
                        .severity_ceiling
                        .as_deref()
                        .and_then(Severity::parse),
                    legal_reference: row.legal_reference.clone(),
                };
                self.state.entry((uf, row.key)).or_default().push(rule);
            }
            _ => return false,
        }
        true
    }

    pub fn len(&self) -> usize {
        self.ncm.len()
            + self.cst.len()
            + self.cfop.len()
            + self.state.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_ncm(&self, ncm: &str) -> Option<&NcmRule> {
        self.ncm.get(ncm)
    }

    pub fn get_cst(&self, cst: &str) -> Option<&CstRule> {
        self.cst.get(cst)
    }

    pub fn get_cfop(&self, cfop: &str) -> Option<&CfopRule> {
        self.cfop.get(cfop)
    }

    pub fn get_state(&self, uf: &str, ncm: &str) -> Option<&[StateOverride]> {
        self.state
            .get(&(uf.to_ascii_uppercase(), ncm.to_string()))
            .map(Vec::as_slice)
    }
}
