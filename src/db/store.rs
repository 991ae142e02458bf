use bigdecimal::BigDecimal;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use crate::models::error::Severity;
use crate::models::invoice::OperationNature;
use crate::models::rule::{
    split_list, CfopRule, CstRule, NcmRule, OperationScope, SituationKind, StateOverride,
};
use crate::models::OverrideKind;

/// 规则库建表语句 (幂等; 行数据由外部工具填充)
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS ncm_rules (
        ncm             TEXT PRIMARY KEY,
        description     TEXT NOT NULL DEFAULT '',
        keywords        TEXT,
        regime          TEXT,
        allowed_csts    TEXT,
        pis_rate        TEXT,
        cofins_rate     TEXT,
        legal_reference TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cst_rules (
        cst             TEXT PRIMARY KEY,
        description     TEXT NOT NULL DEFAULT '',
        situation       TEXT,
        pis_rate        TEXT,
        cofins_rate     TEXT,
        legal_reference TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cfop_rules (
        cfop            TEXT PRIMARY KEY,
        description     TEXT NOT NULL DEFAULT '',
        scope           TEXT,
        nature          TEXT,
        legal_reference TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS state_overrides (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        uf               TEXT NOT NULL,
        ncm              TEXT,
        override_type    TEXT NOT NULL,
        rule_name        TEXT,
        rate             TEXT,
        reduction_rate   TEXT,
        severity_ceiling TEXT,
        legal_reference  TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS legal_refs (
        code     TEXT PRIMARY KEY,
        ref_type TEXT,
        number   TEXT,
        year     TEXT,
        title    TEXT
    )
    "#,
];

/// 规则库适配器 (Rule Store)
///
/// 键按 TEXT 位相等比较; 税率列按 TEXT 存储, 解码为 BigDecimal 保持位精确
/// (SQLite 无十进制类型, 浮点中转会破坏定点值)。
#[derive(Debug, Clone)]
pub struct RuleStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct NcmRuleRow {
    ncm: String,
    description: String,
    keywords: Option<String>,
    regime: Option<String>,
    allowed_csts: Option<String>,
    pis_rate: Option<String>,
    cofins_rate: Option<String>,
    legal_reference: Option<String>,
}

#[derive(Debug, FromRow)]
struct CstRuleRow {
    cst: String,
    description: String,
    situation: Option<String>,
    pis_rate: Option<String>,
    cofins_rate: Option<String>,
    legal_reference: Option<String>,
}

#[derive(Debug, FromRow)]
struct CfopRuleRow {
    cfop: String,
    description: String,
    scope: Option<String>,
    nature: Option<String>,
    legal_reference: Option<String>,
}

#[derive(Debug, FromRow)]
struct StateOverrideRow {
    uf: String,
    ncm: Option<String>,
    override_type: String,
    rule_name: Option<String>,
    rate: Option<String>,
    reduction_rate: Option<String>,
    severity_ceiling: Option<String>,
    legal_reference: Option<String>,
}

#[derive(Debug, FromRow)]
struct LegalRefRow {
    ref_type: Option<String>,
    number: Option<String>,
    year: Option<String>,
    title: Option<String>,
}

/// TEXT -> BigDecimal; 非法值按缺席处理并告警
fn parse_rate(raw: Option<String>) -> Option<BigDecimal> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match BigDecimal::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("rule store rate '{}' is not a decimal, ignoring", trimmed);
            None
        }
    }
}

impl From<NcmRuleRow> for NcmRule {
    fn from(row: NcmRuleRow) -> Self {
        NcmRule {
            ncm: row.ncm,
            description: row.description,
            keywords: row.keywords.as_deref().map(split_list).unwrap_or_default(),
            regime: row.regime,
            allowed_csts: row
                .allowed_csts
                .as_deref()
                .map(split_list)
                .unwrap_or_default(),
            pis_rate: parse_rate(row.pis_rate),
            cofins_rate: parse_rate(row.cofins_rate),
            legal_reference: row.legal_reference,
        }
    }
}

impl From<CstRuleRow> for CstRule {
    fn from(row: CstRuleRow) -> Self {
        CstRule {
            cst: row.cst,
            description: row.description,
            situation: row.situation.as_deref().and_then(SituationKind::parse),
            pis_rate: parse_rate(row.pis_rate),
            cofins_rate: parse_rate(row.cofins_rate),
            legal_reference: row.legal_reference,
        }
    }
}

impl From<CfopRuleRow> for CfopRule {
    fn from(row: CfopRuleRow) -> Self {
        CfopRule {
            cfop: row.cfop,
            description: row.description,
            scope: row.scope.as_deref().and_then(OperationScope::parse),
            nature: row.nature.as_deref().and_then(OperationNature::parse),
            legal_reference: row.legal_reference,
        }
    }
}

impl From<StateOverrideRow> for StateOverride {
    fn from(row: StateOverrideRow) -> Self {
        StateOverride {
            uf: row.uf,
            ncm: row.ncm,
            kind: OverrideKind::parse(&row.override_type).unwrap_or(OverrideKind::IcmsRate),
            rule_name: row.rule_name,
            rate: parse_rate(row.rate),
            reduction_rate: parse_rate(row.reduction_rate),
            severity_ceiling: row.severity_ceiling.as_deref().and_then(Severity::parse),
            legal_reference: row.legal_reference,
        }
    }
}

impl RuleStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 幂等建表, 进程启动时执行一次
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for ddl in SCHEMA {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn get_ncm_rule(&self, ncm: &str) -> Result<Option<NcmRule>, sqlx::Error> {
        let row = sqlx::query_as::<_, NcmRuleRow>(
            r#"
            SELECT ncm, description, keywords, regime, allowed_csts,
                   pis_rate, cofins_rate, legal_reference
            FROM ncm_rules
            WHERE ncm = ?
            "#,
        )
        .bind(ncm)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(NcmRule::from))
    }

    pub async fn get_cst_rule(&self, cst: &str) -> Result<Option<CstRule>, sqlx::Error> {
        let row = sqlx::query_as::<_, CstRuleRow>(
            r#"
            SELECT cst, description, situation, pis_rate, cofins_rate, legal_reference
            FROM cst_rules
            WHERE cst = ?
            "#,
        )
        .bind(cst)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CstRule::from))
    }

    pub async fn get_cfop_rule(&self, cfop: &str) -> Result<Option<CfopRule>, sqlx::Error> {
        let row = sqlx::query_as::<_, CfopRuleRow>(
            r#"
            SELECT cfop, description, scope, nature, legal_reference
            FROM cfop_rules
            WHERE cfop = ?
            "#,
        )
        .bind(cfop)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(CfopRule::from))
    }

    /// 州级覆盖: 精确 (uf, ncm) 加全州规则 (ncm IS NULL)
    pub async fn get_state_overrides(
        &self,
        uf: &str,
        ncm: &str,
    ) -> Result<Vec<StateOverride>, sqlx::Error> {
        let rows = sqlx::query_as::<_, StateOverrideRow>(
            r#"
            SELECT uf, ncm, override_type, rule_name, rate, reduction_rate,
                   severity_ceiling, legal_reference
            FROM state_overrides
            WHERE uf = ?
              AND (ncm = ? OR ncm IS NULL)
            ORDER BY override_type, id
            "#,
        )
        .bind(uf)
        .bind(ncm)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StateOverride::from).collect())
    }

    /// 格式化法律引文, 如 "Lei 10.637/2002 - PIS nao-cumulativo"
    pub async fn get_legal_citation(&self, code: &str) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query_as::<_, LegalRefRow>(
            r#"
            SELECT ref_type, number, year, title
            FROM legal_refs
            WHERE code = ?
            "#,
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            let ref_type = r.ref_type.unwrap_or_default();
            let number = r.number.unwrap_or_default();
            let year = r.year.unwrap_or_default();
            let title = r.title.unwrap_or_default();
            format!("{} {}/{} - {}", ref_type, number, year, title)
        }))
    }
}
