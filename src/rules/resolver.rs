use dashmap::DashMap;
use std::sync::Arc;

use crate::db::RuleStore;
use crate::error::AuditError;
use crate::models::rule::{CfopRule, CstRule, NcmRule, RuleLookup, RuleRecord, StateOverride};

use super::overrides::OverrideLayer;

/// 规则解析器 (Rule Resolver)
///
/// 严格优先级, 非合并: 覆盖层精确命中则整条返回 (即使记录不完整也不向
/// 规则库做字段级回落); 否则查规则库; 都未命中返回 None (NotFound 不是错误,
/// 校验器自行降级)。解析缓存保证同一运行内同键结果一致。
///
/// 生命周期归批处理所有: 每次运行由调用方显式构造并传给校验管线,
/// 不存在跨请求的环境级缓存。外部分类器永远不会被这里咨询。
pub struct RuleResolver {
    overrides: Arc<OverrideLayer>,
    store: RuleStore,
    cache: DashMap<RuleLookup, Option<RuleRecord>>,
    citations: DashMap<String, Option<String>>,
}

impl RuleResolver {
    pub fn new(overrides: Arc<OverrideLayer>, store: RuleStore) -> Self {
        Self {
            overrides,
            store,
            cache: DashMap::new(),
            citations: DashMap::new(),
        }
    }

    /// 统一查询入口: resolve(lookup) -> RuleRecord | NotFound
    pub async fn resolve(&self, lookup: RuleLookup) -> Result<Option<RuleRecord>, AuditError> {
        if let Some(hit) = self.cache.get(&lookup) {
            return Ok(hit.value().clone());
        }
        let resolved = self.resolve_uncached(&lookup).await?;
        self.cache.insert(lookup, resolved.clone());
        Ok(resolved)
    }

    async fn resolve_uncached(
        &self,
        lookup: &RuleLookup,
    ) -> Result<Option<RuleRecord>, AuditError> {
        match lookup {
            RuleLookup::Ncm(ncm) => {
                if let Some(rule) = self.overrides.get_ncm(ncm) {
                    return Ok(Some(RuleRecord::Ncm(rule.clone())));
                }
                Ok(self.store.get_ncm_rule(ncm).await?.map(RuleRecord::Ncm))
            }
            RuleLookup::Cst(cst) => {
                if let Some(rule) = self.overrides.get_cst(cst) {
                    return Ok(Some(RuleRecord::Cst(rule.clone())));
                }
                Ok(self.store.get_cst_rule(cst).await?.map(RuleRecord::Cst))
            }
            RuleLookup::Cfop(cfop) => {
                if let Some(rule) = self.overrides.get_cfop(cfop) {
                    return Ok(Some(RuleRecord::Cfop(rule.clone())));
                }
                Ok(self.store.get_cfop_rule(cfop).await?.map(RuleRecord::Cfop))
            }
            RuleLookup::State { uf, ncm } => {
                if let Some(rules) = self.overrides.get_state(uf, ncm) {
                    return Ok(Some(RuleRecord::State(rules.to_vec())));
                }
                let rules = self.store.get_state_overrides(uf, ncm).await?;
                Ok(if rules.is_empty() {
                    None
                } else {
                    Some(RuleRecord::State(rules))
                })
            }
        }
    }

    pub async fn ncm_rule(&self, ncm: &str) -> Result<Option<NcmRule>, AuditError> {
        Ok(self
            .resolve(RuleLookup::Ncm(ncm.to_string()))
            .await?
            .and_then(|r| r.as_ncm().cloned()))
    }

    pub async fn cst_rule(&self, cst: &str) -> Result<Option<CstRule>, AuditError> {
        Ok(self
            .resolve(RuleLookup::Cst(cst.to_string()))
            .await?
            .and_then(|r| r.as_cst().cloned()))
    }

    pub async fn cfop_rule(&self, cfop: &str) -> Result<Option<CfopRule>, AuditError> {
        Ok(self
            .resolve(RuleLookup::Cfop(cfop.to_string()))
            .await?
            .and_then(|r| r.as_cfop().cloned()))
    }

    /// 州级覆盖; 无规则返回空集 (不是错误)
    pub async fn state_rules(
        &self,
        uf: &str,
        ncm: &str,
    ) -> Result<Vec<StateOverride>, AuditError> {
        Ok(self
            .resolve(RuleLookup::State {
                uf: uf.to_string(),
                ncm: ncm.to_string(),
            })
            .await?
            .and_then(|r| r.as_state().map(<[StateOverride]>::to_vec))
            .unwrap_or_default())
    }

    /// 法律引文; 未收录时原样返回代码
    pub async fn citation(&self, code: &str) -> Result<String, AuditError> {
        if let Some(hit) = self.citations.get(code) {
            return Ok(hit.value().clone().unwrap_or_else(|| code.to_string()));
        }
        let formatted = self.store.get_legal_citation(code).await?;
        self.citations.insert(code.to_string(), formatted.clone());
        Ok(formatted.unwrap_or_else(|| code.to_string()))
    }
}
