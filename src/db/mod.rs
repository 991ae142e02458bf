pub mod pool;
pub mod store;

pub use pool::create_pool;
pub use store::RuleStore;

/// 单元测试共用的内存规则库 (单连接池, 否则每个连接各自一份 :memory: 数据库)
#[cfg(test)]
pub(crate) mod test_support {
    use super::store::RuleStore;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn memory_store() -> RuleStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let store = RuleStore::new(pool);
        store.ensure_schema().await.expect("schema");
        store
    }

    pub(crate) async fn insert_ncm(
        store: &RuleStore,
        ncm: &str,
        description: &str,
        keywords: &str,
        allowed_csts: Option<&str>,
        pis_rate: Option<&str>,
        cofins_rate: Option<&str>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO ncm_rules (ncm, description, keywords, regime, allowed_csts,
                                   pis_rate, cofins_rate, legal_reference)
            VALUES (?, ?, ?, 'NON_CUMULATIVE', ?, ?, ?, 'Tabela NCM/TIPI')
            "#,
        )
        .bind(ncm)
        .bind(description)
        .bind(keywords)
        .bind(allowed_csts)
        .bind(pis_rate)
        .bind(cofins_rate)
        .execute(store.pool())
        .await
        .expect("insert ncm rule");
    }

    pub(crate) async fn insert_cst(
        store: &RuleStore,
        cst: &str,
        situation: &str,
        pis_rate: &str,
        cofins_rate: &str,
    ) {
        sqlx::query(
            r#"
            INSERT INTO cst_rules (cst, description, situation, pis_rate, cofins_rate,
                                   legal_reference)
            VALUES (?, 'Operacao tributavel', ?, ?, ?, 'Lei 10.637/2002')
            "#,
        )
        .bind(cst)
        .bind(situation)
        .bind(pis_rate)
        .bind(cofins_rate)
        .execute(store.pool())
        .await
        .expect("insert cst rule");
    }

    pub(crate) async fn insert_cfop(
        store: &RuleStore,
        cfop: &str,
        scope: &str,
        nature: Option<&str>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO cfop_rules (cfop, description, scope, nature, legal_reference)
            VALUES (?, 'Venda de producao', ?, ?, 'Ajuste SINIEF 07/05')
            "#,
        )
        .bind(cfop)
        .bind(scope)
        .bind(nature)
        .execute(store.pool())
        .await
        .expect("insert cfop rule");
    }

    pub(crate) async fn insert_state_override(
        store: &RuleStore,
        uf: &str,
        ncm: Option<&str>,
        override_type: &str,
        rate: Option<&str>,
        reduction_rate: Option<&str>,
        severity_ceiling: Option<&str>,
    ) {
        sqlx::query(
            r#"
            INSERT INTO state_overrides (uf, ncm, override_type, rule_name, rate,
                                         reduction_rate, severity_ceiling, legal_reference)
            VALUES (?, ?, ?, 'regra estadual', ?, ?, ?, 'RICMS')
            "#,
        )
        .bind(uf)
        .bind(ncm)
        .bind(override_type)
        .bind(rate)
        .bind(reduction_rate)
        .bind(severity_ceiling)
        .execute(store.pool())
        .await
        .expect("insert state override");
    }

    pub(crate) async fn insert_legal_ref(
        store: &RuleStore,
        code: &str,
        ref_type: &str,
        number: &str,
        year: &str,
        title: &str,
    ) {
        sqlx::query(
            r#"
            INSERT INTO legal_refs (code, ref_type, number, year, title)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(code)
        .bind(ref_type)
        .bind(number)
        .bind(year)
        .bind(title)
        .execute(store.pool())
        .await
        .expect("insert legal ref");
    }
}
