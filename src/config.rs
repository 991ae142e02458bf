use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 规则库 (SQLite) 连接串
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// 覆盖规则 CSV 路径 (缺失时覆盖层为空)
    pub overrides_path: String,
    /// 建议正式更正的影响额阈值
    pub amendment_threshold: BigDecimal,
    /// 分类器调用超时 (秒)
    pub classifier_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://rules.db".to_string(),
            },
            audit: AuditConfig {
                overrides_path: "override_rules.csv".to_string(),
                amendment_threshold: default_threshold(),
                classifier_timeout_secs: 30,
            },
        }
    }
}

fn default_threshold() -> BigDecimal {
    BigDecimal::from(100)
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            database: DatabaseConfig {
                url: std::env::var("RULES_DB_URL")
                    .unwrap_or_else(|_| "sqlite://rules.db".to_string()),
            },
            audit: AuditConfig {
                overrides_path: std::env::var("OVERRIDES_CSV")
                    .unwrap_or_else(|_| "override_rules.csv".to_string()),
                amendment_threshold: std::env::var("AUDIT_AMENDMENT_THRESHOLD")
                    .ok()
                    .and_then(|v| BigDecimal::from_str(&v).ok())
                    .unwrap_or_else(default_threshold),
                classifier_timeout_secs: std::env::var("CLASSIFIER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            },
        }
    }
}
