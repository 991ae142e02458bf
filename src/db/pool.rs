use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{ConnectOptions, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

/// 创建规则库连接池 (SQLite, 校验运行期间只读)
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let mut connect_options =
        SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    // 设置慢查询日志阈值为 5秒
    connect_options = connect_options
        .log_slow_statements(tracing::log::LevelFilter::Warn, Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await
}
