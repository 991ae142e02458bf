use axum::{
    routing::{get, post},
    Router,
};
use nfe_audit_rust::{api, create_pool, AppConfig, AuditService, OverrideLayer, RuleStore};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    // 打开规则库 (进程内一次, 运行期间只读)
    let pool = create_pool(&config.database.url).await?;
    let store = RuleStore::new(pool);
    store.ensure_schema().await?;
    info!("Rule store ready at {}", config.database.url);

    // 覆盖规则层 (会话边界加载一次)
    let overrides = Arc::new(OverrideLayer::load(Path::new(&config.audit.overrides_path))?);

    // 审计服务
    let service = Arc::new(AuditService::new(
        store,
        overrides,
        config.audit.amendment_threshold.clone(),
    ));

    // 构建路由
    let app = Router::new()
        .route("/health", get(api::health_check))
        .route("/api/audit/batch", post(api::audit_batch))
        .with_state(service)
        .layer(ServiceBuilder::new());

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/audit/batch - audit a batch of invoices");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
