// ==========================================
// 门诊号源分配系统 - 主入口
// ==========================================
// 职责: 初始化日志、打开/创建数据库、确保表结构、输出系统概况
// ==========================================

use opd_token_engine::app::{get_default_db_path, AppState};
use opd_token_engine::logging;

fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", opd_token_engine::APP_NAME);
    tracing::info!("系统版本: {}", opd_token_engine::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径 (命令行参数优先)
    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(get_default_db_path);
    tracing::info!("使用数据库: {}", db_path);

    let app_state = AppState::new(db_path).map_err(anyhow::Error::msg)?;

    let policy = app_state.config_manager.get_allocation_policy()?;
    tracing::info!(
        avg_consultation_minutes = policy.avg_consultation_minutes,
        victim_policy = %policy.victim_policy,
        "当前分配策略"
    );

    let stats = app_state.schedule_api.get_system_stats()?;
    tracing::info!(
        doctors = stats.doctors,
        patients = stats.patients,
        slots = stats.slots,
        confirmed = stats.tokens.confirmed,
        waitlisted = stats.tokens.waitlisted,
        cancelled = stats.tokens.cancelled,
        no_show = stats.tokens.no_show,
        "系统概况"
    );

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
