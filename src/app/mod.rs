// ==========================================
// 门诊号源分配系统 - 应用层
// ==========================================
// 职责: 组装各层, 供可执行程序与集成测试使用
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState};
