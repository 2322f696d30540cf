// ==========================================
// 门诊号源分配系统 - 配置层
// ==========================================
// 职责: 系统配置管理 (平均就诊时长 / 默认容量 / 挤占策略)
// 存储: config_kv 表
// ==========================================

pub mod allocation_policy;
pub mod config_manager;

// 重导出核心配置管理器
pub use allocation_policy::AllocationPolicy;
pub use config_manager::{config_keys, ConfigManager};
