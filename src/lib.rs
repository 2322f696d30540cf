// ==========================================
// 门诊号源分配系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 门诊号源的优先级分配与动态重分配引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体、类型与时段名单
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 分配 / 急诊 / 重分配规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 服务门面
pub mod api;

// 应用层 - 组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    PriorityRank, TokenSource, TokenStatus, TransitionReason, UnknownSourceError, VictimPolicy,
};

// 领域实体
pub use domain::{Doctor, Patient, SlotContext, SlotLedger, TimeSlot, Token, TokenTransition};

// 引擎
pub use engine::{
    AllocationEngine, EmergencyAdmission, PriorityClassifier, ReallocationEngine,
    SlotLockRegistry,
};

// API
pub use api::{ApiError, PatientInput, ScheduleApi, TokenApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "门诊号源分配系统";
