// ==========================================
// 门诊号源分配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、时段名单聚合
// 红线: 不含数据访问逻辑,不含分配策略
// ==========================================

pub mod ledger;
pub mod patient;
pub mod slot;
pub mod token;
pub mod types;

// 重导出核心类型
pub use ledger::{LedgerEntry, LedgerError, SlotContext, SlotLedger};
pub use patient::Patient;
pub use slot::{Doctor, TimeSlot};
pub use token::{Token, TokenTransition};
pub use types::{
    PriorityRank, TokenSource, TokenStatus, TransitionReason, UnknownSourceError, VictimPolicy,
};
