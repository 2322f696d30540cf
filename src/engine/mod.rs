// ==========================================
// 门诊号源分配系统 - 引擎层
// ==========================================
// 职责: 实现分配/急诊/重分配规则,不拼 SQL
// 红线: 引擎无状态, 每次调用只读写一个 SlotContext
// 红线: 所有状态变更必须输出 TokenTransition
// ==========================================

pub mod allocation;
pub mod emergency;
pub mod error;
pub mod events;
pub mod id;
pub mod priority;
pub mod reallocation;
pub mod slot_locks;

// 重导出核心引擎
pub use allocation::{
    AllocationEngine, AllocationOutcome, AllocationRequest, Displacement, Placement,
};
pub use emergency::EmergencyAdmission;
pub use error::{EngineError, EngineResult};
pub use events::{NoOpEventPublisher, TokenEventPublisher};
pub use id::{TokenIdGenerator, UuidTokenIdGenerator};
pub use priority::PriorityClassifier;
pub use reallocation::{
    Promotion, ReallocationEngine, ReleaseEffect, ReleaseKind, ReleaseOutcome,
};
pub use slot_locks::SlotLockRegistry;
