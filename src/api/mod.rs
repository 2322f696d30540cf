// ==========================================
// 门诊号源分配系统 - API 层
// ==========================================
// 职责: 面向调用方的服务门面 (纯 Rust, 不含 HTTP)
// 红线: 所有写操作经由时段锁 + SlotLedgerStore::commit
// ==========================================

pub mod dto;
pub mod error;
pub mod schedule_api;
pub mod token_api;

pub use dto::{
    AllocationResponse, CreateDoctorRequest, DoctorInfo, PatientInput, PatientTokens,
    ReleaseResponse, SlotStatus, SlotSummary, SlotWindow, SystemStats, TokenDetail, TokenView,
};
pub use error::{ApiError, ApiResult};
pub use schedule_api::ScheduleApi;
pub use token_api::TokenApi;
