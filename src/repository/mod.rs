// ==========================================
// 门诊号源分配系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod doctor_repo;
pub mod error;
pub mod ledger_store;
pub mod patient_repo;
pub mod slot_repo;
pub mod token_repo;

// 重导出核心仓储
pub use doctor_repo::DoctorRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use ledger_store::{SlotLedgerStore, SqliteSlotLedgerStore};
pub use patient_repo::PatientRepository;
pub use slot_repo::TimeSlotRepository;
pub use token_repo::{TokenRepository, TokenStatusCounts};
