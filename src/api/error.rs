// ==========================================
// 门诊号源分配系统 - API层错误类型
// ==========================================
// 职责: 统一各层错误, 转换为调用方可区分的错误消息
// 说明: 幂等无操作 (重复取消/无候补可晋升) 是成功结果, 不在此列
// ==========================================

use crate::domain::ledger::LedgerError;
use crate::domain::types::UnknownSourceError;
use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;
use tracing::error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 调用方错误 (变更前拒绝)
    // ==========================================
    #[error(transparent)]
    UnknownSource(#[from] UnknownSourceError),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("时段未找到: {0}")]
    SlotNotFound(String),

    #[error("号源未找到: {0}")]
    TokenNotFound(String),

    #[error("医生未找到: {0}")]
    DoctorNotFound(String),

    #[error("就诊人未找到: {0}")]
    PatientNotFound(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    // ==========================================
    // 内部不变量违反 (程序缺陷)
    // ==========================================
    #[error("时段名单不变量违反: {0}")]
    InvariantViolation(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::SlotNotFound(id) => ApiError::SlotNotFound(id),
            RepositoryError::TokenNotFound(id) => ApiError::TokenNotFound(id),
            RepositoryError::DoctorNotFound(id) => ApiError::DoctorNotFound(id),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }

            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            RepositoryError::DataIntegrityViolation(msg) => {
                error!(reason = %msg, "持久化数据违反时段名单不变量");
                ApiError::InvariantViolation(msg)
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}错误: {}", field, message))
            }

            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        if err.is_invariant_violation() {
            if let EngineError::Ledger(LedgerError::CapacityExceeded { slot_id, capacity }) = &err {
                error!(
                    slot_id = %slot_id,
                    capacity = *capacity,
                    "确认名单插入越过容量上限, 分配逻辑存在缺陷"
                );
            } else {
                error!(reason = %err, "时段名单不变量违反");
            }
            return ApiError::InvariantViolation(err.to_string());
        }

        match err {
            EngineError::UnknownSource(e) => ApiError::UnknownSource(e),
            EngineError::Ledger(e) => ApiError::InvariantViolation(e.to_string()),
            EngineError::TokenNotInSlot { token_id, .. } => ApiError::TokenNotFound(token_id),
            EngineError::DuplicateToken(id) => {
                ApiError::BusinessRuleViolation(format!("号源 ID 已存在: {}", id))
            }
            EngineError::NotEmergency(source) => {
                ApiError::InvalidInput(format!("急诊通道不接受来源 {}", source))
            }
            EngineError::EstimateOutOfRange { slot_id, seq_no } => {
                ApiError::BusinessRuleViolation(format!(
                    "预计就诊时间越界, 请检查平均接诊时长配置: slot_id={}, seq_no={}",
                    slot_id, seq_no
                ))
            }
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
