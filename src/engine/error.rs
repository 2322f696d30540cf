// ==========================================
// 门诊号源分配系统 - 引擎层错误类型
// ==========================================

use crate::domain::ledger::LedgerError;
use crate::domain::types::{TokenSource, UnknownSourceError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 调用方错误: 在任何变更之前拒绝
    #[error(transparent)]
    UnknownSource(#[from] UnknownSourceError),

    /// 名单不变量被破坏 (含 CapacityExceeded), 属于程序缺陷
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("号源不属于该时段: slot_id={slot_id}, token_id={token_id}")]
    TokenNotInSlot { slot_id: String, token_id: String },

    #[error("号源 ID 已存在: {0}")]
    DuplicateToken(String),

    #[error("急诊通道只接受 EMERGENCY 来源, 实际为 {0}")]
    NotEmergency(TokenSource),

    /// 预计就诊时间超出日期范围 (平均接诊时长配置过大)
    #[error("预计就诊时间越界: slot_id={slot_id}, seq_no={seq_no}")]
    EstimateOutOfRange { slot_id: String, seq_no: u32 },
}

impl EngineError {
    /// 是否为内部不变量违反 (需要 error! 级别日志)
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EngineError::Ledger(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
