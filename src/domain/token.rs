// ==========================================
// 门诊号源分配系统 - 号源领域模型
// ==========================================
// 红线: created_at 与 priority 创建后不可变 (降级也不改变)
// ==========================================

use crate::domain::types::{PriorityRank, TokenSource, TokenStatus, TransitionReason};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Token - 号源
// ==========================================
// 一名就诊人对一个时段的占用请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    // ===== 主键 =====
    pub token_id: String,
    pub slot_id: String, // 所属时段

    // ===== 请求信息 =====
    pub patient_id: String,      // 就诊人
    pub source: TokenSource,     // 来源
    pub priority: PriorityRank,  // 优先级 (由来源决定)

    // ===== 当前状态 =====
    pub status: TokenStatus,
    pub seq_no: Option<u32>,                     // 就诊序号 (仅 CONFIRMED)
    pub estimated_time: Option<NaiveDateTime>,   // 预计就诊时间 (仅 CONFIRMED)

    // ===== 时间戳 =====
    pub created_at: DateTime<Utc>, // FIFO 排序依据
    pub updated_at: DateTime<Utc>,
}

impl Token {
    /// 创建新号源
    ///
    /// 初始状态为 WAITLISTED, 最终状态由 SlotLedger 插入时决定
    pub fn new(
        token_id: String,
        slot_id: String,
        patient_id: String,
        source: TokenSource,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id,
            slot_id,
            patient_id,
            source,
            priority: source.rank(),
            status: TokenStatus::Waitlisted,
            seq_no: None,
            estimated_time: None,
            created_at,
            updated_at: created_at,
        }
    }
}

// ==========================================
// TokenTransition - 状态转换记录
// ==========================================
// 用途: 审计追踪 + 事件发布
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransition {
    pub token_id: String,
    pub slot_id: String,
    pub from_status: Option<TokenStatus>, // 创建时为 None
    pub to_status: TokenStatus,
    pub reason: TransitionReason,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl TokenTransition {
    pub fn new(
        token: &Token,
        from_status: Option<TokenStatus>,
        reason: TransitionReason,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: token.token_id.clone(),
            slot_id: token.slot_id.clone(),
            from_status,
            to_status: token.status,
            reason,
            detail: None,
            at,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
