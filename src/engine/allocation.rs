// ==========================================
// 门诊号源分配系统 - 常规分配引擎
// ==========================================
// 红线: 常规通道只有两种结果: CONFIRMED 或 WAITLISTED, 从不拒绝
// 红线: 容量检查只在 SlotLedger::insert_confirmed 发生
// ==========================================
// 输入: SlotContext (调用方已持有时段锁) + 分配请求 + 分配策略
// 输出: AllocationOutcome (含状态转换记录)
// ==========================================

use crate::config::AllocationPolicy;
use crate::domain::ledger::SlotContext;
use crate::domain::slot::TimeSlot;
use crate::domain::token::{Token, TokenTransition};
use crate::domain::types::{PriorityRank, TokenSource, TransitionReason};
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ==========================================
// 请求与结果
// ==========================================

/// 分配请求 (ID 由调用方预先生成)
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationRequest {
    pub token_id: String,
    pub patient_id: String,
    pub source: TokenSource,
    pub requested_at: DateTime<Utc>,
}

/// 落位结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Placement {
    Confirmed {
        seq_no: u32,
        estimated_time: NaiveDateTime,
    },
    Waitlisted {
        position: usize,
        estimated_wait_minutes: u32,
    },
}

/// 急诊挤占记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Displacement {
    pub token_id: String,
    pub priority: PriorityRank,
    pub waitlist_position: usize, // 降级后的候补位置
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub token: Token,
    pub placement: Placement,
    pub displaced: Option<Displacement>,
    pub transitions: Vec<TokenTransition>,
}

// ==========================================
// 共用落位操作 (供急诊/重分配复用)
// ==========================================

/// 写入确认号源的预计就诊时间
///
/// 越界时返回 EstimateOutOfRange, 调用方丢弃整个 SlotContext
pub(crate) fn stamp_confirmed(
    slot: &TimeSlot,
    token: &mut Token,
    seq_no: u32,
    policy: &AllocationPolicy,
    at: DateTime<Utc>,
) -> EngineResult<NaiveDateTime> {
    let estimated_time = slot
        .estimated_time_for(seq_no, policy.avg_consultation_minutes)
        .ok_or_else(|| EngineError::EstimateOutOfRange {
            slot_id: slot.slot_id.clone(),
            seq_no,
        })?;
    token.estimated_time = Some(estimated_time);
    token.updated_at = at;
    Ok(estimated_time)
}

/// 由请求创建号源 (前置校验: ID 不得已存在)
pub(crate) fn new_token(ctx: &SlotContext, request: AllocationRequest) -> EngineResult<Token> {
    if ctx.tokens.contains_key(&request.token_id) || ctx.ledger.contains(&request.token_id) {
        return Err(EngineError::DuplicateToken(request.token_id));
    }
    Ok(Token::new(
        request.token_id,
        ctx.slot.slot_id.clone(),
        request.patient_id,
        request.source,
        request.requested_at,
    ))
}

/// 新号源进入确认名单
pub(crate) fn admit_confirmed(
    ctx: &mut SlotContext,
    mut token: Token,
    policy: &AllocationPolicy,
) -> EngineResult<(Token, Placement, TokenTransition)> {
    let at = token.created_at;
    let seq_no = ctx.ledger.insert_confirmed(&mut token)?;
    let estimated_time = stamp_confirmed(&ctx.slot, &mut token, seq_no, policy, at)?;

    let transition = TokenTransition::new(&token, None, TransitionReason::Admitted, at);
    ctx.tokens.insert(token.token_id.clone(), token.clone());

    Ok((
        token,
        Placement::Confirmed {
            seq_no,
            estimated_time,
        },
        transition,
    ))
}

/// 新号源进入候补名单
pub(crate) fn admit_waitlisted(
    ctx: &mut SlotContext,
    mut token: Token,
    policy: &AllocationPolicy,
    detail: Option<&str>,
) -> EngineResult<(Token, Placement, TokenTransition)> {
    let at = token.created_at;
    let position = ctx.ledger.insert_waitlisted(&mut token)?;
    token.updated_at = at;

    let mut transition = TokenTransition::new(&token, None, TransitionReason::Waitlisted, at);
    if let Some(detail) = detail {
        transition = transition.with_detail(detail);
    }
    ctx.tokens.insert(token.token_id.clone(), token.clone());

    Ok((
        token,
        Placement::Waitlisted {
            position,
            estimated_wait_minutes: policy.estimated_wait_minutes(position),
        },
        transition,
    ))
}

// ==========================================
// AllocationEngine - 常规分配引擎 (无状态)
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationEngine;

impl AllocationEngine {
    pub fn new() -> Self {
        Self
    }

    /// 常规分配
    ///
    /// 有余量 → CONFIRMED (序号 + 预计时间); 无余量 → WAITLISTED (位置 + 预计等待)
    pub fn allocate(
        &self,
        ctx: &mut SlotContext,
        request: AllocationRequest,
        policy: &AllocationPolicy,
    ) -> EngineResult<AllocationOutcome> {
        let token = new_token(ctx, request)?;

        debug!(
            slot_id = %ctx.slot.slot_id,
            available = ctx.ledger.available_capacity(),
            waitlist = ctx.ledger.waitlist().len(),
            "常规分配: 名单现状"
        );

        let (token, placement, transition) = if ctx.ledger.available_capacity() > 0 {
            admit_confirmed(ctx, token, policy)?
        } else {
            admit_waitlisted(ctx, token, policy, Some("时段已满"))?
        };

        info!(
            token_id = %token.token_id,
            slot_id = %token.slot_id,
            source = %token.source,
            status = %token.status,
            "号源已分配"
        );

        Ok(AllocationOutcome {
            token,
            placement,
            displaced: None,
            transitions: vec![transition],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TokenStatus;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn make_context(capacity: u32) -> SlotContext {
        SlotContext::new(TimeSlot {
            slot_id: "S1".to_string(),
            doctor_id: "D1".to_string(),
            slot_date: NaiveDate::from_ymd_opt(2026, 1, 29).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            max_capacity: capacity,
            next_seq_no: 1,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        })
    }

    fn request(id: &str, source: TokenSource, minute: u32) -> AllocationRequest {
        AllocationRequest {
            token_id: id.to_string(),
            patient_id: format!("PAT-{}", id),
            source,
            requested_at: Utc.with_ymd_and_hms(2026, 1, 29, 8, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_confirmed_gets_sequence_and_estimated_time() {
        let engine = AllocationEngine::new();
        let policy = AllocationPolicy::default();
        let mut ctx = make_context(3);

        engine
            .allocate(&mut ctx, request("T1", TokenSource::OnlineBooking, 0), &policy)
            .unwrap();
        let outcome = engine
            .allocate(&mut ctx, request("T2", TokenSource::WalkIn, 1), &policy)
            .unwrap();

        let expected = NaiveDate::from_ymd_opt(2026, 1, 29)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        assert_eq!(
            outcome.placement,
            Placement::Confirmed {
                seq_no: 2,
                estimated_time: expected
            }
        );
        assert_eq!(outcome.token.estimated_time, Some(expected));
        assert_eq!(outcome.transitions[0].reason, TransitionReason::Admitted);
        assert_eq!(outcome.transitions[0].from_status, None);
    }

    #[test]
    fn test_full_slot_waitlists_with_estimated_wait() {
        let engine = AllocationEngine::new();
        let policy = AllocationPolicy {
            avg_consultation_minutes: 7,
            ..AllocationPolicy::default()
        };
        let mut ctx = make_context(1);

        engine
            .allocate(&mut ctx, request("T1", TokenSource::WalkIn, 0), &policy)
            .unwrap();
        engine
            .allocate(&mut ctx, request("T2", TokenSource::WalkIn, 1), &policy)
            .unwrap();
        let outcome = engine
            .allocate(&mut ctx, request("T3", TokenSource::PaidPriority, 2), &policy)
            .unwrap();

        // 高优先级插到同时段候补之前
        assert_eq!(
            outcome.placement,
            Placement::Waitlisted {
                position: 1,
                estimated_wait_minutes: 7
            }
        );
        assert_eq!(outcome.token.status, TokenStatus::Waitlisted);
        assert_eq!(ctx.ledger.waitlist_position("T2"), Some(2));
        assert_eq!(ctx.ledger.confirmed().len(), 1);
        assert!(ctx.verify().is_ok());
    }

    #[test]
    fn test_duplicate_token_id_rejected_without_mutation() {
        let engine = AllocationEngine::new();
        let policy = AllocationPolicy::default();
        let mut ctx = make_context(2);

        engine
            .allocate(&mut ctx, request("T1", TokenSource::FollowUp, 0), &policy)
            .unwrap();
        let err = engine
            .allocate(&mut ctx, request("T1", TokenSource::FollowUp, 1), &policy)
            .unwrap_err();

        assert_eq!(err, EngineError::DuplicateToken("T1".to_string()));
        assert_eq!(ctx.ledger.confirmed().len(), 1);
        assert_eq!(ctx.ledger.next_seq_no(), 2);
    }

    #[test]
    fn test_unrepresentable_estimated_time_is_an_error() {
        let engine = AllocationEngine::new();
        let policy = AllocationPolicy {
            avg_consultation_minutes: u32::MAX,
            ..AllocationPolicy::default()
        };
        let mut ctx = make_context(40);

        // 序号 1..=32 仍在 chrono 日期范围内
        for i in 1..=32u32 {
            let id = format!("T{}", i);
            engine
                .allocate(&mut ctx, request(&id, TokenSource::WalkIn, i), &policy)
                .unwrap();
        }
        let err = engine
            .allocate(&mut ctx, request("T33", TokenSource::WalkIn, 33), &policy)
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::EstimateOutOfRange {
                slot_id: "S1".to_string(),
                seq_no: 33
            }
        );
    }
}
