// ==========================================
// 门诊号源分配系统 - 重分配引擎
// ==========================================
// 触发: 取消 / 爽约
// 规则:
// - 终态号源再次释放: 无操作, 显式报告 AlreadyTerminal
// - 确认号源释放: 腾出一个名额, 候补队首晋升
// - 候补号源释放: 仅移出候补, 不触发晋升
// ==========================================

use crate::config::AllocationPolicy;
use crate::domain::ledger::{LedgerError, SlotContext};
use crate::domain::token::{Token, TokenTransition};
use crate::domain::types::{TokenStatus, TransitionReason};
use crate::engine::allocation::stamp_confirmed;
use crate::engine::error::{EngineError, EngineResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 释放类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseKind {
    Cancel,
    NoShow,
}

impl ReleaseKind {
    pub fn terminal_status(&self) -> TokenStatus {
        match self {
            ReleaseKind::Cancel => TokenStatus::Cancelled,
            ReleaseKind::NoShow => TokenStatus::NoShow,
        }
    }

    fn reason(&self) -> TransitionReason {
        match self {
            ReleaseKind::Cancel => TransitionReason::Cancelled,
            ReleaseKind::NoShow => TransitionReason::NoShow,
        }
    }
}

/// 候补晋升记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    pub token_id: String,
    pub seq_no: u32,
    pub estimated_time: NaiveDateTime,
}

/// 释放的后续影响
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseEffect {
    /// 号源已是终态, 未做任何变更
    AlreadyTerminal,
    /// 候补号源被移出, 未腾出名额
    WaitlistEntryRemoved,
    /// 腾出的名额由候补队首补上
    Promoted(Promotion),
    /// 名额已腾出, 但候补为空
    NoEligibleWaitlistEntry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseOutcome {
    pub token: Token,
    pub previous_status: TokenStatus,
    pub effect: ReleaseEffect,
    pub transitions: Vec<TokenTransition>,
}

impl ReleaseOutcome {
    /// 是否有状态变更需要提交
    pub fn is_noop(&self) -> bool {
        self.transitions.is_empty()
    }
}

// ==========================================
// ReallocationEngine - 重分配引擎 (无状态)
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct ReallocationEngine;

impl ReallocationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn cancel(
        &self,
        ctx: &mut SlotContext,
        token_id: &str,
        policy: &AllocationPolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<ReleaseOutcome> {
        self.release(ctx, token_id, ReleaseKind::Cancel, policy, now)
    }

    pub fn no_show(
        &self,
        ctx: &mut SlotContext,
        token_id: &str,
        policy: &AllocationPolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<ReleaseOutcome> {
        self.release(ctx, token_id, ReleaseKind::NoShow, policy, now)
    }

    /// 释放号源并按需晋升候补
    pub fn release(
        &self,
        ctx: &mut SlotContext,
        token_id: &str,
        kind: ReleaseKind,
        policy: &AllocationPolicy,
        now: DateTime<Utc>,
    ) -> EngineResult<ReleaseOutcome> {
        let slot_id = ctx.slot.slot_id.clone();
        let token = ctx
            .tokens
            .get_mut(token_id)
            .ok_or_else(|| EngineError::TokenNotInSlot {
                slot_id: slot_id.clone(),
                token_id: token_id.to_string(),
            })?;
        let previous_status = token.status;

        if previous_status.is_terminal() {
            warn!(
                token_id = %token_id,
                status = %previous_status,
                requested = ?kind,
                "号源已是终态, 忽略重复释放"
            );
            return Ok(ReleaseOutcome {
                token: token.clone(),
                previous_status,
                effect: ReleaseEffect::AlreadyTerminal,
                transitions: Vec::new(),
            });
        }

        let removed = match previous_status {
            TokenStatus::Confirmed => ctx.ledger.remove_confirmed(token_id),
            _ => ctx.ledger.remove_waitlisted(token_id),
        };
        if !removed {
            return Err(LedgerError::Inconsistent {
                slot_id,
                message: format!("号源状态为 {} 但不在名单中: {}", previous_status, token_id),
            }
            .into());
        }

        token.status = kind.terminal_status();
        token.seq_no = None;
        token.estimated_time = None;
        token.updated_at = now;
        let released = token.clone();

        let mut transitions = vec![TokenTransition::new(
            &released,
            Some(previous_status),
            kind.reason(),
            now,
        )];

        info!(
            token_id = %token_id,
            slot_id = %slot_id,
            from = %previous_status,
            to = %released.status,
            "号源已释放"
        );

        let effect = if previous_status == TokenStatus::Confirmed {
            self.promote_front(ctx, token_id, policy, now, &mut transitions)?
        } else {
            ReleaseEffect::WaitlistEntryRemoved
        };

        Ok(ReleaseOutcome {
            token: released,
            previous_status,
            effect,
            transitions,
        })
    }

    /// 候补队首补位 (优先级与创建时间不变, 仅状态与序号变化)
    fn promote_front(
        &self,
        ctx: &mut SlotContext,
        vacated_by: &str,
        policy: &AllocationPolicy,
        now: DateTime<Utc>,
        transitions: &mut Vec<TokenTransition>,
    ) -> EngineResult<ReleaseEffect> {
        let Some(entry) = ctx.ledger.pop_highest_waitlisted() else {
            debug!(slot_id = %ctx.slot.slot_id, "候补为空, 名额保持空闲");
            return Ok(ReleaseEffect::NoEligibleWaitlistEntry);
        };

        let candidate =
            ctx.tokens
                .get_mut(&entry.token_id)
                .ok_or_else(|| LedgerError::Inconsistent {
                    slot_id: ctx.slot.slot_id.clone(),
                    message: format!("候补名单引用了缺失的号源: {}", entry.token_id),
                })?;
        let seq_no = ctx.ledger.insert_confirmed(candidate)?;
        let estimated_time = stamp_confirmed(&ctx.slot, candidate, seq_no, policy, now)?;

        transitions.push(
            TokenTransition::new(
                candidate,
                Some(TokenStatus::Waitlisted),
                TransitionReason::Promoted,
                now,
            )
            .with_detail(format!("补位 {}", vacated_by)),
        );

        info!(
            slot_id = %ctx.slot.slot_id,
            token_id = %entry.token_id,
            seq_no,
            "候补晋升为确认"
        );

        Ok(ReleaseEffect::Promoted(Promotion {
            token_id: entry.token_id,
            seq_no,
            estimated_time,
        }))
    }
}
