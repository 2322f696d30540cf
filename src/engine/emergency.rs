// ==========================================
// 门诊号源分配系统 - 急诊加号
// ==========================================
// 规则:
// - 有余量: 等同常规分配
// - 已满: 挤出优先级最低的确认号源 (降级为候补, 保留原优先级与创建时间)
// - 已满且最低者同为急诊: 新急诊进入候补, 不挤占同级
// 红线: 挤占前后确认人数不变, 容量上限自动保持
// ==========================================

use crate::config::AllocationPolicy;
use crate::domain::ledger::{LedgerError, SlotContext};
use crate::domain::token::TokenTransition;
use crate::domain::types::{PriorityRank, TokenSource, TransitionReason};
use crate::engine::allocation::{
    admit_confirmed, admit_waitlisted, new_token, AllocationEngine, AllocationOutcome,
    AllocationRequest, Displacement,
};
use crate::engine::error::{EngineError, EngineResult};
use tracing::{info, warn};

// ==========================================
// EmergencyAdmission - 急诊加号引擎 (无状态)
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct EmergencyAdmission {
    allocation: AllocationEngine,
}

impl EmergencyAdmission {
    pub fn new() -> Self {
        Self {
            allocation: AllocationEngine::new(),
        }
    }

    pub fn allocate_emergency(
        &self,
        ctx: &mut SlotContext,
        request: AllocationRequest,
        policy: &AllocationPolicy,
    ) -> EngineResult<AllocationOutcome> {
        if request.source != TokenSource::Emergency {
            return Err(EngineError::NotEmergency(request.source));
        }

        if ctx.ledger.available_capacity() > 0 {
            return self.allocation.allocate(ctx, request, policy);
        }

        let token = new_token(ctx, request)?;
        let victim = ctx
            .ledger
            .lowest_priority_confirmed(policy.victim_policy)
            .cloned();

        let victim = match victim {
            Some(victim) if victim.priority > PriorityRank::EMERGENCY => victim,
            other => {
                // 同级急诊先到先得
                warn!(
                    slot_id = %ctx.slot.slot_id,
                    token_id = %token.token_id,
                    occupied_by_emergency = other.is_some(),
                    "时段已满且无可挤占号源, 急诊进入候补"
                );
                let (token, placement, transition) =
                    admit_waitlisted(ctx, token, policy, Some("时段已满, 确认名单均为急诊"))?;
                return Ok(AllocationOutcome {
                    token,
                    placement,
                    displaced: None,
                    transitions: vec![transition],
                });
            }
        };

        let at = token.created_at;
        let slot_id = ctx.slot.slot_id.clone();

        // 降级: 先移出确认名单, 再有序插入候补
        let victim_token =
            ctx.tokens
                .get_mut(&victim.token_id)
                .ok_or_else(|| LedgerError::Inconsistent {
                    slot_id: slot_id.clone(),
                    message: format!("确认名单引用了缺失的号源: {}", victim.token_id),
                })?;
        let previous_status = victim_token.status;
        ctx.ledger.remove_confirmed(&victim.token_id);
        let waitlist_position = ctx.ledger.insert_waitlisted(victim_token)?;
        victim_token.updated_at = at;

        let demotion = TokenTransition::new(
            victim_token,
            Some(previous_status),
            TransitionReason::Demoted,
            at,
        )
        .with_detail(format!("被急诊号源 {} 挤占", token.token_id));

        let (token, placement, admission) = admit_confirmed(ctx, token, policy)?;

        info!(
            slot_id = %slot_id,
            token_id = %token.token_id,
            displaced = %victim.token_id,
            displaced_priority = %victim.priority,
            waitlist_position,
            "急诊挤占: 原号源降级为候补"
        );

        Ok(AllocationOutcome {
            token,
            placement,
            displaced: Some(Displacement {
                token_id: victim.token_id,
                priority: victim.priority,
                waitlist_position,
            }),
            transitions: vec![demotion, admission],
        })
    }
}
