// ==========================================
// 门诊号源分配系统 - 号源事件发布
// ==========================================
// 职责: 定义号源状态转换的发布 trait (通知/看板等下游由外部实现)
// 说明: 只在提交成功后发布; 发布失败不回滚已提交的分配
// ==========================================

use crate::domain::token::TokenTransition;
use std::error::Error;

/// 号源事件发布者 Trait
pub trait TokenEventPublisher: Send + Sync {
    /// 发布一次调用产生的全部状态转换 (按发生顺序)
    fn publish(&self, transitions: &[TokenTransition]) -> Result<(), Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
///
/// 用于不需要事件发布的场景（如单元测试）
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl TokenEventPublisher for NoOpEventPublisher {
    fn publish(&self, transitions: &[TokenTransition]) -> Result<(), Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - transitions={}",
            transitions.len()
        );
        Ok(())
    }
}
