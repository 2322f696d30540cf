use crate::domain::types::VictimPolicy;
use serde::{Deserialize, Serialize};

/// 默认平均就诊时长（分钟）
pub const DEFAULT_AVG_CONSULTATION_MINUTES: u32 = 5;

/// 平均就诊时长上限（分钟）：一天
pub const MAX_AVG_CONSULTATION_MINUTES: u32 = 24 * 60;

/// 默认时段容量
pub const DEFAULT_SLOT_CAPACITY: u32 = 10;

/// 分配策略参数（每次调用时从 config_kv 读取，引擎本身不持有）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPolicy {
    /// 平均就诊时长（分钟），用于预计时间与预计等待
    pub avg_consultation_minutes: u32,

    /// 急诊挤占时同优先级内的取舍
    #[serde(default)]
    pub victim_policy: VictimPolicy,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            avg_consultation_minutes: DEFAULT_AVG_CONSULTATION_MINUTES,
            victim_policy: VictimPolicy::default(),
        }
    }
}

impl AllocationPolicy {
    /// 候补预计等待（分钟）= 候补位置 × 平均就诊时长
    pub fn estimated_wait_minutes(&self, waitlist_position: usize) -> u32 {
        (waitlist_position as u32).saturating_mul(self.avg_consultation_minutes)
    }
}
