// ==========================================
// 门诊号源分配系统 - 医生与时段领域模型
// ==========================================
// 红线: max_capacity 创建后固定,任何时刻不得超出
// ==========================================

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Doctor - 医生
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub doctor_id: String,
    pub name: String,
    pub specialization: String, // 科室/专业
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

// ==========================================
// TimeSlot - 出诊时段
// ==========================================
// 唯一键: (doctor_id, slot_date, start_time)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub slot_id: String,
    pub doctor_id: String,
    pub slot_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,

    // ===== 容量 =====
    pub max_capacity: u32,
    pub next_seq_no: u32, // 下一个就诊序号 (1 起, 时段内单调递增)

    pub created_at: DateTime<Utc>,
}

impl TimeSlot {
    /// 时段开始时刻
    pub fn starts_at(&self) -> NaiveDateTime {
        self.slot_date.and_time(self.start_time)
    }

    /// 预计就诊时间 = 开始时刻 + (序号 - 1) × 平均就诊时长
    ///
    /// 结果超出 chrono 可表示范围时返回 None
    pub fn estimated_time_for(
        &self,
        seq_no: u32,
        avg_consultation_minutes: u32,
    ) -> Option<NaiveDateTime> {
        let offset = i64::from(seq_no.saturating_sub(1)).checked_mul(i64::from(avg_consultation_minutes))?;
        let offset = Duration::try_minutes(offset)?;
        self.starts_at().checked_add_signed(offset)
    }

    /// 时段显示文本 (HH:MM - HH:MM)
    pub fn time_range_label(&self) -> String {
        format!(
            "{} - {}",
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}
