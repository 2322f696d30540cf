// ==========================================
// 门诊号源分配系统 - 领域类型定义
// ==========================================
// 依据: 优先级模型 (EMERGENCY=1 ... WALK_IN=5)
// 红线: 来源是封闭枚举,未知来源必须显式拒绝,不允许默认值
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 优先级 (Priority Rank)
// ==========================================
// 1 最高, 5 最低; 数值越小越优先
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityRank(u8);

impl PriorityRank {
    pub const EMERGENCY: PriorityRank = PriorityRank(1);
    pub const PAID_PRIORITY: PriorityRank = PriorityRank(2);
    pub const FOLLOW_UP: PriorityRank = PriorityRank(3);
    pub const ONLINE_BOOKING: PriorityRank = PriorityRank(4);
    pub const WALK_IN: PriorityRank = PriorityRank(5);

    /// 从数据库存储值恢复 (仅接受 1..=5)
    pub fn from_value(value: u8) -> Option<Self> {
        if (1..=5).contains(&value) {
            Some(PriorityRank(value))
        } else {
            None
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for PriorityRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

// ==========================================
// 号源来源 (Token Source)
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenSource {
    Emergency,     // 急诊
    PaidPriority,  // 付费优先
    FollowUp,      // 复诊
    OnlineBooking, // 线上预约
    WalkIn,        // 现场挂号
}

impl TokenSource {
    pub const ALL: [TokenSource; 5] = [
        TokenSource::Emergency,
        TokenSource::PaidPriority,
        TokenSource::FollowUp,
        TokenSource::OnlineBooking,
        TokenSource::WalkIn,
    ];

    /// 来源 → 优先级 (全映射)
    pub fn rank(&self) -> PriorityRank {
        match self {
            TokenSource::Emergency => PriorityRank::EMERGENCY,
            TokenSource::PaidPriority => PriorityRank::PAID_PRIORITY,
            TokenSource::FollowUp => PriorityRank::FOLLOW_UP,
            TokenSource::OnlineBooking => PriorityRank::ONLINE_BOOKING,
            TokenSource::WalkIn => PriorityRank::WALK_IN,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TokenSource::Emergency => "EMERGENCY",
            TokenSource::PaidPriority => "PAID_PRIORITY",
            TokenSource::FollowUp => "FOLLOW_UP",
            TokenSource::OnlineBooking => "ONLINE_BOOKING",
            TokenSource::WalkIn => "WALK_IN",
        }
    }
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

/// 未知来源错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("未知的号源来源: {0}")]
pub struct UnknownSourceError(pub String);

impl FromStr for TokenSource {
    type Err = UnknownSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMERGENCY" => Ok(TokenSource::Emergency),
            "PAID_PRIORITY" => Ok(TokenSource::PaidPriority),
            "FOLLOW_UP" => Ok(TokenSource::FollowUp),
            "ONLINE_BOOKING" => Ok(TokenSource::OnlineBooking),
            "WALK_IN" => Ok(TokenSource::WalkIn),
            _ => Err(UnknownSourceError(s.to_string())),
        }
    }
}

// ==========================================
// 号源状态 (Token Status)
// ==========================================
// CANCELLED / NO_SHOW 为终态
// CONFIRMED ⇄ WAITLISTED 是唯一的双向转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Confirmed,  // 已确认
    Waitlisted, // 候补
    Cancelled,  // 已取消
    NoShow,     // 爽约
}

impl TokenStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Cancelled | TokenStatus::NoShow)
    }

    /// 从字符串解析状态
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "CONFIRMED" => Some(TokenStatus::Confirmed),
            "WAITLISTED" => Some(TokenStatus::Waitlisted),
            "CANCELLED" => Some(TokenStatus::Cancelled),
            "NO_SHOW" => Some(TokenStatus::NoShow),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TokenStatus::Confirmed => "CONFIRMED",
            TokenStatus::Waitlisted => "WAITLISTED",
            TokenStatus::Cancelled => "CANCELLED",
            TokenStatus::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 状态转换原因 (Transition Reason)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionReason {
    Admitted,   // 直接确认
    Waitlisted, // 进入候补
    Promoted,   // 候补晋升
    Demoted,    // 被急诊挤出
    Cancelled,  // 取消
    NoShow,     // 爽约
}

impl TransitionReason {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TransitionReason::Admitted => "ADMITTED",
            TransitionReason::Waitlisted => "WAITLISTED",
            TransitionReason::Promoted => "PROMOTED",
            TransitionReason::Demoted => "DEMOTED",
            TransitionReason::Cancelled => "CANCELLED",
            TransitionReason::NoShow => "NO_SHOW",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "ADMITTED" => Some(TransitionReason::Admitted),
            "WAITLISTED" => Some(TransitionReason::Waitlisted),
            "PROMOTED" => Some(TransitionReason::Promoted),
            "DEMOTED" => Some(TransitionReason::Demoted),
            "CANCELLED" => Some(TransitionReason::Cancelled),
            "NO_SHOW" => Some(TransitionReason::NoShow),
            _ => None,
        }
    }
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 急诊挤占对象选择策略 (Victim Policy)
// ==========================================
// 先取优先级数值最大者; 策略只决定同优先级内的取舍
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VictimPolicy {
    #[default]
    MostRecentlyAdmitted, // 最近创建者先被挤出
    EarliestAdmitted,     // 最早创建者先被挤出
}

impl VictimPolicy {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MOST_RECENTLY_ADMITTED" => Some(VictimPolicy::MostRecentlyAdmitted),
            "EARLIEST_ADMITTED" => Some(VictimPolicy::EarliestAdmitted),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            VictimPolicy::MostRecentlyAdmitted => "MOST_RECENTLY_ADMITTED",
            VictimPolicy::EarliestAdmitted => "EARLIEST_ADMITTED",
        }
    }
}

impl fmt::Display for VictimPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}
