// ==========================================
// 门诊号源分配系统 - API 数据传输对象
// ==========================================
// 说明: 纯 Rust 结构, 通过 serde 可直接序列化为 JSON
// ==========================================

use crate::domain::patient::Patient;
use crate::domain::slot::{Doctor, TimeSlot};
use crate::domain::token::{Token, TokenTransition};
use crate::domain::types::{TokenSource, TokenStatus};
use crate::engine::allocation::{AllocationOutcome, Displacement, Placement};
use crate::engine::reallocation::{ReleaseEffect, ReleaseOutcome};
use crate::repository::token_repo::TokenStatusCounts;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// 号源分配
// ==========================================

/// 就诊人登记信息 (按手机号去重)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInput {
    pub name: String,
    pub phone: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
}

impl PatientInput {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            age: None,
            gender: None,
        }
    }
}

/// 分配结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResponse {
    pub token_id: String,
    pub slot_id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub medical_record_number: String,
    pub source: TokenSource,
    pub priority: u8,
    pub status: TokenStatus,
    pub seq_no: Option<u32>,
    pub estimated_time: Option<NaiveDateTime>,
    pub waitlist_position: Option<usize>,
    pub estimated_wait_minutes: Option<u32>,
    pub displaced: Option<Displacement>,
}

impl AllocationResponse {
    pub fn new(outcome: AllocationOutcome, patient: &Patient) -> Self {
        let (waitlist_position, estimated_wait_minutes) = match outcome.placement {
            Placement::Confirmed { .. } => (None, None),
            Placement::Waitlisted {
                position,
                estimated_wait_minutes,
            } => (Some(position), Some(estimated_wait_minutes)),
        };
        let token = outcome.token;

        Self {
            token_id: token.token_id,
            slot_id: token.slot_id,
            patient_id: token.patient_id,
            patient_name: patient.name.clone(),
            medical_record_number: patient.medical_record_number.clone(),
            source: token.source,
            priority: token.priority.value(),
            status: token.status,
            seq_no: token.seq_no,
            estimated_time: token.estimated_time,
            waitlist_position,
            estimated_wait_minutes,
            displaced: outcome.displaced,
        }
    }
}

/// 取消 / 爽约结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub token_id: String,
    pub slot_id: String,
    pub previous_status: TokenStatus,
    pub status: TokenStatus,
    pub effect: ReleaseEffect,
}

impl From<ReleaseOutcome> for ReleaseResponse {
    fn from(outcome: ReleaseOutcome) -> Self {
        Self {
            token_id: outcome.token.token_id,
            slot_id: outcome.token.slot_id,
            previous_status: outcome.previous_status,
            status: outcome.token.status,
            effect: outcome.effect,
        }
    }
}

// ==========================================
// 时段状态
// ==========================================

/// 名单中的号源视图
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenView {
    pub token_id: String,
    pub patient_id: String,
    pub source: TokenSource,
    pub priority: u8,
    pub status: TokenStatus,
    pub seq_no: Option<u32>,
    pub estimated_time: Option<NaiveDateTime>,
    pub waitlist_position: Option<usize>,
    pub estimated_wait_minutes: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl TokenView {
    pub fn confirmed(token: &Token) -> Self {
        Self::build(token, None, None)
    }

    pub fn waitlisted(token: &Token, position: usize, estimated_wait_minutes: u32) -> Self {
        Self::build(token, Some(position), Some(estimated_wait_minutes))
    }

    fn build(token: &Token, position: Option<usize>, wait: Option<u32>) -> Self {
        Self {
            token_id: token.token_id.clone(),
            patient_id: token.patient_id.clone(),
            source: token.source,
            priority: token.priority.value(),
            status: token.status,
            seq_no: token.seq_no,
            estimated_time: token.estimated_time,
            waitlist_position: position,
            estimated_wait_minutes: wait,
            created_at: token.created_at,
        }
    }
}

/// 时段状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub slot_id: String,
    pub doctor_id: String,
    pub slot_date: NaiveDate,
    pub time_range: String,
    pub max_capacity: u32,
    pub allocated_count: u32,
    pub available_capacity: u32,
    pub waitlist_count: usize,
    pub confirmed: Vec<TokenView>, // 分配顺序
    pub waitlist: Vec<TokenView>,  // 优先级 + FIFO 顺序
}

/// 就诊人名下全部号源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientTokens {
    pub patient: Patient,
    pub tokens: Vec<Token>, // 按创建时间
}

/// 号源详情 (含状态转换历史)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDetail {
    pub token: Token,
    pub waitlist_position: Option<usize>,
    pub estimated_wait_minutes: Option<u32>,
    pub history: Vec<TokenTransition>,
}

// ==========================================
// 排班管理
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub doctor_id: Option<String>, // 为空时自动生成
    pub name: String,
    pub specialization: String,
}

/// 单个时段定义 (容量为空时取配置默认值)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorInfo {
    pub doctor_id: String,
    pub name: String,
    pub specialization: String,
    pub active: bool,
}

impl From<Doctor> for DoctorInfo {
    fn from(doctor: Doctor) -> Self {
        Self {
            doctor_id: doctor.doctor_id,
            name: doctor.name,
            specialization: doctor.specialization,
            active: doctor.active,
        }
    }
}

/// 时段概要 (列表展示)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot_id: String,
    pub slot_date: NaiveDate,
    pub time_range: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub max_capacity: u32,
    pub active_tokens: i64, // CONFIRMED + WAITLISTED
}

impl SlotSummary {
    pub fn new(slot: &TimeSlot, active_tokens: i64) -> Self {
        Self {
            slot_id: slot.slot_id.clone(),
            slot_date: slot.slot_date,
            time_range: slot.time_range_label(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            max_capacity: slot.max_capacity,
            active_tokens,
        }
    }
}

/// 系统统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub doctors: i64,
    pub patients: i64,
    pub slots: i64,
    pub tokens: TokenStatusCounts,
    pub total_tokens: i64,
}
