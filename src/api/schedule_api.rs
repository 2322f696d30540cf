// ==========================================
// 门诊号源分配系统 - 排班管理 API
// ==========================================
// 职责: 医生 / 出诊时段维护, 系统统计
// 说明: 时段容量创建后固定, 不提供修改接口
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::dto::{CreateDoctorRequest, DoctorInfo, SlotSummary, SlotWindow, SystemStats};
use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::slot::{Doctor, TimeSlot};
use crate::repository::{
    DoctorRepository, PatientRepository, TimeSlotRepository, TokenRepository,
};

// ==========================================
// ScheduleApi - 排班管理 API
// ==========================================
pub struct ScheduleApi {
    doctor_repo: Arc<DoctorRepository>,
    slot_repo: Arc<TimeSlotRepository>,
    token_repo: Arc<TokenRepository>,
    patient_repo: Arc<PatientRepository>,
    config: Arc<ConfigManager>,
}

impl ScheduleApi {
    pub fn new(
        doctor_repo: Arc<DoctorRepository>,
        slot_repo: Arc<TimeSlotRepository>,
        token_repo: Arc<TokenRepository>,
        patient_repo: Arc<PatientRepository>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            doctor_repo,
            slot_repo,
            token_repo,
            patient_repo,
            config,
        }
    }

    /// 新建医生
    #[instrument(skip_all)]
    pub fn create_doctor(&self, request: CreateDoctorRequest) -> ApiResult<DoctorInfo> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ApiError::InvalidInput("医生姓名不能为空".to_string()));
        }
        let specialization = request.specialization.trim();
        if specialization.is_empty() {
            return Err(ApiError::InvalidInput("科室不能为空".to_string()));
        }

        let doctor_id = match request.doctor_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("DOC-{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase()),
        };

        let doctor = Doctor {
            doctor_id,
            name: name.to_string(),
            specialization: specialization.to_string(),
            active: true,
            created_at: Utc::now(),
        };
        self.doctor_repo.insert(&doctor)?;

        info!(doctor_id = %doctor.doctor_id, name = %doctor.name, "医生已创建");
        Ok(doctor.into())
    }

    pub fn list_doctors(&self) -> ApiResult<Vec<DoctorInfo>> {
        let doctors = self.doctor_repo.list_all()?;
        Ok(doctors.into_iter().map(DoctorInfo::from).collect())
    }

    /// 批量创建出诊时段 (单事务, 全部成功或全部失败)
    ///
    /// # 校验
    /// - 医生必须存在
    /// - end_time > start_time
    /// - 容量 ≥ 1 (未指定时取 default_slot_capacity)
    /// - 同一医生同一日期同一开始时间不得已有时段
    #[instrument(skip_all, fields(doctor_id = %doctor_id, date = %slot_date, count = windows.len()))]
    pub fn create_slots(
        &self,
        doctor_id: &str,
        slot_date: NaiveDate,
        windows: &[SlotWindow],
    ) -> ApiResult<Vec<SlotSummary>> {
        if windows.is_empty() {
            return Err(ApiError::InvalidInput("时段列表不能为空".to_string()));
        }
        if self.doctor_repo.find_by_id(doctor_id)?.is_none() {
            return Err(ApiError::DoctorNotFound(doctor_id.to_string()));
        }

        let default_capacity = self.config.get_default_slot_capacity()?;
        let now = Utc::now();

        let slots = windows
            .iter()
            .map(|window| {
                if window.end_time <= window.start_time {
                    return Err(ApiError::InvalidInput(format!(
                        "结束时间必须晚于开始时间: {} - {}",
                        window.start_time.format("%H:%M"),
                        window.end_time.format("%H:%M")
                    )));
                }
                let max_capacity = window.max_capacity.unwrap_or(default_capacity);
                if max_capacity == 0 {
                    return Err(ApiError::InvalidInput("时段容量必须 ≥ 1".to_string()));
                }
                if let Some(existing) =
                    self.slot_repo
                        .find_by_doctor_and_start(doctor_id, slot_date, window.start_time)?
                {
                    return Err(ApiError::BusinessRuleViolation(format!(
                        "时段已存在: {}",
                        existing.slot_id
                    )));
                }

                Ok(TimeSlot {
                    slot_id: format!(
                        "{}-{}-{}",
                        doctor_id,
                        slot_date.format("%Y%m%d"),
                        window.start_time.format("%H%M")
                    ),
                    doctor_id: doctor_id.to_string(),
                    slot_date,
                    start_time: window.start_time,
                    end_time: window.end_time,
                    max_capacity,
                    next_seq_no: 1,
                    created_at: now,
                })
            })
            .collect::<ApiResult<Vec<TimeSlot>>>()?;

        self.slot_repo.insert_batch(&slots)?;

        info!(doctor_id = %doctor_id, count = slots.len(), "出诊时段已创建");
        Ok(slots.iter().map(|slot| SlotSummary::new(slot, 0)).collect())
    }

    /// 医生的时段列表 (可按日期过滤)
    pub fn list_doctor_slots(
        &self,
        doctor_id: &str,
        slot_date: Option<NaiveDate>,
    ) -> ApiResult<Vec<SlotSummary>> {
        if self.doctor_repo.find_by_id(doctor_id)?.is_none() {
            return Err(ApiError::DoctorNotFound(doctor_id.to_string()));
        }

        self.slot_repo
            .list_by_doctor(doctor_id, slot_date)?
            .iter()
            .map(|slot| -> ApiResult<SlotSummary> {
                let active = self.token_repo.count_active_by_slot(&slot.slot_id)?;
                Ok(SlotSummary::new(slot, active))
            })
            .collect()
    }

    /// 系统统计
    pub fn get_system_stats(&self) -> ApiResult<SystemStats> {
        let tokens = self.token_repo.count_by_status()?;
        Ok(SystemStats {
            doctors: self.doctor_repo.count()?,
            patients: self.patient_repo.count()?,
            slots: self.slot_repo.count()?,
            total_tokens: tokens.total(),
            tokens,
        })
    }
}
