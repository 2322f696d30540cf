// ==========================================
// 门诊号源分配系统 - 号源 API
// ==========================================
// 职责: 分配 / 急诊加号 / 取消 / 爽约 / 时段状态 / 号源详情 / 就诊人号源
// 流程: 校验时段存在 → 登记就诊人 → 取时段锁 → 加载 SlotContext → 引擎变更 → 单事务提交 → 释放锁 → 发布事件
// 红线: 每次调用只持有一个时段锁; 失败时不提交任何变更
// ==========================================

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Utc};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::api::dto::{
    AllocationResponse, PatientInput, PatientTokens, ReleaseResponse, SlotStatus, TokenDetail,
    TokenView,
};
use crate::api::error::{ApiError, ApiResult};
use crate::config::{AllocationPolicy, ConfigManager};
use crate::domain::ledger::SlotContext;
use crate::domain::patient::{normalize_phone, Patient};
use crate::domain::slot::TimeSlot;
use crate::domain::token::TokenTransition;
use crate::domain::types::{TokenSource, TokenStatus};
use crate::engine::{
    AllocationEngine, AllocationOutcome, AllocationRequest, EmergencyAdmission,
    PriorityClassifier, ReallocationEngine, ReleaseKind, ReleaseOutcome, SlotLockRegistry,
    TokenEventPublisher, TokenIdGenerator,
};
use crate::repository::ledger_store::SlotLedgerStore;
use crate::repository::{PatientRepository, TokenRepository};

// ==========================================
// TokenApi - 号源 API
// ==========================================
pub struct TokenApi {
    store: Arc<dyn SlotLedgerStore>,
    patient_repo: Arc<PatientRepository>,
    token_repo: Arc<TokenRepository>,
    config: Arc<ConfigManager>,
    locks: Arc<SlotLockRegistry>,
    id_generator: Arc<dyn TokenIdGenerator>,
    publisher: Arc<dyn TokenEventPublisher>,
    classifier: PriorityClassifier,
    allocation: AllocationEngine,
    emergency: EmergencyAdmission,
    reallocation: ReallocationEngine,
}

impl TokenApi {
    pub fn new(
        store: Arc<dyn SlotLedgerStore>,
        patient_repo: Arc<PatientRepository>,
        token_repo: Arc<TokenRepository>,
        config: Arc<ConfigManager>,
        locks: Arc<SlotLockRegistry>,
        id_generator: Arc<dyn TokenIdGenerator>,
        publisher: Arc<dyn TokenEventPublisher>,
    ) -> Self {
        Self {
            store,
            patient_repo,
            token_repo,
            config,
            locks,
            id_generator,
            publisher,
            classifier: PriorityClassifier::new(),
            allocation: AllocationEngine::new(),
            emergency: EmergencyAdmission::new(),
            reallocation: ReallocationEngine::new(),
        }
    }

    // ==========================================
    // 分配
    // ==========================================

    /// 常规分配 (来源与就诊人信息在加锁前校验)
    ///
    /// # 返回
    /// - Ok: CONFIRMED (序号 + 预计时间) 或 WAITLISTED (位置 + 预计等待)
    /// - Err(UnknownSource) / Err(InvalidInput) / Err(SlotNotFound)
    #[instrument(skip_all, fields(slot_id = %slot_id, source = %source))]
    pub fn allocate(
        &self,
        slot_id: &str,
        patient: &PatientInput,
        source: &str,
    ) -> ApiResult<AllocationResponse> {
        let candidate = validate_patient(patient)?;
        let (source, _) = self.classifier.classify(source)?;
        let slot = self.require_slot(slot_id)?;
        self.allocate_in_slot(&slot.slot_id, candidate, source, false)
    }

    /// 按 (医生, 日期, 开始时间) 定位时段后常规分配
    #[instrument(skip_all, fields(doctor_id = %doctor_id, date = %slot_date, start = %start_time))]
    pub fn allocate_by_time(
        &self,
        doctor_id: &str,
        slot_date: NaiveDate,
        start_time: NaiveTime,
        patient: &PatientInput,
        source: &str,
    ) -> ApiResult<AllocationResponse> {
        let candidate = validate_patient(patient)?;
        let (source, _) = self.classifier.classify(source)?;

        let slot = self
            .store
            .find_slot_by_time(doctor_id, slot_date, start_time)?
            .ok_or_else(|| {
                ApiError::SlotNotFound(format!(
                    "doctor_id={}, date={}, start={}",
                    doctor_id,
                    slot_date,
                    start_time.format("%H:%M")
                ))
            })?;

        self.allocate_in_slot(&slot.slot_id, candidate, source, false)
    }

    /// 急诊加号 (时段已满时可能挤占最低优先级号源)
    #[instrument(skip_all, fields(slot_id = %slot_id))]
    pub fn allocate_emergency(
        &self,
        slot_id: &str,
        patient: &PatientInput,
    ) -> ApiResult<AllocationResponse> {
        let candidate = validate_patient(patient)?;
        let slot = self.require_slot(slot_id)?;
        self.allocate_in_slot(&slot.slot_id, candidate, TokenSource::Emergency, true)
    }

    /// 时段存在性检查 (不创建时段锁)
    fn require_slot(&self, slot_id: &str) -> ApiResult<TimeSlot> {
        self.store
            .find_slot(slot_id)?
            .ok_or_else(|| ApiError::SlotNotFound(slot_id.to_string()))
    }

    /// 调用方已确认时段存在
    fn allocate_in_slot(
        &self,
        slot_id: &str,
        candidate: Patient,
        source: TokenSource,
        emergency: bool,
    ) -> ApiResult<AllocationResponse> {
        let policy = self.config.get_allocation_policy()?;
        let (patient, created) = self.patient_repo.find_or_create_by_phone(&candidate)?;
        if created {
            info!(patient_id = %patient.patient_id, "就诊人已登记");
        }
        let token_id = self.id_generator.next_id();

        let outcome = self
            .locks
            .with_slot_lock(slot_id, || -> ApiResult<AllocationOutcome> {
                let mut ctx = self.store.load_slot_context(slot_id)?;
                let request = AllocationRequest {
                    token_id,
                    patient_id: patient.patient_id.clone(),
                    source,
                    requested_at: Utc::now(),
                };

                let outcome = if emergency {
                    self.emergency.allocate_emergency(&mut ctx, request, &policy)?
                } else {
                    self.allocation.allocate(&mut ctx, request, &policy)?
                };

                self.store.commit(&ctx, &outcome.transitions)?;
                Ok(outcome)
            })?;

        if let Some(displaced) = &outcome.displaced {
            info!(
                token_id = %outcome.token.token_id,
                displaced = %displaced.token_id,
                "急诊加号完成 (含挤占)"
            );
        }

        self.publish(&outcome.transitions);
        Ok(AllocationResponse::new(outcome, &patient))
    }

    // ==========================================
    // 取消 / 爽约
    // ==========================================

    /// 取消号源 (已是终态时返回 AlreadyTerminal, 不是错误)
    #[instrument(skip_all, fields(token_id = %token_id))]
    pub fn cancel_token(&self, token_id: &str) -> ApiResult<ReleaseResponse> {
        self.release(token_id, ReleaseKind::Cancel)
    }

    /// 标记爽约
    #[instrument(skip_all, fields(token_id = %token_id))]
    pub fn mark_no_show(&self, token_id: &str) -> ApiResult<ReleaseResponse> {
        self.release(token_id, ReleaseKind::NoShow)
    }

    fn release(&self, token_id: &str, kind: ReleaseKind) -> ApiResult<ReleaseResponse> {
        // 号源所属时段不可变, 可在锁外定位
        let token = self
            .store
            .find_token(token_id)?
            .ok_or_else(|| ApiError::TokenNotFound(token_id.to_string()))?;
        let policy = self.config.get_allocation_policy()?;

        let outcome = self
            .locks
            .with_slot_lock(&token.slot_id, || -> ApiResult<ReleaseOutcome> {
                let mut ctx = self.store.load_slot_context(&token.slot_id)?;
                let outcome = self
                    .reallocation
                    .release(&mut ctx, token_id, kind, &policy, Utc::now())?;

                if !outcome.is_noop() {
                    self.store.commit(&ctx, &outcome.transitions)?;
                }
                Ok(outcome)
            })?;

        self.publish(&outcome.transitions);
        Ok(outcome.into())
    }

    // ==========================================
    // 只读查询
    // ==========================================

    /// 时段状态快照 (锁只在加载期间持有)
    #[instrument(skip_all, fields(slot_id = %slot_id))]
    pub fn get_slot_status(&self, slot_id: &str) -> ApiResult<SlotStatus> {
        self.require_slot(slot_id)?;
        let policy = self.config.get_allocation_policy()?;
        let ctx = self
            .locks
            .with_slot_lock(slot_id, || self.store.load_slot_context(slot_id))?;

        Ok(build_slot_status(&ctx, &policy))
    }

    /// 号源详情: 当前状态 + 候补位置 + 状态转换历史
    #[instrument(skip_all, fields(token_id = %token_id))]
    pub fn get_token_detail(&self, token_id: &str) -> ApiResult<TokenDetail> {
        let token = self
            .store
            .find_token(token_id)?
            .ok_or_else(|| ApiError::TokenNotFound(token_id.to_string()))?;
        let policy = self.config.get_allocation_policy()?;

        let ctx = self
            .locks
            .with_slot_lock(&token.slot_id, || self.store.load_slot_context(&token.slot_id))?;
        let token = ctx
            .tokens
            .get(token_id)
            .cloned()
            .ok_or_else(|| ApiError::TokenNotFound(token_id.to_string()))?;

        let waitlist_position = match token.status {
            TokenStatus::Waitlisted => ctx.ledger.waitlist_position(token_id),
            _ => None,
        };
        let history = self.store.list_token_events(token_id)?;

        Ok(TokenDetail {
            token,
            waitlist_position,
            estimated_wait_minutes: waitlist_position.map(|p| policy.estimated_wait_minutes(p)),
            history,
        })
    }

    /// 就诊人名下全部号源 (跨时段, 按创建时间)
    #[instrument(skip_all, fields(patient_id = %patient_id))]
    pub fn get_patient_tokens(&self, patient_id: &str) -> ApiResult<PatientTokens> {
        let patient = self
            .patient_repo
            .find_by_id(patient_id)?
            .ok_or_else(|| ApiError::PatientNotFound(patient_id.to_string()))?;
        let tokens = self.token_repo.list_by_patient(&patient.patient_id)?;
        Ok(PatientTokens { patient, tokens })
    }

    /// 按手机号查询就诊人名下号源
    pub fn get_tokens_by_phone(&self, phone: &str) -> ApiResult<PatientTokens> {
        let phone = normalize_phone(phone);
        let patient = self
            .patient_repo
            .find_by_phone(&phone)?
            .ok_or_else(|| ApiError::PatientNotFound(format!("phone={}", phone)))?;
        let tokens = self.token_repo.list_by_patient(&patient.patient_id)?;
        Ok(PatientTokens { patient, tokens })
    }

    fn publish(&self, transitions: &[TokenTransition]) {
        if transitions.is_empty() {
            return;
        }
        if let Err(e) = self.publisher.publish(transitions) {
            warn!(error = %e, count = transitions.len(), "号源事件发布失败, 已提交的变更保持不变");
        }
    }
}

/// 校验就诊人信息并生成候选记录 (手机号已存在时由仓储返回既有记录)
fn validate_patient(input: &PatientInput) -> ApiResult<Patient> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ApiError::InvalidInput("就诊人姓名不能为空".to_string()));
    }
    let phone = normalize_phone(&input.phone);
    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::InvalidInput(format!("手机号格式错误: {}", input.phone)));
    }
    let gender = input
        .gender
        .as_deref()
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string);

    Ok(Patient::new(
        format!("PAT-{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase()),
        name.to_string(),
        phone,
        input.age,
        gender,
        Utc::now(),
    ))
}

fn build_slot_status(ctx: &SlotContext, policy: &AllocationPolicy) -> SlotStatus {
    let confirmed = ctx
        .ledger
        .confirmed()
        .iter()
        .filter_map(|entry| ctx.tokens.get(&entry.token_id))
        .map(TokenView::confirmed)
        .collect();

    let waitlist = ctx
        .ledger
        .waitlist()
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| {
            ctx.tokens.get(&entry.token_id).map(|token| {
                let position = idx + 1;
                TokenView::waitlisted(token, position, policy.estimated_wait_minutes(position))
            })
        })
        .collect();

    SlotStatus {
        slot_id: ctx.slot.slot_id.clone(),
        doctor_id: ctx.slot.doctor_id.clone(),
        slot_date: ctx.slot.slot_date,
        time_range: ctx.slot.time_range_label(),
        max_capacity: ctx.ledger.capacity(),
        allocated_count: ctx.ledger.confirmed().len() as u32,
        available_capacity: ctx.ledger.available_capacity(),
        waitlist_count: ctx.ledger.waitlist().len(),
        confirmed,
        waitlist,
    }
}
