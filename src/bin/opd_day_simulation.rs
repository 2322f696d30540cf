// ==========================================
// 门诊号源分配系统 - 门诊日全流程模拟
// ==========================================
// 用法: opd_day_simulation [db_path] [timeline.csv]
// 流程: 建档 → 线上预约高峰 → 现场挂号 → 付费优先 → 取消
//       → 急诊加号 → 爽约 → 复诊 → 日终报告 + 名单不变量校验
// ==========================================

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate, NaiveTime};
use serde::Serialize;

use opd_token_engine::api::{
    AllocationResponse, CreateDoctorRequest, PatientInput, SlotStatus, SlotWindow,
};
use opd_token_engine::app::AppState;
use opd_token_engine::domain::token::TokenTransition;
use opd_token_engine::domain::types::TokenStatus;
use opd_token_engine::engine::{ReleaseEffect, TokenEventPublisher, UuidTokenIdGenerator};
use opd_token_engine::logging;

const DEFAULT_DB_PATH: &str = "./opd_day_simulation.db";
const SIMULATION_DATE: (i32, u32, u32) = (2026, 1, 29);

// (姓名, 手机号)
const ONLINE_PATIENTS: [(&str, &str); 10] = [
    ("Ramesh Singh", "9800000001"),
    ("Anita Desai", "9800000002"),
    ("Suresh Reddy", "9800000003"),
    ("Meena Iyer", "9800000004"),
    ("Vijay Kumar", "9800000005"),
    ("Lakshmi Nair", "9800000006"),
    ("Arjun Mehta", "9800000007"),
    ("Divya Shah", "9800000008"),
    ("Karthik Rao", "9800000009"),
    ("Sneha Gupta", "9800000010"),
];

const WALK_IN_PATIENTS: [(&str, &str); 5] = [
    ("Rajiv Malhotra", "9800000011"),
    ("Pooja Jain", "9800000012"),
    ("Anil Verma", "9800000013"),
    ("Rekha Pillai", "9800000014"),
    ("Deepak Sinha", "9800000015"),
];

// ==========================================
// 事件时间线 (经由 TokenEventPublisher 收集)
// ==========================================

#[derive(Debug, Clone, Serialize)]
struct TimelineRow {
    clock: String,
    phase: String,
    token_id: String,
    slot_id: String,
    from_status: String,
    to_status: String,
    reason: String,
    detail: String,
}

#[derive(Default)]
struct TimelinePublisher {
    phase: Mutex<(String, String)>, // (clock, phase)
    rows: Mutex<Vec<TimelineRow>>,
}

impl TimelinePublisher {
    fn enter_phase(&self, clock: &str, phase: &str) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) =
            (clock.to_string(), phase.to_string());
    }

    fn rows(&self) -> Vec<TimelineRow> {
        self.rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenEventPublisher for TimelinePublisher {
    fn publish(
        &self,
        transitions: &[TokenTransition],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (clock, phase) = self
            .phase
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        for t in transitions {
            rows.push(TimelineRow {
                clock: clock.clone(),
                phase: phase.clone(),
                token_id: t.token_id.clone(),
                slot_id: t.slot_id.clone(),
                from_status: t.from_status.map(|s| s.to_string()).unwrap_or_default(),
                to_status: t.to_status.to_string(),
                reason: t.reason.to_string(),
                detail: t.detail.clone().unwrap_or_default(),
            });
        }
        Ok(())
    }
}

// ==========================================
// 模拟过程
// ==========================================

struct Simulation {
    state: AppState,
    timeline: Arc<TimelinePublisher>,
    date: NaiveDate,
    doctor_ids: Vec<String>,
    issued: Vec<AllocationResponse>, // 按分配顺序
}

fn main() -> anyhow::Result<()> {
    logging::init();

    let db_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
    let csv_path = std::env::args().nth(2);

    reset_db(&db_path)?;

    let timeline = Arc::new(TimelinePublisher::default());
    let state = AppState::with_components(
        db_path.clone(),
        Arc::new(UuidTokenIdGenerator),
        timeline.clone(),
    )
    .map_err(anyhow::Error::msg)?;

    let (y, m, d) = SIMULATION_DATE;
    let date = NaiveDate::from_ymd_opt(y, m, d).context("非法模拟日期")?;

    let mut sim = Simulation {
        state,
        timeline,
        date,
        doctor_ids: Vec::new(),
        issued: Vec::new(),
    };

    println!("==================================================");
    println!("{} - 门诊日全流程模拟", opd_token_engine::APP_NAME);
    println!("模拟日期: {}  开始时间: {}", date, Local::now().format("%Y-%m-%d %H:%M:%S"));
    println!("==================================================");

    sim.setup_doctors_and_slots()?;
    sim.morning_rush()?;
    sim.walk_ins()?;
    sim.paid_priority()?;
    sim.cancellations()?;
    sim.emergencies()?;
    sim.no_shows()?;
    sim.follow_ups()?;

    let statuses = sim.final_report()?;
    let violations = validate_slots(&statuses);

    if let Some(path) = csv_path {
        write_timeline(&path, &sim.timeline.rows())?;
        println!("\n事件时间线已写入: {}", path);
    }

    if !violations.is_empty() {
        for v in &violations {
            eprintln!("  ✗ {}", v);
        }
        bail!("发现 {} 处时段名单不变量违反", violations.len());
    }
    println!("\n✓ 所有时段均满足: 确认人数 ≤ 容量 / 候补有序 / 无重复成员");
    Ok(())
}

fn reset_db(db_path: &str) -> anyhow::Result<()> {
    let path = Path::new(db_path);
    if path.exists() {
        fs::remove_file(path).with_context(|| format!("无法删除旧数据库: {}", db_path))?;
    }
    Ok(())
}

fn time(h: u32, m: u32) -> anyhow::Result<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0).with_context(|| format!("非法时间: {:02}:{:02}", h, m))
}

impl Simulation {
    fn phase(&self, clock: &str, title: &str) {
        self.timeline.enter_phase(clock, title);
        println!("\n[{}] ===== {} =====", clock, title);
    }

    fn setup_doctors_and_slots(&mut self) -> anyhow::Result<()> {
        self.phase("07:30", "建档: 医生与出诊时段");

        let doctors = [
            ("DOC001", "Dr. Rajesh Kumar", "Cardiology"),
            ("DOC002", "Dr. Priya Sharma", "Orthopedics"),
            ("DOC003", "Dr. Amit Patel", "General Medicine"),
        ];
        let windows = vec![
            SlotWindow { start_time: time(9, 0)?, end_time: time(10, 0)?, max_capacity: Some(4) },
            SlotWindow { start_time: time(10, 0)?, end_time: time(11, 0)?, max_capacity: Some(6) },
            SlotWindow { start_time: time(11, 0)?, end_time: time(12, 0)?, max_capacity: Some(5) },
            SlotWindow { start_time: time(12, 0)?, end_time: time(13, 0)?, max_capacity: Some(5) },
        ];

        for (id, name, specialization) in doctors {
            let doctor = self.state.schedule_api.create_doctor(CreateDoctorRequest {
                doctor_id: Some(id.to_string()),
                name: name.to_string(),
                specialization: specialization.to_string(),
            })?;
            let slots = self
                .state
                .schedule_api
                .create_slots(&doctor.doctor_id, self.date, &windows)?;
            println!(
                "  {} ({}) - {} 个时段",
                doctor.name,
                doctor.specialization,
                slots.len()
            );
            self.doctor_ids.push(doctor.doctor_id);
        }
        Ok(())
    }

    fn book(
        &mut self,
        doctor_idx: usize,
        start: NaiveTime,
        (name, phone): (&str, &str),
        source: &str,
    ) -> anyhow::Result<()> {
        let doctor_id = &self.doctor_ids[doctor_idx % self.doctor_ids.len()];
        let response = self.state.token_api.allocate_by_time(
            doctor_id,
            self.date,
            start,
            &PatientInput::new(name, phone),
            source,
        )?;
        print_allocation(&response);
        self.issued.push(response);
        Ok(())
    }

    fn morning_rush(&mut self) -> anyhow::Result<()> {
        self.phase("08:00", "线上预约高峰");
        for (idx, patient) in ONLINE_PATIENTS.iter().enumerate() {
            self.book(idx, time(9, 0)?, *patient, "ONLINE_BOOKING")?;
        }
        Ok(())
    }

    fn walk_ins(&mut self) -> anyhow::Result<()> {
        self.phase("08:30", "现场挂号");
        for (idx, patient) in WALK_IN_PATIENTS.iter().enumerate() {
            self.book(idx, time(9, 0)?, *patient, "WALK_IN")?;
        }
        Ok(())
    }

    fn paid_priority(&mut self) -> anyhow::Result<()> {
        self.phase("09:00", "付费优先");
        let patients = [("Mr. Sharma", "9810000001"), ("Mrs. Kapoor", "9810000002")];
        for (idx, patient) in patients.iter().enumerate() {
            self.book(idx, time(10, 0)?, *patient, "PAID_PRIORITY")?;
        }
        Ok(())
    }

    /// 取 issued 中当前仍为 CONFIRMED 的号源
    fn confirmed_tokens(&self) -> anyhow::Result<Vec<String>> {
        let mut ids = Vec::new();
        for issued in &self.issued {
            let detail = self.state.token_api.get_token_detail(&issued.token_id)?;
            if detail.token.status == TokenStatus::Confirmed {
                ids.push(issued.token_id.clone());
            }
        }
        Ok(ids)
    }

    fn cancellations(&mut self) -> anyhow::Result<()> {
        self.phase("09:15", "患者取消");
        for token_id in self.confirmed_tokens()?.into_iter().take(3) {
            let response = self.state.token_api.cancel_token(&token_id)?;
            println!("  取消 {} → {}", token_id, describe_effect(&response.effect));
        }
        Ok(())
    }

    fn emergencies(&mut self) -> anyhow::Result<()> {
        self.phase("09:30", "急诊加号");
        let doctor_id = self.doctor_ids[0].clone();
        let slot_id = format!("{}-{}-0900", doctor_id, self.date.format("%Y%m%d"));
        let patients = [
            ("Emergency - Chest Pain", "9820000001"),
            ("Emergency - Accident Victim", "9820000002"),
        ];
        for (name, phone) in patients {
            let response = self
                .state
                .token_api
                .allocate_emergency(&slot_id, &PatientInput::new(name, phone))?;
            print_allocation(&response);
            if let Some(displaced) = &response.displaced {
                println!(
                    "      挤占 {} ({}) → 候补第 {} 位",
                    displaced.token_id, displaced.priority, displaced.waitlist_position
                );
            }
            self.issued.push(response);
        }
        Ok(())
    }

    fn no_shows(&mut self) -> anyhow::Result<()> {
        self.phase("10:00", "爽约");
        let confirmed = self.confirmed_tokens()?;
        for token_id in confirmed.iter().rev().take(2) {
            let response = self.state.token_api.mark_no_show(token_id)?;
            println!("  爽约 {} → {}", token_id, describe_effect(&response.effect));
        }
        Ok(())
    }

    fn follow_ups(&mut self) -> anyhow::Result<()> {
        self.phase("10:30", "复诊预约");
        // 复诊沿用已登记的手机号, 不重复建档
        let patients = [WALK_IN_PATIENTS[0], ONLINE_PATIENTS[1]];
        for (idx, patient) in patients.iter().enumerate() {
            self.book(idx, time(11, 0)?, *patient, "FOLLOW_UP")?;
        }
        Ok(())
    }

    fn final_report(&self) -> anyhow::Result<Vec<SlotStatus>> {
        println!("\n==================================================");
        println!("日终报告");
        println!("==================================================");

        let stats = self.state.schedule_api.get_system_stats()?;
        println!(
            "医生 {} / 就诊人 {} / 时段 {} / 号源 {} (确认 {}, 候补 {}, 取消 {}, 爽约 {})",
            stats.doctors,
            stats.patients,
            stats.slots,
            stats.total_tokens,
            stats.tokens.confirmed,
            stats.tokens.waitlisted,
            stats.tokens.cancelled,
            stats.tokens.no_show
        );

        let mut statuses = Vec::new();
        for doctor in self.state.schedule_api.list_doctors()? {
            let slots = self
                .state
                .schedule_api
                .list_doctor_slots(&doctor.doctor_id, Some(self.date))?;
            let mut capacity = 0u32;
            let mut allocated = 0u32;
            let mut lines = Vec::new();
            for slot in &slots {
                let status = self.state.token_api.get_slot_status(&slot.slot_id)?;
                capacity += status.max_capacity;
                allocated += status.allocated_count;
                lines.push(format!(
                    "    {} {}: {}/{} (候补 {})",
                    if status.available_capacity == 0 { "●" } else { "○" },
                    status.time_range,
                    status.allocated_count,
                    status.max_capacity,
                    status.waitlist_count
                ));
                statuses.push(status);
            }

            let utilization = if capacity > 0 {
                f64::from(allocated) / f64::from(capacity) * 100.0
            } else {
                0.0
            };
            println!(
                "\n  {} ({}) 利用率 {:.1}%",
                doctor.name, doctor.specialization, utilization
            );
            for line in lines {
                println!("{}", line);
            }
        }

        println!("\n事件时间线: {} 条状态转换", self.timeline.rows().len());
        Ok(statuses)
    }
}

fn print_allocation(response: &AllocationResponse) {
    match response.status {
        TokenStatus::Confirmed => println!(
            "  {} [{}] → 确认 #{} 预计 {}",
            response.patient_name,
            response.source,
            response.seq_no.unwrap_or_default(),
            response
                .estimated_time
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default()
        ),
        _ => println!(
            "  {} [{}] → 候补第 {} 位, 预计等待 {} 分钟",
            response.patient_name,
            response.source,
            response.waitlist_position.unwrap_or_default(),
            response.estimated_wait_minutes.unwrap_or_default()
        ),
    }
}

fn describe_effect(effect: &ReleaseEffect) -> String {
    match effect {
        ReleaseEffect::AlreadyTerminal => "已是终态, 无操作".to_string(),
        ReleaseEffect::WaitlistEntryRemoved => "移出候补".to_string(),
        ReleaseEffect::Promoted(p) => format!("候补 {} 晋升为 #{}", p.token_id, p.seq_no),
        ReleaseEffect::NoEligibleWaitlistEntry => "名额空出, 无候补".to_string(),
    }
}

/// 日终名单不变量校验
fn validate_slots(statuses: &[SlotStatus]) -> Vec<String> {
    let mut violations = Vec::new();
    for status in statuses {
        if status.allocated_count > status.max_capacity {
            violations.push(format!(
                "{} 超出容量: {}/{}",
                status.slot_id, status.allocated_count, status.max_capacity
            ));
        }

        let ordered = status
            .waitlist
            .windows(2)
            .all(|w| (w[0].priority, w[0].created_at) <= (w[1].priority, w[1].created_at));
        if !ordered {
            violations.push(format!("{} 候补名单顺序错误", status.slot_id));
        }

        let mut seen = HashSet::new();
        for view in status.confirmed.iter().chain(status.waitlist.iter()) {
            if !seen.insert(view.token_id.as_str()) {
                violations.push(format!("{} 号源重复: {}", status.slot_id, view.token_id));
            }
        }
    }
    violations
}

fn write_timeline(path: &str, rows: &[TimelineRow]) -> anyhow::Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("无法创建 CSV: {}", path))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
