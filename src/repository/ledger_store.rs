// ==========================================
// 门诊号源分配系统 - 时段名单持久化
// ==========================================
// 职责: 加载 SlotContext / 单事务提交 SlotContext
// 红线: 提交要么全部成功, 要么不留任何痕迹
// 说明: 引擎只依赖 SlotLedgerStore trait, 测试可替换为内存实现
// ==========================================

use crate::domain::ledger::SlotContext;
use crate::domain::slot::TimeSlot;
use crate::domain::token::{Token, TokenTransition};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::{slot_repo, token_repo};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::debug;

// ==========================================
// SlotLedgerStore Trait
// ==========================================
pub trait SlotLedgerStore: Send + Sync {
    fn find_slot(&self, slot_id: &str) -> RepositoryResult<Option<TimeSlot>>;

    /// 按 (医生, 日期, 开始时间) 定位时段
    fn find_slot_by_time(
        &self,
        doctor_id: &str,
        slot_date: NaiveDate,
        start_time: NaiveTime,
    ) -> RepositoryResult<Option<TimeSlot>>;

    fn find_token(&self, token_id: &str) -> RepositoryResult<Option<Token>>;

    /// 加载时段工作集 (时段 + 名单 + 全部号源)
    ///
    /// # 返回
    /// - Err(SlotNotFound): 时段不存在
    /// - Err(DataIntegrityViolation): 持久化数据违反名单不变量
    fn load_slot_context(&self, slot_id: &str) -> RepositoryResult<SlotContext>;

    /// 提交工作集与本次产生的状态转换
    fn commit(&self, context: &SlotContext, transitions: &[TokenTransition]) -> RepositoryResult<()>;

    fn list_token_events(&self, token_id: &str) -> RepositoryResult<Vec<TokenTransition>>;
}

// ==========================================
// SqliteSlotLedgerStore - SQLite 实现
// ==========================================
pub struct SqliteSlotLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSlotLedgerStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl SlotLedgerStore for SqliteSlotLedgerStore {
    fn find_slot(&self, slot_id: &str) -> RepositoryResult<Option<TimeSlot>> {
        let conn = self.get_conn()?;
        slot_repo::find_slot(&conn, slot_id)
    }

    fn find_slot_by_time(
        &self,
        doctor_id: &str,
        slot_date: NaiveDate,
        start_time: NaiveTime,
    ) -> RepositoryResult<Option<TimeSlot>> {
        let conn = self.get_conn()?;
        slot_repo::find_slot_by_start(&conn, doctor_id, slot_date, start_time)
    }

    fn find_token(&self, token_id: &str) -> RepositoryResult<Option<Token>> {
        let conn = self.get_conn()?;
        token_repo::find_token(&conn, token_id)
    }

    fn load_slot_context(&self, slot_id: &str) -> RepositoryResult<SlotContext> {
        let conn = self.get_conn()?;
        let slot = slot_repo::find_slot(&conn, slot_id)?
            .ok_or_else(|| RepositoryError::SlotNotFound(slot_id.to_string()))?;
        let tokens = token_repo::list_tokens_by_slot(&conn, slot_id)?;

        let context = SlotContext::from_tokens(slot, tokens)?;
        context.verify()?;
        Ok(context)
    }

    fn commit(&self, context: &SlotContext, transitions: &[TokenTransition]) -> RepositoryResult<()> {
        context.verify()?;

        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let slot_id = context.slot.slot_id.as_str();
        slot_repo::update_next_seq_no(&tx, slot_id, context.ledger.next_seq_no())?;

        for token in context.tokens.values() {
            let waitlist_pos = context
                .ledger
                .waitlist_position(&token.token_id)
                .map(|pos| pos as u32);
            token_repo::upsert_token(&tx, token, waitlist_pos)?;
        }

        for transition in transitions {
            token_repo::insert_event(&tx, transition)?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        debug!(
            slot_id = %slot_id,
            tokens = context.tokens.len(),
            transitions = transitions.len(),
            "时段名单已提交"
        );
        Ok(())
    }

    fn list_token_events(&self, token_id: &str) -> RepositoryResult<Vec<TokenTransition>> {
        let conn = self.get_conn()?;
        token_repo::list_events(&conn, token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{TokenSource, TokenStatus, TransitionReason};
    use chrono::{TimeZone, Utc};

    fn setup(capacity: u32) -> SqliteSlotLedgerStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO doctor (doctor_id, name, specialization, active, created_at)
             VALUES ('D1', 'Dr. One', 'General', 1, '2026-01-01 00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO patient (patient_id, name, phone, medical_record_number, created_at)
             VALUES ('P1', 'Patient One', '9000000001', 'MRN-P1', '2026-01-01 00:00:00+00:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO time_slot (slot_id, doctor_id, slot_date, start_time, end_time,
                                    max_capacity, next_seq_no, created_at)
             VALUES ('S1', 'D1', '2026-01-29', '09:00:00', '10:00:00', ?1, 1,
                     '2026-01-01 00:00:00+00:00')",
            [capacity],
        )
        .unwrap();
        SqliteSlotLedgerStore::new(Arc::new(Mutex::new(conn)))
    }

    fn admit(ctx: &mut SlotContext, id: &str, source: TokenSource, minute: u32) -> TokenTransition {
        let mut token = Token::new(
            id.to_string(),
            "S1".to_string(),
            "P1".to_string(),
            source,
            Utc.with_ymd_and_hms(2026, 1, 29, 8, minute, 0).unwrap(),
        );
        let reason = if ctx.ledger.available_capacity() > 0 {
            ctx.ledger.insert_confirmed(&mut token).unwrap();
            TransitionReason::Admitted
        } else {
            ctx.ledger.insert_waitlisted(&mut token).unwrap();
            TransitionReason::Waitlisted
        };
        let transition = TokenTransition::new(&token, None, reason, token.created_at);
        ctx.tokens.insert(token.token_id.clone(), token);
        transition
    }

    #[test]
    fn test_commit_then_reload_restores_ledger() {
        let store = setup(1);
        let mut ctx = store.load_slot_context("S1").unwrap();
        let transitions = vec![
            admit(&mut ctx, "T1", TokenSource::OnlineBooking, 0),
            admit(&mut ctx, "T2", TokenSource::WalkIn, 1),
            admit(&mut ctx, "T3", TokenSource::FollowUp, 2),
        ];
        store.commit(&ctx, &transitions).unwrap();

        let reloaded = store.load_slot_context("S1").unwrap();
        assert_eq!(reloaded.ledger.next_seq_no(), 2);
        assert_eq!(reloaded.ledger.confirmed()[0].token_id, "T1");
        let waitlist: Vec<_> = reloaded
            .ledger
            .waitlist()
            .iter()
            .map(|e| e.token_id.as_str())
            .collect();
        assert_eq!(waitlist, vec!["T3", "T2"]);
        assert_eq!(store.list_token_events("T2").unwrap().len(), 1);
        assert_eq!(
            store.find_token("T1").unwrap().unwrap().status,
            TokenStatus::Confirmed
        );
    }

    #[test]
    fn test_commit_rejects_inconsistent_context() {
        let store = setup(2);
        let mut ctx = store.load_slot_context("S1").unwrap();
        let transition = admit(&mut ctx, "T1", TokenSource::OnlineBooking, 0);
        if let Some(token) = ctx.tokens.get_mut("T1") {
            token.status = TokenStatus::Cancelled;
        }

        let err = store.commit(&ctx, &[transition]).unwrap_err();
        assert!(matches!(err, RepositoryError::DataIntegrityViolation(_)));
        assert!(store.find_token("T1").unwrap().is_none());
    }

    #[test]
    fn test_load_missing_slot() {
        let store = setup(1);
        assert!(matches!(
            store.load_slot_context("S404"),
            Err(RepositoryError::SlotNotFound(_))
        ));
    }
}
