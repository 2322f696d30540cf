// ==========================================
// 门诊号源分配系统 - 号源数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 写入只发生在 SlotLedgerStore::commit 的事务内,
//       本仓储对外只提供查询
// ==========================================

use crate::domain::token::{Token, TokenTransition};
use crate::domain::types::{PriorityRank, TokenSource, TokenStatus, TransitionReason};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

const TOKEN_COLUMNS: &str = "token_id, slot_id, patient_id, source, priority, status, \
     seq_no, estimated_time, created_at, updated_at";

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

pub(crate) fn map_token_row(row: &Row) -> rusqlite::Result<Token> {
    let source_raw: String = row.get(3)?;
    let source = source_raw
        .parse::<TokenSource>()
        .map_err(|e| conversion_error(3, e.to_string()))?;

    let priority_raw: u8 = row.get(4)?;
    let priority = PriorityRank::from_value(priority_raw)
        .ok_or_else(|| conversion_error(4, format!("非法优先级: {}", priority_raw)))?;

    let status_raw: String = row.get(5)?;
    let status = TokenStatus::from_db_str(&status_raw)
        .ok_or_else(|| conversion_error(5, format!("非法号源状态: {}", status_raw)))?;

    Ok(Token {
        token_id: row.get(0)?,
        slot_id: row.get(1)?,
        patient_id: row.get(2)?,
        source,
        priority,
        status,
        seq_no: row.get(6)?,
        estimated_time: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_event_row(row: &Row) -> rusqlite::Result<TokenTransition> {
    let from_raw: Option<String> = row.get(2)?;
    let from_status = match from_raw {
        Some(s) => Some(
            TokenStatus::from_db_str(&s)
                .ok_or_else(|| conversion_error(2, format!("非法号源状态: {}", s)))?,
        ),
        None => None,
    };

    let to_raw: String = row.get(3)?;
    let to_status = TokenStatus::from_db_str(&to_raw)
        .ok_or_else(|| conversion_error(3, format!("非法号源状态: {}", to_raw)))?;

    let reason_raw: String = row.get(4)?;
    let reason = TransitionReason::from_db_str(&reason_raw)
        .ok_or_else(|| conversion_error(4, format!("非法转换原因: {}", reason_raw)))?;

    Ok(TokenTransition {
        token_id: row.get(0)?,
        slot_id: row.get(1)?,
        from_status,
        to_status,
        reason,
        detail: row.get(5)?,
        at: row.get(6)?,
    })
}

// ==========================================
// 连接级操作 (供事务内复用)
// ==========================================

pub(crate) fn find_token(conn: &Connection, token_id: &str) -> RepositoryResult<Option<Token>> {
    let token = conn
        .query_row(
            &format!("SELECT {} FROM token WHERE token_id = ?1", TOKEN_COLUMNS),
            params![token_id],
            map_token_row,
        )
        .optional()?;
    Ok(token)
}

/// 时段全部号源
///
/// 候补号源按持久化的 waitlist_pos 排在前, 其余按序号/创建时间
pub(crate) fn list_tokens_by_slot(conn: &Connection, slot_id: &str) -> RepositoryResult<Vec<Token>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM token WHERE slot_id = ?1
         ORDER BY CASE WHEN waitlist_pos IS NULL THEN 1 ELSE 0 END,
                  waitlist_pos, seq_no, created_at, token_id",
        TOKEN_COLUMNS
    ))?;
    let tokens = stmt
        .query_map(params![slot_id], map_token_row)?
        .collect::<rusqlite::Result<Vec<Token>>>()?;
    Ok(tokens)
}

/// 插入或更新号源 (ON CONFLICT 覆写可变列)
pub(crate) fn upsert_token(
    conn: &Connection,
    token: &Token,
    waitlist_pos: Option<u32>,
) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO token (
            token_id, slot_id, patient_id, source, priority, status,
            seq_no, waitlist_pos, estimated_time, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT(token_id) DO UPDATE SET
            status = excluded.status,
            seq_no = excluded.seq_no,
            waitlist_pos = excluded.waitlist_pos,
            estimated_time = excluded.estimated_time,
            updated_at = excluded.updated_at
        "#,
        params![
            token.token_id,
            token.slot_id,
            token.patient_id,
            token.source.to_db_str(),
            token.priority.value(),
            token.status.to_db_str(),
            token.seq_no,
            waitlist_pos,
            token.estimated_time,
            token.created_at,
            token.updated_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_event(conn: &Connection, transition: &TokenTransition) -> RepositoryResult<()> {
    conn.execute(
        r#"
        INSERT INTO token_event (
            token_id, slot_id, from_status, to_status, reason, detail, event_ts
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            transition.token_id,
            transition.slot_id,
            transition.from_status.map(|s| s.to_db_str()),
            transition.to_status.to_db_str(),
            transition.reason.to_db_str(),
            transition.detail,
            transition.at,
        ],
    )?;
    Ok(())
}

pub(crate) fn list_events(conn: &Connection, token_id: &str) -> RepositoryResult<Vec<TokenTransition>> {
    let mut stmt = conn.prepare(
        "SELECT token_id, slot_id, from_status, to_status, reason, detail, event_ts
         FROM token_event WHERE token_id = ?1 ORDER BY event_id",
    )?;
    let events = stmt
        .query_map(params![token_id], map_event_row)?
        .collect::<rusqlite::Result<Vec<TokenTransition>>>()?;
    Ok(events)
}

// ==========================================
// TokenStatusCounts - 状态计数
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStatusCounts {
    pub confirmed: i64,
    pub waitlisted: i64,
    pub cancelled: i64,
    pub no_show: i64,
}

impl TokenStatusCounts {
    pub fn total(&self) -> i64 {
        self.confirmed + self.waitlisted + self.cancelled + self.no_show
    }
}

// ==========================================
// TokenRepository - 号源仓储 (只读)
// ==========================================
pub struct TokenRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TokenRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 就诊人的全部号源 (按创建时间)
    pub fn list_by_patient(&self, patient_id: &str) -> RepositoryResult<Vec<Token>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM token WHERE patient_id = ?1 ORDER BY created_at, token_id",
            TOKEN_COLUMNS
        ))?;
        let tokens = stmt
            .query_map(params![patient_id], map_token_row)?
            .collect::<rusqlite::Result<Vec<Token>>>()?;
        Ok(tokens)
    }

    /// 全局状态计数
    pub fn count_by_status(&self) -> RepositoryResult<TokenStatusCounts> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM token GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, i64)>>>()?;

        let mut counts = TokenStatusCounts::default();
        for (status, n) in rows {
            match TokenStatus::from_db_str(&status) {
                Some(TokenStatus::Confirmed) => counts.confirmed = n,
                Some(TokenStatus::Waitlisted) => counts.waitlisted = n,
                Some(TokenStatus::Cancelled) => counts.cancelled = n,
                Some(TokenStatus::NoShow) => counts.no_show = n,
                None => {
                    return Err(RepositoryError::FieldValueError {
                        field: "status".to_string(),
                        message: format!("非法号源状态: {}", status),
                    })
                }
            }
        }
        Ok(counts)
    }

    /// 时段内非终态号源数 (CONFIRMED + WAITLISTED)
    pub fn count_active_by_slot(&self, slot_id: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM token WHERE slot_id = ?1 AND status IN ('CONFIRMED', 'WAITLISTED')",
            params![slot_id],
            |row| row.get(0),
        )?)
    }
}
