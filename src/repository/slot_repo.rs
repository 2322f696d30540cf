// ==========================================
// 门诊号源分配系统 - 出诊时段数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 名单成员关系由 token 表的 status/seq_no/waitlist_pos 承载
// ==========================================

use crate::domain::slot::TimeSlot;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SLOT_COLUMNS: &str =
    "slot_id, doctor_id, slot_date, start_time, end_time, max_capacity, next_seq_no, created_at";

fn map_slot_row(row: &Row) -> rusqlite::Result<TimeSlot> {
    Ok(TimeSlot {
        slot_id: row.get(0)?,
        doctor_id: row.get(1)?,
        slot_date: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        max_capacity: row.get(5)?,
        next_seq_no: row.get(6)?,
        created_at: row.get(7)?,
    })
}

// ==========================================
// 连接级操作 (供事务内复用)
// ==========================================

pub(crate) fn find_slot(conn: &Connection, slot_id: &str) -> RepositoryResult<Option<TimeSlot>> {
    let slot = conn
        .query_row(
            &format!("SELECT {} FROM time_slot WHERE slot_id = ?1", SLOT_COLUMNS),
            params![slot_id],
            map_slot_row,
        )
        .optional()?;
    Ok(slot)
}

pub(crate) fn find_slot_by_start(
    conn: &Connection,
    doctor_id: &str,
    slot_date: NaiveDate,
    start_time: NaiveTime,
) -> RepositoryResult<Option<TimeSlot>> {
    let slot = conn
        .query_row(
            &format!(
                "SELECT {} FROM time_slot WHERE doctor_id = ?1 AND slot_date = ?2 AND start_time = ?3",
                SLOT_COLUMNS
            ),
            params![doctor_id, slot_date, start_time],
            map_slot_row,
        )
        .optional()?;
    Ok(slot)
}

pub(crate) fn update_next_seq_no(
    conn: &Connection,
    slot_id: &str,
    next_seq_no: u32,
) -> RepositoryResult<()> {
    let affected = conn.execute(
        "UPDATE time_slot SET next_seq_no = ?2 WHERE slot_id = ?1",
        params![slot_id, next_seq_no],
    )?;
    if affected == 0 {
        return Err(RepositoryError::SlotNotFound(slot_id.to_string()));
    }
    Ok(())
}

// ==========================================
// TimeSlotRepository - 时段仓储
// ==========================================
pub struct TimeSlotRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TimeSlotRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 批量插入时段（单事务）
    pub fn insert_batch(&self, slots: &[TimeSlot]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        for slot in slots {
            tx.execute(
                r#"
                INSERT INTO time_slot (
                    slot_id, doctor_id, slot_date, start_time, end_time,
                    max_capacity, next_seq_no, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    slot.slot_id,
                    slot.doctor_id,
                    slot.slot_date,
                    slot.start_time,
                    slot.end_time,
                    slot.max_capacity,
                    slot.next_seq_no,
                    slot.created_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(slots.len())
    }

    /// 按 (医生, 日期, 开始时间) 查询时段
    pub fn find_by_doctor_and_start(
        &self,
        doctor_id: &str,
        slot_date: NaiveDate,
        start_time: NaiveTime,
    ) -> RepositoryResult<Option<TimeSlot>> {
        let conn = self.get_conn()?;
        find_slot_by_start(&conn, doctor_id, slot_date, start_time)
    }

    /// 查询医生的时段列表（可按日期过滤）
    pub fn list_by_doctor(
        &self,
        doctor_id: &str,
        slot_date: Option<NaiveDate>,
    ) -> RepositoryResult<Vec<TimeSlot>> {
        let conn = self.get_conn()?;

        let slots = match slot_date {
            Some(date) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM time_slot WHERE doctor_id = ?1 AND slot_date = ?2
                     ORDER BY slot_date, start_time",
                    SLOT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![doctor_id, date], map_slot_row)?
                    .collect::<rusqlite::Result<Vec<TimeSlot>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM time_slot WHERE doctor_id = ?1 ORDER BY slot_date, start_time",
                    SLOT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(params![doctor_id], map_slot_row)?
                    .collect::<rusqlite::Result<Vec<TimeSlot>>>()?;
                rows
            }
        };

        Ok(slots)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM time_slot", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup() -> (Arc<Mutex<Connection>>, TimeSlotRepository) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO doctor (doctor_id, name, specialization, active, created_at)
             VALUES ('D1', 'Dr. One', 'General', 1, '2026-01-01 00:00:00+00:00')",
            [],
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        (conn.clone(), TimeSlotRepository::new(conn))
    }

    fn make_slot(id: &str, hour: u32) -> TimeSlot {
        TimeSlot {
            slot_id: id.to_string(),
            doctor_id: "D1".to_string(),
            slot_date: NaiveDate::from_ymd_opt(2026, 1, 29).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            max_capacity: 4,
            next_seq_no: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_lookup_by_start() {
        let (_conn, repo) = setup();
        repo.insert_batch(&[make_slot("S10", 10), make_slot("S09", 9)])
            .unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 1, 29).unwrap();
        let found = repo
            .find_by_doctor_and_start("D1", date, NaiveTime::from_hms_opt(9, 0, 0).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(found.slot_id, "S09");
        assert_eq!(found.max_capacity, 4);

        let listed = repo.list_by_doctor("D1", Some(date)).unwrap();
        let ids: Vec<_> = listed.iter().map(|s| s.slot_id.as_str()).collect();
        assert_eq!(ids, vec!["S09", "S10"]);
        assert!(repo
            .list_by_doctor("D1", NaiveDate::from_ymd_opt(2026, 1, 30))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unique_start_per_doctor() {
        let (_conn, repo) = setup();
        repo.insert_batch(&[make_slot("S1", 9)]).unwrap();
        let err = repo
            .insert_batch(&[make_slot("S3", 11), make_slot("S2", 9)])
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
        // 整批回滚
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_update_next_seq_no() {
        let (conn, repo) = setup();
        repo.insert_batch(&[make_slot("S1", 9)]).unwrap();

        update_next_seq_no(&conn.lock().unwrap(), "S1", 7).unwrap();
        let slot = find_slot(&conn.lock().unwrap(), "S1").unwrap().unwrap();
        assert_eq!(slot.next_seq_no, 7);

        let err = update_next_seq_no(&conn.lock().unwrap(), "S404", 2).unwrap_err();
        assert!(matches!(err, RepositoryError::SlotNotFound(_)));
    }
}
