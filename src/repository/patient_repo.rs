// ==========================================
// 门诊号源分配系统 - 就诊人数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 去重: 以规范化后的手机号为唯一键
// ==========================================

use crate::domain::patient::Patient;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const PATIENT_COLUMNS: &str =
    "patient_id, name, phone, age, gender, medical_record_number, created_at";

fn map_patient_row(row: &Row) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        age: row.get(3)?,
        gender: row.get(4)?,
        medical_record_number: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn find_by_phone_in(conn: &Connection, phone: &str) -> rusqlite::Result<Option<Patient>> {
    conn.query_row(
        &format!("SELECT {} FROM patient WHERE phone = ?1", PATIENT_COLUMNS),
        params![phone],
        map_patient_row,
    )
    .optional()
}

// ==========================================
// PatientRepository - 就诊人仓储
// ==========================================
pub struct PatientRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PatientRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按手机号取已有就诊人, 不存在时插入 `candidate`
    ///
    /// # 返回
    /// - (Patient, true): 新建
    /// - (Patient, false): 已存在 (不覆盖既有资料)
    pub fn find_or_create_by_phone(&self, candidate: &Patient) -> RepositoryResult<(Patient, bool)> {
        let conn = self.get_conn()?;

        if let Some(existing) = find_by_phone_in(&conn, &candidate.phone)? {
            return Ok((existing, false));
        }

        conn.execute(
            "INSERT INTO patient (patient_id, name, phone, age, gender,
                                  medical_record_number, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                candidate.patient_id,
                candidate.name,
                candidate.phone,
                candidate.age,
                candidate.gender,
                candidate.medical_record_number,
                candidate.created_at,
            ],
        )?;
        Ok((candidate.clone(), true))
    }

    pub fn find_by_id(&self, patient_id: &str) -> RepositoryResult<Option<Patient>> {
        let conn = self.get_conn()?;
        let patient = conn
            .query_row(
                &format!("SELECT {} FROM patient WHERE patient_id = ?1", PATIENT_COLUMNS),
                params![patient_id],
                map_patient_row,
            )
            .optional()?;
        Ok(patient)
    }

    pub fn find_by_phone(&self, phone: &str) -> RepositoryResult<Option<Patient>> {
        let conn = self.get_conn()?;
        Ok(find_by_phone_in(&conn, phone)?)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM patient", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup() -> PatientRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        PatientRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn make_patient(id: &str, name: &str, phone: &str) -> Patient {
        Patient::new(
            id.to_string(),
            name.to_string(),
            phone.to_string(),
            Some(30),
            Some("F".to_string()),
            Utc::now(),
        )
    }

    #[test]
    fn test_find_or_create_deduplicates_by_phone() {
        let repo = setup();

        let (first, created) = repo
            .find_or_create_by_phone(&make_patient("PAT-0001", "Anita Desai", "9000000001"))
            .unwrap();
        assert!(created);
        assert_eq!(first.patient_id, "PAT-0001");

        // 同一手机号: 返回已有记录, 姓名不被覆盖
        let (again, created) = repo
            .find_or_create_by_phone(&make_patient("PAT-0002", "A. Desai", "9000000001"))
            .unwrap();
        assert!(!created);
        assert_eq!(again.patient_id, "PAT-0001");
        assert_eq!(again.name, "Anita Desai");

        assert_eq!(repo.count().unwrap(), 1);
        assert_eq!(
            repo.find_by_phone("9000000001").unwrap().unwrap().medical_record_number,
            "MRN-0001"
        );
        assert!(repo.find_by_id("PAT-0002").unwrap().is_none());
    }

    #[test]
    fn test_distinct_phones_create_distinct_patients() {
        let repo = setup();
        repo.find_or_create_by_phone(&make_patient("PAT-0001", "A", "9000000001"))
            .unwrap();
        repo.find_or_create_by_phone(&make_patient("PAT-0002", "B", "9000000002"))
            .unwrap();

        assert_eq!(repo.count().unwrap(), 2);
        assert_eq!(repo.find_by_id("PAT-0002").unwrap().unwrap().name, "B");
    }
}
