// ==========================================
// 门诊号源分配系统 - 医生数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::slot::Doctor;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const DOCTOR_COLUMNS: &str = "doctor_id, name, specialization, active, created_at";

fn map_doctor_row(row: &Row) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        doctor_id: row.get(0)?,
        name: row.get(1)?,
        specialization: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

// ==========================================
// DoctorRepository - 医生仓储
// ==========================================
pub struct DoctorRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DoctorRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入医生
    pub fn insert(&self, doctor: &Doctor) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO doctor (doctor_id, name, specialization, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                doctor.doctor_id,
                doctor.name,
                doctor.specialization,
                doctor.active,
                doctor.created_at,
            ],
        )?;
        Ok(())
    }

    /// 按 ID 查询医生
    pub fn find_by_id(&self, doctor_id: &str) -> RepositoryResult<Option<Doctor>> {
        let conn = self.get_conn()?;
        let doctor = conn
            .query_row(
                &format!("SELECT {} FROM doctor WHERE doctor_id = ?1", DOCTOR_COLUMNS),
                params![doctor_id],
                map_doctor_row,
            )
            .optional()?;
        Ok(doctor)
    }

    /// 查询全部医生（按创建时间）
    pub fn list_all(&self) -> RepositoryResult<Vec<Doctor>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM doctor ORDER BY created_at, doctor_id",
            DOCTOR_COLUMNS
        ))?;
        let doctors = stmt
            .query_map([], map_doctor_row)?
            .collect::<rusqlite::Result<Vec<Doctor>>>()?;
        Ok(doctors)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM doctor", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup() -> DoctorRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        DoctorRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn make_doctor(id: &str) -> Doctor {
        Doctor {
            doctor_id: id.to_string(),
            name: format!("Dr. {}", id),
            specialization: "Cardiology".to_string(),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let repo = setup();
        repo.insert(&make_doctor("DOC001")).unwrap();

        let found = repo.find_by_id("DOC001").unwrap().unwrap();
        assert_eq!(found.name, "Dr. DOC001");
        assert!(found.active);
        assert!(repo.find_by_id("DOC404").unwrap().is_none());
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let repo = setup();
        repo.insert(&make_doctor("DOC001")).unwrap();
        let err = repo.insert(&make_doctor("DOC001")).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }
}
