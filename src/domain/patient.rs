// ==========================================
// 门诊号源分配系统 - 就诊人领域模型
// ==========================================
// 红线: 手机号唯一, 同一手机号只对应一名就诊人
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Patient - 就诊人
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: String,
    pub name: String,
    pub phone: String, // 去重键 (已去除空白)
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub medical_record_number: String, // 病历号
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// 新建就诊人, 病历号由 ID 派生
    pub fn new(
        patient_id: String,
        name: String,
        phone: String,
        age: Option<u32>,
        gender: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let medical_record_number = format!("MRN-{}", patient_id.trim_start_matches("PAT-"));
        Self {
            patient_id,
            name,
            phone,
            age,
            gender,
            medical_record_number,
            created_at,
        }
    }
}

/// 手机号规范化: 去掉空格与连字符
pub fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mrn_derived_from_id() {
        let patient = Patient::new(
            "PAT-1A2B3C4D".to_string(),
            "Meena Iyer".to_string(),
            "9876543210".to_string(),
            Some(42),
            None,
            Utc::now(),
        );
        assert_eq!(patient.medical_record_number, "MRN-1A2B3C4D");
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone(" 98765-43210 "), "9876543210");
        assert_eq!(normalize_phone("+91 98765 43210"), "+919876543210");
    }
}
