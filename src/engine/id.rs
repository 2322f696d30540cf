// ==========================================
// 门诊号源分配系统 - 号源 ID 生成
// ==========================================

use uuid::Uuid;

pub trait TokenIdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// 默认实现: TKN- 前缀 + UUID v4 前 8 位 (大写)
#[derive(Debug, Clone, Default)]
pub struct UuidTokenIdGenerator;

impl TokenIdGenerator for UuidTokenIdGenerator {
    fn next_id(&self) -> String {
        let simple = Uuid::new_v4().simple().to_string();
        format!("TKN-{}", simple[..8].to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_prefixed() {
        let generator = UuidTokenIdGenerator;
        let id = generator.next_id();
        assert!(id.starts_with("TKN-"));
        assert_eq!(id.len(), 12);
        assert_ne!(id, generator.next_id());
    }
}
