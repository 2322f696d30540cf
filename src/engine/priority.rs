// ==========================================
// 门诊号源分配系统 - 优先级分类器
// ==========================================
// 红线: 来源 → 优先级是全映射, 未知来源显式拒绝
// ==========================================

use crate::domain::types::{PriorityRank, TokenSource, UnknownSourceError};

// ==========================================
// PriorityClassifier - 优先级分类器 (纯函数, 无状态)
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct PriorityClassifier;

impl PriorityClassifier {
    pub fn new() -> Self {
        Self
    }

    /// 来源字符串 → 优先级
    pub fn rank_of(&self, source: &str) -> Result<PriorityRank, UnknownSourceError> {
        self.classify(source).map(|(_, rank)| rank)
    }

    /// 来源字符串 → (来源枚举, 优先级)
    pub fn classify(&self, source: &str) -> Result<(TokenSource, PriorityRank), UnknownSourceError> {
        let source: TokenSource = source.parse()?;
        Ok((source, source.rank()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_mapping_is_total() {
        let classifier = PriorityClassifier::new();
        let ranks: Vec<u8> = ["EMERGENCY", "PAID_PRIORITY", "FOLLOW_UP", "ONLINE_BOOKING", "WALK_IN"]
            .iter()
            .map(|s| classifier.rank_of(s).unwrap().value())
            .collect();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_unknown_source_rejected() {
        let classifier = PriorityClassifier::new();
        assert_eq!(
            classifier.rank_of("VIP"),
            Err(UnknownSourceError("VIP".to_string()))
        );
        assert_eq!(
            classifier.classify("follow_up"),
            Ok((TokenSource::FollowUp, PriorityRank::FOLLOW_UP))
        );
    }
}
