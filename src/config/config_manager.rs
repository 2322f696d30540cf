// ==========================================
// 门诊号源分配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::allocation_policy::{
    AllocationPolicy, DEFAULT_AVG_CONSULTATION_MINUTES, DEFAULT_SLOT_CAPACITY,
    MAX_AVG_CONSULTATION_MINUTES,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::VictimPolicy;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        Ok(value)
    }

    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入配置值（UPSERT）
    pub fn update_config(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        tracing::info!(config_key = key, value, "配置已更新");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&json!(config_map))
            .map_err(|e| RepositoryError::InternalError(e.to_string()))
    }

    // ===== 分配策略配置 =====

    /// 平均就诊时长（分钟），非法值或超过 24 小时回退默认 5
    pub fn get_avg_consultation_minutes(&self) -> RepositoryResult<u32> {
        let default = DEFAULT_AVG_CONSULTATION_MINUTES.to_string();
        let value = self.get_config_or_default(config_keys::AVG_CONSULTATION_MINUTES, &default)?;
        Ok(parse_positive(
            config_keys::AVG_CONSULTATION_MINUTES,
            &value,
            DEFAULT_AVG_CONSULTATION_MINUTES,
            MAX_AVG_CONSULTATION_MINUTES,
        ))
    }

    /// 新建时段默认容量，非法值回退默认 10
    pub fn get_default_slot_capacity(&self) -> RepositoryResult<u32> {
        let default = DEFAULT_SLOT_CAPACITY.to_string();
        let value = self.get_config_or_default(config_keys::DEFAULT_SLOT_CAPACITY, &default)?;
        Ok(parse_positive(
            config_keys::DEFAULT_SLOT_CAPACITY,
            &value,
            DEFAULT_SLOT_CAPACITY,
            u32::MAX,
        ))
    }

    /// 急诊挤占对象选择策略
    pub fn get_victim_policy(&self) -> RepositoryResult<VictimPolicy> {
        let value = self.get_config_or_default(
            config_keys::EMERGENCY_VICTIM_POLICY,
            VictimPolicy::default().to_db_str(),
        )?;
        Ok(VictimPolicy::from_db_str(&value).unwrap_or_else(|| {
            tracing::warn!(
                config_key = config_keys::EMERGENCY_VICTIM_POLICY,
                raw_value = %value,
                "挤占策略配置无法识别，使用默认策略"
            );
            VictimPolicy::default()
        }))
    }

    /// 读取当前分配策略
    pub fn get_allocation_policy(&self) -> RepositoryResult<AllocationPolicy> {
        Ok(AllocationPolicy {
            avg_consultation_minutes: self.get_avg_consultation_minutes()?,
            victim_policy: self.get_victim_policy()?,
        })
    }
}

/// 解析 1..=max 范围内的整数，越界或非法时回退默认值
fn parse_positive(key: &str, raw: &str, default: u32, max: u32) -> u32 {
    match raw.trim().parse::<u32>() {
        Ok(v) if v > 0 && v <= max => v,
        _ => {
            tracing::warn!(config_key = key, raw_value = %raw, default, "配置值非法，使用默认值");
            default
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const AVG_CONSULTATION_MINUTES: &str = "avg_consultation_minutes";
    pub const DEFAULT_SLOT_CAPACITY: &str = "default_slot_capacity";
    pub const EMERGENCY_VICTIM_POLICY: &str = "emergency_victim_policy";
}
