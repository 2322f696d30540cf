// ==========================================
// 门诊号源分配系统 - 应用状态
// ==========================================
// 职责: 组装共享连接、仓储、配置、时段锁与 API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use crate::api::{ScheduleApi, TokenApi};
use crate::config::config_manager::ConfigManager;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{
    NoOpEventPublisher, SlotLockRegistry, TokenEventPublisher, TokenIdGenerator,
    UuidTokenIdGenerator,
};
use crate::repository::{
    DoctorRepository, PatientRepository, SlotLedgerStore, SqliteSlotLedgerStore,
    TimeSlotRepository, TokenRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 号源API (分配 / 急诊 / 取消 / 爽约 / 查询)
    pub token_api: Arc<TokenApi>,

    /// 排班管理API
    pub schedule_api: Arc<ScheduleApi>,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 时段锁注册表 (进程内共享)
    pub slot_locks: Arc<SlotLockRegistry>,
}

impl AppState {
    /// 创建新的AppState实例 (UUID 号源 ID, 不发布事件)
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_components(
            db_path,
            Arc::new(UuidTokenIdGenerator),
            Arc::new(NoOpEventPublisher),
        )
    }

    /// 使用指定的 ID 生成器与事件发布者创建AppState
    ///
    /// # 说明
    /// 1. 打开共享连接并确保表结构
    /// 2. 初始化所有Repository
    /// 3. 创建所有API实例
    pub fn with_components(
        db_path: String,
        id_generator: Arc<dyn TokenIdGenerator>,
        publisher: Arc<dyn TokenEventPublisher>,
    ) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("无法初始化表结构: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化Repository层
        // ==========================================
        let doctor_repo = Arc::new(DoctorRepository::new(conn.clone()));
        let slot_repo = Arc::new(TimeSlotRepository::new(conn.clone()));
        let token_repo = Arc::new(TokenRepository::new(conn.clone()));
        let patient_repo = Arc::new(PatientRepository::new(conn.clone()));
        let ledger_store: Arc<dyn SlotLedgerStore> =
            Arc::new(SqliteSlotLedgerStore::new(conn.clone()));

        let config_manager = Arc::new(ConfigManager::from_connection(conn));
        let slot_locks = Arc::new(SlotLockRegistry::new());

        // ==========================================
        // 创建API实例
        // ==========================================
        let token_api = Arc::new(TokenApi::new(
            ledger_store,
            patient_repo.clone(),
            token_repo.clone(),
            config_manager.clone(),
            slot_locks.clone(),
            id_generator,
            publisher,
        ));
        let schedule_api = Arc::new(ScheduleApi::new(
            doctor_repo,
            slot_repo,
            token_repo,
            patient_repo,
            config_manager.clone(),
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            token_api,
            schedule_api,
            config_manager,
            slot_locks,
        })
    }
}

/// 获取默认数据库路径
///
/// 优先级: 环境变量 OPD_TOKEN_ENGINE_DB_PATH > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("OPD_TOKEN_ENGINE_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./opd_token_engine.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("opd-token-engine");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("opd_token_engine.db");
        }
    }

    path.to_string_lossy().to_string()
}
