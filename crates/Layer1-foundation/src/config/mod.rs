//! Config - warden 설정
//!
//! - `settings.rs` - WardenConfig 및 하위 설정 (모든 필드 기본값 보유)
//! - `loader.rs` - user → project → 명시 파일 → 환경변수 순 병합 로더

mod loader;
mod settings;

pub use loader::{ConfigLoader, ENV_CRASH_GRACE_MS, ENV_SILENT_RECOVERY, ENV_STATE_DIR};
pub use settings::{
    HealthSettings, RecoverySettings, TestRunSettings, WardenConfig, SETTINGS_FILE,
    SNAPSHOT_FILE,
};
