//! ConfigLoader - 계층 병합 로더
//!
//! 우선순위 (뒤가 이김): `~/.warden/settings.json` → `<cwd>/.warden/settings.json`
//! → `--config` 파일 → 환경변수. CLI 플래그는 호출자가 마지막에 적용한다.

use super::settings::{WardenConfig, SETTINGS_FILE};
use crate::storage::JsonStore;
use crate::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ENV_SILENT_RECOVERY: &str = "WARDEN_SILENT_RECOVERY";
pub const ENV_CRASH_GRACE_MS: &str = "WARDEN_CRASH_GRACE_MS";
pub const ENV_STATE_DIR: &str = "WARDEN_STATE_DIR";

/// 설정 로더
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    layers: Vec<PathBuf>,
    skip_env: bool,
}

impl ConfigLoader {
    /// 빈 로더 (레이어 없음)
    pub fn new() -> Self {
        Self::default()
    }

    /// user + project 레이어가 등록된 로더
    pub fn standard() -> Self {
        let mut loader = Self::new();
        if let Ok(global) = JsonStore::global() {
            loader = loader.with_layer(global.file_path(SETTINGS_FILE));
        }
        if let Ok(project) = JsonStore::current_project() {
            loader = loader.with_layer(project.file_path(SETTINGS_FILE));
        }
        loader
    }

    /// 레이어 추가 (나중 레이어가 우선)
    pub fn with_layer(mut self, path: impl Into<PathBuf>) -> Self {
        self.layers.push(path.into());
        self
    }

    /// 환경변수 적용 생략 (테스트용)
    pub fn without_env(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// 모든 레이어를 병합해 설정 생성
    ///
    /// 없는 파일은 건너뛰고, 깨진 파일은 경고 후 건너뛴다.
    pub fn load(&self) -> Result<WardenConfig> {
        let mut merged = Value::Object(Default::default());

        for path in &self.layers {
            match read_layer(path) {
                Ok(Some(layer)) => {
                    debug!(path = %path.display(), "Merging config layer");
                    merge_values(&mut merged, layer);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping config layer"),
            }
        }

        let mut config: WardenConfig = serde_json::from_value(merged)
            .map_err(|e| Error::Config(format!("Invalid settings: {}", e)))?;

        if !self.skip_env {
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        }

        Ok(config)
    }
}

fn read_layer(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;
    if !value.is_object() {
        return Err(Error::Config("settings root must be an object".to_string()));
    }
    Ok(Some(value))
}

/// JSON object 키 단위 재귀 병합
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// 환경변수 오버라이드 적용
pub(crate) fn apply_env_overrides<F>(config: &mut WardenConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENV_SILENT_RECOVERY) {
        config.silent_recovery = matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes"
        );
    }

    if let Some(raw) = lookup(ENV_CRASH_GRACE_MS) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => config.crash_grace_ms = ms,
            Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_CRASH_GRACE_MS),
        }
    }

    if let Some(dir) = lookup(ENV_STATE_DIR) {
        if !dir.trim().is_empty() {
            config.state_dir = PathBuf::from(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_layer_precedence() {
        let dir = TempDir::new().unwrap();
        let user = write(
            dir.path(),
            "user.json",
            r#"{"crash_grace_ms": 1000, "health": {"interval_ms": 100, "cpu_threshold": 50}}"#,
        );
        let project = write(dir.path(), "project.json", r#"{"health": {"interval_ms": 200}}"#);

        let config = ConfigLoader::new()
            .with_layer(user)
            .with_layer(project)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.crash_grace_ms, 1000);
        assert_eq!(config.health.interval_ms, 200);
        assert_eq!(config.health.cpu_threshold, 50.0);
    }

    #[test]
    fn test_missing_and_malformed_layers_skipped() {
        let dir = TempDir::new().unwrap();
        let broken = write(dir.path(), "broken.json", "{ nope");

        let config = ConfigLoader::new()
            .with_layer(dir.path().join("absent.json"))
            .with_layer(broken)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config, WardenConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SILENT_RECOVERY, "yes"),
            (ENV_CRASH_GRACE_MS, "750"),
            (ENV_STATE_DIR, "/tmp/warden-state"),
        ]
        .into_iter()
        .collect();

        let mut config = WardenConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert!(config.silent_recovery);
        assert_eq!(config.crash_grace_ms, 750);
        assert_eq!(config.state_dir, PathBuf::from("/tmp/warden-state"));
    }

    #[test]
    fn test_invalid_env_value_ignored() {
        let mut config = WardenConfig::default();
        apply_env_overrides(&mut config, |k| {
            (k == ENV_CRASH_GRACE_MS).then(|| "soon".to_string())
        });
        assert_eq!(config.crash_grace_ms, 5000);
    }
}
