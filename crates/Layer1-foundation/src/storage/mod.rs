//! Storage module for warden
//!
//! - `json`: JSON 파일 저장/로드 (설정, 프로세스 스냅샷)

mod json;

pub use json::{JsonStore, WARDEN_DIR};
