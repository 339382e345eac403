//! # warden-server
//!
//! Exposes the supervisor to a calling agent as named tools over
//! newline-delimited JSON-RPC 2.0 on stdin/stdout.
//!
//! - `protocol`: JSON-RPC 메시지 타입
//! - `tool`: Tool trait, 레지스트리, 입력 스키마 검사, 기본 툴
//! - `runtime`: supervisor / health / recovery / test run 배선
//! - `server`: stdio 서버 루프
//! - `workspace`: 태스크 목록, 프로젝트 감지

pub mod protocol;
pub mod runtime;
pub mod server;
pub mod tool;
pub mod workspace;

pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, SERVER_NAME};
pub use runtime::Runtime;
pub use server::StdioServer;
pub use tool::{Tool, ToolMeta, ToolOutcome, ToolRegistry};
pub use workspace::{
    FsProjectDetector, FsTaskReader, ProjectDetector, ProjectInfo, TaskDefinition, TaskReader,
};
