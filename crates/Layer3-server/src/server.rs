//! StdioServer - 줄 단위 JSON-RPC 서버
//!
//! stdin 에서 한 줄씩 읽어 요청마다 태스크를 띄우고, 응답은 writer 태스크 하나가
//! 순서대로 stdout 에 쓴다. 오래 걸리는 호출(readiness 대기 등)이 다른 요청을 막지 않는다.
//!
//! `shutdown` 요청이나 EOF 를 받으면 관리 중인 프로세스를 모두 내리고 끝난다.

use crate::protocol::{initialize_result, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use crate::runtime::Runtime;
use crate::tool::ToolRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use warden_foundation::Result;

#[derive(Clone)]
pub struct StdioServer {
    runtime: Arc<Runtime>,
    registry: Arc<ToolRegistry>,
}

impl StdioServer {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            registry: Arc::new(ToolRegistry::with_builtins()),
        }
    }

    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 프로세스 stdin/stdout 으로 서비스
    pub async fn run_stdio(&self) -> Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// 입력이 끝나거나 `shutdown` 을 받을 때까지 서비스
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        info!(tools = self.registry.len(), "Serving JSON-RPC over stdio");

        let (tx, mut rx) = mpsc::channel::<JsonRpcResponse>(64);
        let writer_task = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(response) = rx.recv().await {
                let mut line = match serde_json::to_string(&response) {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize response");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    error!(error = %e, "Failed to write response");
                    break;
                }
                if let Err(e) = writer.flush().await {
                    error!(error = %e, "Failed to flush response");
                    break;
                }
            }
        });

        let mut lines = reader.lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read input, stopping");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let request = match parse_request(&line) {
                Ok(request) => request,
                Err(response) => {
                    let _ = tx.send(*response).await;
                    continue;
                }
            };

            if request.method == "shutdown" {
                if let Some(response) = self.handle_request(request).await {
                    let _ = tx.send(response).await;
                }
                break;
            }

            let this = self.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                if let Some(response) = this.handle_request(request).await {
                    let _ = tx.send(response).await;
                }
            });
        }

        self.runtime.shutdown().await;
        drop(tx);
        // 진행 중인 요청의 응답까지 쓰고 끝난다
        if let Err(e) = writer_task.await {
            warn!(error = %e, "Response writer ended abnormally");
        }
        Ok(())
    }

    /// 한 줄 처리 (알림이면 None)
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        match parse_request(line) {
            Ok(request) => self.handle_request(request).await,
            Err(response) => Some(*response),
        }
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, id = ?request.id, "Request");

        let result = match request.method.as_str() {
            "initialize" => Ok(initialize_result()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.schemas() })),
            "tools/call" => self.call_tool(request.params.clone()).await,
            "shutdown" => {
                self.runtime.shutdown().await;
                Ok(json!({}))
            }
            method if method.starts_with("notifications/") => {
                debug!(method, "Ignoring notification");
                return None;
            }
            method => Err(JsonRpcError::method_not_found(method)),
        };

        // 알림에는 응답하지 않는다
        let id = request.id?;
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> std::result::Result<Value, JsonRpcError> {
        let params: ToolCallParams = params
            .ok_or_else(|| JsonRpcError::invalid_params("missing params"))
            .and_then(|p| {
                serde_json::from_value(p).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
            })?;

        let outcome = self
            .registry
            .call(
                &params.name,
                params.arguments.unwrap_or(Value::Null),
                &self.runtime,
            )
            .await;
        Ok(outcome.to_call_result())
    }
}

/// 파싱 실패는 바로 보낼 에러 응답으로
fn parse_request(line: &str) -> std::result::Result<JsonRpcRequest, Box<JsonRpcResponse>> {
    let value: Value = serde_json::from_str(line).map_err(|e| {
        debug!(error = %e, "Unparsable input line");
        Box::new(JsonRpcResponse::failure(
            Value::Null,
            JsonRpcError::parse_error(e.to_string()),
        ))
    })?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| {
        Box::new(JsonRpcResponse::failure(
            id,
            JsonRpcError::invalid_request(e.to_string()),
        ))
    })
}
