//! JSON-RPC 서버 통합 테스트
//!
//! `cargo test -p warden-server --test server_test`

#![cfg(unix)]

use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use warden_foundation::WardenConfig;
use warden_server::{Runtime, StdioServer};
use warden_supervisor::process::os;

async fn server(dir: &TempDir) -> StdioServer {
    let config = WardenConfig {
        state_dir: dir.path().to_path_buf(),
        stop_grace_ms: 500,
        ..Default::default()
    };
    let runtime = Runtime::start(config).await.expect("runtime start failed");
    StdioServer::new(runtime)
}

fn request(id: u64, method: &str, params: Value) -> String {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
}

/// (structuredContent, isError)
async fn call(server: &StdioServer, name: &str, arguments: Value) -> (Value, bool) {
    let line = request(1, "tools/call", json!({"name": name, "arguments": arguments}));
    let response = server.handle_line(&line).await.expect("no response");
    let result = response.result.expect("tools/call must not fail at protocol level");
    assert_eq!(result["content"][0]["type"], "text");
    (
        result["structuredContent"].clone(),
        result["isError"].as_bool().unwrap(),
    )
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let init = server
        .handle_line(&request(1, "initialize", json!({})))
        .await
        .unwrap();
    let result = init.result.unwrap();
    assert_eq!(result["serverInfo"]["name"], "warden");
    assert!(result["capabilities"]["tools"].is_object());

    let list = server
        .handle_line(&request(2, "tools/list", json!({})))
        .await
        .unwrap();
    let tools = list.result.unwrap()["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), 18);
    assert!(tools.iter().any(|t| t["name"] == "start_test_run"));

    // 알림에는 응답이 없다
    let note = json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string();
    assert!(server.handle_line(&note).await.is_none());
}

#[tokio::test]
async fn test_protocol_errors() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let unknown = server
        .handle_line(&request(3, "resources/list", json!({})))
        .await
        .unwrap();
    assert_eq!(unknown.id, json!(3));
    assert_eq!(unknown.error.unwrap().code, -32601);

    let garbage = server.handle_line("this is not json").await.unwrap();
    assert_eq!(garbage.error.unwrap().code, -32700);

    let (payload, is_error) = call(&server, "no_such_tool", json!({})).await;
    assert!(is_error);
    assert_eq!(payload["error"]["kind"], "not_found");
}

#[tokio::test]
async fn test_invalid_arguments_have_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let (payload, is_error) = call(&server, "start_process", json!({"args": ["30"]})).await;
    assert!(is_error);
    assert_eq!(payload["error"]["kind"], "validation");

    let (payload, is_error) = call(
        &server,
        "start_process",
        json!({"command": "sleep", "args": ["30"], "readiness": {"port": 3000, "log": "ready"}}),
    )
    .await;
    assert!(is_error);
    assert_eq!(payload["error"]["kind"], "validation");

    let (payload, _) = call(&server, "list_processes", json!({"includeSystem": true})).await;
    assert_eq!(payload["count"], 0);
}

#[tokio::test]
async fn test_process_tools_round_trip() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let (started, is_error) = call(
        &server,
        "start_process",
        json!({"command": "sh", "args": ["-c", "echo 'Error: bad config' >&2; sleep 30"], "name": "api", "role": "backend"}),
    )
    .await;
    assert!(!is_error, "{}", started);
    let pid = started["pid"].as_u64().unwrap() as u32;
    assert_eq!(started["role"], "backend");
    assert_eq!(started["reused"], false);

    let (status, is_error) = call(&server, "process_status", json!({"idOrName": "api"})).await;
    assert!(!is_error);
    assert_eq!(status["pid"], pid);
    assert_eq!(status["running"], true);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let (logs, _) = call(
        &server,
        "get_logs",
        json!({"idOrName": pid, "errorsOnly": true}),
    )
    .await;
    assert_eq!(logs["count"], 1);

    let (check, is_error) = call(&server, "health_check", json!({"idOrName": "api"})).await;
    assert!(!is_error, "{}", check);
    assert!(check["healthScore"].as_u64().unwrap() <= 100);

    let (stopped, is_error) = call(&server, "stop_process", json!({"idOrName": pid.to_string()})).await;
    assert!(!is_error, "{}", stopped);
    assert!(!os::is_alive(pid));

    let (again, is_error) = call(&server, "stop_process", json!({"idOrName": pid})).await;
    assert!(is_error);
    assert_eq!(again["error"]["kind"], "not_found");
}

#[tokio::test]
async fn test_recovery_tools() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let strategy = json!({
        "name": "api-notify",
        "conditions": [{"type": "error_count", "operator": "gte", "value": 1}],
        "actions": [{"type": "notify", "params": {"message": "errors"}}],
        "maxAttempts": 1,
        "cooldownPeriod": 1000
    });
    let (configured, is_error) = call(
        &server,
        "configure_recovery",
        json!({"name": "api", "strategies": [strategy]}),
    )
    .await;
    assert!(!is_error, "{}", configured);
    assert_eq!(configured["strategies"][0]["name"], "api-notify");

    let (bad, is_error) = call(
        &server,
        "configure_recovery",
        json!({"name": "api", "strategies": [{"name": "x", "conditions": [], "actions": [{"type": "explode"}], "maxAttempts": 1, "cooldownPeriod": 0}]}),
    )
    .await;
    assert!(is_error);
    assert_eq!(bad["error"]["kind"], "validation");

    let (stats, is_error) = call(&server, "recovery_stats", json!({"idOrName": "api"})).await;
    assert!(!is_error);
    assert_eq!(stats["totalAttempts"], 0);
    assert_eq!(stats["history"], json!([]));
    assert_eq!(stats["strategies"][0]["name"], "api-notify");

    // 빈 목록은 기본 전략으로 되돌린다
    let (reset, _) = call(&server, "configure_recovery", json!({"name": "api", "strategies": []})).await;
    assert_eq!(reset["strategies"][0]["name"], "error-restart");
}

#[tokio::test]
async fn test_test_run_tools() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let (started, is_error) = call(
        &server,
        "start_test_run",
        json!({"runId": "t1", "test": {"command": "sh", "args": ["-c", "exit 0"]}}),
    )
    .await;
    assert!(!is_error, "{}", started);
    assert_eq!(started["runId"], "t1");

    let finished = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let (state, _) = call(&server, "test_run_status", json!({"runId": "t1"})).await;
            if state["status"] == "completed" || state["status"] == "failed" {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .expect("run did not finish");
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["exitCode"], 0);

    let (runs, _) = call(&server, "list_test_runs", json!({})).await;
    assert_eq!(runs["count"], 1);

    let (missing, is_error) = call(&server, "abort_test_run", json!({"runId": "nope"})).await;
    assert!(is_error);
    assert_eq!(missing["error"]["kind"], "not_found");
}

#[tokio::test]
async fn test_serve_stops_processes_on_eof() {
    let dir = TempDir::new().unwrap();
    let server = server(&dir).await;

    let (client, server_io) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server_io);
    let (client_read, mut client_write) = tokio::io::split(client);

    let serving = tokio::spawn({
        let server = server.clone();
        async move { server.serve(BufReader::new(server_read), server_write).await }
    });

    let start = request(
        9,
        "tools/call",
        json!({"name": "start_process", "arguments": {"command": "sleep", "args": ["30"]}}),
    );
    client_write.write_all(format!("{}\n", start).as_bytes()).await.unwrap();

    let mut responses = BufReader::new(client_read).lines();
    let line = tokio::time::timeout(Duration::from_secs(5), responses.next_line())
        .await
        .expect("no response")
        .unwrap()
        .unwrap();
    let response: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(response["id"], 9);
    let pid = response["result"]["structuredContent"]["pid"].as_u64().unwrap() as u32;
    assert!(os::is_alive(pid));

    // EOF
    client_write.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(10), serving)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(!os::is_alive(pid));
    assert!(server.runtime().lifecycle().is_shutting_down());
}
