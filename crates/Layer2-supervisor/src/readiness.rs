//! Readiness Probe Engine
//!
//! 프로브(port/http/log)를 타임아웃, 프로세스 종료와 경주시킨다.
//! 실패해도 프로세스는 죽이지 않는다. 호출자가 `ready=false` 와
//! `lastError` 를 기록한다.

use crate::process::{ExitInfo, LogEntry, LogLevel, ReadinessConfig, ReadinessProbe};
use regex::RegexBuilder;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tokio::time::{timeout, Instant};
use tracing::{debug, trace};
use warden_foundation::{Error, Result};

/// 단일 연결 시도 타임아웃
const CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// 프로브가 관찰하는 프로세스 핸들
pub struct ProbeContext {
    pub pid: u32,
    /// 종료 알림
    pub exit_rx: watch::Receiver<Option<ExitInfo>>,
    /// stdout/stderr 라인 스트림 (첫 출력 전에 구독한 것)
    pub logs: broadcast::Receiver<LogEntry>,
}

/// 준비될 때까지 대기. 성공하면 걸린 시간을 돌려준다
pub async fn await_readiness(config: &ReadinessConfig, ctx: ProbeContext) -> Result<Duration> {
    let started = Instant::now();
    let limit = config.timeout();
    let ProbeContext {
        pid,
        mut exit_rx,
        logs,
    } = ctx;

    let probe = run_probe(config, logs);
    tokio::pin!(probe);

    let exited = wait_exit(&mut exit_rx);
    tokio::pin!(exited);

    tokio::select! {
        outcome = &mut probe => {
            outcome?;
            let elapsed = started.elapsed();
            debug!(pid, elapsed_ms = elapsed.as_millis() as u64, "Process ready");
            Ok(elapsed)
        }
        info = &mut exited => {
            let code = info
                .and_then(|i| i.code)
                .map(|c| c.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(Error::ReadinessProcessExited(format!(
                "process {} exited (code {}) before becoming ready",
                pid, code
            )))
        }
        _ = tokio::time::sleep(limit) => {
            Err(Error::ReadinessTimeout(format!(
                "readiness timeout after {}ms waiting for {}",
                limit.as_millis(),
                describe(&config.probe)
            )))
        }
    }
}

/// 헬스 체크용 단발 프로브. 응답하면 왕복 시간
pub async fn probe_once(config: &ReadinessConfig) -> Option<Duration> {
    let started = Instant::now();
    let ok = match &config.probe {
        ReadinessProbe::Port(port) => try_connect(*port).await,
        ReadinessProbe::Http(url) => {
            let client = http_client()?;
            try_http(&client, url).await
        }
        ReadinessProbe::Log(_) => return None,
    };
    ok.then(|| started.elapsed())
}

fn describe(probe: &ReadinessProbe) -> String {
    match probe {
        ReadinessProbe::Port(port) => format!("port {}", port),
        ReadinessProbe::Http(url) => format!("http {}", url),
        ReadinessProbe::Log(pattern) => format!("log pattern /{}/", pattern),
    }
}

async fn wait_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    // watch::Ref 를 await 너머로 들고 있지 않도록 값만 꺼낸다
    let exited = rx.wait_for(|info| info.is_some()).await.ok().map(|info| *info);
    match exited {
        Some(info) => info,
        // sender 가 사라지면 종료로 간주할 수 없다
        None => std::future::pending().await,
    }
}

async fn run_probe(config: &ReadinessConfig, logs: broadcast::Receiver<LogEntry>) -> Result<()> {
    let interval = config.interval();
    match &config.probe {
        ReadinessProbe::Port(port) => {
            poll(interval, || try_connect(*port)).await;
            Ok(())
        }
        ReadinessProbe::Http(url) => {
            let client = http_client()
                .ok_or_else(|| Error::Internal("failed to build http client".to_string()))?;
            poll(interval, || try_http(&client, url)).await;
            Ok(())
        }
        ReadinessProbe::Log(pattern) => watch_logs(pattern, logs).await,
    }
}

async fn poll<F, Fut>(interval: Duration, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    loop {
        if attempt().await {
            return;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn try_connect(port: u16) -> bool {
    let ok = matches!(
        timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    );
    trace!(port, ok, "Port probe");
    ok
}

fn http_client() -> Option<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(CONNECT_TIMEOUT)
        .build()
        .ok()
}

async fn try_http(client: &reqwest::Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            trace!(url, status = status.as_u16(), "HTTP probe");
            status.as_u16() < 500
        }
        Err(e) => {
            trace!(url, error = %e, "HTTP probe failed");
            false
        }
    }
}

async fn watch_logs(pattern: &str, mut logs: broadcast::Receiver<LogEntry>) -> Result<()> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::Validation(format!("invalid readiness pattern: {}", e)))?;

    loop {
        match logs.recv().await {
            // supervisor 배너는 프로세스 출력이 아니다
            Ok(entry) if entry.level == LogLevel::System => {}
            Ok(entry) if re.is_match(&entry.content) => return Ok(()),
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Log probe lagged");
            }
            // 스트림이 닫히면 타임아웃/종료 쪽이 결론을 낸다
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn context(
        pid: u32,
    ) -> (
        ProbeContext,
        watch::Sender<Option<ExitInfo>>,
        broadcast::Sender<LogEntry>,
    ) {
        let (exit_tx, exit_rx) = watch::channel(None);
        let (log_tx, logs) = broadcast::channel(16);
        (ProbeContext { pid, exit_rx, logs }, exit_tx, log_tx)
    }

    #[tokio::test]
    async fn test_port_probe_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (ctx, _exit, _logs) = context(1);

        let elapsed = await_readiness(&ReadinessConfig::port(port), ctx).await.unwrap();
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_port_probe_times_out() {
        // 바인드 후 즉시 닫아 열려있지 않은 포트를 얻는다
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let (ctx, _exit, _logs) = context(1);
        let config = ReadinessConfig::port(port)
            .with_timeout_ms(400)
            .with_interval_ms(100);

        let started = Instant::now();
        let err = await_readiness(&config, ctx).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.kind(), "readiness_timeout");
        assert!(err.to_string().contains("timeout"));
        assert!(elapsed >= Duration::from_millis(400));
        // 타임아웃 + 폴링 간격 한 번 안에 끝난다
        assert!(elapsed <= Duration::from_millis(400 + 100 + 150), "{:?}", elapsed);
    }

    #[tokio::test]
    async fn test_log_probe_matches_case_insensitive() {
        let (ctx, _exit, log_tx) = context(1);
        let config = ReadinessConfig::log("listening on").with_timeout_ms(2000);

        let handle = tokio::spawn(async move { await_readiness(&config, ctx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        log_tx.send(LogEntry::stdout("compiling...")).unwrap();
        log_tx.send(LogEntry::stdout("LISTENING ON :3000")).unwrap();

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_log_probe_ignores_system_lines() {
        let (ctx, _exit, log_tx) = context(1);
        let config = ReadinessConfig::log("ready").with_timeout_ms(300);

        let handle = tokio::spawn(async move { await_readiness(&config, ctx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        log_tx
            .send(LogEntry::system("Starting: sh -c sleep 3; echo ready"))
            .unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "readiness_timeout");
    }

    #[tokio::test]
    async fn test_exit_beats_timeout() {
        let (ctx, exit_tx, _logs) = context(99);
        let config = ReadinessConfig::log("never").with_timeout_ms(5000);

        let handle = tokio::spawn(async move { await_readiness(&config, ctx).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        exit_tx.send(Some(ExitInfo { code: Some(1) })).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), "readiness_process_exited");
        assert!(err.to_string().contains("code 1"));
    }

    #[tokio::test]
    async fn test_probe_once_reports_rtt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe_once(&ReadinessConfig::port(port)).await.is_some());
        assert!(probe_once(&ReadinessConfig::log("x")).await.is_none());
    }
}
