//! OS helpers - 시그널, 생존 확인, 프로세스 트리
//!
//! 직접 spawn 한 자식은 자기 process group 의 리더이므로 (`process_group(0)`)
//! 그룹 전체에 시그널을 보낸다. 이전 세션에서 재연결된 프로세스는 그룹을
//! 보장할 수 없으므로 sysinfo 로 자손을 찾아 트리 단위로 종료한다.

use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, trace};
use warden_foundation::{Error, Result};

/// 시그널 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// 정상 종료 요청 (SIGTERM)
    Terminate,
    /// 강제 종료 (SIGKILL)
    Kill,
}

impl Signal {
    #[cfg(unix)]
    fn raw(self) -> libc::c_int {
        match self {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        }
    }
}

/// OS 프로세스 테이블에 pid 가 살아있는지
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    // 0 은 자기 process group 을 가리킨다
    let raw = match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => return false,
    };
    // SAFETY: signal 0 은 권한/존재 확인만 한다
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).is_some()
}

/// pid 에 시그널 전송 (`group` 이면 process group 전체)
///
/// 이미 없는 프로세스는 성공으로 취급한다.
#[cfg(unix)]
pub fn signal(pid: u32, sig: Signal, group: bool) -> Result<()> {
    let raw = libc::pid_t::try_from(pid)
        .ok()
        .filter(|raw| *raw > 0)
        .ok_or_else(|| Error::stop_failure(pid, "pid out of range"))?;

    if group {
        // SAFETY: 음수 pid 는 process group 대상
        let rc = unsafe { libc::kill(-raw, sig.raw()) };
        if rc == 0 {
            trace!(pid, ?sig, "Signalled process group");
            return Ok(());
        }
        // 그룹이 없으면 단일 pid 로 재시도
        debug!(pid, ?sig, "Process group signal failed, falling back to pid");
    }

    // SAFETY: 단순 kill(2) 호출
    let rc = unsafe { libc::kill(raw, sig.raw()) };
    if rc == 0 {
        return Ok(());
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(Error::stop_failure(pid, format!("{:?} failed: {}", sig, err)))
}

#[cfg(not(unix))]
pub fn signal(pid: u32, _sig: Signal, _group: bool) -> Result<()> {
    // SIGTERM 이 없는 플랫폼에서는 즉시 kill
    let mut system = System::new();
    let target = Pid::from_u32(pid);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    match system.process(target) {
        Some(process) if !process.kill() => {
            Err(Error::stop_failure(pid, "failed to kill process"))
        }
        _ => Ok(()),
    }
}

/// pid 의 모든 자손 (깊은 것부터)
pub fn descendants(pid: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let root = Pid::from_u32(pid);
    let mut found = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for (child_pid, process) in system.processes() {
            if process.parent() == Some(parent) && *child_pid != root {
                found.push(child_pid.as_u32());
                frontier.push(*child_pid);
            }
        }
    }

    found.reverse();
    found
}

/// 트리 단위 종료 (자손 먼저, 마지막에 루트)
pub fn signal_tree(pid: u32, sig: Signal) -> Result<()> {
    for child in descendants(pid) {
        if let Err(e) = signal(child, sig, false) {
            debug!(pid = child, error = %e, "Failed to signal descendant");
        }
    }
    signal(pid, sig, false)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_missing_pid_is_not_alive() {
        // pid_t 범위 밖
        assert!(!is_alive(u32::MAX));
    }

    #[tokio::test]
    async fn test_signal_tree_kills_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        signal_tree(pid, Signal::Kill).unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_signal_vanished_pid_is_ok() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        assert!(signal(pid, Signal::Terminate, false).is_ok());
    }
}
