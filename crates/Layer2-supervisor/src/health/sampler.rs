//! OS 메트릭 샘플러

use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};

/// OS 프로세스 테이블에서 읽은 한 시점의 값
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OsSample {
    /// 프로세스가 없음
    NotFound,
    /// 좀비 상태
    Zombie,
    Alive { cpu_percent: f32, memory_bytes: u64 },
}

/// 샘플러 seam (테스트에서는 고정값 구현으로 대체)
pub trait MetricsSampler: Send + Sync {
    fn sample(&self, pid: u32) -> OsSample;

    /// 추적 종료 (내부 상태 정리)
    fn forget(&self, _pid: u32) {}
}

/// sysinfo 기반 샘플러
///
/// CPU 사용률은 직전 refresh 와의 차이로 계산되므로 `System` 하나를
/// 계속 재사용한다. 첫 샘플의 CPU 값은 0 이다.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSampler for SysinfoSampler {
    fn sample(&self, pid: u32) -> OsSample {
        let target = Pid::from_u32(pid);
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        match system.process(target) {
            None => OsSample::NotFound,
            Some(process) if process.status() == ProcessStatus::Zombie => OsSample::Zombie,
            Some(process) => OsSample::Alive {
                cpu_percent: process.cpu_usage(),
                memory_bytes: process.memory(),
            },
        }
    }
}
