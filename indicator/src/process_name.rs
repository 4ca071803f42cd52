use async_trait::async_trait;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::ClientError;

/// Looks up a human-readable name for a registered game's PID.
///
/// Point-in-time lookup: the process may already be gone by the time the
/// registration signal is handled, which surfaces as `NameResolutionFailed`.
#[async_trait]
pub trait ProcessNameResolver: Send + Sync {
    async fn resolve(&self, pid: i32) -> Result<String, ClientError>;
}

/// Reads the process table through `sysinfo`, equivalent to `ps -o comm=`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoResolver;

#[async_trait]
impl ProcessNameResolver for SysinfoResolver {
    async fn resolve(&self, pid: i32) -> Result<String, ClientError> {
        let raw = u32::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| failed(pid, "not a valid process id"))?;

        tokio::task::spawn_blocking(move || lookup(raw))
            .await
            .map_err(|e| failed(pid, e))?
            .ok_or_else(|| failed(pid, "no such process"))
    }
}

fn lookup(pid: u32) -> Option<String> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new(),
    );
    let process = sys.process(pid)?;
    let name = process.name().to_string_lossy().trim().to_string();
    (!name.is_empty()).then_some(name)
}

fn failed(pid: i32, message: impl std::fmt::Display) -> ClientError {
    ClientError::NameResolutionFailed {
        pid,
        message: message.to_string(),
    }
}
