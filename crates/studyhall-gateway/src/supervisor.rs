//! Brain supervisor — child-process lifecycle for the model
//! orchestrator.
//!
//! The Brain is spawned with `kill_on_drop`, so even a panicking
//! gateway releases the accelerator. Startup is health-gated: the
//! supervisor polls the Brain's health endpoint until it reports ready
//! or the startup deadline expires. A Brain that never comes up is
//! non-fatal — the gateway runs with AI routes answering
//! "AI unavailable" instead.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use studyhall_core::config::BrainConfig;
use studyhall_core::error::{CoreError, Result};

/// Health poll cadence while waiting for the child to come up.
const POLL_INTERVAL_MS: u64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrainState {
    Absent,
    Starting,
    Healthy,
    Stopping,
    Crashed,
}

impl std::fmt::Display for BrainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Starting => write!(f, "starting"),
            Self::Healthy => write!(f, "healthy"),
            Self::Stopping => write!(f, "stopping"),
            Self::Crashed => write!(f, "crashed"),
        }
    }
}

struct Inner {
    state: BrainState,
    child: Option<Child>,
}

pub struct BrainSupervisor {
    config: BrainConfig,
    client: reqwest::Client,
    inner: Mutex<Inner>,
}

impl BrainSupervisor {
    pub fn new(config: BrainConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            inner: Mutex::new(Inner {
                state: BrainState::Absent,
                child: None,
            }),
        }
    }

    pub async fn state(&self) -> BrainState {
        self.inner.lock().await.state
    }

    /// Whether AI routes should be offered at all.
    pub async fn ai_enabled(&self) -> bool {
        self.state().await == BrainState::Healthy
    }

    /// Spawn the Brain and wait for its health probe, up to the
    /// configured startup deadline. On deadline the child is killed and
    /// the supervisor lands in `Absent`.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == BrainState::Healthy {
            return Ok(());
        }

        let executable = self.resolve_executable()?;
        info!(executable = %executable, "starting brain child process");
        inner.state = BrainState::Starting;

        let child = Command::new(&executable)
            .arg("--bind")
            .arg(&self.config.bind)
            .arg("--port")
            .arg(self.config.port.to_string())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                CoreError::AiUnavailable(format!("failed to spawn brain ({executable}): {e}"))
            })?;
        inner.child = Some(child);

        let deadline = Instant::now() + Duration::from_secs(self.config.startup_deadline_secs);
        loop {
            if self.probe_ready().await {
                inner.state = BrainState::Healthy;
                info!("brain reported healthy");
                return Ok(());
            }

            // A child that exited during startup is a crash, not a slow start.
            if let Some(child) = inner.child.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    warn!(%status, "brain exited during startup");
                    inner.child = None;
                    inner.state = BrainState::Absent;
                    return Err(CoreError::AiUnavailable(format!(
                        "brain exited during startup: {status}"
                    )));
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    deadline_secs = self.config.startup_deadline_secs,
                    "brain startup deadline expired, killing child"
                );
                if let Some(mut child) = inner.child.take() {
                    let _ = child.kill().await;
                }
                inner.state = BrainState::Absent;
                return Err(CoreError::AiUnavailable(
                    "brain did not become healthy before the startup deadline".to_string(),
                ));
            }

            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Graceful-then-forceful termination. Idempotent: stopping an
    /// absent Brain is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(mut child) = inner.child.take() else {
            inner.state = BrainState::Absent;
            return Ok(());
        };
        inner.state = BrainState::Stopping;

        #[cfg(unix)]
        if let Some(pid) = child.id() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
        #[cfg(not(unix))]
        let _ = child.start_kill();

        let grace = Duration::from_secs(self.config.stop_grace_secs);
        let deadline = Instant::now() + grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    info!(%status, "brain stopped");
                    break;
                }
                Ok(None) if Instant::now() >= deadline => {
                    warn!("brain ignored graceful stop, killing");
                    let _ = child.kill().await;
                    break;
                }
                Ok(None) => tokio::time::sleep(Duration::from_millis(100)).await,
                Err(e) => {
                    warn!(error = %e, "wait on brain child failed, killing");
                    let _ = child.kill().await;
                    break;
                }
            }
        }

        inner.state = BrainState::Absent;
        Ok(())
    }

    /// Administrative restart (also used by the crash-detector hook).
    pub async fn restart(&self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Non-blocking health view: reconciles the recorded state with the
    /// child's actual liveness. Not for the request hot path — the
    /// brain client's own timeouts cover that.
    pub async fn is_healthy(&self) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.state != BrainState::Healthy {
            return false;
        }
        if let Some(child) = inner.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                warn!(%status, "brain exited unexpectedly");
                inner.child = None;
                inner.state = BrainState::Crashed;
                return false;
            }
        }
        true
    }

    async fn probe_ready(&self) -> bool {
        let url = format!("{}/health", self.config.endpoint.trim_end_matches('/'));
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => resp
                .json::<HealthProbe>()
                .await
                .map(|h| h.status == "Active")
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Resolution order: explicit config path, then PATH, then a
    /// sibling of the gateway binary (the standard install layout).
    fn resolve_executable(&self) -> Result<String> {
        if let Some(ref path) = self.config.executable {
            if !path.is_empty() {
                return Ok(path.clone());
            }
        }
        if let Ok(found) = which::which("studyhall-brain") {
            return Ok(found.to_string_lossy().to_string());
        }
        if let Ok(exe) = std::env::current_exe() {
            let sibling = exe.with_file_name("studyhall-brain");
            if sibling.exists() {
                return Ok(sibling.to_string_lossy().to_string());
            }
        }
        Err(CoreError::AiUnavailable(
            "studyhall-brain executable not found".to_string(),
        ))
    }
}

#[derive(Deserialize)]
struct HealthProbe {
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(executable: Option<String>, deadline_secs: u64) -> BrainConfig {
        BrainConfig {
            // Nothing listens here; probes fail fast with refused connects.
            endpoint: "http://127.0.0.1:1".to_string(),
            executable,
            startup_deadline_secs: deadline_secs,
            stop_grace_secs: 1,
            ..BrainConfig::default()
        }
    }

    #[tokio::test]
    async fn stop_is_idempotent_when_absent() {
        let sup = BrainSupervisor::new(test_config(None, 1));
        sup.stop().await.unwrap();
        sup.stop().await.unwrap();
        assert_eq!(sup.state().await, BrainState::Absent);
        assert!(!sup.ai_enabled().await);
    }

    #[tokio::test]
    async fn missing_executable_is_nonfatal_unavailable() {
        let sup = BrainSupervisor::new(test_config(
            Some("/nonexistent/studyhall-brain".to_string()),
            1,
        ));
        let err = sup.start().await.unwrap_err();
        assert_eq!(err.kind(), "AI_UNAVAILABLE");
        assert_eq!(sup.state().await, BrainState::Absent);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_startup_lands_in_absent() {
        // `sleep` either rejects the injected args and exits, or lingers
        // without ever serving the health endpoint until the deadline.
        // Both paths must end Absent with the child reaped.
        let sup = BrainSupervisor::new(BrainConfig {
            endpoint: "http://127.0.0.1:1".to_string(),
            executable: Some("sleep".to_string()),
            startup_deadline_secs: 1,
            stop_grace_secs: 1,
            ..BrainConfig::default()
        });
        let err = sup.start().await.unwrap_err();
        assert_eq!(err.kind(), "AI_UNAVAILABLE");
        assert_eq!(sup.state().await, BrainState::Absent);
        assert!(!sup.is_healthy().await);
    }
}
