//! 公网隧道
//!
//! 启动一个隧道进程（默认 ngrok），轮询就绪探测直到拿到公网地址。
//!
//! # 状态机
//!
//! ```text
//! Stopped → Starting → Running → Stopping → Stopped
//!              └──── 失败 ────→ Stopped
//! ```
//!
//! 进程以 `kill_on_drop` 启动，句柄被丢弃时进程随之退出。

mod probe;

pub use probe::{NGROK_API_URL, NgrokApiProbe, ReadinessProbe, https_public_url};

use log::{debug, info, warn};
use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::process::{Child, Command};

/// 隧道状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    Stopped,
    Starting,
    Running { public_url: String },
    Stopping,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Stopped => write!(f, "stopped"),
            TunnelState::Starting => write!(f, "starting"),
            TunnelState::Running { public_url } => write!(f, "running at {public_url}"),
            TunnelState::Stopping => write!(f, "stopping"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("cannot {action} tunnel while {state}")]
    InvalidState {
        action: &'static str,
        state: TunnelState,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("tunnel process exited early: {0}")]
    Exited(String),

    #[error("tunnel not ready after {attempts} attempts")]
    NotReady { attempts: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 隧道进程配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelConfig {
    pub program: String,
    pub args: Vec<String>,
    /// 两次探测之间的间隔
    pub poll_interval: Duration,
    /// 最多探测次数
    pub max_attempts: u32,
}

impl TunnelConfig {
    /// `ngrok http <port> --log=stdout`
    pub fn ngrok(port: u16) -> Self {
        Self {
            program: "ngrok".to_string(),
            args: vec![
                "http".to_string(),
                port.to_string(),
                "--log=stdout".to_string(),
            ],
            poll_interval: Duration::from_secs(1),
            max_attempts: 15,
        }
    }
}

/// 隧道句柄
///
/// 方法都接受 `&self`，启动过程中可以从其他任务读取状态。
pub struct TunnelHandle {
    config: TunnelConfig,
    probe: Arc<dyn ReadinessProbe>,
    state: Mutex<TunnelState>,
    child: Mutex<Option<Child>>,
}

impl TunnelHandle {
    pub fn new(config: TunnelConfig, probe: Arc<dyn ReadinessProbe>) -> Self {
        Self {
            config,
            probe,
            state: Mutex::new(TunnelState::Stopped),
            child: Mutex::new(None),
        }
    }

    /// 使用 ngrok 和其本地 API 的隧道
    pub fn ngrok(port: u16) -> anyhow::Result<Self> {
        let probe = NgrokApiProbe::new()?;
        Ok(Self::new(TunnelConfig::ngrok(port), Arc::new(probe)))
    }

    pub fn state(&self) -> TunnelState {
        self.lock_state().clone()
    }

    /// 运行中时返回公网地址
    pub fn public_url(&self) -> Option<String> {
        match &*self.lock_state() {
            TunnelState::Running { public_url } => Some(public_url.clone()),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lock_state(), TunnelState::Running { .. })
    }

    /// 启动隧道进程并等待公网地址
    pub async fn start(&self) -> Result<String, TunnelError> {
        {
            let mut state = self.lock_state();
            if *state != TunnelState::Stopped {
                return Err(TunnelError::InvalidState {
                    action: "start",
                    state: state.clone(),
                });
            }
            *state = TunnelState::Starting;
        }

        info!(
            "Starting tunnel: {} {}",
            self.config.program,
            self.config.args.join(" ")
        );

        let spawned = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();
        let child = match spawned {
            Ok(c) => c,
            Err(source) => {
                self.set_state(TunnelState::Stopped);
                return Err(TunnelError::Spawn {
                    program: self.config.program.clone(),
                    source,
                });
            }
        };
        *self.lock_child() = Some(child);

        for attempt in 1..=self.config.max_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            match self.child_exit() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    self.lock_child().take();
                    self.set_state(TunnelState::Stopped);
                    return Err(TunnelError::Exited(status));
                }
                Err(e) => {
                    self.kill_child().await;
                    self.set_state(TunnelState::Stopped);
                    return Err(e.into());
                }
            }

            match self.probe.public_url().await {
                Ok(Some(url)) => {
                    info!("Tunnel running at {}", url);
                    self.set_state(TunnelState::Running {
                        public_url: url.clone(),
                    });
                    return Ok(url);
                }
                Ok(None) => debug!("Tunnel not ready (attempt {})", attempt),
                Err(e) => debug!("Readiness probe failed (attempt {}): {}", attempt, e),
            }
        }

        warn!(
            "Tunnel did not become ready after {} attempts",
            self.config.max_attempts
        );
        self.kill_child().await;
        self.set_state(TunnelState::Stopped);
        Err(TunnelError::NotReady {
            attempts: self.config.max_attempts,
        })
    }

    /// 停止隧道；已停止时什么都不做
    pub async fn stop(&self) -> Result<(), TunnelError> {
        {
            let mut state = self.lock_state();
            match *state {
                TunnelState::Stopped => return Ok(()),
                TunnelState::Running { .. } => {}
                ref other => {
                    return Err(TunnelError::InvalidState {
                        action: "stop",
                        state: other.clone(),
                    });
                }
            }
            *state = TunnelState::Stopping;
        }

        self.kill_child().await;
        self.set_state(TunnelState::Stopped);
        info!("Tunnel stopped");
        Ok(())
    }

    /// 进程是否已退出，返回退出状态描述
    fn child_exit(&self) -> std::io::Result<Option<String>> {
        let mut child = self.lock_child();
        match child.as_mut() {
            Some(c) => Ok(c.try_wait()?.map(|status| status.to_string())),
            None => Ok(Some("process handle missing".to_string())),
        }
    }

    async fn kill_child(&self) {
        let child = self.lock_child().take();
        if let Some(mut child) = child
            && let Err(e) = child.kill().await
        {
            warn!("Failed to kill tunnel process: {}", e);
        }
    }

    fn set_state(&self, state: TunnelState) {
        *self.lock_state() = state;
    }

    fn lock_state(&self) -> MutexGuard<'_, TunnelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
