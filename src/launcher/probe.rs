//! Reachability probes

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// A single reachability check of the target host
#[allow(async_fn_in_trait)]
pub trait ReachabilityProbe {
    /// True if the host answered
    async fn probe(&self) -> bool;
}

/// One ICMP echo request through the system `ping`
#[derive(Debug, Clone)]
pub struct PingProbe {
    host: String,
    timeout: Duration,
}

impl PingProbe {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }

    /// Arguments passed to `ping`
    pub fn args(&self) -> Vec<String> {
        // -W takes whole seconds
        let wait = self.timeout.as_secs().max(1);
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            wait.to_string(),
            self.host.clone(),
        ]
    }
}

impl ReachabilityProbe for PingProbe {
    async fn probe(&self) -> bool {
        let status = Command::new("ping")
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(s) => s.success(),
            Err(e) => {
                log::debug!("ping {} failed to run: {}", self.host, e);
                false
            }
        }
    }
}
