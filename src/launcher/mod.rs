//! Display launcher
//!
//! Waits until the server host answers, then opens the display page in a
//! kiosk browser exactly once.
//!
//! The wait is bounded by the [`WaitPolicy`] and can be cancelled by any
//! future (the binary passes Ctrl-C). A policy with no attempt limit, no
//! timeout and a backoff factor of 1.0 probes once per interval forever.

mod browser;
mod probe;

pub use browser::{Browser, CommandBrowser, URL_PLACEHOLDER};
pub use probe::{PingProbe, ReachabilityProbe};

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::LauncherConfig;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("{host} still unreachable after {attempts} attempts")]
    TimedOut { host: String, attempts: u32 },

    #[error("Cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("Invalid browser command: {0:?}")]
    InvalidCommand(String),

    #[error("Failed to launch browser: {0}")]
    Browser(String),
}

/// Retry schedule for reachability probes
#[derive(Debug, Clone, PartialEq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub backoff_factor: f64,
    pub max_interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self::from_config(&LauncherConfig::default())
    }
}

impl WaitPolicy {
    pub fn from_config(config: &LauncherConfig) -> Self {
        Self {
            interval: config.interval,
            backoff_factor: config.backoff_factor,
            max_interval: config.max_interval,
            max_attempts: config.max_attempts,
            timeout: config.timeout,
        }
    }

    /// Delay after `current`, grown by the backoff factor and capped
    pub fn next_interval(&self, current: Duration) -> Duration {
        let factor = if self.backoff_factor.is_finite() {
            self.backoff_factor.max(1.0)
        } else {
            1.0
        };
        let cap = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * factor)
            .unwrap_or(cap)
            .min(cap)
    }
}

/// Waits for the host, then starts the browser
pub struct Launcher<P = PingProbe, B = CommandBrowser> {
    host: String,
    url: String,
    policy: WaitPolicy,
    probe: P,
    browser: B,
}

impl Launcher {
    /// Launcher using `ping` and the configured browser command
    pub fn from_config(config: &LauncherConfig) -> Result<Self, LaunchError> {
        let probe = PingProbe::new(config.host.clone(), config.probe_timeout);
        let browser = CommandBrowser::parse(&config.browser)?;
        Ok(Self::with_parts(config, probe, browser))
    }
}

impl<P: ReachabilityProbe, B: Browser> Launcher<P, B> {
    pub fn with_parts(config: &LauncherConfig, probe: P, browser: B) -> Self {
        Self {
            host: config.host.clone(),
            url: config.url(),
            policy: WaitPolicy::from_config(config),
            probe,
            browser,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Probe until the host answers, returning the number of probes made
    pub async fn wait_until_reachable<C>(&self, cancel: C) -> Result<u32, LaunchError>
    where
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let deadline = self.policy.timeout.map(|t| Instant::now() + t);
        let mut interval = self.policy.interval;
        let mut attempts = 0u32;

        loop {
            if attempts > 0 && deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(self.timed_out(attempts));
            }

            let reachable = tokio::select! {
                ok = self.probe.probe() => ok,
                _ = &mut cancel => return Err(LaunchError::Cancelled { attempts }),
            };
            attempts += 1;

            if reachable {
                log::info!("{} reachable after {} attempt(s)", self.host, attempts);
                return Ok(attempts);
            }
            log::debug!("{} unreachable (attempt {})", self.host, attempts);

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(self.timed_out(attempts));
            }

            let delay = match deadline {
                Some(d) => interval.min(d.saturating_duration_since(Instant::now())),
                None => interval,
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut cancel => return Err(LaunchError::Cancelled { attempts }),
            }
            interval = self.policy.next_interval(interval);
        }
    }

    /// Wait for the host, then launch the browser once
    pub async fn run<C>(&self, cancel: C) -> Result<(), LaunchError>
    where
        C: Future<Output = ()>,
    {
        log::info!("Waiting for {} before opening {}", self.host, self.url);
        self.wait_until_reachable(cancel).await?;

        log::info!("Opening {}", self.url);
        self.browser.launch(&self.url)
    }

    fn timed_out(&self, attempts: u32) -> LaunchError {
        LaunchError::TimedOut {
            host: self.host.clone(),
            attempts,
        }
    }
}
