//! Browser launching

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use super::LaunchError;

/// Placeholder replaced by the URL in browser command lines
pub const URL_PLACEHOLDER: &str = "{url}";

/// Something that can open the kiosk page
pub trait Browser {
    fn launch(&self, url: &str) -> Result<(), LaunchError>;
}

/// Spawns a browser command line and leaves it running
#[derive(Debug, Clone)]
pub struct CommandBrowser {
    template: Vec<String>,
}

impl CommandBrowser {
    /// Parse a shell-style command line (e.g. `chromium-browser --kiosk {url}`)
    pub fn parse(command_line: &str) -> Result<Self, LaunchError> {
        let template = shlex::split(command_line)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| LaunchError::InvalidCommand(command_line.to_string()))?;
        Ok(Self { template })
    }

    /// Program and arguments for `url`; the URL is appended if no placeholder is present
    pub fn command_line(&self, url: &str) -> Vec<String> {
        let mut parts: Vec<String> = self
            .template
            .iter()
            .map(|p| p.replace(URL_PLACEHOLDER, url))
            .collect();
        if !self.template.iter().any(|p| p.contains(URL_PLACEHOLDER)) {
            parts.push(url.to_string());
        }
        parts
    }
}

impl Browser for CommandBrowser {
    fn launch(&self, url: &str) -> Result<(), LaunchError> {
        let parts = self.command_line(url);
        let (program, args) = parts
            .split_first()
            .ok_or_else(|| LaunchError::InvalidCommand(self.template.join(" ")))?;

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .process_group(0)
            .spawn()
            .map_err(|e| LaunchError::Browser(format!("{}: {}", program, e)))?;

        log::info!("Browser started (PID {})", child.id());
        Ok(())
    }
}
