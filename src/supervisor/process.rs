//! Process spawning, signalling and process-table queries

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::config::SupervisorConfig;

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("Failed to open log file {path}: {source}")]
    Log {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to spawn process: {0}")]
    Spawn(String),
}

/// Spawn the daemon in its own process group with output appended to `log`
pub fn spawn_daemon(
    config: &SupervisorConfig,
    log: File,
    extra_env: &HashMap<String, String>,
) -> Result<Child, SpawnError> {
    let mut cmd = match &config.interpreter {
        Some(interpreter) => {
            let mut cmd = Command::new(interpreter);
            cmd.arg(&config.program);
            cmd
        }
        None => Command::new(&config.program),
    };
    cmd.args(&config.args);

    if let Some(wd) = &config.working_directory {
        cmd.current_dir(wd);
    }

    // Override file may replace the search path
    if let Some(search_path) = &config.search_path {
        cmd.env(&config.search_path_var, search_path);
    }
    cmd.envs(extra_env);

    let stderr = log.try_clone().map_err(|source| SpawnError::Log {
        path: config.log_file.clone(),
        source,
    })?;
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(log));
    cmd.stderr(Stdio::from(stderr));

    // Detach from the caller's terminal signals
    cmd.process_group(0);

    cmd.spawn().map_err(|e| SpawnError::Spawn(e.to_string()))
}

/// Load environment variables from a KEY=VALUE file
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_env(&content))
}

fn parse_env(content: &str) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            // Remove quotes from value
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.to_string(), value.to_string());
        }
    }

    vars
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Liveness probe: zero-signal send, with zombies counted as dead
pub fn is_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };

    match kill(target, None) {
        Ok(()) => !is_zombie(pid),
        // Exists but belongs to another user
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Send a signal to a PID
pub fn send_signal(pid: u32, signal: Signal) -> Result<(), Errno> {
    let target = to_pid(pid).ok_or(Errno::EINVAL)?;
    kill(target, signal)
}

fn is_zombie(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) else {
        return false;
    };
    // Format: "pid (comm) S ..."; comm may contain spaces or parens
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .is_some_and(|state| state == "Z")
}

/// Argument vector of a process, if readable
pub fn cmdline(pid: u32) -> Option<Vec<Vec<u8>>> {
    let raw = std::fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(<[u8]>::to_vec)
            .collect(),
    )
}

/// Whether any argument of `pid`'s command line equals `arg`
pub fn cmdline_contains(pid: u32, arg: &OsStr) -> bool {
    cmdline(pid).is_some_and(|args| args.iter().any(|a| a.as_slice() == arg.as_bytes()))
}

/// Whether `pid` runs the same executable as this process; `None` if unknown
fn runs_own_executable(pid: u32) -> Option<bool> {
    let theirs = std::fs::read_link(format!("/proc/{}/exe", pid)).ok()?;
    let ours = std::fs::read_link("/proc/self/exe").ok()?;
    Some(theirs == ours)
}

/// Whether `pid` provably belongs to neither the daemon nor another supervisor.
///
/// Its command line must be readable and lack `program`, and its executable
/// must differ from ours. Anything unreadable counts as related.
pub fn is_unrelated(pid: u32, program: &OsStr) -> bool {
    if cmdline_contains(pid, program) || cmdline(pid).is_none() {
        return false;
    }
    runs_own_executable(pid) == Some(false)
}

/// Scan the process table for processes invoked with `arg`
pub fn find_by_arg(arg: &OsStr) -> Vec<u32> {
    let own_pid = std::process::id();
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut pids: Vec<u32> = entries
        .flatten()
        .filter_map(|e| e.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| *pid != own_pid && cmdline_contains(*pid, arg))
        .collect();
    pids.sort_unstable();
    pids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env() {
        let vars = parse_env(
            r#"
# comment
DAEMON_ARGS="--port 8080"
export PJC_DATA='/var/lib/pjc-mc'
VERBOSE=no
=ignored
"#,
        );
        assert_eq!(vars.get("DAEMON_ARGS").unwrap(), "--port 8080");
        assert_eq!(vars.get("PJC_DATA").unwrap(), "/var/lib/pjc-mc");
        assert_eq!(vars.get("VERBOSE").unwrap(), "no");
        assert_eq!(vars.len(), 3);
    }

    #[test]
    fn test_self_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pids_not_alive() {
        assert!(!is_alive(0));
        assert!(!is_alive(u32::MAX));
    }

    #[test]
    fn test_reaped_child_not_alive() {
        let mut child = std::process::Command::new("/bin/true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_zombie_not_alive() {
        let child = std::process::Command::new("/bin/true").spawn().unwrap();
        let pid = child.id();
        // Not waited on: becomes a zombie once it exits
        std::thread::sleep(std::time::Duration::from_millis(300));
        assert!(!is_alive(pid));
        drop(child);
    }

    #[test]
    fn test_unrelated_process() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let program = OsStr::new("/opt/pjc-mc/bin/pjc-mc.py");

        assert!(is_unrelated(child.id(), program));
        assert!(!is_unrelated(child.id(), OsStr::new("30")));
        // Another process running our executable may be a supervisor mid-start
        assert!(!is_unrelated(std::process::id(), program));

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_find_by_arg() {
        let marker = format!("pjc-mc-find-test-{}", std::process::id());
        let mut child = std::process::Command::new("/bin/sh")
            .args(["-c", "sleep 30; :", &marker])
            .spawn()
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));

        let found = find_by_arg(OsStr::new(&marker));
        assert_eq!(found, vec![child.id()]);

        child.kill().unwrap();
        child.wait().unwrap();
        assert!(find_by_arg(OsStr::new(&marker)).is_empty());
    }
}
