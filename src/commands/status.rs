//! Show daemon status

use pjc_mc::supervisor::Supervisor;

pub fn status(supervisor: &Supervisor) -> i32 {
    let config = supervisor.config();

    let status = supervisor.status();

    let (symbol, state) = if status.is_running() {
        ("●", "running")
    } else {
        ("○", "not running")
    };
    println!("{} {} - {}", symbol, config.name, state);
    println!("    Program: {}", config.program.display());

    if !status.running.is_empty() {
        let pids: Vec<String> = status.running.iter().map(u32::to_string).collect();
        println!("       PIDs: {}", pids.join(" "));
    }

    if let Some(pid) = status.recorded {
        let stale = if status.is_stale() { "stale, " } else { "" };
        println!(
            "   PID file: {} ({}PID {})",
            supervisor.pid_file().path().display(),
            stale,
            pid
        );
    }

    status.exit_code()
}
