//! Restart the daemon (also used for force-reload)

use pjc_mc::supervisor::{Supervisor, EXIT_OK};

pub async fn restart(supervisor: &Supervisor) -> i32 {
    let name = &supervisor.config().name;

    match supervisor.restart().await {
        Ok(pid) => {
            println!("● {} - restarted (PID {})", name, pid);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}: {}", name, e);
            e.exit_code()
        }
    }
}
