//! Start the daemon

use pjc_mc::supervisor::{Supervisor, EXIT_OK};

pub async fn start(supervisor: &Supervisor) -> i32 {
    let name = &supervisor.config().name;

    match supervisor.start().await {
        Ok(pid) => {
            println!("● {} - started (PID {})", name, pid);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}: {}", name, e);
            e.exit_code()
        }
    }
}
