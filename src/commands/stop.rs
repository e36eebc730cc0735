//! Stop the daemon

use pjc_mc::supervisor::{StopOutcome, Supervisor, EXIT_OK};

pub async fn stop(supervisor: &Supervisor) -> i32 {
    let name = &supervisor.config().name;

    match supervisor.stop().await {
        Ok(StopOutcome::Killed) => {
            println!("● {} - killed (did not exit after SIGTERM)", name);
            EXIT_OK
        }
        Ok(_) => {
            println!("○ {} - stopped", name);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{}: {}", name, e);
            e.exit_code()
        }
    }
}
