//! Process-level services on the host.

use std::process::Command;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};
use wifiprov_core::System;

/// Sleeps the thread and restarts by re-executing the current binary.
#[derive(Debug, Default)]
pub struct HostSystem;

impl HostSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for HostSystem {
    fn delay(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    fn restart(&mut self) {
        warn!("Restarting process");

        let exe = match std::env::current_exe() {
            Ok(exe) => exe,
            Err(e) => {
                error!("Cannot locate own executable: {}", e);
                std::process::exit(1);
            }
        };
        let mut command = Command::new(exe);
        command.args(std::env::args_os().skip(1));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Only returns on failure.
            let e = command.exec();
            error!("Restart failed: {}", e);
            std::process::exit(1);
        }

        #[cfg(not(unix))]
        {
            match command.spawn() {
                Ok(_) => std::process::exit(0),
                Err(e) => {
                    error!("Restart failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
