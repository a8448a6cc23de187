//! Process supervision
//!
//! The host delivers termination through a single `shutdown()` entry point;
//! the runner wires Ctrl+C into it. The supervisor owns the session-wide
//! run flag shared with the market stream task, and the runner parks on
//! `wait_for_shutdown` so resting orders get cancelled before exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

pub struct ProcessSupervisor {
    running: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The single shutdown entry point. Idempotent, callable from any task.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("shutdown requested, draining trading session");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared run flag handed to the market stream task.
    pub fn run_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Route Ctrl+C into `shutdown()`.
    pub fn install_signal_handler(&self) {
        let running = Arc::clone(&self.running);
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("received termination signal");
                running.store(false, Ordering::Release);
            }
        });
    }

    /// Park the caller until shutdown is requested.
    pub async fn wait_for_shutdown(&self) {
        while self.is_running() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_unparks_waiter() {
        let supervisor = Arc::new(ProcessSupervisor::new());
        assert!(supervisor.is_running());

        let waiter = {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move { supervisor.wait_for_shutdown().await })
        };
        supervisor.shutdown();
        assert!(!supervisor.is_running());
        waiter.await.unwrap();
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let supervisor = ProcessSupervisor::new();
        supervisor.shutdown();
        supervisor.shutdown();
        assert!(!supervisor.is_running());
    }
}
