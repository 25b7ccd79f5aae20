use super::ChargeDriver;
use crate::error::Result;
use std::future::Future;
use tokio::time::{MissedTickBehavior, interval, timeout};

impl ChargeDriver {
    /// Run until SIGINT/SIGTERM
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run cycles on the poll interval until `shutdown` completes
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.logger.info(&format!(
            "Starting: start>={:.0}W stop<{:.0}W reserve>={:.0}% window={} rate={} every {}s",
            self.thresholds.start_surplus_watts,
            self.thresholds.stop_threshold_watts(),
            self.thresholds.min_battery_reserve_percent,
            self.schedule.window(),
            self.rate,
            self.poll_interval.as_secs()
        ));

        let mut poll_interval = interval(self.poll_interval);
        // A slow cycle pushes the next one back instead of bunching them up
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    let now = chrono::Utc::now();
                    let deadline = self.cycle_timeout;
                    if timeout(deadline, self.run_cycle(now)).await.is_err() {
                        self.record_timeout();
                    }
                }
                () = &mut shutdown => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        let stats = &self.stats;
        self.logger.info(&format!(
            "Stopped after {} cycles ({} skipped, {} timed out, {} command failures, {} transitions, {} rate changes, {} overridden); charger left {}",
            stats.cycles,
            stats.skipped,
            stats.timeouts,
            stats.command_failures,
            stats.transitions,
            stats.rate_changes,
            stats.overrides,
            match self.charger.confirmed() {
                Some(true) => "on",
                Some(false) => "off",
                None => "untouched",
            }
        ));
        Ok(())
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
