use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::occupancy::{DeskRegistry, SampleStore};

use super::changes::{ChangeDetector, ChangeReport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub async fn notification_loop<S, R>(
    detector: Arc<ChangeDetector<S, R>>,
    poll_interval: Duration,
    cycle_timeout: Duration,
    reports: broadcast::Sender<ChangeReport>,
    cancel_token: CancellationToken,
) where
    S: SampleStore + 'static,
    R: DeskRegistry + 'static,
{
    let mut ticker = tokio::time::interval(poll_interval);
    // A slow cycle pushes the next tick back instead of stacking cycles.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match tokio::time::timeout(cycle_timeout, detector.poll_changes()).await {
                    Ok(Ok(report)) => publish(&reports, report),
                    Ok(Err(err)) => log_error!("poll cycle failed: {err}"),
                    Err(_) => log_warn!("poll cycle timeout (> {}s)", cycle_timeout.as_secs()),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("notification loop shutting down");
                break;
            }
        }
    }
}

fn publish(reports: &broadcast::Sender<ChangeReport>, report: ChangeReport) {
    let events = report.events.len();
    match reports.send(report) {
        Ok(receivers) => log_debug!("poll cycle: {events} change(s) sent to {receivers} subscriber(s)"),
        Err(_) => log_debug!("poll cycle: {events} change(s), no subscribers"),
    }
}
