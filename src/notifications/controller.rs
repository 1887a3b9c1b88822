use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::occupancy::{DeskRegistry, SampleStore};
use crate::settings::NotificationSettings;

use super::changes::{ChangeDetector, ChangeReport};
use super::loop_worker::notification_loop;

/// Owns the poll loop task and the broadcast channel its reports go out on.
pub struct NotificationController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    reports: broadcast::Sender<ChangeReport>,
    poll_interval: Duration,
    cycle_timeout: Duration,
}

impl NotificationController {
    pub fn new(settings: &NotificationSettings) -> Self {
        let (reports, _) = broadcast::channel(settings.channel_capacity);
        Self {
            handle: None,
            cancel_token: None,
            reports,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            cycle_timeout: Duration::from_secs(settings.cycle_timeout_secs),
        }
    }

    /// Receives every report published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeReport> {
        self.reports.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<ChangeReport> {
        self.reports.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start<S, R>(&mut self, detector: ChangeDetector<S, R>) -> Result<()>
    where
        S: SampleStore + 'static,
        R: DeskRegistry + 'static,
    {
        if self.handle.is_some() {
            bail!("notification loop already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(notification_loop(
            Arc::new(detector),
            self.poll_interval,
            self.cycle_timeout,
            self.reports.clone(),
            cancel_token.clone(),
        ));

        info!(
            "Notification loop started (every {}s)",
            self.poll_interval.as_secs()
        );
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("notification loop task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}
