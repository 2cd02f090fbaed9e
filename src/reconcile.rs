// src/reconcile.rs
use log::{debug, error, info};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::format::{self, CHANNEL_NAME_CAP};
use crate::models::server::TrackedServer;
use crate::readiness::Readiness;
use crate::sink::{ApplyOutcome, ChannelSink, SkipReason};
use crate::source::ServerSource;
use crate::storage::registry::TenantRegistry;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("cancelled")]
    Cancelled,
    #[error("task failed: {0}")]
    Task(String),
}

/// Counters for one guild, or for a whole pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Entries whose fetch came back empty.
    pub unavailable: usize,
}

impl PassReport {
    fn record(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Updated => self.updated += 1,
            ApplyOutcome::Skipped(_) => self.skipped += 1,
            ApplyOutcome::Failed => self.failed += 1,
        }
    }

    fn merge(&mut self, other: PassReport) {
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.unavailable += other.unavailable;
    }
}

enum EntryOutcome {
    Unavailable,
    Applied(ApplyOutcome),
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs `fut` as its own task so a panic inside it stays inside this scope.
/// Dropping the returned future, or cancelling, aborts the task.
async fn isolated<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, ReconcileError>> + Send + 'static,
    T: Send + 'static,
{
    let mut task = AbortOnDrop(tokio::spawn(fut));
    tokio::select! {
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        joined = &mut task.0 => match joined {
            Ok(result) => result,
            Err(e) => Err(ReconcileError::Task(e.to_string())),
        },
    }
}

async fn pause(cancel: &CancellationToken, duration: Duration) -> Result<(), ReconcileError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ReconcileError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Fetch, format and apply for every tracked server of every guild.
#[derive(Clone)]
pub struct Reconciler {
    registry: Arc<TenantRegistry>,
    source: Arc<dyn ServerSource>,
    sink: Arc<ChannelSink>,
}

impl Reconciler {
    pub fn new(registry: Arc<TenantRegistry>, source: Arc<dyn ServerSource>, sink: Arc<ChannelSink>) -> Self {
        Self { registry, source, sink }
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn source(&self) -> &Arc<dyn ServerSource> {
        &self.source
    }

    pub fn sink(&self) -> &Arc<ChannelSink> {
        &self.sink
    }

    /// Background loop: waits for readiness plus `grace`, then runs a pass
    /// every update interval until `cancel` fires.
    pub async fn run(self, readiness: Readiness, grace: Duration, cancel: CancellationToken) {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = readiness.wait() => {}
        }
        if pause(&cancel, grace).await.is_err() {
            return;
        }
        info!("Update loop started");

        loop {
            let this = self.clone();
            let pass_cancel = cancel.clone();
            match isolated(&cancel, async move { this.run_pass(&pass_cancel).await }).await {
                Ok(report) => info!(
                    "Pass complete: {} updated, {} skipped, {} failed, {} unavailable",
                    report.updated, report.skipped, report.failed, report.unavailable
                ),
                Err(ReconcileError::Cancelled) => break,
                Err(e) => error!("Error in update loop: {}", e),
            }

            let interval = Duration::from_secs(self.registry.global().update_interval_secs);
            if pause(&cancel, interval).await.is_err() {
                break;
            }
        }
        info!("Update loop stopped");
    }

    /// One pass over every known guild.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport, ReconcileError> {
        let token = self.registry.global().api_token;
        let mut total = PassReport::default();

        for guild_id in self.registry.tenant_ids() {
            let fut = self.clone().reconcile_tenant(guild_id.clone(), token.clone(), cancel.clone());
            match isolated(cancel, fut).await {
                Ok(report) => total.merge(report),
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(e) => error!("Update of guild {} aborted: {}", guild_id, e),
            }
        }
        Ok(total)
    }

    /// Manual refresh of a single guild, same rules as the loop.
    pub async fn refresh_tenant(&self, guild_id: &str) -> Result<PassReport, ReconcileError> {
        let cancel = CancellationToken::new();
        let token = self.registry.global().api_token;
        let fut = self.clone().reconcile_tenant(guild_id.to_string(), token, cancel.clone());
        isolated(&cancel, fut).await
    }

    async fn reconcile_tenant(
        self,
        guild_id: String,
        token: Option<String>,
        cancel: CancellationToken,
    ) -> Result<PassReport, ReconcileError> {
        let mut report = PassReport::default();
        let servers = self.registry.tracked_servers(&guild_id);
        if servers.is_empty() {
            return Ok(report);
        }

        let template: Arc<str> = self.registry.channel_format(&guild_id).into();
        debug!("Updating {} servers in guild {}", servers.len(), guild_id);

        for (server_id, entry) in servers {
            let fut = self
                .clone()
                .reconcile_entry(template.clone(), token.clone(), server_id.clone(), entry);
            match isolated(&cancel, fut).await {
                Ok(EntryOutcome::Unavailable) => report.unavailable += 1,
                Ok(EntryOutcome::Applied(outcome)) => {
                    if matches!(outcome, ApplyOutcome::Skipped(SkipReason::ChannelMissing)) {
                        debug!("Channel for server {} in guild {} is gone; remove the entry to stop polling it", server_id, guild_id);
                    }
                    report.record(outcome);
                    pause(&cancel, self.sink.pacing_delay()).await?;
                }
                Err(ReconcileError::Cancelled) => return Err(ReconcileError::Cancelled),
                Err(e) => {
                    error!("Update of server {} in guild {} aborted: {}", server_id, guild_id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn reconcile_entry(
        self,
        template: Arc<str>,
        token: Option<String>,
        server_id: String,
        entry: TrackedServer,
    ) -> Result<EntryOutcome, ReconcileError> {
        let Some(snapshot) = self.source.fetch(&server_id, token.as_deref()).await else {
            return Ok(EntryOutcome::Unavailable);
        };

        let desired = format::channel_name(&template, &snapshot, entry.label(), CHANNEL_NAME_CAP);
        let outcome = self.sink.apply_if_changed(&entry.channel_id, &desired).await;
        Ok(EntryOutcome::Applied(outcome))
    }
}
