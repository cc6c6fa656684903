// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Herald broadcast engine.
//!
//! [`BroadcastEngine`] wires the lease keeper, the connection manager, the
//! ingestion pass and the dispatch pipeline together and drives them from a
//! fixed-interval tick. Only the lease holder ingests and dispatches; every
//! worker keeps trying to take the lease over.
//!
//! Under [`BroadcastEngine::run`] ingestion and schedule runs are background
//! jobs, so a long paced run never delays the next tick's evaluation. A
//! schedule has at most one run in flight.

pub mod backoff;
pub mod connection;
pub mod dispatch;
pub mod ingest;
pub mod lease;
pub mod pacing;
pub mod render;
pub mod shutdown;

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use herald_config::HeraldConfig;
use herald_core::{
    BroadcastStore, Clock, ConnectionStatus, ControlCommand, CredentialStore, FeedSource,
    HeraldError, LeaseStore, MessageLog, Schedule, Transport, TriggerRequest,
};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use connection::{ConnectionEvent, ConnectionManager, ConnectionSettings};
pub use dispatch::{DispatchSettings, Dispatcher, MessageSender, RunReport};
pub use ingest::{IngestReport, Ingestor};
pub use lease::{LeaseKeeper, LeaseSettings, LeaseStatus};
pub use shutdown::install_signal_handler;

/// Collaborators the engine runs against.
pub struct EngineDeps {
    pub lease_store: Arc<dyn LeaseStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub store: Arc<dyn BroadcastStore>,
    pub log: Arc<dyn MessageLog>,
    pub transport: Arc<dyn Transport>,
    pub feeds: Arc<dyn FeedSource>,
    pub clock: Arc<dyn Clock>,
}

/// What one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// This process held a valid lease when the tick started.
    pub holder: bool,
    /// The connection was ready, so due schedules ran.
    pub ready: bool,
    pub ingest: Option<IngestReport>,
    pub runs: Vec<RunReport>,
    /// Schedules disabled during this tick because they are malformed.
    pub disabled: Vec<String>,
}

/// Work the driver runs off the tick loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Job {
    Ingest,
    Schedule(String),
}

type JobResult = (Job, Result<(), HeraldError>);

/// How a schedule run ended, after malformed schedules were disabled.
enum Settled {
    Finished(RunReport),
    Disabled(String),
    Failed,
}

async fn settle(
    store: &Arc<dyn BroadcastStore>,
    schedule_id: String,
    outcome: Result<RunReport, HeraldError>,
) -> Result<Settled, HeraldError> {
    match outcome {
        Ok(run) => Ok(Settled::Finished(run)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e @ HeraldError::ConfigInvalid { .. }) => {
            error!(schedule = schedule_id.as_str(), error = %e, "disabling malformed schedule");
            store.set_schedule_enabled(&schedule_id, false).await?;
            Ok(Settled::Disabled(schedule_id))
        }
        Err(e) => {
            warn!(schedule = schedule_id.as_str(), error = %e, "schedule run failed");
            Ok(Settled::Failed)
        }
    }
}

pub struct BroadcastEngine {
    config: HeraldConfig,
    store: Arc<dyn BroadcastStore>,
    clock: Arc<dyn Clock>,
    keeper: Arc<LeaseKeeper>,
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    ingestor: Arc<Ingestor>,
    schedule_slots: Arc<Semaphore>,
}

impl BroadcastEngine {
    pub fn new(config: HeraldConfig, deps: EngineDeps) -> Self {
        let keeper = Arc::new(LeaseKeeper::new(
            deps.lease_store,
            LeaseSettings::from_config(&config),
        ));
        let connection = Arc::new(ConnectionManager::new(
            deps.transport,
            deps.credentials,
            deps.store.clone(),
            keeper.clone(),
            deps.clock.clone(),
            ConnectionSettings::from_config(&config),
        ));
        let dispatcher = Arc::new(Dispatcher::new(
            deps.store.clone(),
            deps.log,
            connection.clone(),
            deps.clock.clone(),
            DispatchSettings::from_config(&config),
        ));
        let ingestor = Arc::new(Ingestor::new(
            deps.store.clone(),
            deps.feeds,
            deps.clock.clone(),
        ));
        let schedule_slots = Arc::new(Semaphore::new(
            config.dispatch.max_parallel_schedules.max(1),
        ));

        Self {
            config,
            store: deps.store,
            clock: deps.clock,
            keeper,
            connection,
            dispatcher,
            ingestor,
            schedule_slots,
        }
    }

    pub fn lease(&self) -> &Arc<LeaseKeeper> {
        &self.keeper
    }

    pub fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    /// One driver tick, awaited to completion.
    ///
    /// Non-holders only pick up operator commands meant for a failed
    /// connection. The holder ingests, then, if the connection is ready,
    /// runs every due or manually triggered schedule.
    pub async fn tick(&self) -> Result<TickReport, HeraldError> {
        let mut report = self.begin_tick().await?;
        if !report.holder {
            return Ok(report);
        }

        if self.config.ingest.enabled {
            report.ingest = Some(self.ingestor.run_pass().await?);
        }

        let Some((runs, triggers)) = self.due_runs(&mut report).await? else {
            return Ok(report);
        };

        let outcomes: Vec<(String, Result<RunReport, HeraldError>)> = futures::stream::iter(&runs)
            .map(|schedule| async move {
                (
                    schedule.id.clone(),
                    self.dispatcher.run_schedule(schedule).await,
                )
            })
            .buffer_unordered(self.config.dispatch.max_parallel_schedules.max(1))
            .collect()
            .await;

        for (schedule_id, outcome) in outcomes {
            match settle(&self.store, schedule_id, outcome).await? {
                Settled::Finished(run) => report.runs.push(run),
                Settled::Disabled(id) => report.disabled.push(id),
                Settled::Failed => {}
            }
        }

        for trigger in triggers {
            self.store.complete_trigger(trigger.id).await?;
        }
        Ok(report)
    }

    /// Lease check and operator commands, shared by both tick flavours.
    async fn begin_tick(&self) -> Result<TickReport, HeraldError> {
        let report = TickReport {
            holder: self.keeper.status().is_valid_at(self.clock.now()),
            ..TickReport::default()
        };
        let failed = self.connection.session().status == ConnectionStatus::Failed;
        if report.holder || failed {
            self.apply_controls().await?;
        }
        if !report.holder {
            debug!("not the lease holder, idle tick");
        }
        Ok(report)
    }

    /// Claims pending triggers and lists what should run now. `None` while
    /// the connection is not ready; triggers stay queued until it is.
    async fn due_runs(
        &self,
        report: &mut TickReport,
    ) -> Result<Option<(Vec<Schedule>, Vec<TriggerRequest>)>, HeraldError> {
        if !self.connection.is_ready() {
            debug!(
                state = %self.connection.session().status,
                "connection not ready, due schedules wait"
            );
            return Ok(None);
        }
        report.ready = true;

        let triggers = self.store.claim_triggers().await?;
        let runs = self.collect_runs(&triggers).await?;
        Ok(Some((runs, triggers)))
    }

    /// Due schedules plus manually triggered ones, each at most once.
    async fn collect_runs(
        &self,
        triggers: &[TriggerRequest],
    ) -> Result<Vec<Schedule>, HeraldError> {
        let now = self.clock.now();
        let mut runs: Vec<Schedule> = self
            .store
            .list_schedules(true)
            .await?
            .into_iter()
            .filter(|s| herald_schedule::is_due(s, now))
            .collect();

        for trigger in triggers {
            if runs.iter().any(|s| s.id == trigger.schedule_id) {
                continue;
            }
            match self.store.get_schedule(&trigger.schedule_id).await? {
                Some(schedule) => {
                    info!(schedule = schedule.id.as_str(), "running manually triggered schedule");
                    runs.push(schedule);
                }
                None => warn!(
                    schedule = trigger.schedule_id.as_str(),
                    "trigger names an unknown schedule"
                ),
            }
        }
        Ok(runs)
    }

    async fn apply_controls(&self) -> Result<(), HeraldError> {
        for request in self
            .store
            .claim_controls(&self.config.engine.session_name)
            .await?
        {
            info!(command = %request.command, "applying operator command");
            self.connection.handle(match request.command {
                ControlCommand::Reset => ConnectionEvent::OperatorReset,
                ControlCommand::Logout => ConnectionEvent::LoggedOut,
            });
        }
        Ok(())
    }

    /// A tick under [`run`](Self::run): evaluates everything like
    /// [`tick`](Self::tick) but hands ingestion and schedule runs to `jobs`
    /// instead of awaiting them. Jobs already in flight are not started again.
    async fn spawn_tick(
        &self,
        jobs: &mut JoinSet<JobResult>,
        in_flight: &mut HashSet<Job>,
    ) -> Result<(), HeraldError> {
        let mut report = self.begin_tick().await?;
        if !report.holder {
            return Ok(());
        }

        if self.config.ingest.enabled && in_flight.insert(Job::Ingest) {
            let ingestor = self.ingestor.clone();
            jobs.spawn(async move { (Job::Ingest, ingestor.run_pass().await.map(|_| ())) });
        }

        let Some((runs, triggers)) = self.due_runs(&mut report).await? else {
            return Ok(());
        };

        for schedule in runs {
            let job = Job::Schedule(schedule.id.clone());
            if !in_flight.insert(job.clone()) {
                debug!(schedule = schedule.id.as_str(), "previous run still in flight");
                continue;
            }
            let dispatcher = self.dispatcher.clone();
            let store = self.store.clone();
            let slots = self.schedule_slots.clone();
            jobs.spawn(async move {
                let result = match slots.acquire_owned().await {
                    Ok(_slot) => {
                        let outcome = dispatcher.run_schedule(&schedule).await;
                        settle(&store, schedule.id.clone(), outcome).await.map(|_| ())
                    }
                    Err(_) => Err(HeraldError::Internal("schedule pool closed".into())),
                };
                (job, result)
            });
        }

        // A trigger is consumed once its schedule has a run in flight.
        for trigger in triggers {
            self.store.complete_trigger(trigger.id).await?;
        }
        Ok(())
    }

    /// Books a finished job. Fatal errors and panics stop the engine.
    fn job_finished(
        joined: Result<JobResult, JoinError>,
        in_flight: &mut HashSet<Job>,
    ) -> Result<(), HeraldError> {
        let (job, result) =
            joined.map_err(|e| HeraldError::Internal(format!("background job panicked: {e}")))?;
        in_flight.remove(&job);
        match (result, &job) {
            (Ok(()), _) => Ok(()),
            (Err(e), _) if e.is_fatal() => Err(e),
            (Err(e), Job::Ingest) => {
                warn!(error = %e, "ingestion pass failed");
                Ok(())
            }
            (Err(e), Job::Schedule(id)) => {
                warn!(schedule = id.as_str(), error = %e, "schedule job failed");
                Ok(())
            }
        }
    }

    /// Runs until `cancel` fires or a fatal error occurs.
    ///
    /// On shutdown in-flight jobs get `drain_timeout` to finish and are
    /// aborted after that. The connection is closed before the lease is
    /// released.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), HeraldError> {
        info!(
            instance = self.config.engine.instance_id.as_str(),
            session = self.config.engine.session_name.as_str(),
            "broadcast engine starting"
        );

        let stop_connection = CancellationToken::new();
        let stop_lease = CancellationToken::new();
        let lease_task = tokio::spawn(self.keeper.clone().run(stop_lease.clone()));
        let connection_task = tokio::spawn(self.connection.clone().run(stop_connection.clone()));

        let mut ticker = tokio::time::interval(self.config.engine.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut jobs: JoinSet<JobResult> = JoinSet::new();
        let mut in_flight: HashSet<Job> = HashSet::new();

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                Some(joined) = jobs.join_next(), if !jobs.is_empty() => {
                    if let Err(e) = Self::job_finished(joined, &mut in_flight) {
                        error!(error = %e, "background job failed fatally, stopping engine");
                        break Err(e);
                    }
                }
                _ = ticker.tick() => {
                    match self.spawn_tick(&mut jobs, &mut in_flight).await {
                        Ok(()) => debug!(in_flight = in_flight.len(), "tick finished"),
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "fatal storage error, stopping engine");
                            break Err(e);
                        }
                        Err(e) => warn!(error = %e, "tick failed"),
                    }
                }
            }
        };

        if !jobs.is_empty() {
            info!(in_flight = jobs.len(), "draining in-flight jobs");
            let drained = shutdown::drain(
                async {
                    while let Some(joined) = jobs.join_next().await {
                        if let Err(e) = Self::job_finished(joined, &mut in_flight) {
                            warn!(error = %e, "job failed while draining");
                        }
                    }
                },
                self.config.engine.drain_timeout(),
            )
            .await;
            if drained.is_none() {
                jobs.shutdown().await;
            }
        }

        stop_connection.cancel();
        match connection_task.await {
            Ok(Err(e)) => warn!(error = %e, "connection manager stopped with an error"),
            Err(e) => warn!(error = %e, "connection manager task panicked"),
            Ok(Ok(())) => {}
        }
        stop_lease.cancel();
        if let Err(e) = lease_task.await {
            warn!(error = %e, "lease keeper task panicked");
        }

        info!("broadcast engine stopped");
        outcome
    }
}
