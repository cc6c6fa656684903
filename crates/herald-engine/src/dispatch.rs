// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch pipeline: one schedule run.
//!
//! A run resolves the schedule's template and targets, collects the items
//! that still owe a delivery, and sends every `(item, target)` pair that has
//! no `sent` row yet. Targets run in parallel up to a process-wide pool;
//! sends to one target are paced and serialized through its lane.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use herald_config::HeraldConfig;
use herald_core::{
    BroadcastStore, Clock, DeliveryRecord, DeliveryStatus, FeedItem, HeraldError, MessageLog,
    OutboundMessage, Schedule, Target,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::connection::ConnectionManager;
use crate::pacing::TargetPacer;
use crate::render::render;

/// Where rendered messages go.
#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send(&self, message: &OutboundMessage) -> Result<(), HeraldError>;
}

#[async_trait]
impl MessageSender for ConnectionManager {
    async fn send(&self, message: &OutboundMessage) -> Result<(), HeraldError> {
        ConnectionManager::send(self, message).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub max_parallel_targets: usize,
    /// Failed or skipped sends after which a run starts no new pairs.
    pub error_budget: usize,
    pub max_items_per_run: usize,
}

impl DispatchSettings {
    pub fn from_config(config: &HeraldConfig) -> Self {
        Self {
            max_parallel_targets: config.dispatch.max_parallel_targets,
            error_budget: config.dispatch.error_budget,
            max_items_per_run: config.dispatch.max_items_per_run,
        }
    }
}

/// Counts from one schedule run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub schedule_id: String,
    pub items: usize,
    pub targets: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Pairs passed over because a `sent` row already existed.
    pub already_sent: usize,
    pub budget_exhausted: bool,
}

#[derive(Default)]
struct Tally {
    sent: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    already_sent: AtomicUsize,
    exhausted: AtomicBool,
}

impl Tally {
    fn failures(&self) -> usize {
        self.failed.load(Ordering::Relaxed) + self.skipped.load(Ordering::Relaxed)
    }
}

struct Rendered {
    item: FeedItem,
    text: String,
}

pub struct Dispatcher {
    store: Arc<dyn BroadcastStore>,
    log: Arc<dyn MessageLog>,
    sender: Arc<dyn MessageSender>,
    pacer: Arc<TargetPacer>,
    slots: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn BroadcastStore>,
        log: Arc<dyn MessageLog>,
        sender: Arc<dyn MessageSender>,
        clock: Arc<dyn Clock>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            log,
            sender,
            pacer: Arc::new(TargetPacer::new()),
            slots: Arc::new(Semaphore::new(settings.max_parallel_targets.max(1))),
            clock,
            settings,
        }
    }

    /// Runs `schedule` once, whether or not it is due.
    ///
    /// Malformed schedules fail with [`HeraldError::ConfigInvalid`] before
    /// anything is sent. Storage errors abort the run.
    pub async fn run_schedule(&self, schedule: &Schedule) -> Result<RunReport, HeraldError> {
        let started_at = self.clock.now();
        herald_schedule::validate(schedule)?;
        let entity = format!("schedule `{}`", schedule.id);

        let template = self
            .store
            .get_template(&schedule.template_id)
            .await?
            .ok_or_else(|| {
                HeraldError::invalid(
                    &entity,
                    format!("template `{}` does not exist", schedule.template_id),
                )
            })?;

        let known = self.store.get_targets(&schedule.target_ids).await?;
        if known.is_empty() {
            return Err(HeraldError::invalid(&entity, "none of its targets exist"));
        }
        let targets: Vec<Target> = known.into_iter().filter(|t| t.enabled).collect();

        let mut report = RunReport {
            schedule_id: schedule.id.clone(),
            targets: targets.len(),
            ..RunReport::default()
        };

        if !targets.is_empty() {
            let target_ids: Vec<String> = targets.iter().map(|t| t.id.clone()).collect();
            let batch = self.collect_batch(schedule, &template.body, &target_ids).await?;
            report.items = batch.len();
            if !batch.is_empty() {
                let tally = Tally::default();
                futures::future::try_join_all(
                    targets
                        .iter()
                        .map(|target| self.deliver(&schedule.id, target, &batch, &tally)),
                )
                .await?;
                report.sent = tally.sent.into_inner();
                report.failed = tally.failed.into_inner();
                report.skipped = tally.skipped.into_inner();
                report.already_sent = tally.already_sent.into_inner();
                report.budget_exhausted = tally.exhausted.into_inner();
            }
        }

        self.store
            .set_schedule_last_run(&schedule.id, started_at)
            .await?;

        if report.budget_exhausted {
            warn!(
                schedule = schedule.id.as_str(),
                budget = self.settings.error_budget,
                "error budget exhausted, remaining pairs wait for the next run"
            );
        }
        info!(
            schedule = schedule.id.as_str(),
            items = report.items,
            targets = report.targets,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            already_sent = report.already_sent,
            "schedule run finished"
        );
        Ok(report)
    }

    /// Pending items across the schedule's feeds, oldest first, rendered.
    async fn collect_batch(
        &self,
        schedule: &Schedule,
        body: &str,
        target_ids: &[String],
    ) -> Result<Vec<Rendered>, HeraldError> {
        let limit = self.settings.max_items_per_run;
        let feed_urls: HashMap<String, String> = self
            .store
            .list_feeds()
            .await?
            .into_iter()
            .map(|f| (f.id, f.url))
            .collect();

        let mut items = Vec::new();
        for feed_id in &schedule.feed_ids {
            items.extend(
                self.store
                    .pending_items(feed_id, &schedule.id, target_ids, limit)
                    .await?,
            );
        }
        items.sort_by_key(|item| item.created_at);
        items.truncate(limit);

        Ok(items
            .into_iter()
            .map(|item| {
                let feed_url = feed_urls.get(&item.feed_id).map(String::as_str).unwrap_or("");
                let text = render(body, &item, feed_url);
                Rendered { item, text }
            })
            .collect())
    }

    async fn deliver(
        &self,
        schedule_id: &str,
        target: &Target,
        batch: &[Rendered],
        tally: &Tally,
    ) -> Result<(), HeraldError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| HeraldError::Internal("dispatch pool closed".into()))?;
        let mut lane = self.pacer.acquire(&target.id).await;
        let gap = Duration::from_secs(target.intra_delay_sec.into());

        for entry in batch {
            if tally.failures() >= self.settings.error_budget {
                tally.exhausted.store(true, Ordering::Relaxed);
                break;
            }
            if self
                .log
                .has_sent(&entry.item.id, &target.id, schedule_id)
                .await?
            {
                tally.already_sent.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            lane.wait_turn(gap).await;
            let message = OutboundMessage {
                jid: target.jid.clone(),
                text: entry.text.clone(),
            };
            let mut record = DeliveryRecord {
                feed_item_id: entry.item.id.clone(),
                target_id: target.id.clone(),
                schedule_id: schedule_id.to_string(),
                status: DeliveryStatus::Sent,
                error: None,
                sent_at: None,
            };
            match self.sender.send(&message).await {
                Ok(()) => {
                    record.sent_at = Some(self.clock.now());
                    tally.sent.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    let Some(status) = e.classify() else {
                        return Err(e);
                    };
                    debug!(
                        target = target.id.as_str(),
                        item = entry.item.id.as_str(),
                        %status,
                        error = %e,
                        "send did not go through"
                    );
                    let counter = match status {
                        DeliveryStatus::Skipped => &tally.skipped,
                        _ => &tally.failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                    record.status = status;
                    record.error = Some(e.to_string());
                }
            }

            if self.log.append(&record).await?.is_none() {
                warn!(
                    target = target.id.as_str(),
                    item = entry.item.id.as_str(),
                    "a sent row already existed, duplicate row dropped"
                );
            }
        }
        Ok(())
    }
}
