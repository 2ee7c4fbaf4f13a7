//! Health-check scheduler
//!
//! One timer task per group keeps node health fresh. A cycle probes every
//! enabled node of a group concurrently and writes each result to the
//! registry as soon as it arrives. Triggers that land while a cycle is
//! running coalesce into that cycle.

use super::{classify, probe_node, Prober, StatusProber, Transport};
use crate::config::{NetworkGroup, ParamsTable};
use crate::node::{ConnectionStatus, Node};
use crate::registry::NodeRegistry;
use crate::status::NodesListInfo;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Why a health check was started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Foreground,
    ConnectivityRestored,
    /// Explicit request, e.g. pull-to-refresh
    Manual,
    NodesEdited,
    /// A request failed over away from a node
    Failover,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Foreground => "foreground",
            Trigger::ConnectivityRestored => "connectivity_restored",
            Trigger::Manual => "manual",
            Trigger::NodesEdited => "nodes_edited",
            Trigger::Failover => "failover",
        }
    }
}

struct GroupState {
    in_flight: AtomicBool,
    /// Signalled whenever a running cycle ends
    idle: Notify,
    /// Triggers that found a cycle already running
    coalesced: AtomicUsize,
    on_screen: AtomicBool,
    last_started: Mutex<Option<Instant>>,
    last_completed: Mutex<Option<Instant>>,
    /// Re-evaluates the timer after a visibility change
    wake: Notify,
    info: watch::Sender<NodesListInfo>,
}

struct Inner {
    registry: Arc<NodeRegistry>,
    probers: HashMap<NetworkGroup, Arc<dyn Prober>>,
    params: ParamsTable,
    permits: Semaphore,
    groups: Vec<GroupState>,
}

/// Clears the in-flight flag when a cycle ends or is dropped
struct InFlight<'a>(&'a GroupState);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::Release);
        self.0.idle.notify_waiters();
    }
}

/// Keeps every group's node health fresh
#[derive(Clone)]
pub struct HealthScheduler {
    inner: Arc<Inner>,
}

impl HealthScheduler {
    /// Scheduler with one prober per group; groups without a prober are never
    /// checked
    pub fn new(
        registry: Arc<NodeRegistry>,
        params: ParamsTable,
        probers: HashMap<NetworkGroup, Arc<dyn Prober>>,
        max_parallel_probes: usize,
    ) -> Self {
        let groups = NetworkGroup::ALL
            .iter()
            .map(|&group| {
                let info = NodesListInfo::compute(
                    group,
                    registry.list(group),
                    registry.prefer_fastest(group),
                    true,
                );
                GroupState {
                    in_flight: AtomicBool::new(false),
                    idle: Notify::new(),
                    coalesced: AtomicUsize::new(0),
                    on_screen: AtomicBool::new(false),
                    last_started: Mutex::new(None),
                    last_completed: Mutex::new(None),
                    wake: Notify::new(),
                    info: watch::Sender::new(info),
                }
            })
            .collect();

        Self {
            inner: Arc::new(Inner {
                registry,
                probers,
                params,
                permits: Semaphore::new(max_parallel_probes.max(1)),
                groups,
            }),
        }
    }

    /// Scheduler probing every group with its default status protocol
    pub fn with_transport(
        registry: Arc<NodeRegistry>,
        params: ParamsTable,
        transport: Arc<dyn Transport>,
        max_parallel_probes: usize,
    ) -> Self {
        let probers = NetworkGroup::ALL
            .iter()
            .map(|&group| {
                let timeout = params.get(group).probe_timeout;
                let prober: Arc<dyn Prober> =
                    Arc::new(StatusProber::for_group(group, transport.clone(), timeout));
                (group, prober)
            })
            .collect();

        Self::new(registry, params, probers, max_parallel_probes)
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.inner.registry
    }

    fn state(&self, group: NetworkGroup) -> &GroupState {
        &self.inner.groups[group.index()]
    }

    pub fn is_checking(&self, group: NetworkGroup) -> bool {
        self.state(group).in_flight.load(Ordering::Acquire)
    }

    /// How many triggers were folded into an already running cycle
    pub fn coalesced_triggers(&self, group: NetworkGroup) -> usize {
        self.state(group).coalesced.load(Ordering::Relaxed)
    }

    /// When the last health check of a group finished
    pub fn last_completed(&self, group: NetworkGroup) -> Option<Instant> {
        *self.state(group).last_completed.lock()
    }

    /// No health check finished within the group's staleness threshold
    pub fn is_stale(&self, group: NetworkGroup) -> bool {
        let stale_after = self.inner.params.get(group).stale_after;
        match self.last_completed(group) {
            Some(at) => at.elapsed() > stale_after,
            None => true,
        }
    }

    /// Live summary of a group, republished whenever it changes
    pub fn observe_info(&self, group: NetworkGroup) -> watch::Receiver<NodesListInfo> {
        self.publish_info(group);
        self.state(group).info.subscribe()
    }

    /// Current summary of a group
    pub fn info(&self, group: NetworkGroup) -> NodesListInfo {
        self.publish_info(group);
        self.state(group).info.borrow().clone()
    }

    fn publish_info(&self, group: NetworkGroup) {
        let registry = &self.inner.registry;
        let info = NodesListInfo::compute(
            group,
            registry.list(group),
            registry.prefer_fastest(group),
            self.is_stale(group),
        );

        self.state(group).info.send_if_modified(|current| {
            if *current == info {
                return false;
            }
            *current = info;
            true
        });
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Start a health check in the background
    pub fn trigger(&self, group: NetworkGroup, trigger: Trigger) -> JoinHandle<bool> {
        let this = self.clone();
        tokio::spawn(async move { this.run_cycle(group, trigger).await })
    }

    pub fn on_foreground(&self) {
        for group in NetworkGroup::ALL {
            self.trigger(group, Trigger::Foreground);
        }
    }

    pub fn on_connectivity_restored(&self) {
        for group in NetworkGroup::ALL {
            self.trigger(group, Trigger::ConnectivityRestored);
        }
    }

    /// Whether the group's node list is currently shown to the user
    pub fn set_on_screen(&self, group: NetworkGroup, on_screen: bool) {
        let state = self.state(group);
        if state.on_screen.swap(on_screen, Ordering::AcqRel) != on_screen {
            state.wake.notify_one();
        }
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    /// Run one health-check cycle for a group.
    ///
    /// Returns `false` without probing if a cycle for the group is already
    /// running or the group has no prober.
    pub async fn run_cycle(&self, group: NetworkGroup, trigger: Trigger) -> bool {
        let state = self.state(group);
        if state.in_flight.swap(true, Ordering::AcqRel) {
            state.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(group = %group, trigger = trigger.as_str(), "health check already running");
            return false;
        }
        let _in_flight = InFlight(state);
        *state.last_started.lock() = Some(Instant::now());

        let Some(prober) = self.inner.probers.get(&group) else {
            debug!(group = %group, "no prober for group, skipping health check");
            return false;
        };

        let params = self.inner.params.get(group);
        let registry = &self.inner.registry;
        let permits = &self.inner.permits;
        let nodes: Vec<Node> = registry
            .list(group)
            .into_iter()
            .filter(|n| n.enabled)
            .collect();

        debug!(group = %group, trigger = trigger.as_str(), nodes = nodes.len(), "health check started");

        // Heights from earlier cycles bound the in-progress classification
        let known_height = nodes.iter().filter_map(|n| n.height).max().unwrap_or(0);
        let cycle_height = AtomicU64::new(0);
        let probes = nodes.iter().map(|node| {
            let prober = prober.as_ref();
            let params = &params;
            let cycle_height = &cycle_height;

            async move {
                let _permit = permits.acquire().await;

                match probe_node(prober, node).await {
                    Ok((sample, origin)) => {
                        // Provisional: the final pass reclassifies against the cycle max
                        let best = cycle_height
                            .fetch_max(sample.height, Ordering::AcqRel)
                            .max(sample.height)
                            .max(known_height);
                        let provisional = classify(&sample, best, node.status, params);
                        registry.record_health(group, node.id, |n| {
                            n.apply_sample(&sample, origin);
                            n.status = Some(provisional);
                        });
                        Some((node, sample, provisional))
                    }
                    Err(e) => {
                        debug!(
                            group = %group,
                            node = %node.id,
                            origin = %node.preferred_origin(),
                            error = %e,
                            "probe failed"
                        );
                        registry.record_health(group, node.id, |n| {
                            n.status = Some(ConnectionStatus::Offline);
                        });
                        if node.status != Some(ConnectionStatus::Offline) {
                            info!(group = %group, node = %node.id, "node went offline");
                        }
                        None
                    }
                }
            }
        });

        let answered: Vec<_> = join_all(probes).await.into_iter().flatten().collect();
        let max_height = cycle_height.load(Ordering::Acquire);

        for (node, sample, provisional) in &answered {
            let status = classify(sample, max_height, node.status, &params);
            let mut applied = false;
            registry.record_health(group, node.id, |n| {
                // A status written after the probe (e.g. a failover) is newer
                if n.status == Some(*provisional) {
                    n.status = Some(status);
                    applied = true;
                }
            });

            if applied && node.status != Some(status) {
                info!(
                    group = %group,
                    node = %node.id,
                    status = ?status,
                    height = sample.height,
                    max_height,
                    "node status changed"
                );
            }
        }

        *state.last_completed.lock() = Some(Instant::now());
        self.publish_info(group);

        debug!(
            group = %group,
            probed = nodes.len(),
            answered = answered.len(),
            max_height,
            "health check finished"
        );
        true
    }

    // ========================================================================
    // Background tasks
    // ========================================================================

    /// Spawn the per-group timers and the edit listener
    pub fn start(&self) -> SchedulerHandle {
        let (shutdown, rx) = watch::channel(false);

        let mut workers: Vec<JoinHandle<()>> = NetworkGroup::ALL
            .iter()
            .map(|&group| {
                let this = self.clone();
                let rx = rx.clone();
                tokio::spawn(async move { this.run_timer(group, rx).await })
            })
            .collect();

        let edits = self.inner.registry.subscribe_edits();
        let this = self.clone();
        workers.push(tokio::spawn(async move {
            this.forward_edits(edits, rx).await
        }));

        info!(groups = NetworkGroup::ALL.len(), "health scheduler started");

        SchedulerHandle {
            shutdown,
            workers: tokio::sync::Mutex::new(workers),
        }
    }

    /// When the group's next timer check is due; `None` when its timer is off
    fn next_due(&self, group: NetworkGroup, interval: Option<Duration>) -> Option<Instant> {
        match *self.state(group).last_started.lock() {
            None => Some(Instant::now()),
            Some(started) => interval.map(|every| started + every),
        }
    }

    /// When the group's published info turns stale; `None` once it already is
    fn stale_deadline(&self, group: NetworkGroup) -> Option<Instant> {
        let stale_after = self.inner.params.get(group).stale_after;
        let completed = self.last_completed(group)?;
        let deadline = completed + stale_after + Duration::from_millis(1);
        (deadline > Instant::now()).then_some(deadline)
    }

    async fn run_timer(self, group: NetworkGroup, mut shutdown: watch::Receiver<bool>) {
        let registry = self.inner.registry.clone();
        let mut nodes = registry.observe(group);
        let mut fastest = registry.observe_prefer_fastest(group);

        loop {
            let state = self.state(group);
            let interval = self.inner.params.get(group).interval(
                registry.has_allowed_node(group),
                state.on_screen.load(Ordering::Acquire),
            );
            let timer = sleep_until(self.next_due(group, interval));
            let stale_timer = sleep_until(self.stale_deadline(group));

            let stop = tokio::select! {
                _ = timer => {
                    let idle = state.idle.notified();
                    tokio::pin!(idle);
                    idle.as_mut().enable();

                    tokio::select! {
                        ran = self.run_cycle(group, Trigger::Timer) => {
                            if !ran && self.is_checking(group) {
                                // Another trigger's cycle is still running
                                tokio::select! {
                                    _ = idle => false,
                                    _ = shutdown.changed() => true,
                                }
                            } else {
                                false
                            }
                        }
                        _ = shutdown.changed() => true,
                    }
                }
                _ = stale_timer => {
                    self.publish_info(group);
                    false
                }
                _ = state.wake.notified() => false,
                changed = nodes.changed() => {
                    nodes.borrow_and_update();
                    self.publish_info(group);
                    changed.is_err()
                }
                changed = fastest.changed() => {
                    fastest.borrow_and_update();
                    self.publish_info(group);
                    changed.is_err()
                }
                changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
            };

            if stop {
                break;
            }
        }

        debug!(group = %group, "health timer stopped");
    }

    async fn forward_edits(
        self,
        mut edits: broadcast::Receiver<NetworkGroup>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                received = edits.recv() => match received {
                    Ok(group) => {
                        self.trigger(group, Trigger::NodesEdited);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "edit notifications lagged, checking every group");
                        for group in NetworkGroup::ALL {
                            self.trigger(group, Trigger::NodesEdited);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Running scheduler tasks
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl SchedulerHandle {
    /// Stop every timer and wait for them to exit
    pub async fn shutdown(&self) {
        if self.shutdown.send(true).is_err() {
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(err) = handle.await {
                debug!(?err, "health scheduler worker exited with error");
            }
        }
        info!("health scheduler stopped");
    }
}
