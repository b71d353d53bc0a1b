//! The poll loop: enumerate, gate, match, advance cases, terminate
//!
//! The engine is the only owner of enforcement cases, so case state needs
//! no locking. Time comes in through [`Ticker`] so tests drive cycles with
//! synthetic ticks instead of sleeping.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    AdvisorySource, CancelReason, CaseKey, CaseTick, EngineEvent, EnforcementCase, WindowIdentity,
    DEFAULT_COUNTDOWN,
};
use crate::enumerator::{process_matches, Enumerator};
use crate::error::{GuardianError, Result};
use crate::matcher::{is_whitelisted, Matcher};
use crate::policy::store::PolicyStore;
use crate::policy::Policy;
use crate::recorder::EventRecorder;
use crate::schedule::is_policy_active;
use crate::{Verdict, WindowInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Warning period before termination
    pub countdown: Duration,
    /// Time between poll cycles
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            countdown: DEFAULT_COUNTDOWN,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// What one poll cycle did
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Schedule gate was open for this cycle
    pub active: bool,
    pub started: usize,
    pub cancelled: usize,
    /// Apps terminated this cycle
    pub terminated: Vec<String>,
    /// Terminations that did not happen and need the operator's attention
    pub failures: Vec<GuardianError>,
}

/// One clock reading fed to the engine
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Monotonic time, drives countdowns
    pub at: Instant,
    /// Local wall-clock time, drives the schedule gate
    pub local: NaiveDateTime,
}

impl Tick {
    pub fn now() -> Self {
        Self {
            at: Instant::now(),
            local: Local::now().naive_local(),
        }
    }
}

/// Source of poll ticks. `None` ends the loop.
#[async_trait]
pub trait Ticker: Send {
    async fn tick(&mut self) -> Option<Tick>;
}

/// Fixed-period ticker backed by a tokio interval
pub struct IntervalTicker {
    interval: tokio::time::Interval,
}

impl IntervalTicker {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> Option<Tick> {
        self.interval.tick().await;
        Some(Tick::now())
    }
}

/// Ticker fed from a channel; closing the sender stops the engine
pub struct ChannelTicker {
    rx: mpsc::Receiver<Tick>,
}

impl ChannelTicker {
    pub fn channel(buffer: usize) -> (mpsc::Sender<Tick>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Ticker for ChannelTicker {
    async fn tick(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }
}

pub struct Engine {
    store: Arc<PolicyStore>,
    enumerator: Arc<dyn Enumerator>,
    recorder: Arc<EventRecorder>,
    settings: EngineSettings,
    cases: HashMap<CaseKey, EnforcementCase>,
    /// (app, label) pairs already reported as advisories
    advisories: HashSet<(String, String)>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    pub fn new(
        store: Arc<PolicyStore>,
        enumerator: Arc<dyn Enumerator>,
        recorder: Arc<EventRecorder>,
        settings: EngineSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            store,
            enumerator,
            recorder,
            settings,
            cases: HashMap::new(),
            advisories: HashSet::new(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    /// Cases currently counting down
    pub fn cases(&self) -> impl Iterator<Item = &EnforcementCase> {
        self.cases.values()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Run one poll cycle at monotonic time `now` and local time `local`.
    ///
    /// Enumeration failures skip the cycle and are returned as errors.
    /// Termination failures do not abort the cycle; they are collected in
    /// [`CycleReport::failures`].
    pub async fn poll_cycle(&mut self, now: Instant, local: NaiveDateTime) -> Result<CycleReport> {
        let policy = self.store.snapshot();

        // Gate is evaluated once and applies to the whole cycle
        if !is_policy_active(&policy, &local) {
            let cancelled = self.cancel_all(CancelReason::ScheduleInactive);
            self.advisories.clear();
            debug!("Outside active hours for profile {}", policy.current_profile);
            return Ok(CycleReport {
                cancelled,
                ..Default::default()
            });
        }

        let (windows, processes) = match self.enumerate().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Skipping poll cycle: {}", e);
                self.emit(EngineEvent::CycleSkipped {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut report = CycleReport {
            active: true,
            ..Default::default()
        };
        let matcher = Matcher::from_policy(&policy);
        let mut advisories = HashSet::new();
        let mut seen = HashSet::new();
        let mut fresh = HashSet::new();
        let mut apps_with_windows = HashSet::new();

        for window in windows.iter().filter(|w| w.is_candidate()) {
            let Verdict::Blocked(app) = matcher.classify(&window.title) else {
                continue;
            };
            apps_with_windows.insert(app.to_lowercase());

            if !window.is_focused {
                advisories.insert((app, window.title.clone(), AdvisorySource::Window));
                continue;
            }

            let key = CaseKey::new(&app, window);
            seen.insert(key.clone());
            if self.cases.contains_key(&key) {
                continue;
            }

            let mut case = EnforcementCase::detect(&app, window, now);
            case.start_warning(self.settings.countdown, now);
            info!(
                "⏳ {} detected in \"{}\", closing in {}s",
                app,
                window.title,
                self.settings.countdown.as_secs()
            );
            self.emit(EngineEvent::warning(&case, self.settings.countdown));
            fresh.insert(key.clone());
            self.cases.insert(key, case);
            report.started += 1;
        }

        // Cases whose window is gone, unfocused or no longer blocked
        let stale: Vec<CaseKey> = self
            .cases
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(mut case) = self.cases.remove(&key) {
                let reason = cancel_reason(&key, &windows);
                case.cancel();
                info!("Countdown for {} cancelled: {}", case.app, reason);
                self.emit(EngineEvent::cancelled(&case, reason));
                report.cancelled += 1;
            }
        }

        // Advance cases that existed before this cycle
        let mut expired = Vec::new();
        let mut countdowns = Vec::new();
        for (key, case) in self.cases.iter_mut() {
            if fresh.contains(key) {
                continue;
            }
            match case.tick(now) {
                CaseTick::Countdown(remaining) => {
                    countdowns.push(EngineEvent::warning(case, remaining))
                }
                CaseTick::Expired => expired.push(key.clone()),
            }
        }
        for event in countdowns {
            self.emit(event);
        }

        self.terminate_expired(expired, &mut report).await;

        for name in &processes {
            if let Some(app) = blocked_process(&policy, name) {
                if !apps_with_windows.contains(&app.to_lowercase()) {
                    advisories.insert((app, name.clone(), AdvisorySource::Process));
                }
            }
        }
        self.report_advisories(advisories);

        Ok(report)
    }

    async fn enumerate(&self) -> Result<(Vec<WindowInfo>, BTreeSet<String>)> {
        let enumerator = Arc::clone(&self.enumerator);
        tokio::task::spawn_blocking(move || {
            let windows = enumerator.list_windows()?;
            let processes = enumerator.list_process_names()?;
            Ok((windows, processes))
        })
        .await
        .map_err(|e| GuardianError::Enumeration(format!("enumeration task failed: {}", e)))?
    }

    /// Terminate expired cases, one OS call per app.
    ///
    /// Each termination is joined before its cases are discarded.
    async fn terminate_expired(&mut self, expired: Vec<CaseKey>, report: &mut CycleReport) {
        let mut by_app: BTreeMap<String, Vec<CaseKey>> = BTreeMap::new();
        for key in expired {
            by_app.entry(key.app.clone()).or_default().push(key);
        }

        for keys in by_app.into_values() {
            let Some(app) = keys
                .first()
                .and_then(|key| self.cases.get(key))
                .map(|case| case.app.clone())
            else {
                continue;
            };

            let enumerator = Arc::clone(&self.enumerator);
            let target = app.clone();
            let outcome = tokio::task::spawn_blocking(move || enumerator.terminate(&target))
                .await
                .unwrap_or_else(|e| {
                    Err(GuardianError::Enumeration(format!(
                        "terminate task failed: {}",
                        e
                    )))
                });

            let mut cases: Vec<EnforcementCase> =
                keys.iter().filter_map(|key| self.cases.remove(key)).collect();

            match outcome {
                Ok(processes) => {
                    let at = Utc::now();
                    warn!("🛑 Closed {} ({} process(es))", app, processes);
                    // The app is already closed; a lost record must not undo that
                    if let Err(e) = self.recorder.append(&app, at) {
                        error!("Failed to record block event for {}: {}", app, e);
                        report.failures.push(e);
                    }
                    for case in &mut cases {
                        case.mark_terminated();
                        self.emit(EngineEvent::Terminated {
                            case_id: case.id,
                            app: case.app.clone(),
                            processes,
                            at,
                        });
                    }
                    report.terminated.push(app);
                }
                Err(GuardianError::ProcessNotFound(_)) => {
                    debug!("{} exited before termination", app);
                    for case in &mut cases {
                        case.cancel();
                        self.emit(EngineEvent::cancelled(case, CancelReason::ProcessGone));
                    }
                }
                Err(e) => {
                    error!("Could not close {}: {}", app, e);
                    for case in &cases {
                        self.emit(EngineEvent::TerminationFailed {
                            case_id: case.id,
                            app: case.app.clone(),
                            error: e.to_string(),
                        });
                    }
                    report.failures.push(e);
                }
            }
        }
    }

    fn report_advisories(&mut self, current: HashSet<(String, String, AdvisorySource)>) {
        let mut next = HashSet::with_capacity(current.len());
        for (app, label, source) in current {
            let key = (app.to_lowercase(), label.clone());
            if !self.advisories.contains(&key) {
                match source {
                    AdvisorySource::Window => {
                        info!("Blocked app {} open in background window \"{}\"", app, label)
                    }
                    AdvisorySource::Process => {
                        info!("Blocked app {} running as process {}", app, label)
                    }
                }
                self.emit(EngineEvent::Advisory { app, label, source });
            }
            next.insert(key);
        }
        self.advisories = next;
    }

    fn cancel_all(&mut self, reason: CancelReason) -> usize {
        let cases: Vec<EnforcementCase> = self.cases.drain().map(|(_, case)| case).collect();
        for mut case in cases.iter().cloned() {
            case.cancel();
            info!("Countdown for {} cancelled: {}", case.app, reason);
            self.emit(EngineEvent::cancelled(&case, reason));
        }
        cases.len()
    }

    /// Discard all in-flight cases without terminating anything.
    pub fn shutdown(&mut self) {
        let discarded = self.cancel_all(CancelReason::Stopped);
        if discarded > 0 {
            info!("Discarded {} pending countdown(s)", discarded);
        }
    }

    /// Drive poll cycles from `ticker` until it ends or `cancel` fires.
    pub async fn run<T: Ticker>(&mut self, ticker: &mut T, cancel: CancellationToken) {
        info!(
            "Enforcement loop running (poll every {:?}, countdown {:?})",
            self.settings.poll_interval, self.settings.countdown
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                tick = ticker.tick() => {
                    let Some(tick) = tick else { break };
                    match self.poll_cycle(tick.at, tick.local).await {
                        Ok(report) => {
                            for failure in &report.failures {
                                error!("Enforcement failure: {}", failure);
                            }
                        }
                        Err(e) => debug!("Cycle skipped: {}", e),
                    }
                }
            }
        }

        self.shutdown();
        info!("Enforcement loop stopped");
    }
}

fn cancel_reason(key: &CaseKey, windows: &[WindowInfo]) -> CancelReason {
    match windows.iter().find(|w| WindowIdentity::of(w) == key.window) {
        None => CancelReason::WindowClosed,
        Some(w) if !w.is_focused || !w.is_candidate() => CancelReason::LostFocus,
        Some(_) => CancelReason::NoLongerBlocked,
    }
}

/// First blocked app of the current profile that process `name` belongs to.
fn blocked_process(policy: &Policy, name: &str) -> Option<String> {
    if is_whitelisted(name, &policy.whitelist) {
        return None;
    }
    policy
        .blocked_apps()
        .iter()
        .find(|app| process_matches(name, app))
        .cloned()
}
