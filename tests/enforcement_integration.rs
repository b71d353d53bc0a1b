use chrono::{NaiveDate, NaiveDateTime};
use focus_guardian::enforcer::engine::{ChannelTicker, Engine, EngineSettings, Tick};
use focus_guardian::enforcer::{CancelReason, EngineEvent};
use focus_guardian::enumerator::Enumerator;
use focus_guardian::policy::store::{self, PolicyStore};
use focus_guardian::policy::{Day, HourRange, Policy, Profile};
use focus_guardian::recorder::EventRecorder;
use focus_guardian::{GuardianError, Result, WindowInfo};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
enum TerminateOutcome {
    Killed,
    AlreadyGone,
    Denied,
}

struct MockDesktop {
    windows: Mutex<Vec<WindowInfo>>,
    outcome: Mutex<TerminateOutcome>,
    broken: AtomicBool,
    terminated: Mutex<Vec<String>>,
}

impl MockDesktop {
    fn with_window(window: WindowInfo) -> Arc<Self> {
        Arc::new(Self {
            windows: Mutex::new(vec![window]),
            outcome: Mutex::new(TerminateOutcome::Killed),
            broken: AtomicBool::new(false),
            terminated: Mutex::new(Vec::new()),
        })
    }

    fn close_all_windows(&self) {
        self.windows.lock().unwrap().clear();
    }

    fn terminated(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

impl Enumerator for MockDesktop {
    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(GuardianError::Enumeration("display went away".to_string()));
        }
        Ok(self.windows.lock().unwrap().clone())
    }

    fn list_process_names(&self) -> Result<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    fn terminate(&self, identifier: &str) -> Result<usize> {
        self.terminated.lock().unwrap().push(identifier.to_string());
        match *self.outcome.lock().unwrap() {
            TerminateOutcome::Killed => Ok(1),
            TerminateOutcome::AlreadyGone => {
                Err(GuardianError::ProcessNotFound(identifier.to_string()))
            }
            TerminateOutcome::Denied => Err(GuardianError::Permission(format!(
                "cannot terminate {}",
                identifier
            ))),
        }
    }
}

fn game_window() -> WindowInfo {
    WindowInfo::new("Game - Level 3").with_id(42).focused()
}

/// 2024-01-01 (a Monday) at `hour`:00 local time
fn monday_at(hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// "study" profile blocking only game.exe from 08:00 to 18:00
fn study_store(dir: &tempfile::TempDir) -> Arc<PolicyStore> {
    let mut policy = Policy::default();
    let mut study = Profile::new("Study", HourRange::new(8, 18).unwrap());
    study.blocked_apps = vec!["game.exe".to_string()];
    policy.profiles.insert("study".to_string(), study);
    policy.current_profile = "study".to_string();

    let path = dir.path().join("settings.json");
    store::save(&path, &policy).unwrap();
    Arc::new(PolicyStore::open(path).unwrap())
}

struct Harness {
    engine: Engine,
    desk: Arc<MockDesktop>,
    recorder: Arc<EventRecorder>,
    _dir: tempfile::TempDir,
}

fn harness(window: WindowInfo) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = study_store(&dir);
    let desk = MockDesktop::with_window(window);
    let recorder = Arc::new(EventRecorder::open_in_memory().unwrap());
    let settings = EngineSettings {
        countdown: Duration::from_secs(3),
        poll_interval: Duration::from_secs(1),
    };
    let engine = Engine::new(store, desk.clone(), recorder.clone(), settings);
    Harness {
        engine,
        desk,
        recorder,
        _dir: dir,
    }
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[tokio::test]
async fn blocked_focused_window_is_terminated_after_countdown() {
    let mut h = harness(game_window());
    let t0 = Instant::now();

    let report = assert_ok!(h.engine.poll_cycle(t0, monday_at(10)).await);
    assert!(report.active);
    assert_eq!(report.started, 1);

    for tick in 1..=2 {
        let report = assert_ok!(h.engine.poll_cycle(t0 + secs(tick), monday_at(10)).await);
        assert!(report.terminated.is_empty(), "terminated early at tick {}", tick);
    }
    assert!(h.desk.terminated().is_empty());

    let report = assert_ok!(h.engine.poll_cycle(t0 + secs(3), monday_at(10)).await);
    assert_eq!(report.terminated, vec!["game.exe".to_string()]);
    assert_eq!(h.desk.terminated(), vec!["game.exe".to_string()]);
    assert_eq!(h.engine.cases().count(), 0);

    let events = h.recorder.recent(10).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].app, "game.exe");
}

#[tokio::test]
async fn outside_active_hours_no_case_is_created() {
    let mut h = harness(game_window());
    let t0 = Instant::now();

    for tick in 0..5 {
        let report = assert_ok!(h.engine.poll_cycle(t0 + secs(tick), monday_at(20)).await);
        assert!(!report.active);
        assert_eq!(report.started, 0);
    }

    assert_eq!(h.engine.cases().count(), 0);
    assert!(h.desk.terminated().is_empty());
    assert_eq!(h.recorder.count().unwrap(), 0);
}

#[tokio::test]
async fn window_closed_after_second_tick_cancels_without_termination() {
    let mut h = harness(game_window());
    let mut events = h.engine.subscribe();
    let t0 = Instant::now();

    assert_ok!(h.engine.poll_cycle(t0, monday_at(10)).await);
    assert_ok!(h.engine.poll_cycle(t0 + secs(1), monday_at(10)).await);
    assert_ok!(h.engine.poll_cycle(t0 + secs(2), monday_at(10)).await);

    h.desk.close_all_windows();
    let report = assert_ok!(h.engine.poll_cycle(t0 + secs(3), monday_at(10)).await);

    assert_eq!(report.cancelled, 1);
    assert!(report.terminated.is_empty());
    assert!(h.desk.terminated().is_empty());
    assert_eq!(h.recorder.count().unwrap(), 0);

    let mut cancelled = None;
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::Cancelled { reason, .. } = event {
            cancelled = Some(reason);
        }
    }
    assert_eq!(cancelled, Some(CancelReason::WindowClosed));
}

#[tokio::test]
async fn disabled_override_falls_back_to_profile_hours() {
    let mut h = harness(game_window());
    let dir = tempfile::tempdir().unwrap();
    let store = study_store(&dir);
    store.set_schedule("study", Day::Monday, 19, 22).unwrap();
    store.disable_schedule("study", Day::Monday).unwrap();
    h.engine = Engine::new(
        store,
        h.desk.clone(),
        h.recorder.clone(),
        EngineSettings::default(),
    );

    let report = assert_ok!(h.engine.poll_cycle(Instant::now(), monday_at(10)).await);
    assert!(report.active);
    assert_eq!(report.started, 1);

    let report = assert_ok!(h.engine.poll_cycle(Instant::now(), monday_at(20)).await);
    assert!(!report.active);
}

#[tokio::test]
async fn repeated_observations_continue_one_case() {
    let mut h = harness(game_window());
    let t0 = Instant::now();

    assert_ok!(h.engine.poll_cycle(t0, monday_at(10)).await);
    let report = assert_ok!(h.engine.poll_cycle(t0 + secs(1), monday_at(10)).await);

    assert_eq!(report.started, 0);
    assert_eq!(h.engine.cases().count(), 1);
}

#[tokio::test]
async fn whitelisted_window_is_never_enforced() {
    let mut h = harness(WindowInfo::new("Game - homework planner").with_id(9).focused());
    let dir = tempfile::tempdir().unwrap();
    let store = study_store(&dir);
    store.add_whitelist_entry("homework").unwrap();
    h.engine = Engine::new(
        store,
        h.desk.clone(),
        h.recorder.clone(),
        EngineSettings::default(),
    );

    let report = assert_ok!(h.engine.poll_cycle(Instant::now(), monday_at(10)).await);
    assert_eq!(report.started, 0);
}

#[tokio::test]
async fn process_already_gone_discards_case_without_event() {
    let mut h = harness(game_window());
    *h.desk.outcome.lock().unwrap() = TerminateOutcome::AlreadyGone;
    let t0 = Instant::now();

    for tick in 0..=3 {
        assert_ok!(h.engine.poll_cycle(t0 + secs(tick), monday_at(10)).await);
    }

    assert_eq!(h.desk.terminated().len(), 1);
    assert_eq!(h.engine.cases().count(), 0);
    assert_eq!(h.recorder.count().unwrap(), 0);
}

#[tokio::test]
async fn permission_failure_is_surfaced_and_case_discarded() {
    let mut h = harness(game_window());
    *h.desk.outcome.lock().unwrap() = TerminateOutcome::Denied;
    let t0 = Instant::now();

    for tick in 0..3 {
        assert_ok!(h.engine.poll_cycle(t0 + secs(tick), monday_at(10)).await);
    }
    let report = assert_ok!(h.engine.poll_cycle(t0 + secs(3), monday_at(10)).await);

    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0], GuardianError::Permission(_)));
    assert_eq!(h.engine.cases().count(), 0);
    assert_eq!(h.recorder.count().unwrap(), 0);
}

#[tokio::test]
async fn enumeration_failure_skips_only_that_cycle() {
    let mut h = harness(game_window());
    let t0 = Instant::now();

    h.desk.broken.store(true, Ordering::SeqCst);
    let err = assert_err!(h.engine.poll_cycle(t0, monday_at(10)).await);
    assert!(matches!(err, GuardianError::Enumeration(_)));

    h.desk.broken.store(false, Ordering::SeqCst);
    let report = assert_ok!(h.engine.poll_cycle(t0 + secs(1), monday_at(10)).await);
    assert_eq!(report.started, 1);
}

#[tokio::test]
async fn run_loop_driven_by_synthetic_ticks() {
    let mut h = harness(game_window());
    let (tx, mut ticker) = ChannelTicker::channel(8);
    let t0 = Instant::now();

    for tick in 0..=3 {
        tx.send(Tick {
            at: t0 + secs(tick),
            local: monday_at(10),
        })
        .await
        .unwrap();
    }
    drop(tx);

    h.engine.run(&mut ticker, CancellationToken::new()).await;

    assert_eq!(h.desk.terminated(), vec!["game.exe".to_string()]);
    assert_eq!(h.recorder.count().unwrap(), 1);
}

#[tokio::test]
async fn cancelling_the_loop_discards_pending_cases() {
    let mut h = harness(game_window());
    let (tx, mut ticker) = ChannelTicker::channel(8);
    let cancel = CancellationToken::new();
    let t0 = Instant::now();

    tx.send(Tick {
        at: t0,
        local: monday_at(10),
    })
    .await
    .unwrap();

    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stopper.cancel();
    });

    h.engine.run(&mut ticker, cancel).await;
    drop(tx);

    assert_eq!(h.engine.cases().count(), 0);
    assert!(h.desk.terminated().is_empty());
}
