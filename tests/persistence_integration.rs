use focus_guardian::blocker::{DomainBlocker, DEFAULT_LOOPBACK};
use focus_guardian::policy::store::{self, PolicyStore};
use focus_guardian::policy::{Day, Policy, DEFAULT_PROFILE};
use focus_guardian::GuardianError;
use std::collections::BTreeSet;

#[test]
fn save_of_fresh_load_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let store = PolicyStore::open(&path).unwrap();
    store.add_whitelist_entry("Notion").unwrap();
    store.set_schedule("study", Day::Friday, 9, 12).unwrap();
    let written = std::fs::read(&path).unwrap();

    let loaded = store::load(&path).unwrap();
    assert!(loaded.degraded.is_none());
    store::save(&path, &loaded.policy).unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), written);
}

#[test]
fn unknown_fields_survive_a_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{
  "current_profile": "default",
  "profiles": {"default": {"name": "Default", "blocked_apps": [], "active_hours": {"start": 0, "end": 24}}},
  "whitelist": [],
  "schedules": {},
  "theme": "dark",
  "points": 120
}"#,
    )
    .unwrap();

    let store = PolicyStore::open(&path).unwrap();
    assert!(store.add_blocked_app("Steam.exe").unwrap());

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(saved["theme"], "dark");
    assert_eq!(saved["points"], 120);
    assert_eq!(saved["profiles"]["default"]["blocked_apps"][0], "Steam.exe");
}

#[test]
fn corrupt_settings_fall_back_to_defaults_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    std::fs::write(&path, r#"{"current_profile": 7}"#).unwrap();

    let loaded = store::load(&path).unwrap();
    assert!(matches!(
        loaded.degraded,
        Some(GuardianError::CorruptStore { .. })
    ));
    assert_eq!(loaded.policy, Policy::default());

    // The next successful save replaces the corrupt document
    let store = PolicyStore::open(&path).unwrap();
    store.switch_profile("work").unwrap();
    let reopened = PolicyStore::open(&path).unwrap();
    assert!(reopened.load_warning().is_none());
    assert_eq!(reopened.snapshot().current_profile, "work");
}

#[test]
fn unknown_profile_is_a_caller_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = PolicyStore::open(dir.path().join("settings.json")).unwrap();

    let err = store.switch_profile("holiday").unwrap_err();
    assert!(err.is_caller_error());
    assert_eq!(store.snapshot().current_profile, DEFAULT_PROFILE);
}

#[test]
fn blocking_twice_writes_two_lines_not_four() {
    let dir = tempfile::tempdir().unwrap();
    let hosts = dir.path().join("hosts");
    std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();
    let blocker = DomainBlocker::new(&hosts, DEFAULT_LOOPBACK);

    blocker.block("x.com").unwrap();
    let once = blocker.list_blocked().unwrap();
    blocker.block("x.com").unwrap();

    let content = std::fs::read_to_string(&hosts).unwrap();
    let lines: Vec<&str> = content.lines().filter(|l| l.contains("x.com")).collect();
    assert_eq!(lines, vec!["127.0.0.1 x.com", "127.0.0.1 www.x.com"]);
    assert_eq!(blocker.list_blocked().unwrap(), once);
}

#[test]
fn blocked_set_follows_external_edits() {
    let dir = tempfile::tempdir().unwrap();
    let hosts = dir.path().join("hosts");
    std::fs::write(&hosts, "127.0.0.1 localhost\n").unwrap();
    let blocker = DomainBlocker::new(&hosts, DEFAULT_LOOPBACK);
    blocker.block("reddit.com").unwrap();

    // Someone appends an entry by hand
    let mut content = std::fs::read_to_string(&hosts).unwrap();
    content.push_str("127.0.0.1 news.ycombinator.com\n");
    std::fs::write(&hosts, content).unwrap();

    let expected: BTreeSet<String> = ["news.ycombinator.com", "reddit.com"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(blocker.list_blocked().unwrap(), expected);

    assert!(blocker.unblock("https://www.reddit.com/r/rust").unwrap());
    assert_eq!(
        blocker.snapshot().unwrap().domains,
        vec!["news.ycombinator.com".to_string()]
    );
}

#[test]
fn unblocking_a_domain_keeps_localhost_on_a_shared_line() {
    let dir = tempfile::tempdir().unwrap();
    let hosts = dir.path().join("hosts");
    std::fs::write(&hosts, "127.0.0.1 localhost x.com\n127.0.0.1 www.x.com\n").unwrap();
    let blocker = DomainBlocker::new(&hosts, DEFAULT_LOOPBACK);

    assert!(blocker.unblock("x.com").unwrap());

    assert_eq!(std::fs::read_to_string(&hosts).unwrap(), "127.0.0.1 localhost\n");
    assert!(blocker.list_blocked().unwrap().is_empty());
}
