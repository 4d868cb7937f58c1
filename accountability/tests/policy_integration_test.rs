//! Policy file → store → escalation check, persisted through snapshots

use accountability::{
    AccountabilityPolicy, Contract, ContractDirectory, EscalationEngine, EscalationLevel,
    MemoryAuditLog, MemoryStore, PolicyFile, PolicyStore, Request, RequestRepository,
};
use chrono::{Duration, TimeZone, Utc};

const POLICIES: &str = r#"
[[policy]]
client_package = "SILVER"
reminder_hours = 24
warning_hours = 12
escalation_hours = 72

[[policy]]
client_package = "GOLD"
reminder_hours = 48
warning_hours = 0
escalation_hours = 24
"#;

#[test]
fn test_policy_file_drives_escalation() {
    let dir = tempfile::tempdir().unwrap();
    let policy_path = dir.path().join("policies.toml");
    std::fs::write(&policy_path, POLICIES).unwrap();

    let store = MemoryStore::new().shared();
    let written = PolicyFile::load(&policy_path)
        .unwrap()
        .apply(&*store)
        .unwrap();
    assert_eq!(written, 2);

    // Listing is ordered by package, not file order
    let packages: Vec<_> = store
        .list_policies()
        .unwrap()
        .into_iter()
        .map(|p| p.client_package)
        .collect();
    assert_eq!(packages, vec!["GOLD", "SILVER"]);

    let now = Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap();
    store
        .put_contract(&Contract::new("Retainer", "Acme", "GOLD").with_id("gold"))
        .unwrap();
    store
        .put_contract(&Contract::new("Pilot", "Globex", "SILVER").with_id("silver"))
        .unwrap();
    // 30h out: inside GOLD's 48h reminder window, outside SILVER's 24h
    let due = now + Duration::hours(30);
    store
        .create_request(&Request::new("gold", "u1", "G", "TASK", due).with_id("g1"))
        .unwrap();
    store
        .create_request(&Request::new("silver", "u1", "S", "TASK", due).with_id("s1"))
        .unwrap();

    let engine = EscalationEngine::new(store.clone(), MemoryAuditLog::new().shared());
    let summary = engine.run_check(now).unwrap();
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.reminders, 1);

    // Round trip the whole store through a snapshot
    let snapshot_path = dir.path().join("state").join("tracker.json");
    store.save(&snapshot_path).unwrap();
    let reloaded = MemoryStore::load(&snapshot_path).unwrap();
    assert_eq!(reloaded.snapshot().unwrap(), store.snapshot().unwrap());
    assert_eq!(
        reloaded.get_request("g1").unwrap().unwrap().escalation_level,
        EscalationLevel::Reminder
    );
    assert_eq!(reloaded.list_events(Some("g1")).unwrap().len(), 1);
}

#[test]
fn test_reloading_policy_replaces_thresholds() {
    let store = MemoryStore::new();
    PolicyFile::parse(POLICIES).unwrap().apply(&store).unwrap();

    let update = r#"
[[policy]]
client_package = "GOLD"
reminder_hours = 12
warning_hours = 6
escalation_hours = 36
"#;
    PolicyFile::parse(update).unwrap().apply(&store).unwrap();

    assert_eq!(
        store.get_policy("GOLD").unwrap(),
        Some(AccountabilityPolicy::new("GOLD", 12, 6, 36))
    );
    assert_eq!(store.list_policies().unwrap().len(), 2);
}
