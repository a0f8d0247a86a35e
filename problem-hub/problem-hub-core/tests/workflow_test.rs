//! End-to-end flows across accounts, problems, sharing, groups and
//! maintenance on one data directory.

use chrono::Duration;
use problem_hub_core::{
    accounts::{Accounts, TokenIssuer},
    config::HubConfig,
    events::{Event, EventBus},
    groups::GroupDirectory,
    model::{today, Status},
    permissions::AccessLevel,
    problems::{NewProblem, ProblemService},
    scheduler::{Job, JobReport, Maintenance},
    storage::JsonStore,
    views, HubError,
};
use std::sync::Arc;
use tempfile::TempDir;

struct Hub {
    _dir: TempDir,
    accounts: Accounts,
    problems: ProblemService,
    groups: GroupDirectory,
    maintenance: Maintenance,
    events: EventBus,
}

fn hub() -> Hub {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonStore::new(dir.path().join("data")).unwrap());
    let events = EventBus::new();
    let mut config = HubConfig::default();
    config.backup_dir = dir.path().join("backups");
    config.backup_retention = 2;
    Hub {
        accounts: Accounts::with_cost(store.clone(), 8, 1).unwrap(),
        problems: ProblemService::new(store.clone(), events.clone()),
        groups: GroupDirectory::new(store.clone(), events.clone()),
        maintenance: Maintenance::from_config(store, &config, events.clone()),
        events,
        _dir: dir,
    }
}

fn due_in(days: i64, title: &str) -> NewProblem {
    NewProblem {
        title: Some(title.to_string()),
        category: Some("home".to_string()),
        due_date: Some(today() + Duration::days(days)),
        ..Default::default()
    }
}

#[test]
fn shared_problem_is_visible_with_granted_level_only() {
    let hub = hub();
    hub.accounts.register("alice", "alice@example.com", "pw-a").unwrap();
    hub.accounts.register("bob", "bob@example.com", "pw-b").unwrap();
    let alice = hub.accounts.login("alice", "pw-a").unwrap();
    let bob = hub.accounts.login("bob", "pw-b").unwrap();

    let sink = hub.problems.create(&alice, due_in(5, "Fix sink")).unwrap();
    hub.problems.create(&alice, due_in(9, "Paint fence")).unwrap();
    assert!(views::kanban(&hub.problems.list_accessible(&bob).unwrap()).open.is_empty());

    hub.problems
        .share(&alice, sink.id, "bob", AccessLevel::Write)
        .unwrap();
    let visible = hub.problems.list_accessible(&bob).unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(views::stats(&visible, today()).total, 1);

    let updated = hub
        .problems
        .update_status(&bob, sink.id, Status::InProgress)
        .unwrap();
    assert_eq!(updated.status, Status::InProgress);
    assert!(matches!(
        hub.problems.delete(&bob, sink.id),
        Err(HubError::AccessDenied)
    ));
    assert_eq!(hub.problems.sharing(&alice, sink.id).unwrap().len(), 1);
}

#[test]
fn tokens_carry_the_login_context() {
    let hub = hub();
    hub.accounts.register("carol", "carol@example.com", "pw").unwrap();
    let ctx = hub.accounts.login("carol", "pw").unwrap();
    let issuer = TokenIssuer::new("test-secret");
    let token = issuer.issue(&ctx).unwrap();
    assert_eq!(issuer.verify(&token).unwrap().context(), ctx);
}

#[test]
fn group_members_can_file_group_problems() {
    let hub = hub();
    for name in ["alice", "bob"] {
        hub.accounts.register(name, "", "pw").unwrap();
    }
    let alice = hub.accounts.context_for("alice").unwrap();
    let bob = hub.accounts.context_for("bob").unwrap();
    let group = hub.groups.create(&alice, "family", "household chores").unwrap();

    let mut chores = due_in(3, "Clean garage");
    chores.group_id = Some(group.id);
    assert!(matches!(
        hub.problems.create(&bob, chores.clone()),
        Err(HubError::AccessDenied)
    ));
    hub.groups.add_member(&alice, group.id, "bob").unwrap();
    let problem = hub.problems.create(&bob, chores).unwrap();
    assert_eq!(problem.group_id, Some(group.id));
    assert_eq!(hub.groups.groups_for_user("bob").unwrap().len(), 1);
}

#[tokio::test]
async fn maintenance_jobs_cover_reminders_and_backups() {
    let hub = hub();
    let mut rx = hub.events.subscribe();
    hub.accounts.register("alice", "alice@example.com", "pw").unwrap();
    let alice = hub.accounts.context_for("alice").unwrap();
    let soon = hub.problems.create(&alice, due_in(1, "Pay rent")).unwrap();
    hub.problems.create(&alice, due_in(2, "Call bank")).unwrap();
    while rx.try_recv().is_ok() {}

    let report = hub.maintenance.run(Job::Reminders).await.unwrap();
    assert_eq!(report, JobReport::Reminders { sent: 1 });
    match rx.recv().await.unwrap() {
        Event::DueReminder { id, days_until_due, .. } => {
            assert_eq!((id, days_until_due), (soon.id, 1));
        }
        other => panic!("unexpected event {other:?}"),
    }

    for _ in 0..3 {
        hub.maintenance.run(Job::Backup).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    let kept = hub.maintenance.backups().list().unwrap();
    assert_eq!(kept.len(), 2);
    assert!(kept.iter().all(|b| b.join("problems.json").exists()));
    assert!(kept.iter().all(|b| b.join("users.json").exists()));
}
