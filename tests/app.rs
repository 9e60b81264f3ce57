mod support;

use std::fs;

use assert_matches::assert_matches;

use gdrive_backup::app::{App, RunState};
use gdrive_backup::domain::{BackupMode, Subject};
use gdrive_backup::error::BackupError;
use gdrive_backup::layout::{BackupLayout, MANIFEST_FILE, RunStamp};

use support::{FakeAuth, FakeDrive, RecordingSink, document, file, folder, temp_root};

fn subject() -> Subject {
    "someone@example.com".parse().unwrap()
}

#[test]
fn full_backup_mirrors_the_drive() {
    let (_temp, root) = temp_root();
    let drive = FakeDrive::new(vec![
        file("n1", "notes.txt").with_parent("p"),
        folder("p", "Projects"),
        document("s1", "Budget", "application/vnd.google-apps.spreadsheet").with_parent("p"),
        document("q", "Survey", "application/vnd.google-apps.form"),
    ])
    .with_content("n1", b"hello");
    let app = App::new(BackupLayout::new(root.clone()), FakeAuth::new(drive.clone()));
    let sink = RecordingSink::default();

    let manifest = app.full_backup(&subject(), &sink).unwrap();

    let run_root = app.layout().run_root(&subject(), RunStamp::today());
    assert_eq!(manifest.mode, BackupMode::Full);
    assert_eq!(manifest.run_root, run_root.to_string());
    assert_eq!(manifest.found, 4);
    assert_eq!(manifest.succeeded, 3);
    assert_eq!(manifest.skipped, 1);
    assert_eq!(manifest.failed, 0);
    assert!(run_root.starts_with(root.join("someone_at_example.com")));
    assert_eq!(fs::read(run_root.join("Projects/notes.txt")).unwrap(), b"hello");
    assert!(run_root.join("Projects/Budget.xlsx").is_file());
    assert!(!run_root.join("Survey").exists());
    assert!(run_root.join(MANIFEST_FILE).is_file());
}

#[test]
fn full_backup_reports_states_in_order() {
    let (_temp, root) = temp_root();
    let drive = FakeDrive::new(vec![folder("a", "A"), file("b", "b.txt").with_parent("a")]);
    let app = App::new(BackupLayout::new(root), FakeAuth::new(drive));
    let sink = RecordingSink::default();

    app.full_backup(&subject(), &sink).unwrap();

    let mut states = sink.events().iter().map(|event| event.state).collect::<Vec<_>>();
    states.dedup();
    assert_eq!(
        states,
        vec![
            RunState::Authenticating,
            RunState::Listing,
            RunState::Processing,
            RunState::Completed
        ]
    );
    let last = sink.events().last().cloned().unwrap();
    assert_eq!(last.counters.total, 2);
    assert_eq!(last.counters.processed, 2);
    assert_eq!(last.counters.succeeded, 2);
}

#[test]
fn one_failure_does_not_stop_the_run() {
    let (_temp, root) = temp_root();
    let drive = FakeDrive::new(
        (1..=5)
            .map(|n| file(&format!("f{n}"), &format!("{n}.bin")))
            .collect(),
    )
    .failing("f3");
    let app = App::new(BackupLayout::new(root), FakeAuth::new(drive));
    let sink = RecordingSink::default();

    let manifest = app.full_backup(&subject(), &sink).unwrap();

    let counters = sink.events().last().unwrap().counters;
    assert_eq!(counters.processed, 5);
    assert_eq!(counters.succeeded, 4);
    assert_eq!(counters.failed, 1);
    assert_eq!(manifest.failures.len(), 1);
    assert_eq!(manifest.failures[0].id, "f3");
    let run_root = app.layout().run_root(&subject(), RunStamp::today());
    assert!(run_root.join("4.bin").is_file());
    assert!(!run_root.join("3.bin").exists());
}

#[test]
fn empty_drive_completes() {
    let (_temp, root) = temp_root();
    let app = App::new(BackupLayout::new(root), FakeAuth::new(FakeDrive::new(Vec::new())));
    let sink = RecordingSink::default();

    let manifest = app.full_backup(&subject(), &sink).unwrap();

    assert_eq!(manifest.found, 0);
    assert_eq!(sink.events().last().unwrap().state, RunState::Completed);
}

#[test]
fn rejected_credentials_fail_the_run() {
    let (_temp, root) = temp_root();
    let app = App::new(BackupLayout::new(root.clone()), FakeAuth::rejecting());
    let sink = RecordingSink::default();

    let err = app.full_backup(&subject(), &sink).unwrap_err();

    assert_matches!(err, BackupError::AuthFailed(_));
    let events = sink.events();
    assert_eq!(events.last().unwrap().state, RunState::Failed);
    assert!(events.iter().all(|event| event.state != RunState::Listing));
    assert!(!root.join("someone_at_example.com").exists());
}

#[test]
fn targeted_backup_places_matches_under_their_ancestors() {
    let (_temp, root) = temp_root();
    let mut drive = FakeDrive::new(vec![
        document("plan", "Plan", "application/vnd.google-apps.document").with_parent("q3"),
        file("other", "Other"),
    ]);
    drive.hidden = vec![
        folder("q3", "Q3").with_parent("projects"),
        folder("projects", "Projects").with_parent("root"),
        folder("root", "My Drive"),
    ];
    let app = App::new(BackupLayout::new(root), FakeAuth::new(drive.clone()));
    let sink = RecordingSink::default();
    let names = vec!["Plan".to_string(), " Plan ".to_string(), "Absent".to_string()];

    let manifest = app.targeted_backup(&subject(), &names, &sink).unwrap();

    let run_root = app.layout().run_root(&subject(), RunStamp::SpecificFiles);
    assert!(run_root.ends_with("specific_files"));
    assert_eq!(manifest.mode, BackupMode::Targeted);
    assert_eq!(manifest.found, 1);
    assert_eq!(manifest.succeeded, 1);
    assert!(run_root.join("My Drive/Projects/Q3/Plan.docx").is_file());
    assert!(!run_root.join("Other").exists());
    assert_eq!(drive.transfer_count(), 1);
}

#[test]
fn targeted_ancestor_failure_counts_against_the_match() {
    let (_temp, root) = temp_root();
    let mut drive = FakeDrive::new(vec![
        file("a", "Report").with_parent("broken"),
        file("b", "Report"),
    ]);
    drive.broken_metadata.insert("broken".to_string());
    let app = App::new(BackupLayout::new(root), FakeAuth::new(drive));
    let sink = RecordingSink::default();

    let manifest = app
        .targeted_backup(&subject(), &["Report".to_string()], &sink)
        .unwrap();

    assert_eq!(manifest.found, 2);
    assert_eq!(manifest.succeeded, 1);
    assert_eq!(manifest.failed, 1);
    assert_eq!(manifest.failures[0].id, "a");
    assert!(manifest.failures[0].path.is_none());
    let counters = sink.events().last().unwrap().counters;
    assert_eq!(counters.processed, 2);
}

#[test]
fn targeted_backup_needs_a_name() {
    let (_temp, root) = temp_root();
    let app = App::new(BackupLayout::new(root), FakeAuth::new(FakeDrive::new(Vec::new())));
    let sink = RecordingSink::default();

    let err = app
        .targeted_backup(&subject(), &[" ".to_string(), String::new()], &sink)
        .unwrap_err();

    assert_matches!(err, BackupError::EmptyNameList);
    assert!(sink.events().is_empty());
}

#[test]
fn manifest_records_the_run() {
    let (_temp, root) = temp_root();
    let drive = FakeDrive::new(vec![file("x", "x.bin")]).failing("x");
    let app = App::new(BackupLayout::new(root), FakeAuth::new(drive));

    let manifest = app.full_backup(&subject(), &RecordingSink::default()).unwrap();

    let run_root = app.layout().run_root(&subject(), RunStamp::today());
    let written: serde_json::Value =
        serde_json::from_slice(&fs::read(run_root.join(MANIFEST_FILE)).unwrap()).unwrap();
    assert_eq!(written["subject"], "someone@example.com");
    assert_eq!(written["mode"], "full");
    assert_eq!(written["found"], 1);
    assert_eq!(written["failed"], 1);
    assert_eq!(written["failures"][0]["name"], "x.bin");
    assert!(manifest.finished_at.is_some());
}
