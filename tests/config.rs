use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use gdrive_backup::config::{Config, ConfigLoader, ConfigOverrides, NameEntry};
use gdrive_backup::error::BackupError;

#[test]
fn parse_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("job.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "subject": "ops@example.org",
            "backup_root": "/srv/drive",
            "access_token_file": "/run/secrets/drive-token",
            "names": ["Budget", "Q3 Plan"]
        }"#,
    )
    .unwrap();

    let resolved =
        ConfigLoader::resolve(path.to_str(), ConfigOverrides::default()).unwrap();

    assert_eq!(resolved.subject.as_str(), "ops@example.org");
    assert_eq!(resolved.backup_root, Utf8PathBuf::from("/srv/drive"));
    assert_eq!(
        resolved.access_token_file,
        Some(Utf8PathBuf::from("/run/secrets/drive-token"))
    );
    assert_eq!(resolved.names, vec!["Budget", "Q3 Plan"]);
    assert_eq!(
        resolved.layout().backup_root(),
        Utf8PathBuf::from("/srv/drive").as_path()
    );
}

#[test]
fn names_accept_comma_separated_string() {
    let config = Config {
        subject: Some("ops@example.org".to_string()),
        names: Some(NameEntry::CommaSeparated("Budget,, Notes ".to_string())),
        ..Config::default()
    };

    let resolved = ConfigLoader::resolve_config(config, ConfigOverrides::default()).unwrap();
    assert_eq!(resolved.names, vec!["Budget", "Notes"]);
}

#[test]
fn cli_names_replace_file_names() {
    let config = Config {
        subject: Some("ops@example.org".to_string()),
        names: Some(NameEntry::List(vec!["From file".to_string()])),
        ..Config::default()
    };
    let overrides = ConfigOverrides {
        names: Some("From CLI".to_string()),
        backup_root: Some("/tmp/backups".to_string()),
        ..ConfigOverrides::default()
    };

    let resolved = ConfigLoader::resolve_config(config, overrides).unwrap();
    assert_eq!(resolved.names, vec!["From CLI"]);
    assert_eq!(resolved.backup_root, Utf8PathBuf::from("/tmp/backups"));
}

#[test]
fn subject_is_required() {
    let err = ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default())
        .unwrap_err();
    assert_matches!(err, BackupError::InvalidSubject(_));
}

#[test]
fn explicit_missing_config_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    let err = ConfigLoader::load(path.to_str()).unwrap_err();
    assert_matches!(err, BackupError::ConfigRead(_));
}

#[test]
fn malformed_config_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("job.json");
    fs::write(&path, "{ not json").unwrap();
    let err = ConfigLoader::load(path.to_str()).unwrap_err();
    assert_matches!(err, BackupError::ConfigParse(_));
}

#[test]
fn no_job_file_and_no_subject() {
    let err = ConfigLoader::resolve(None, ConfigOverrides::default()).unwrap_err();
    assert_matches!(err, BackupError::MissingConfig);
}
