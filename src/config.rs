use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{Subject, parse_name_list};
use crate::error::BackupError;
use crate::layout::BackupLayout;

pub const DEFAULT_CONFIG_FILE: &str = "gdrive-backup.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub backup_root: Option<String>,
    #[serde(default)]
    pub access_token_file: Option<String>,
    #[serde(default)]
    pub names: Option<NameEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum NameEntry {
    CommaSeparated(String),
    List(Vec<String>),
}

/// Values given on the command line; each one wins over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub subject: Option<String>,
    pub backup_root: Option<String>,
    pub access_token_file: Option<String>,
    pub names: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub subject: Subject,
    pub backup_root: Utf8PathBuf,
    pub access_token_file: Option<Utf8PathBuf>,
    pub names: Vec<String>,
}

impl ResolvedConfig {
    pub fn layout(&self) -> BackupLayout {
        BackupLayout::new(self.backup_root.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the job file. A missing default file is not an error; a missing
    /// explicit `--config` path is.
    pub fn load(path: Option<&str>) -> Result<Option<Config>, BackupError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(None);
        }
        if path.is_some() && !config_path.exists() {
            return Err(BackupError::ConfigRead(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| BackupError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| BackupError::ConfigParse(err.to_string()))?;
        Ok(Some(config))
    }

    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, BackupError> {
        match Self::load(path)? {
            Some(config) => Self::resolve_config(config, overrides),
            None if overrides.subject.is_none() => Err(BackupError::MissingConfig),
            None => Self::resolve_config(Config::default(), overrides),
        }
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, BackupError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let subject = overrides
            .subject
            .or(config.subject)
            .ok_or_else(|| BackupError::InvalidSubject("no subject given".to_string()))?
            .parse::<Subject>()?;

        let backup_root = match overrides.backup_root.or(config.backup_root) {
            Some(root) => expand_home(&root)?,
            None => BackupLayout::default_root()?,
        };

        let access_token_file = overrides
            .access_token_file
            .or(config.access_token_file)
            .map(|path| expand_home(&path))
            .transpose()?;

        let names = match (overrides.names, config.names) {
            (Some(names), _) => parse_name_list(&names)?,
            (None, Some(NameEntry::CommaSeparated(names))) => parse_name_list(&names)?,
            (None, Some(NameEntry::List(names))) => parse_name_list(&names.join(","))?,
            (None, None) => Vec::new(),
        };

        Ok(ResolvedConfig {
            schema_version,
            subject,
            backup_root,
            access_token_file,
            names,
        })
    }
}

fn expand_home(value: &str) -> Result<Utf8PathBuf, BackupError> {
    let trimmed = value.trim();
    let rest = if trimmed == "~" {
        ""
    } else if let Some(rest) = trimmed.strip_prefix("~/") {
        rest
    } else {
        return Ok(Utf8PathBuf::from(trimmed));
    };
    let home = BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
        .ok_or_else(|| BackupError::Filesystem("unable to resolve home directory".to_string()))?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}
