use crate::level::config::LevelConfig;
use photon::logging::{self, Logger};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum LevelError {
    /// The level file does not exist.
    NotFound(PathBuf),
    /// The file exists but could not be read.
    Io(io::Error),
    /// The document is not well-formed JSON.
    Syntax(serde_json::Error),
    /// The document parsed but fails validation.
    Invalid(String),
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LevelError::NotFound(path) => write!(f, "level file not found: {}", path.display()),
            LevelError::Io(err) => write!(f, "level file read error: {}", err),
            LevelError::Syntax(err) => write!(f, "level syntax error: {}", err),
            LevelError::Invalid(reason) => write!(f, "invalid level: {}", reason),
        }
    }
}

impl std::error::Error for LevelError {}

impl From<serde_json::Error> for LevelError {
    fn from(err: serde_json::Error) -> LevelError {
        LevelError::Syntax(err)
    }
}

/// A validated level plus the non-fatal issues found while checking it.
#[derive(Debug)]
pub struct LoadedLevel {
    pub config: LevelConfig,
    pub warnings: Vec<String>,
}

/// Reads and validates one level definition file.
pub fn load_level<P: AsRef<Path>>(path: P) -> Result<LoadedLevel, LevelError> {
    let path = path.as_ref();

    let text = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => LevelError::NotFound(path.to_path_buf()),
        _ => LevelError::Io(err),
    })?;

    parse_level(&text)
}

/// Parses and validates a level document.
pub fn parse_level(text: &str) -> Result<LoadedLevel, LevelError> {
    let mut config: LevelConfig = serde_json::from_str(text)?;

    if config.metadata.id.is_empty() {
        return Err(LevelError::Invalid("metadata.id is empty".into()));
    }
    if config.metadata.name.is_empty() {
        return Err(LevelError::Invalid("metadata.name is empty".into()));
    }
    if config.waves.is_empty() {
        return Err(LevelError::Invalid("level declares no waves".into()));
    }

    // The map key is authoritative for the enemy id; definitions usually
    // repeat it inline but are allowed to omit it.
    for (key, def) in config.enemy_definitions.iter_mut() {
        if def.id.is_empty() {
            def.id = key.clone();
        }
    }

    let mut warnings = Vec::new();
    let mut valid_waves = 0usize;

    for (index, wave) in config.waves.iter().enumerate() {
        let mut resolvable = 0usize;

        for group in &wave.enemies {
            if config.enemy_definitions.contains_key(&group.enemy_id) {
                resolvable += 1;
            } else {
                warnings.push(format!(
                    "wave {} references undefined enemy '{}'",
                    index, group.enemy_id
                ));
            }
        }

        if resolvable > 0 {
            valid_waves += 1;
        }
    }

    if valid_waves == 0 {
        return Err(LevelError::Invalid(
            "no wave has a resolvable spawn group".into(),
        ));
    }

    Ok(LoadedLevel { config, warnings })
}

/// Loads every `*.json` level in a directory, sorted by metadata id.
/// Broken levels are skipped and logged; one bad file never takes down the
/// rest of the campaign.
pub fn load_level_dir<P: AsRef<Path>>(dir: P, log: &Logger) -> Vec<LoadedLevel> {
    let dir = dir.as_ref();
    let mut levels = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            logging::warn!(log, "cannot read level directory";
                           "dir" => %dir.display(),
                           "error" => %err);
            return levels;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }

        match load_level(&path) {
            Ok(level) => {
                for warning in &level.warnings {
                    logging::warn!(log, "level warning";
                                   "file" => %path.display(),
                                   "warning" => %warning);
                }
                logging::info!(log, "level loaded";
                               "file" => %path.display(),
                               "id" => %level.config.metadata.id,
                               "waves" => level.config.waves.len());
                levels.push(level);
            }
            Err(err) => {
                logging::warn!(log, "skipping unloadable level";
                               "file" => %path.display(),
                               "error" => %err);
            }
        }
    }

    levels.sort_by(|a, b| a.config.metadata.id.cmp(&b.config.metadata.id));
    levels
}
