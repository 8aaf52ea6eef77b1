//! Wildcard files and their shuffle-bag rotation.
//!
//! A wildcard `name` is backed by `{dir}/{name}.txt`, one value per line.
//! Values are handed out in a shuffled order; no value repeats until every
//! value in the file has been used once, then the bag is reshuffled.
//! Rotation state (bag order, cursor, usage count) is kept per wildcard and
//! written to a state file after every advancing call.

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::persist;

/// Rotation primitive consumed by the prompt resolver.
pub trait WildcardSource: Send + Sync {
    /// Next value of `name`, advancing its rotation.
    fn next_value(&self, name: &str) -> Result<String, WildcardError>;

    /// The next `count` values of `name` without advancing anything.
    fn preview_values(&self, name: &str, count: usize) -> Result<Vec<String>, WildcardError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Rotation {
    /// Shuffled indices into the wildcard's values.
    order: Vec<usize>,
    cursor: usize,
    usage_count: u64,
}

impl Rotation {
    fn shuffled(len: usize) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        order.shuffle(&mut rand::rng());
        Self {
            order,
            cursor: 0,
            usage_count: 0,
        }
    }

    fn reshuffle(&mut self) {
        self.order.shuffle(&mut rand::rng());
        self.cursor = 0;
    }
}

/// Summary of one wildcard for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WildcardInfo {
    pub name: String,
    pub values: usize,
    pub cursor: usize,
    pub usage_count: u64,
}

/// File-backed wildcard store.
pub struct WildcardStore {
    dir: PathBuf,
    state_file: Option<PathBuf>,
    rotations: Mutex<HashMap<String, Rotation>>,
}

impl WildcardStore {
    /// Open a store over `dir`, restoring rotation state from `state_file`
    /// when given.
    pub fn open(dir: impl Into<PathBuf>, state_file: Option<PathBuf>) -> Result<Self, WildcardError> {
        let rotations = match &state_file {
            Some(path) => persist::read_json_or_quarantine(path)?.unwrap_or_default(),
            None => HashMap::new(),
        };

        Ok(Self {
            dir: dir.into(),
            state_file,
            rotations: Mutex::new(rotations),
        })
    }

    /// A store that keeps rotation state in memory only.
    pub fn in_memory(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            state_file: None,
            rotations: Mutex::new(HashMap::new()),
        }
    }

    /// Read the values of `name`, skipping blank lines and `#` comments.
    pub fn values(&self, name: &str) -> Result<Vec<String>, WildcardError> {
        let path = self.path_for(name)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WildcardError::NotFound(name.to_string()));
            }
            Err(e) => return Err(WildcardError::Io(e)),
        };

        let values: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        if values.is_empty() {
            return Err(WildcardError::Empty(name.to_string()));
        }
        Ok(values)
    }

    /// All wildcards found under the directory, with their rotation state.
    pub fn list(&self) -> Result<Vec<WildcardInfo>, WildcardError> {
        let mut names = Vec::new();
        collect_names(&self.dir, &self.dir, &mut names)?;
        names.sort();

        let rotations = self.rotations.lock();
        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            let values = match self.values(&name) {
                Ok(values) => values.len(),
                Err(WildcardError::Empty(_)) => 0,
                Err(e) => return Err(e),
            };
            let rotation = rotations.get(&name);
            infos.push(WildcardInfo {
                name,
                values,
                cursor: rotation.map_or(0, |r| r.cursor),
                usage_count: rotation.map_or(0, |r| r.usage_count),
            });
        }
        Ok(infos)
    }

    /// Forget the rotation of `name` so its next use starts a fresh bag.
    pub fn reset(&self, name: &str) -> Result<(), WildcardError> {
        let mut rotations = self.rotations.lock();
        let previous = rotations.remove(name);
        self.commit(&mut rotations, name, previous)
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, WildcardError> {
        let valid = !name.is_empty()
            && name.split('/').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            });
        if !valid {
            return Err(WildcardError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.txt")))
    }

    /// Make sure `name` has a bag matching the current number of values.
    fn ensure_rotation<'a>(
        rotations: &'a mut HashMap<String, Rotation>,
        name: &str,
        len: usize,
    ) -> &'a mut Rotation {
        let rotation = rotations
            .entry(name.to_string())
            .or_insert_with(|| Rotation::shuffled(len));
        if rotation.order.len() != len {
            let usage_count = rotation.usage_count;
            *rotation = Rotation {
                usage_count,
                ..Rotation::shuffled(len)
            };
        }
        rotation
    }

    /// Persist `rotations`; on failure put `name` back to `previous` so
    /// memory matches the state file.
    fn commit(
        &self,
        rotations: &mut HashMap<String, Rotation>,
        name: &str,
        previous: Option<Rotation>,
    ) -> Result<(), WildcardError> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        if let Err(e) = persist::write_json_atomic(path, &*rotations) {
            match previous {
                Some(rotation) => rotations.insert(name.to_string(), rotation),
                None => rotations.remove(name),
            };
            return Err(e.into());
        }
        Ok(())
    }
}

impl WildcardSource for WildcardStore {
    fn next_value(&self, name: &str) -> Result<String, WildcardError> {
        let values = self.values(name)?;
        let mut rotations = self.rotations.lock();
        let previous = rotations.get(name).cloned();
        let rotation = Self::ensure_rotation(&mut rotations, name, values.len());

        if rotation.cursor >= rotation.order.len() {
            rotation.reshuffle();
        }
        let value = values[rotation.order[rotation.cursor]].clone();
        rotation.cursor += 1;
        rotation.usage_count += 1;

        self.commit(&mut rotations, name, previous)?;
        Ok(value)
    }

    fn preview_values(&self, name: &str, count: usize) -> Result<Vec<String>, WildcardError> {
        let values = self.values(name)?;
        let mut rotations = self.rotations.lock();
        let previous = rotations.get(name).cloned();
        let fresh = previous.is_none();
        let rotation = Self::ensure_rotation(&mut rotations, name, values.len());

        // Materialize the bag the next production call will draw from, so the
        // preview and the run agree. Neither cursor nor usage moves.
        let reshuffled = rotation.cursor >= rotation.order.len();
        if reshuffled {
            rotation.reshuffle();
        }
        let preview = (0..count)
            .map(|offset| {
                let slot = (rotation.cursor + offset) % rotation.order.len();
                values[rotation.order[slot]].clone()
            })
            .collect();

        if fresh || reshuffled {
            self.commit(&mut rotations, name, previous)?;
        }
        Ok(preview)
    }
}

fn collect_names(root: &Path, dir: &Path, names: &mut Vec<String>) -> Result<(), WildcardError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(WildcardError::Io(e)),
    };

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_names(root, &path, names)?;
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        if let Ok(relative) = path.with_extension("").strip_prefix(root) {
            let name = relative
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            names.push(name);
        }
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum WildcardError {
    #[error("Wildcard '{0}' not found")]
    NotFound(String),

    #[error("Wildcard '{0}' has no values")]
    Empty(String),

    #[error("Invalid wildcard name '{0}'")]
    InvalidName(String),

    #[error("Wildcard I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist wildcard state: {0}")]
    Persist(#[from] persist::PersistError),
}
