use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use mvl_common::replay::{ReplayFile, FILE_EXTENSION};

/// Attempts at finding a free file name before giving up on a save.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Decides which temporary replays to remove before a new one is written.
pub trait ReplayQuota: Send + Sync {
    fn replays_to_delete(&self, temp_dir: &Path) -> Vec<PathBuf>;
}

/// Keeps at most `max_temp` temporary replays, counting the one about to be
/// written. Oldest by modification time go first. A limit of 0 behaves like 1:
/// the replay being saved is always kept.
#[derive(Debug, Clone, Copy)]
pub struct TempReplayLimit {
    pub max_temp: usize,
}

impl ReplayQuota for TempReplayLimit {
    fn replays_to_delete(&self, temp_dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(temp_dir) else {
            return Vec::new();
        };

        let mut replays: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|s| s.to_str()) == Some(FILE_EXTENSION))
            .map(|path| {
                let modified = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, path)
            })
            .collect();

        // newest first
        replays.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        let keep = self.max_temp.max(1) - 1;
        replays.into_iter().skip(keep).map(|(_, path)| path).collect()
    }
}

/// Writes finished replays into `<replay_dir>/temp`.
///
/// Saving never fails the caller: problems are logged and the save is
/// skipped.
pub struct ReplayStore {
    temp_dir: PathBuf,
    quota: Box<dyn ReplayQuota>,
    last_saved_path: Option<PathBuf>,
}

impl ReplayStore {
    pub fn new(temp_dir: impl Into<PathBuf>, quota: Box<dyn ReplayQuota>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            quota,
            last_saved_path: None,
        }
    }

    pub fn with_limit(temp_dir: impl Into<PathBuf>, max_temp: usize) -> Self {
        Self::new(temp_dir, Box::new(TempReplayLimit { max_temp }))
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    pub fn last_saved_path(&self) -> Option<&Path> {
        self.last_saved_path.as_deref()
    }

    pub fn save(&mut self, replay: &ReplayFile) -> Option<PathBuf> {
        match self.try_save(replay) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "replay saved");
                self.last_saved_path = Some(path.clone());
                Some(path)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to save replay");
                None
            }
        }
    }

    fn try_save(&self, replay: &ReplayFile) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.temp_dir)?;

        for path in self.quota.replays_to_delete(&self.temp_dir) {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(path = %path.display(), "deleted temporary replay"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not delete replay"),
            }
        }

        let (path, file) = create_unique(&self.temp_dir, replay.created_at)?;
        let mut writer = BufWriter::new(file);
        let written = replay
            .write_to(&mut writer)
            .and_then(|_| writer.flush().map_err(Into::into));
        if let Err(e) = written {
            drop(writer);
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(path)
    }
}

/// Create `Replay-<timestamp>.<ext>`, or `Replay-<timestamp>-<n>.<ext>` when
/// that name is taken.
fn create_unique(dir: &Path, timestamp: i64) -> io::Result<(PathBuf, File)> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("Replay-{timestamp}.{FILE_EXTENSION}")
        } else {
            format!("Replay-{timestamp}-{attempt}.{FILE_EXTENSION}")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free replay file name after {MAX_NAME_ATTEMPTS} attempts"),
    ))
}
