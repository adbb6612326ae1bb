use std::{
    ffi::OsString,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::replication::Position;

/// Minimum spacing between two unforced saves.
const SAVE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint IO error: {0}")]
    Io(#[from] io::Error),

    #[error("checkpoint decoding error: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("checkpoint encoding error: {0}")]
    Encode(#[from] toml::ser::Error),
}

/// On-disk form of the checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Record {
    #[serde(default)]
    addr: String,
    #[serde(default)]
    bin_name: String,
    #[serde(default)]
    bin_pos: u32,
}

#[derive(Debug, Default)]
struct Inner {
    record: Record,
    last_save: Option<Instant>,
}

/// The last acknowledged binlog position of a master, persisted to a TOML file.
///
/// Updates are in memory only; [`save`](Self::save) writes at most once per
/// second unless forced, so a crash may lose up to a second of progress.
#[derive(Debug)]
pub struct MasterInfo {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl MasterInfo {
    /// Loads the checkpoint at `path`. A missing file is the zero position.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref().to_path_buf();

        let record = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Record::default(),
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no checkpoint at {}, starting from zero", path.display());
                Record::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                record,
                last_save: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update(&self, name: &str, pos: u32) {
        let mut inner = self.lock();
        inner.record.bin_name = name.to_string();
        inner.record.bin_pos = pos;
    }

    pub fn position(&self) -> Position {
        let inner = self.lock();
        Position::new(inner.record.bin_name.clone(), inner.record.bin_pos)
    }

    pub fn addr(&self) -> String {
        self.lock().record.addr.clone()
    }

    pub fn set_addr(&self, addr: &str) {
        self.lock().record.addr = addr.to_string();
    }

    /// Persists the current position. Returns false when the write was
    /// skipped because the previous save is less than a second old.
    pub fn save(&self, force: bool) -> Result<bool, CheckpointError> {
        let mut inner = self.lock();

        let now = Instant::now();
        if !force
            && inner
                .last_save
                .is_some_and(|last| now.duration_since(last) < SAVE_INTERVAL)
        {
            return Ok(false);
        }

        if let Err(e) = write_atomic(&self.path, &inner.record) {
            error!(
                "failed to save master info to {}: {e}",
                self.path.display()
            );
            return Err(e);
        }
        inner.last_save = Some(now);
        debug!(
            "saved master info ({}, {})",
            inner.record.bin_name, inner.record.bin_pos
        );
        Ok(true)
    }

    pub fn close(&self) -> Result<(), CheckpointError> {
        self.save(true).map(|_| ())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes to a sibling file and renames it over `path`, so readers see either
/// the old or the new document. The sibling is removed if any step fails.
fn write_atomic(path: &Path, record: &Record) -> Result<(), CheckpointError> {
    let document = toml::to_string(record)?;
    let temp = temp_path(path);

    if let Err(e) = write_then_rename(&temp, path, document.as_bytes()) {
        if let Err(cleanup) = fs::remove_file(&temp) {
            debug!("could not remove {}: {cleanup}", temp.display());
        }
        return Err(e.into());
    }
    Ok(())
}

fn write_then_rename(temp: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp)?;
    file.write_all(data)?;
    file.sync_all()?;
    fs::rename(temp, path)
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn missing_file_is_zero_position() {
        let dir = TempDir::new("master_info").unwrap();
        let info = MasterInfo::load(dir.path().join("master.info")).unwrap();

        assert_eq!(info.position(), Position::default());
        assert_eq!(info.addr(), "");
        assert!(!info.path().exists());
    }

    #[test]
    fn forced_save_creates_file() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        let info = MasterInfo::load(&path).unwrap();

        info.set_addr("127.0.0.1:3306");
        info.update("mysql-bin.000002", 1234);
        assert!(info.save(true).unwrap());
        assert!(path.exists());
        assert!(!temp_path(&path).exists());

        let reloaded = MasterInfo::load(&path).unwrap();
        assert_eq!(reloaded.position(), Position::new("mysql-bin.000002", 1234));
        assert_eq!(reloaded.addr(), "127.0.0.1:3306");
    }

    #[test]
    fn unforced_saves_are_throttled() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        let info = MasterInfo::load(&path).unwrap();

        info.update("mysql-bin.000001", 4);
        assert!(info.save(false).unwrap());
        info.update("mysql-bin.000001", 500);
        assert!(!info.save(false).unwrap());
        assert_eq!(
            MasterInfo::load(&path).unwrap().position(),
            Position::new("mysql-bin.000001", 4)
        );

        assert!(info.save(true).unwrap());
        assert_eq!(
            MasterInfo::load(&path).unwrap().position(),
            Position::new("mysql-bin.000001", 500)
        );
    }

    #[test]
    fn document_uses_flat_keys() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        let info = MasterInfo::load(&path).unwrap();

        info.set_addr("db:3306");
        info.update("mysql-bin.000009", 77);
        info.close().unwrap();

        let table: toml::Table = fs::read_to_string(&path).unwrap().parse().unwrap();
        assert_eq!(table["addr"].as_str(), Some("db:3306"));
        assert_eq!(table["bin_name"].as_str(), Some("mysql-bin.000009"));
        assert_eq!(table["bin_pos"].as_integer(), Some(77));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn loads_files_written_by_older_tools() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        fs::write(
            &path,
            "addr = \"127.0.0.1:3306\"\nbin_name = \"mysql-bin.000003\"\nbin_pos = 4567\n",
        )
        .unwrap();

        let info = MasterInfo::load(&path).unwrap();
        assert_eq!(info.position(), Position::new("mysql-bin.000003", 4567));
        assert_eq!(info.addr(), "127.0.0.1:3306");
    }

    #[test]
    fn empty_file_is_zero_position() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        fs::write(&path, "\n").unwrap();

        assert_eq!(MasterInfo::load(&path).unwrap().position(), Position::default());
    }

    #[test]
    fn failed_save_leaves_no_temp_file() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        let info = MasterInfo::load(&path).unwrap();

        // a directory in the way makes the final rename fail
        fs::create_dir(&path).unwrap();
        info.update("mysql-bin.000001", 4);

        assert!(matches!(info.save(true), Err(CheckpointError::Io(_))));
        assert!(!temp_path(&path).exists());
        assert!(path.is_dir());
    }

    #[test]
    #[should_panic(expected = "Decode")]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new("master_info").unwrap();
        let path = dir.path().join("master.info");
        fs::write(&path, "bin_pos = \"not a number\"").unwrap();
        MasterInfo::load(&path).unwrap();
    }
}
