use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// A log file that rolls over once it reaches `max_bytes`.
///
/// Backups are named `<file>.1` (newest) through `<file>.<max_backups>` (oldest).
/// The oldest backup is dropped on rotation. With `max_backups == 0` the file is
/// truncated in place instead.
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    file: File,
    written: u64,
}

impl RotatingFile {
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64, max_backups: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            max_backups,
            file,
            written,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{}", index));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.max_backups == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.written = 0;
            return Ok(());
        }

        let oldest = self.backup_path(self.max_backups);
        if oldest.exists() {
            fs::remove_file(&oldest)?;
        }
        for index in (1..self.max_backups).rev() {
            let src = self.backup_path(index);
            if src.exists() {
                fs::rename(&src, self.backup_path(index + 1))?;
            }
        }
        fs::rename(&self.path, self.backup_path(1))?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Deletes rotated siblings of `log_path` (`<file>.1`, `<file>.2`, ...) whose
/// modification time is older than `max_age`. The active file and unrelated files in
/// the same directory are left alone.
///
/// Returns the number of files removed. A missing directory removes nothing.
pub fn prune_old_logs(log_path: &Path, max_age: Duration) -> io::Result<usize> {
    let (Some(dir), Some(name)) = (log_path.parent(), log_path.file_name()) else {
        return Ok(0);
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    if !dir.is_dir() {
        return Ok(0);
    }
    let prefix = format!("{}.", name.to_string_lossy());
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(&prefix) {
            continue;
        }
        let metadata = entry.metadata()?;
        if metadata.is_file() && metadata.modified()? < cutoff {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
