//! Data source handling: memory buffers, direct files, and temp copies.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collection::Backend;
use crate::config::Config;
use crate::pool::FileHandlePool;
use crate::{Error, Result};

/// A temp copy of the source file; removed on drop when this process
/// created it. Reused copies are left for the next process.
struct TempCopy {
    path: PathBuf,
    created: bool,
}

impl Drop for TempCopy {
    fn drop(&mut self) {
        if self.created {
            if let Err(err) = std::fs::remove_file(&self.path) {
                log::warn!("failed to remove temp copy {}: {err}", self.path.display());
            }
        }
    }
}

enum SourceKind {
    Memory(Arc<[u8]>),
    File {
        pool: Arc<FileHandlePool>,
        size: u64,
        _temp: Option<TempCopy>,
    },
}

/// Where the data set's bytes live for the lifetime of the data set.
///
/// Owns the backing memory, the pooled handles and any temp copy; dropping
/// the source releases all three.
pub struct DataSource {
    kind: SourceKind,
}

impl DataSource {
    /// Wraps caller-supplied bytes. Ownership of the buffer is the only
    /// "free" contract: drop the data set and the buffer goes with it.
    pub fn memory(bytes: impl Into<Arc<[u8]>>) -> DataSource {
        DataSource {
            kind: SourceKind::Memory(bytes.into()),
        }
    }

    /// Opens `path` per the configuration: fully into RAM, through a temp
    /// copy, or in place behind a handle pool.
    pub fn open(path: &Path, config: &Config) -> Result<DataSource> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::from_io_for_path(e, path))?;
        let size = metadata.len();
        if size > u64::from(u32::MAX) {
            return Err(Error::FileTooLarge(size));
        }

        if config.all_in_memory {
            let bytes = std::fs::read(path).map_err(|e| Error::from_io_for_path(e, path))?;
            log::debug!("loaded {} ({size} bytes) fully into memory", path.display());
            return Ok(DataSource::memory(bytes));
        }

        let (open_path, temp) = if config.use_temp_file {
            let copy = make_temp_copy(path, size, config)?;
            (copy.path.clone(), Some(copy))
        } else {
            (path.to_path_buf(), None)
        };

        let pool = Arc::new(FileHandlePool::open(&open_path, config.file_handles)?);
        Ok(DataSource {
            kind: SourceKind::File {
                pool,
                size,
                _temp: temp,
            },
        })
    }

    pub fn backend(&self) -> Backend {
        match &self.kind {
            SourceKind::Memory(data) => Backend::Memory(data.clone()),
            SourceKind::File { pool, size, .. } => Backend::File {
                pool: pool.clone(),
                file_size: *size,
            },
        }
    }

    pub fn size(&self) -> u64 {
        match &self.kind {
            SourceKind::Memory(data) => data.len() as u64,
            SourceKind::File { size, .. } => *size,
        }
    }

    pub fn is_memory(&self) -> bool {
        matches!(self.kind, SourceKind::Memory(_))
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SourceKind::Memory(data) => write!(f, "DataSource(memory, {} bytes)", data.len()),
            SourceKind::File { size, pool, .. } => write!(
                f,
                "DataSource(file {}, {size} bytes)",
                pool.path().display()
            ),
        }
    }
}

fn candidate_dirs(config: &Config) -> Vec<PathBuf> {
    if config.temp_dirs.is_empty() {
        vec![std::env::temp_dir()]
    } else {
        config.temp_dirs.clone()
    }
}

fn make_temp_copy(master: &Path, master_size: u64, config: &Config) -> Result<TempCopy> {
    let stem = master
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::TempFileError(format!("unusable file name: {}", master.display())))?;
    let dirs = candidate_dirs(config);

    if config.reuse_temp_file {
        for dir in &dirs {
            if let Some(existing) = find_existing_copy(dir, stem, master, master_size)? {
                log::debug!("reusing temp copy {}", existing.display());
                return Ok(TempCopy {
                    path: existing,
                    created: false,
                });
            }
        }
    }

    for dir in &dirs {
        let target = dir.join(format!("{stem}-{:08x}.tmp", rand::random::<u32>()));
        if target.exists() {
            return Err(Error::FileExists(target));
        }
        match std::fs::copy(master, &target) {
            Ok(_) => {
                log::debug!("copied {} to temp {}", master.display(), target.display());
                return Ok(TempCopy {
                    path: target,
                    created: true,
                });
            }
            Err(err) => {
                log::debug!("cannot copy into {}: {err}", dir.display());
                std::fs::remove_file(&target).ok();
            }
        }
    }
    Err(Error::FileCopyError(master.to_path_buf()))
}

/// Scans `dir` for a file carrying the master's stem whose content is an
/// exact copy of the master.
fn find_existing_copy(
    dir: &Path,
    stem: &str,
    master: &Path,
    master_size: u64,
) -> Result<Option<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(None),
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(stem) || path == master {
            continue;
        }
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.len() != master_size {
            continue;
        }
        if same_content(master, &path)? {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Full content comparison; the size fast-path has already run.
fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let mut file_a = File::open(a).map_err(|e| Error::from_io_for_path(e, a))?;
    let mut file_b = File::open(b).map_err(|e| Error::from_io_for_path(e, b))?;
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let read_a = file_a.read(&mut buf_a).map_err(Error::FileReadError)?;
        let read_b = file_b.read(&mut buf_b).map_err(Error::FileReadError)?;
        if read_a != read_b {
            return Ok(false);
        }
        if read_a == 0 {
            return Ok(true);
        }
        if buf_a[..read_a] != buf_b[..read_b] {
            return Ok(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_workspace() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "ipintel-source-{}-{}",
            std::process::id(),
            rand::random::<u32>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_master(dir: &Path, bytes: &[u8]) -> PathBuf {
        let path = dir.join("master.dat");
        let mut file = File::create(&path).unwrap();
        file.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn temp_copy_created_and_removed() {
        let dir = temp_workspace();
        let master = write_master(&dir, b"data-file-bytes");
        let config = Config {
            use_temp_file: true,
            temp_dirs: vec![dir.clone()],
            ..Config::low_memory()
        };

        let source = DataSource::open(&master, &config).unwrap();
        let copies: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert_eq!(copies.len(), 1);

        drop(source);
        let copies = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(copies, 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reuse_finds_exact_copy_only() {
        let dir = temp_workspace();
        let master = write_master(&dir, b"identical-content");

        // A stale copy with different bytes must not be reused.
        std::fs::write(dir.join("master-stale.tmp"), b"different-content").unwrap();
        // An exact copy is reused.
        std::fs::write(dir.join("master-good.tmp"), b"identical-content").unwrap();

        let config = Config {
            use_temp_file: true,
            reuse_temp_file: true,
            temp_dirs: vec![dir.clone()],
            ..Config::low_memory()
        };
        let source = DataSource::open(&master, &config).unwrap();
        drop(source);

        // The reused copy survives drop: this process did not create it.
        assert!(dir.join("master-good.tmp").exists());
        // No additional copy was made.
        let tmp_count = std::fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(tmp_count, 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_file_reports_not_found() {
        let err = DataSource::open(Path::new("/nonexistent/ipintel.dat"), &Config::low_memory())
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn memory_source_reports_size() {
        let source = DataSource::memory(vec![0u8; 64]);
        assert!(source.is_memory());
        assert_eq!(source.size(), 64);
    }
}
