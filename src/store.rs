//! On-disk artifact store: content-addressed paths and atomic publication.

use std::io;
use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::CacheError;
use crate::id::{AssetId, Variant};

/// Work area for in-flight uploads, directly under the store root.
pub const TEMP_DIR: &str = "temp";

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o700;
const TEMP_NAME_BYTES: usize = 32;

/// Maps `(guid, hash, variant)` to file paths under a root directory and
/// publishes uploads via temp file plus atomic rename. Readers of a
/// destination path see either the whole previous artifact or the whole
/// new one, never a partial file.
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> ArtifactStore {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final path of an artifact: `<root>/<shard>/<guid>-<hash>.<ext>`.
    pub fn file_path(&self, id: &AssetId, variant: Variant) -> PathBuf {
        self.root.join(id.shard()).join(id.file_name(variant))
    }

    /// Opens an existing artifact for reading, reporting its size.
    /// A missing file is a miss, not an error.
    pub async fn open_read(&self, path: &Path) -> io::Result<Option<(File, u64)>> {
        match File::open(path).await {
            Ok(file) => {
                let size = file.metadata().await?.len();
                Ok(Some((file, size)))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Creates a temp file under `<root>/temp/` named with 32 random bytes
    /// rendered as 64 hex characters. The directory is created lazily.
    pub async fn begin_write(&self) -> Result<TempFile, CacheError> {
        let dir = self.root.join(TEMP_DIR);
        create_dir_private(&dir).await?;

        let mut raw = [0u8; TEMP_NAME_BYTES];
        OsRng.fill_bytes(&mut raw);
        let path = dir.join(hex::encode(raw));

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(FILE_MODE);
        let file = options.open(&path).await?;

        Ok(TempFile {
            file: Some(file),
            path,
            resolved: false,
        })
    }

    /// Publishes a completed temp file at its destination. The rename is
    /// atomic within one file system, so a successful commit replaces any
    /// prior artifact wholesale.
    pub async fn commit(&self, mut temp: TempFile, dest: &Path) -> Result<(), CacheError> {
        if let Some(parent) = dest.parent() {
            create_dir_private(parent).await?;
        }
        if let Some(mut file) = temp.file.take() {
            file.flush().await?;
        }
        fs::rename(&temp.path, dest).await?;
        temp.resolved = true;
        Ok(())
    }
}

async fn create_dir_private(dir: &Path) -> io::Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await
}

/// An in-flight upload. Until `ArtifactStore::commit` renames it into
/// place, the destination path is untouched; aborting (or dropping the
/// handle mid-transfer) unlinks the temp file.
pub struct TempFile {
    file: Option<File>,
    path: PathBuf,
    resolved: bool,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(chunk).await,
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "temp file already closed",
            )),
        }
    }

    /// Closes and unlinks the temp file, leaving the destination untouched.
    pub async fn abort(mut self) {
        self.file.take();
        let _ = fs::remove_file(&self.path).await;
        self.resolved = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        // Covers error paths and task cancellation mid-transfer.
        if !self.resolved {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
