//! Dual-backed artifact file handle.
//!
//! A GET is served from the memory tier when possible and from disk
//! otherwise; a PUT streams into a pending temp file and, when the artifact
//! is small enough, into a mirror buffer that becomes a memory-tier entry
//! once the upload publishes. The three backings differ enough in ownership
//! that they are a tagged sum type rather than trait objects.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::CacheError;
use crate::id::{AssetId, Variant};
use crate::mcache::{MemCache, MEM_LIMIT};
use crate::store::{ArtifactStore, TempFile};

pub enum ArtifactFile {
    /// Open artifact on disk; reads stream from the file.
    Disk {
        file: fs::File,
        path: PathBuf,
        size: u64,
    },
    /// Memory-tier hit; reads copy out of the shared buffer.
    Memory { data: Arc<[u8]>, pos: usize },
    /// In-flight upload: chunks land in the pending temp file and, when
    /// the artifact qualifies for the memory tier, in a mirror buffer.
    Teed {
        temp: TempFile,
        mirror: Option<Vec<u8>>,
        declared: u64,
        written: u64,
        dest: PathBuf,
        key: String,
    },
}

impl ArtifactFile {
    /// Opens an artifact for a GET: memory tier first, then disk.
    /// `None` means the variant is not cached.
    pub async fn open(
        store: &ArtifactStore,
        mcache: &MemCache,
        id: &AssetId,
        variant: Variant,
    ) -> io::Result<Option<ArtifactFile>> {
        if let Some(data) = mcache.get(&id.mem_key(variant)) {
            return Ok(Some(ArtifactFile::Memory { data, pos: 0 }));
        }
        let path = store.file_path(id, variant);
        match store.open_read(&path).await? {
            Some((file, size)) => Ok(Some(ArtifactFile::Disk { file, path, size })),
            None => Ok(None),
        }
    }

    /// Starts an upload of `declared` bytes. Artifacts below the memory
    /// limit get a mirror buffer when the tier is enabled; larger ones
    /// write straight to disk.
    pub async fn create(
        store: &ArtifactStore,
        mcache: &MemCache,
        id: &AssetId,
        variant: Variant,
        declared: u64,
    ) -> Result<ArtifactFile, CacheError> {
        let temp = store.begin_write().await?;
        let mirror = if mcache.enabled() && declared < MEM_LIMIT {
            Some(Vec::with_capacity(declared as usize))
        } else {
            None
        };
        Ok(ArtifactFile::Teed {
            temp,
            mirror,
            declared,
            written: 0,
            dest: store.file_path(id, variant),
            key: id.mem_key(variant),
        })
    }

    /// Payload size: the on-disk or buffered length for reads, bytes
    /// received so far for writes.
    pub fn size(&self) -> u64 {
        match self {
            ArtifactFile::Disk { size, .. } => *size,
            ArtifactFile::Memory { data, .. } => data.len() as u64,
            ArtifactFile::Teed { written, .. } => *written,
        }
    }

    /// Path of the disk backing, when there is one.
    pub fn name(&self) -> Option<&Path> {
        match self {
            ArtifactFile::Disk { path, .. } => Some(path),
            ArtifactFile::Memory { .. } => None,
            ArtifactFile::Teed { temp, .. } => Some(temp.path()),
        }
    }

    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ArtifactFile::Disk { file, .. } => file.read(buf).await,
            ArtifactFile::Memory { data, pos } => {
                let n = buf.len().min(data.len() - *pos);
                buf[..n].copy_from_slice(&data[*pos..*pos + n]);
                *pos += n;
                Ok(n)
            }
            ArtifactFile::Teed { .. } => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "upload handle is write-only",
            )),
        }
    }

    pub async fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            ArtifactFile::Teed {
                temp,
                mirror,
                written,
                ..
            } => {
                if let Some(buf) = mirror {
                    buf.extend_from_slice(chunk);
                }
                temp.write_all(chunk).await?;
                *written += chunk.len() as u64;
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "download handle is read-only",
            )),
        }
    }

    /// Completes an upload: publishes the temp file at its destination,
    /// then offers the mirror buffer to the memory tier. Admission requires
    /// the buffered length to match both the declared size and the size of
    /// the file just published; on any mismatch the buffer is discarded and
    /// the on-disk artifact stays authoritative.
    pub async fn finish(self, store: &ArtifactStore, mcache: &MemCache) -> Result<(), CacheError> {
        let ArtifactFile::Teed {
            temp,
            mirror,
            declared,
            written,
            dest,
            key,
        } = self
        else {
            return Ok(());
        };

        if written != declared {
            temp.abort().await;
            return Err(CacheError::SizeMismatch {
                declared,
                received: written,
            });
        }
        store.commit(temp, &dest).await?;

        match mirror {
            Some(buf) => {
                let on_disk = fs::metadata(&dest).await.map(|m| m.len()).ok();
                if buf.len() as u64 == declared && on_disk == Some(declared) {
                    mcache.put(key, Arc::from(buf));
                } else {
                    debug_assert_eq!(
                        Some(buf.len() as u64),
                        on_disk,
                        "tee mirror diverged from published artifact"
                    );
                    debug!(key = %key, buffered = buf.len(), ?on_disk, "mirror discarded");
                    mcache.remove(&key);
                }
            }
            // A non-mirrored overwrite still invalidates any older entry
            // under the same key.
            None => mcache.remove(&key),
        }
        Ok(())
    }

    /// Abandons an upload, unlinking its temp file. No-op for read handles.
    pub async fn abort(self) {
        if let ArtifactFile::Teed { temp, .. } = self {
            temp.abort().await;
        }
    }
}
