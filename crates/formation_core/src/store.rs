//! File-backed snapshot store
//!
//! On-disk format: MessagePack (named fields) → LZ4 (size prepended) →
//! SHA-256 checksum appended. Writes go to a temp file that is renamed into
//! place, so a crash never leaves a half-written snapshot behind.

use chrono::{DateTime, Utc};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use rmp_serde::{from_slice, to_vec_named};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::collaborators::SnapshotStore;
use crate::error::{FormationError, Result};
use crate::model::{Formation, FormationId};

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSnapshot {
    version: u32,
    saved_at: DateTime<Utc>,
    formation: Formation,
}

pub fn encode_snapshot(formation: &Formation) -> Result<Vec<u8>> {
    let stored = StoredSnapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now(),
        formation: formation.clone(),
    };
    let msgpack = to_vec_named(&stored).map_err(|e| FormationError::Serialization(e.to_string()))?;
    let mut bytes = compress_prepend_size(&msgpack);
    let checksum = Sha256::digest(&bytes);
    bytes.extend_from_slice(&checksum);
    Ok(bytes)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Formation> {
    // size header + checksum
    if bytes.len() < 4 + CHECKSUM_LEN {
        return Err(FormationError::Storage("snapshot truncated".to_string()));
    }
    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(FormationError::Storage("snapshot checksum mismatch".to_string()));
    }
    let msgpack = decompress_size_prepended(payload)
        .map_err(|e| FormationError::Storage(format!("snapshot decompression failed: {}", e)))?;
    let stored: StoredSnapshot =
        from_slice(&msgpack).map_err(|e| FormationError::Serialization(e.to_string()))?;
    if stored.version > SNAPSHOT_VERSION {
        return Err(FormationError::Storage(format!(
            "snapshot version {} is newer than supported {}",
            stored.version, SNAPSHOT_VERSION
        )));
    }
    Ok(stored.formation)
}

/// One file per formation under `root`.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: FormationId) -> PathBuf {
        self.root.join(format!("{}.formation", id))
    }

    pub fn exists(&self, id: FormationId) -> bool {
        self.path_for(id).exists()
    }

    pub fn delete(&self, id: FormationId) -> Result<()> {
        let path = self.path_for(id);
        if path.exists() {
            fs::remove_file(&path).map_err(io_error)?;
        }
        Ok(())
    }
}

fn io_error(err: std::io::Error) -> FormationError {
    FormationError::Storage(err.to_string())
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self, id: FormationId) -> Result<Formation> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(FormationError::NotFound(format!("snapshot {}", path.display())));
        }
        let mut data = Vec::new();
        File::open(&path).and_then(|mut f| f.read_to_end(&mut data)).map_err(io_error)?;
        let formation = decode_snapshot(&data)?;
        debug!(bytes = data.len(), path = %path.display(), "snapshot loaded");
        Ok(formation)
    }

    fn save(&self, formation: &Formation) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(io_error)?;
        let data = encode_snapshot(formation)?;
        let path = self.path_for(formation.id);
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path).map_err(io_error)?;
            file.write_all(&data).map_err(io_error)?;
            file.flush().map_err(io_error)?;
            file.sync_all().map_err(io_error)?;
        }
        fs::rename(&temp_path, &path).map_err(io_error)?;
        debug!(bytes = data.len(), revision = formation.revision, path = %path.display(), "snapshot saved");
        Ok(())
    }
}
