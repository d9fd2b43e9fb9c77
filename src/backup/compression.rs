use crate::error::{BackupError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const EXTENSION: &str = "zst";

const BUFFER_SIZE: usize = 64 * 1024;

pub fn compressed_path(source_path: &Path) -> PathBuf {
    let mut name = source_path.as_os_str().to_owned();
    name.push(".");
    name.push(EXTENSION);
    PathBuf::from(name)
}

/// Compresses `source_path` into a sibling `.zst` file and returns its path.
///
/// The source is removed only after the compressed file has been flushed and
/// synced, unless `keep_original` is set. On failure the partial output is
/// removed and the source is left untouched.
pub fn compress_file(source_path: &Path, level: i32, keep_original: bool) -> Result<PathBuf> {
    let dest_path = compressed_path(source_path);
    info!(
        "Compressing {} to {}",
        source_path.display(),
        dest_path.display()
    );

    if let Err(e) = write_compressed(source_path, &dest_path, level) {
        if dest_path.exists() {
            if let Err(rm) = fs::remove_file(&dest_path) {
                warn!(
                    "Failed to remove partial archive {}: {}",
                    dest_path.display(),
                    rm
                );
            }
        }
        return Err(e);
    }

    let source_size = fs::metadata(source_path).map(|m| m.len()).unwrap_or(0);
    let dest_size = fs::metadata(&dest_path)?.len();
    debug!(
        "Compression complete: {} -> {} bytes",
        source_size, dest_size
    );

    if !keep_original {
        remove_source(source_path);
    }

    Ok(dest_path)
}

/// The archive is already durable at this point, so a source that cannot be
/// removed is only worth a warning.
fn remove_source(source_path: &Path) -> bool {
    match fs::remove_file(source_path) {
        Ok(()) => {
            debug!("Removed {}", source_path.display());
            true
        }
        Err(e) => {
            warn!(
                "Compressed archive is complete but {} could not be removed: {}",
                source_path.display(),
                e
            );
            false
        }
    }
}

fn write_compressed(source_path: &Path, dest_path: &Path, level: i32) -> Result<()> {
    let source_file = File::open(source_path)?;
    let mut reader = BufReader::new(source_file);

    let dest_file = File::create(dest_path)?;
    let mut encoder = zstd::stream::Encoder::new(BufWriter::new(dest_file), level)
        .map_err(|e| BackupError::Compression(e.to_string()))?;

    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        encoder
            .write_all(&buffer[..bytes_read])
            .map_err(|e| BackupError::Compression(e.to_string()))?;
    }

    let writer = encoder
        .finish()
        .map_err(|e| BackupError::Compression(e.to_string()))?;
    let dest_file = writer
        .into_inner()
        .map_err(|e| BackupError::Compression(e.error().to_string()))?;
    dest_file.sync_all()?;

    Ok(())
}

pub fn calculate_sha256(file_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let file = File::open(file_path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
