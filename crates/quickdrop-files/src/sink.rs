//! Destination files for incoming payloads.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::{FileError, Result};

/// An incoming file: declared size, destination and write progress
#[derive(Debug)]
pub struct IncomingFile {
    payload_id: i64,
    name: String,
    path: PathBuf,
    declared_size: u64,
    bytes_written: u64,
    file: Option<File>,
    created: bool,
}

impl IncomingFile {
    /// Describe a pending file. Nothing touches the disk until [`create`](Self::create).
    #[must_use]
    pub fn new(
        payload_id: i64,
        name: impl Into<String>,
        path: PathBuf,
        declared_size: u64,
    ) -> Self {
        Self {
            payload_id,
            name: name.into(),
            path,
            declared_size,
            bytes_written: 0,
            file: None,
            created: false,
        }
    }

    /// Payload ID carrying this file
    pub fn payload_id(&self) -> i64 {
        self.payload_id
    }

    /// Name announced by the sender
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size announced by the sender
    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Bytes appended so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Whether the destination was created on disk
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether the file is still open for writing
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Create the destination. Fails if the path already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub async fn create(&mut self) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await?;
        self.file = Some(file);
        self.created = true;
        Ok(())
    }

    /// Append a chunk that must start at `offset == bytes_written` and must not grow
    /// the file past its declared size.
    ///
    /// # Errors
    ///
    /// Returns [`FileError::OffsetMismatch`], [`FileError::SizeExceeded`],
    /// [`FileError::NotCreated`] or an I/O error.
    pub async fn append(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        if offset != self.bytes_written {
            return Err(FileError::OffsetMismatch {
                expected: self.bytes_written,
                actual: offset,
            });
        }
        let attempted = self.bytes_written + data.len() as u64;
        if attempted > self.declared_size {
            return Err(FileError::SizeExceeded {
                declared: self.declared_size,
                attempted,
            });
        }
        let file = self.file.as_mut().ok_or(FileError::NotCreated)?;
        file.write_all(data).await?;
        self.bytes_written = attempted;
        Ok(())
    }

    /// Flush and close. The file stays on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub async fn finish(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }

    /// Whether every declared byte arrived and the file was closed
    pub fn is_complete(&self) -> bool {
        self.created && self.file.is_none() && self.bytes_written == self.declared_size
    }

    /// Close and delete a created file that did not complete. Failures are logged.
    pub async fn discard(&mut self) {
        self.file = None;
        if !self.created {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Removed incomplete file");
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove incomplete file");
            }
        }
        self.created = false;
    }
}
