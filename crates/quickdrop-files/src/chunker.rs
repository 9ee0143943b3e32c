//! Chunked reads of outgoing files.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::{DEFAULT_CHUNK_SIZE, FileError, Result};

/// An outgoing file read in fixed-size chunks
pub struct FileSource {
    path: PathBuf,
    name: String,
    file: File,
    size: u64,
    offset: u64,
    chunk_size: usize,
}

impl FileSource {
    /// Open a file with the default chunk size
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or stat'ed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_chunk_size(path, DEFAULT_CHUNK_SIZE).await
    }

    /// Open a file with a custom chunk size
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or stat'ed, or the path has no
    /// file name.
    pub async fn with_chunk_size(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileError::NoFileName(path.display().to_string()))?;
        let file = File::open(&path).await?;
        let size = file.metadata().await?.len();
        Ok(Self {
            path,
            name,
            file,
            size,
            offset: 0,
            chunk_size: chunk_size.max(1),
        })
    }

    /// Source path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name (last path component)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size at open time
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Offset of the next chunk
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Chunk size
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of data chunks for the file
    pub fn chunk_count(&self) -> u64 {
        self.size.div_ceil(self.chunk_size as u64)
    }

    /// Read the next chunk; `None` at end of file.
    ///
    /// A chunk is only short at the end of the file.
    ///
    /// # Errors
    ///
    /// Returns an error on read failure.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        self.offset += filled as u64;
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_chunking() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&vec![7u8; 2500]).unwrap();
        temp.flush().unwrap();

        let mut source = FileSource::with_chunk_size(temp.path(), 1024).await.unwrap();
        assert_eq!(source.size(), 2500);
        assert_eq!(source.chunk_count(), 3);

        let mut sizes = Vec::new();
        while let Some(chunk) = source.next_chunk().await.unwrap() {
            sizes.push(chunk.len());
        }
        assert_eq!(sizes, vec![1024, 1024, 452]);
        assert_eq!(source.offset(), 2500);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let temp = NamedTempFile::new().unwrap();
        let mut source = FileSource::open(temp.path()).await.unwrap();
        assert_eq!(source.chunk_count(), 0);
        assert!(source.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(matches!(
            FileSource::open("/nonexistent/quickdrop/file").await,
            Err(FileError::Io(_))
        ));
    }

    #[test]
    fn test_default_chunk_size() {
        assert_eq!(DEFAULT_CHUNK_SIZE, 512 * 1024);
    }
}
