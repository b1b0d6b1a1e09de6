//! Binary storage for embedding matrices.
//!
//! Used for both `embeddings.bin` and `index.bin`; the `kind` byte tells
//! them apart so one can never be loaded in place of the other.
//!
//! Header (48 bytes):
//! - version: u8 (1)
//! - kind: u8 (0 = embeddings, 1 = flat inner-product index)
//! - model_id: [u8; 32] (SHA256 hash of model name)
//! - dimensions: u16 (little-endian)
//! - row_count: u64 (little-endian)
//! - checksum: u32 (CRC32 of header fields before checksum)
//!
//! Payload:
//! - rows: [f32; dimensions] * row_count (little-endian, catalog order)
//! - payload_checksum: u32 (CRC32 of the row bytes)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::semantic::index::{EmbeddingStore, IndexError};

/// Current file format version
const FORMAT_VERSION: u8 = 1;

/// Header size in bytes: version(1) + kind(1) + model_id(32) + dimensions(2) + row_count(8) + checksum(4)
const HEADER_SIZE: usize = 48;

/// What a vector file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorFileKind {
    Embeddings,
    FlatIndex,
}

impl VectorFileKind {
    fn tag(self) -> u8 {
        match self {
            VectorFileKind::Embeddings => 0,
            VectorFileKind::FlatIndex => 1,
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum VectorStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("Kind mismatch: expected {expected:?}, file has tag {got}")]
    KindMismatch { expected: VectorFileKind, got: u8 },

    #[error("Model mismatch: file uses different model")]
    ModelMismatch,

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Row count mismatch: expected {expected}, file has {got}")]
    RowCountMismatch { expected: usize, got: usize },

    #[error("Matrix error: {0}")]
    Matrix(#[from] IndexError),
}

/// Storage manager for one vector file.
pub struct VectorStorage {
    path: PathBuf,
    kind: VectorFileKind,
}

impl VectorStorage {
    /// Create a new storage manager for the given path.
    pub fn new(path: PathBuf, kind: VectorFileKind) -> Self {
        Self { path, kind }
    }

    /// Get the storage file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the matrix from storage.
    ///
    /// # Arguments
    /// * `expected_model_id` - SHA256 hash of the expected model name
    /// * `expected_rows` - Number of rows the caller needs
    pub fn load(
        &self,
        expected_model_id: &[u8; 32],
        expected_rows: usize,
    ) -> Result<EmbeddingStore, VectorStorageError> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);

        let header = self.read_header(&mut reader)?;
        self.validate_header(&header, expected_model_id, expected_rows)?;

        let value_count = (header.row_count as usize)
            .checked_mul(header.dimensions as usize)
            .ok_or_else(|| VectorStorageError::InvalidFormat("matrix size overflows".to_string()))?;

        let mut payload = vec![0u8; value_count * 4];
        reader.read_exact(&mut payload)?;

        let mut checksum_bytes = [0u8; 4];
        reader.read_exact(&mut checksum_bytes)?;
        if u32::from_le_bytes(checksum_bytes) != crc32fast::hash(&payload) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut trailing = [0u8; 1];
        if reader.read(&mut trailing)? != 0 {
            return Err(VectorStorageError::InvalidFormat(
                "unexpected data after payload".to_string(),
            ));
        }

        let values: Vec<f32> = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(EmbeddingStore::from_flat(header.dimensions as usize, values)?)
    }

    /// Save the matrix to storage.
    ///
    /// Uses atomic write: temp file -> fsync -> rename
    pub fn save(
        &self,
        store: &EmbeddingStore,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        if store.dimensions() > u16::MAX as usize {
            return Err(VectorStorageError::InvalidFormat(format!(
                "{} dimensions do not fit the header",
                store.dimensions()
            )));
        }

        let temp_path = self.path.with_extension("tmp");

        let result = self.write_to_file(&temp_path, store, model_id);

        if result.is_err() {
            // Clean up temp file on error
            let _ = std::fs::remove_file(&temp_path);
            return result;
        }

        std::fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Delete the storage file if it exists.
    pub fn delete(&self) -> Result<(), VectorStorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn write_to_file(
        &self,
        path: &Path,
        store: &EmbeddingStore,
        model_id: &[u8; 32],
    ) -> Result<(), VectorStorageError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let header = Header {
            version: FORMAT_VERSION,
            kind: self.kind.tag(),
            model_id: *model_id,
            dimensions: store.dimensions() as u16,
            row_count: store.len() as u64,
        };
        self.write_header(&mut writer, &header)?;

        let mut hasher = crc32fast::Hasher::new();
        for &value in store.as_flat() {
            let bytes = value.to_le_bytes();
            hasher.update(&bytes);
            writer.write_all(&bytes)?;
        }
        writer.write_all(&hasher.finalize().to_le_bytes())?;

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        file.sync_all()?;

        Ok(())
    }

    fn read_header(&self, reader: &mut BufReader<File>) -> Result<Header, VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;

        let version = header_bytes[0];
        if version != FORMAT_VERSION {
            return Err(VectorStorageError::VersionMismatch(version, FORMAT_VERSION));
        }

        // Verify checksum (computed over header without checksum field)
        let stored_checksum = u32::from_le_bytes([
            header_bytes[44],
            header_bytes[45],
            header_bytes[46],
            header_bytes[47],
        ]);
        if stored_checksum != Self::compute_checksum(&header_bytes[0..44]) {
            return Err(VectorStorageError::ChecksumMismatch);
        }

        let mut model_id = [0u8; 32];
        model_id.copy_from_slice(&header_bytes[2..34]);

        let dimensions = u16::from_le_bytes([header_bytes[34], header_bytes[35]]);
        let mut row_count_bytes = [0u8; 8];
        row_count_bytes.copy_from_slice(&header_bytes[36..44]);

        Ok(Header {
            version,
            kind: header_bytes[1],
            model_id,
            dimensions,
            row_count: u64::from_le_bytes(row_count_bytes),
        })
    }

    fn validate_header(
        &self,
        header: &Header,
        expected_model_id: &[u8; 32],
        expected_rows: usize,
    ) -> Result<(), VectorStorageError> {
        if header.kind != self.kind.tag() {
            return Err(VectorStorageError::KindMismatch {
                expected: self.kind,
                got: header.kind,
            });
        }

        if header.model_id != *expected_model_id {
            return Err(VectorStorageError::ModelMismatch);
        }

        if header.row_count != expected_rows as u64 {
            return Err(VectorStorageError::RowCountMismatch {
                expected: expected_rows,
                got: header.row_count as usize,
            });
        }

        Ok(())
    }

    fn write_header(
        &self,
        writer: &mut BufWriter<File>,
        header: &Header,
    ) -> Result<(), VectorStorageError> {
        let mut header_bytes = [0u8; HEADER_SIZE];

        header_bytes[0] = header.version;
        header_bytes[1] = header.kind;
        header_bytes[2..34].copy_from_slice(&header.model_id);
        header_bytes[34..36].copy_from_slice(&header.dimensions.to_le_bytes());
        header_bytes[36..44].copy_from_slice(&header.row_count.to_le_bytes());

        let checksum = Self::compute_checksum(&header_bytes[0..44]);
        header_bytes[44..48].copy_from_slice(&checksum.to_le_bytes());

        writer.write_all(&header_bytes)?;
        Ok(())
    }

    /// Compute CRC32 checksum of data.
    fn compute_checksum(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

/// File header structure.
#[derive(Debug)]
struct Header {
    version: u8,
    kind: u8,
    model_id: [u8; 32],
    dimensions: u16,
    row_count: u64,
}
