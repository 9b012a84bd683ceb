//! Table Metadata
//!
//! The small descriptor that is enough to reconstruct a table on load.
//!
//! ## File Format
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬──────────────────┐
//! │Magic (4) │Version(2)│ CRC (4)  │ Len (4)  │ bincode payload  │
//! └──────────┴──────────┴──────────┴──────────┴──────────────────┘
//! ```
//! The CRC covers the payload only. The file is replaced by writing a
//! sibling `.tmp` file and renaming it over the old one.

use std::fs;
use std::io::Write;
use std::path::Path;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::error::{IoContext, Result, StoreError};
use crate::schema::Schema;

/// Magic bytes identifying a runstore metadata file
const MAGIC: &[u8; 4] = b"RSTM";

/// Current metadata format version
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2) + CRC (4) + Len (4) = 14 bytes
const HEADER_SIZE: usize = 14;

/// Persisted table descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    pub schema: Schema,
    /// Rows inserted so far, buffered or merged
    pub total_row_count: u64,
    /// Threshold the table was created with; fixes how many rows are buffered
    pub flush_threshold: u64,
}

impl TableMetadata {
    /// Encode header + payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.put_slice(MAGIC);
        bytes.put_u16_le(VERSION);
        bytes.put_u32_le(crc32fast::hash(&payload));
        bytes.put_u32_le(payload.len() as u32);
        bytes.put_slice(&payload);
        Ok(bytes)
    }

    /// Decode and verify header + payload
    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::Corruption(format!(
                "metadata is {} bytes, shorter than its header",
                bytes.len()
            )));
        }

        if &bytes[0..4] != MAGIC {
            return Err(StoreError::Corruption(format!(
                "invalid metadata magic: expected RSTM, got {:?}",
                &bytes[0..4]
            )));
        }
        bytes.advance(4);

        let version = bytes.get_u16_le();
        if version != VERSION {
            return Err(StoreError::Corruption(format!(
                "unsupported metadata version: {}",
                version
            )));
        }

        let crc = bytes.get_u32_le();
        let len = bytes.get_u32_le() as usize;
        if bytes.len() != len {
            return Err(StoreError::Corruption(format!(
                "metadata payload is {} bytes, header says {}",
                bytes.len(),
                len
            )));
        }
        if crc32fast::hash(bytes) != crc {
            return Err(StoreError::Corruption(
                "metadata checksum mismatch".to_string(),
            ));
        }

        let decoded: TableMetadata = bincode::deserialize(bytes)?;

        // Deserialization skips the schema constructor; run its checks again
        let schema = Schema::new(
            decoded
                .schema
                .fields()
                .iter()
                .map(|f| (f.name.clone(), f.datum_type)),
        )?;
        if schema != decoded.schema {
            return Err(StoreError::Corruption(
                "metadata schema row width is inconsistent".to_string(),
            ));
        }
        if decoded.flush_threshold == 0 {
            return Err(StoreError::Corruption(
                "metadata flush threshold is zero".to_string(),
            ));
        }

        Ok(decoded)
    }

    /// Atomically replace the descriptor at `path`
    pub fn store(&self, path: &Path, sync: bool) -> Result<()> {
        let bytes = self.encode()?;
        let tmp_path = path.with_extension("tmp");

        {
            let mut file = fs::File::create(&tmp_path).with_file("create", &tmp_path)?;
            file.write_all(&bytes).with_file("write", &tmp_path)?;
            if sync {
                file.sync_all().with_file("sync", &tmp_path)?;
            }
        }

        fs::rename(&tmp_path, path).with_file("rename", &tmp_path)?;
        Ok(())
    }

    /// Read the descriptor at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_file("read", path)?;
        Self::decode(&bytes)
    }
}
