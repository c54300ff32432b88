//! Journal record types and their wire encoding (spec §4.5, §6).
//!
//! Layout: `total_length:i32 ‖ kind:u8 ‖ lsn:i64 ‖ txn_id:16 bytes (UUID) ‖
//! body ‖ crc32:i32` over everything preceding the checksum.

use uuid::Uuid;

use crate::common::{Error, PageId, Result};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    TxnBegin = 1,
    PagePreimage = 2,
    PagePostimage = 3,
    Savepoint = 4,
    TxnCommit = 5,
    TxnAbort = 6,
    Checkpoint = 7,
}

impl RecordKind {
    fn from_u8(v: u8) -> Result<Self> {
        Ok(match v {
            1 => Self::TxnBegin,
            2 => Self::PagePreimage,
            3 => Self::PagePostimage,
            4 => Self::Savepoint,
            5 => Self::TxnCommit,
            6 => Self::TxnAbort,
            7 => Self::Checkpoint,
            other => return Err(Error::malformed(format!("unknown journal record kind {other}"))),
        })
    }
}

/// One record in the write-ahead log (spec §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum JournalRecord {
    TxnBegin { txn_id: Uuid, start_ts: u64 },
    PagePreimage { txn_id: Uuid, page_id: PageId, before_bytes: Vec<u8> },
    PagePostimage { txn_id: Uuid, page_id: PageId, after_bytes: Vec<u8> },
    Savepoint { txn_id: Uuid, savepoint_id: u64, op_index: u64 },
    TxnCommit { txn_id: Uuid, commit_ts: u64 },
    TxnAbort { txn_id: Uuid },
    Checkpoint { applied_lsn: u64 },
}

impl JournalRecord {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::TxnBegin { .. } => RecordKind::TxnBegin,
            Self::PagePreimage { .. } => RecordKind::PagePreimage,
            Self::PagePostimage { .. } => RecordKind::PagePostimage,
            Self::Savepoint { .. } => RecordKind::Savepoint,
            Self::TxnCommit { .. } => RecordKind::TxnCommit,
            Self::TxnAbort { .. } => RecordKind::TxnAbort,
            Self::Checkpoint { .. } => RecordKind::Checkpoint,
        }
    }

    pub fn txn_id(&self) -> Uuid {
        match self {
            Self::TxnBegin { txn_id, .. }
            | Self::PagePreimage { txn_id, .. }
            | Self::PagePostimage { txn_id, .. }
            | Self::Savepoint { txn_id, .. }
            | Self::TxnCommit { txn_id, .. }
            | Self::TxnAbort { txn_id } => *txn_id,
            Self::Checkpoint { .. } => Uuid::nil(),
        }
    }

    fn encode_body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match self {
            Self::TxnBegin { start_ts, .. } => body.extend_from_slice(&start_ts.to_le_bytes()),
            Self::PagePreimage { page_id, before_bytes, .. } => {
                body.extend_from_slice(&page_id.0.to_le_bytes());
                body.extend_from_slice(&(before_bytes.len() as u32).to_le_bytes());
                body.extend_from_slice(before_bytes);
            }
            Self::PagePostimage { page_id, after_bytes, .. } => {
                body.extend_from_slice(&page_id.0.to_le_bytes());
                body.extend_from_slice(&(after_bytes.len() as u32).to_le_bytes());
                body.extend_from_slice(after_bytes);
            }
            Self::Savepoint { savepoint_id, op_index, .. } => {
                body.extend_from_slice(&savepoint_id.to_le_bytes());
                body.extend_from_slice(&op_index.to_le_bytes());
            }
            Self::TxnCommit { commit_ts, .. } => body.extend_from_slice(&commit_ts.to_le_bytes()),
            Self::TxnAbort { .. } => {}
            Self::Checkpoint { applied_lsn } => body.extend_from_slice(&applied_lsn.to_le_bytes()),
        }
        body
    }

    /// Encode this record with the given LSN, including the trailing CRC.
    pub fn encode(&self, lsn: u64) -> Vec<u8> {
        let body = self.encode_body();
        let total_len = 4 + 1 + 8 + 16 + body.len() + 4;

        let mut out = Vec::with_capacity(total_len);
        out.extend_from_slice(&(total_len as i32).to_le_bytes());
        out.push(self.kind() as u8);
        out.extend_from_slice(&lsn.to_le_bytes());
        out.extend_from_slice(self.txn_id().as_bytes());
        out.extend_from_slice(&body);

        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }

    /// Decode one record starting at `data[0]`. Returns the record, its
    /// LSN, and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, u64, usize)> {
        if data.len() < 29 {
            return Err(Error::corrupt("journal record shorter than minimum frame"));
        }

        let total_len = i32::from_le_bytes(data[0..4].try_into().unwrap());
        if total_len < 29 || total_len as usize > data.len() {
            return Err(Error::corrupt(format!("invalid journal record length {total_len}")));
        }
        let total_len = total_len as usize;

        let crc_offset = total_len - 4;
        let stored_crc = u32::from_le_bytes(data[crc_offset..total_len].try_into().unwrap());
        let computed_crc = crc32fast::hash(&data[..crc_offset]);
        if stored_crc != computed_crc {
            return Err(Error::corrupt("journal record checksum mismatch"));
        }

        let kind = RecordKind::from_u8(data[4])?;
        let lsn = u64::from_le_bytes(data[5..13].try_into().unwrap());
        let txn_id = Uuid::from_bytes(data[13..29].try_into().unwrap());
        let body = &data[29..crc_offset];

        let record = match kind {
            RecordKind::TxnBegin => {
                let start_ts = u64::from_le_bytes(body[0..8].try_into().unwrap());
                Self::TxnBegin { txn_id, start_ts }
            }
            RecordKind::PagePreimage => {
                let (page_id, bytes) = decode_page_body(body)?;
                Self::PagePreimage { txn_id, page_id, before_bytes: bytes }
            }
            RecordKind::PagePostimage => {
                let (page_id, bytes) = decode_page_body(body)?;
                Self::PagePostimage { txn_id, page_id, after_bytes: bytes }
            }
            RecordKind::Savepoint => {
                let savepoint_id = u64::from_le_bytes(body[0..8].try_into().unwrap());
                let op_index = u64::from_le_bytes(body[8..16].try_into().unwrap());
                Self::Savepoint { txn_id, savepoint_id, op_index }
            }
            RecordKind::TxnCommit => {
                let commit_ts = u64::from_le_bytes(body[0..8].try_into().unwrap());
                Self::TxnCommit { txn_id, commit_ts }
            }
            RecordKind::TxnAbort => Self::TxnAbort { txn_id },
            RecordKind::Checkpoint => {
                let applied_lsn = u64::from_le_bytes(body[0..8].try_into().unwrap());
                Self::Checkpoint { applied_lsn }
            }
        };

        Ok((record, lsn, total_len))
    }
}

fn decode_page_body(body: &[u8]) -> Result<(PageId, Vec<u8>)> {
    if body.len() < 8 {
        return Err(Error::corrupt("truncated page-image record body"));
    }
    let page_id = PageId::new(u32::from_le_bytes(body[0..4].try_into().unwrap()));
    let len = u32::from_le_bytes(body[4..8].try_into().unwrap()) as usize;
    if body.len() < 8 + len {
        return Err(Error::corrupt("truncated page-image payload"));
    }
    Ok((page_id, body[8..8 + len].to_vec()))
}
