//! Positional lists of labeled items
//!
//! A list computed during one request (the user's vouchers) is stored per
//! attribute column, one blob per category label:
//!
//! ```text
//! sym  => "1:SRF\n2:MILO"
//! bal  => "1:100\n2:200"
//! ```
//!
//! A later request resolves "item 2" against the stored blob without
//! re-fetching the list. Positions are 1-based and follow source order.

use crate::backend::Backend;
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Reserved tag for indexed list keys, outside the field type range
const LIST_KEY_TAG: u16 = 0x8000;

/// Symbol column
pub const LABEL_SYM: &str = "sym";
/// Balance column
pub const LABEL_BAL: &str = "bal";
/// Decimals column
pub const LABEL_DECIMAL: &str = "deci";
/// Contract address column
pub const LABEL_ADDRESS: &str = "addr";

/// Encode values as `1:v1\n2:v2...`
#[must_use]
pub fn encode_list<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| format!("{}:{}", i + 1, v.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decode a blob produced by [`encode_list`]
pub fn decode_list(blob: &str) -> Result<Vec<String>> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }
    blob.split('\n')
        .enumerate()
        .map(|(i, line)| {
            let (pos, value) = split_entry(line)?;
            if pos != i + 1 {
                return Err(Error::Parse(format!("list entry {} has position {}", i + 1, pos)));
            }
            Ok(value.to_string())
        })
        .collect()
}

/// Find the value at 1-based `position` by scanning the blob.
///
/// Returns `Ok(None)` when the position is past the end.
pub fn resolve_in(blob: &str, position: usize) -> Result<Option<&str>> {
    if blob.is_empty() || position == 0 {
        return Ok(None);
    }
    for line in blob.split('\n') {
        let (pos, value) = split_entry(line)?;
        if pos == position {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn split_entry(line: &str) -> Result<(usize, &str)> {
    let (pos, value) = line
        .split_once(':')
        .ok_or_else(|| Error::Parse(format!("malformed list entry: {:?}", line)))?;
    let pos = pos
        .parse()
        .map_err(|_| Error::Parse(format!("malformed list position: {:?}", pos)))?;
    Ok((pos, value))
}

/// Backend key for a session's list under `label`
#[must_use]
pub fn pack_list_key(label: &str, session_id: &str) -> Vec<u8> {
    let label = label.as_bytes();
    let mut key = Vec::with_capacity(3 + label.len() + session_id.len());
    key.extend_from_slice(&LIST_KEY_TAG.to_be_bytes());
    // Labels are short; a one-byte length keeps "ab"+"c" apart from "a"+"bc"
    key.push(label.len().min(u8::MAX as usize) as u8);
    key.extend_from_slice(label);
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Session-scoped indexed lists over a byte backend
#[derive(Clone)]
pub struct IndexedListStore {
    backend: Arc<dyn Backend>,
}

impl IndexedListStore {
    /// Wrap a backend
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Replace the list stored under `label`.
    ///
    /// An empty list is stored as an empty value, so a later read
    /// distinguishes "no items" from "never computed". Values containing a
    /// newline are rejected with [`Error::Parse`] and nothing is written.
    pub async fn put<S: AsRef<str> + Sync>(&self, session_id: &str, label: &str, values: &[S]) -> Result<()> {
        if let Some(pos) = values.iter().position(|v| v.as_ref().contains('\n')) {
            return Err(Error::Parse(format!(
                "list '{}' item {} contains a line break",
                label,
                pos + 1
            )));
        }
        let blob = encode_list(values);
        self.backend.put(&pack_list_key(label, session_id), blob.as_bytes()).await?;
        debug!(session_id = %session_id, label = %label, count = values.len(), "Indexed list stored");
        Ok(())
    }

    /// Raw blob under `label`
    pub async fn get_raw(&self, session_id: &str, label: &str) -> Result<String> {
        match self.backend.get(&pack_list_key(label, session_id)).await {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|e| Error::Parse(format!("list '{}' is not valid UTF-8: {}", label, e))),
            Err(Error::NotFound(_)) => Err(Error::NotFound(format!("list '{}' for session {}", label, session_id))),
            Err(e) => Err(e),
        }
    }

    /// Decoded list under `label`
    pub async fn get(&self, session_id: &str, label: &str) -> Result<Vec<String>> {
        decode_list(&self.get_raw(session_id, label).await?)
    }

    /// Value at 1-based `position` in the list under `label`
    pub async fn resolve(&self, session_id: &str, label: &str, position: usize) -> Result<String> {
        let blob = self.get_raw(session_id, label).await?;
        match resolve_in(&blob, position)? {
            Some(value) => Ok(value.to_string()),
            None => Err(Error::IndexOutOfRange {
                label: label.to_string(),
                position,
                len: if blob.is_empty() { 0 } else { blob.split('\n').count() },
            }),
        }
    }

    /// 1-based position of `value` in the list under `label`
    pub async fn position_of(&self, session_id: &str, label: &str, value: &str) -> Result<Option<usize>> {
        let values = self.get(session_id, label).await?;
        Ok(values.iter().position(|v| v == value).map(|i| i + 1))
    }
}
