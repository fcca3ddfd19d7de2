//! Recovers CarVault documents from a raw database file.
//!
//! The container exposes no directory, index, or page metadata this crate
//! can rely on, so recovery is a brute-force offset scan: try every byte
//! offset as a candidate length-prefixed record, validate cheaply, then
//! attempt a full decode. False-positive length fields are common in
//! unindexed binary soups, so a failed candidate advances the scan by one
//! byte, never by the candidate's declared size.

use serde_json::{Map, Value};
use tracing::debug;

use super::codec::{decode_document, DOC_TERMINATOR};

/// Declared sizes at or below this are corrupt or meaningless fragments.
const MIN_CANDIDATE_BYTES: usize = 10;
/// Declared sizes at or above this are assumed to be false positives.
const MAX_CANDIDATE_BYTES: usize = 65536;

/// Scan `buffer` and return every decodable document, in scan order.
///
/// Never fails; malformed regions are skipped. Consumers must not assume any
/// ordering beyond scan order.
pub fn scan_documents(buffer: &[u8]) -> Vec<Map<String, Value>> {
    let mut documents = Vec::new();
    let mut offset = 0usize;

    while offset + 4 <= buffer.len() {
        if let Some(fields) = candidate_at(buffer, offset) {
            documents.push(fields);
        }
        offset += 1;
    }

    debug!(
        target: "wrenchcloud",
        event = "scan_complete",
        bytes = buffer.len(),
        documents = documents.len()
    );
    documents
}

fn candidate_at(buffer: &[u8], offset: usize) -> Option<Map<String, Value>> {
    let declared = u32::from_le_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ]) as usize;

    if declared <= MIN_CANDIDATE_BYTES || declared >= MAX_CANDIDATE_BYTES {
        return None;
    }
    let end = offset.checked_add(declared)?;
    if end > buffer.len() {
        return None;
    }
    if buffer[end - 1] != DOC_TERMINATOR {
        return None;
    }

    let fields = decode_document(&buffer[offset..end]).ok()?;
    if !looks_like_record(&fields) {
        return None;
    }
    Some(fields)
}

/// Decoded garbage can still parse as a valid-but-meaningless document.
/// Require more than one field and at least one identifier-like field name.
fn looks_like_record(fields: &Map<String, Value>) -> bool {
    fields.len() > 1
        && fields.keys().any(|name| {
            name.chars()
                .next()
                .map(|c| c.is_ascii_alphabetic() || c == '_')
                .unwrap_or(false)
        })
}
