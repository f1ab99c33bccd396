//! Hash chain over a user's entries
//!
//! Every entry commits to the previous entry of the same user, so any edit
//! or removal in the store is detectable by [`verify_chain`].

use crate::{
    types::{ChainHead, LedgerEntry},
    Error, Result,
};
use sha2::{Digest, Sha256};

/// SHA-256 over all entry fields except `hash`
pub fn hash_entry(entry: &LedgerEntry) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(entry.id.as_bytes());
    update_str(&mut hasher, entry.user_id.as_str());
    hasher.update(entry.sequence.to_be_bytes());
    hasher.update(entry.points.to_be_bytes());
    hasher.update([entry.entry_type as u8]);
    update_str(&mut hasher, &entry.description);

    match &entry.order_id {
        Some(order_id) => {
            hasher.update([1u8]);
            update_str(&mut hasher, order_id);
        }
        None => hasher.update([0u8]),
    }

    match entry.expires_at {
        Some(at) => {
            hasher.update([1u8]);
            hasher.update(at.timestamp_micros().to_be_bytes());
        }
        None => hasher.update([0u8]),
    }

    match entry.reference_id {
        Some(reference) => {
            hasher.update([1u8]);
            hasher.update(reference.as_bytes());
        }
        None => hasher.update([0u8]),
    }

    hasher.update(entry.created_at.timestamp_micros().to_be_bytes());
    hasher.update(entry.prev_hash);

    hasher.finalize().into()
}

// Length prefix keeps adjacent strings unambiguous
fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value.as_bytes());
}

/// Verify sequences and hashes of one user's entries, in sequence order
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<ChainHead> {
    let mut head = ChainHead::GENESIS;

    for entry in entries {
        if entry.sequence != head.sequence + 1 {
            return Err(Error::InvariantViolation(format!(
                "entry {} has sequence {}, expected {}",
                entry.id,
                entry.sequence,
                head.sequence + 1
            )));
        }

        if entry.prev_hash != head.hash {
            return Err(Error::InvariantViolation(format!(
                "entry {} does not link to its predecessor",
                entry.id
            )));
        }

        if hash_entry(entry) != entry.hash {
            return Err(Error::InvariantViolation(format!(
                "entry {} hash mismatch",
                entry.id
            )));
        }

        head = ChainHead {
            sequence: entry.sequence,
            hash: entry.hash,
        };
    }

    Ok(head)
}
