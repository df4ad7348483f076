//! Payload scanner
//!
//! Walks a payload left to right against the compiled trie. Every live
//! thread follows one edge per byte, and every offset seeds one fresh
//! thread, so overlapping and staggered matches are all found. Results
//! come out ordered by the position that completed them, which the
//! extraction step depends on.

use crate::signatures::{NodeId, ROOT, SigId, SignatureTable, Step};
use crate::types::SpecType;

/// A live partial-match cursor. `origin` is the offset that consumed the
/// pattern's first byte.
#[derive(Debug, Clone, Copy)]
pub struct SearchThread {
    origin: usize,
    node: NodeId,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchResult {
    pub sig: SigId,
    pub spec: SpecType,
    /// Match-start offset for headers, match-end offset for footers.
    pub offset: usize,
}

/// Scans one payload. `threads` belongs to the calling session and
/// persists across calls, so a pattern straddling two payloads can still
/// complete when the caller carries the list forward.
pub fn scan(
    table: &SignatureTable,
    threads: &mut Vec<SearchThread>,
    payload: &[u8],
) -> Vec<MatchResult> {
    let mut results = Vec::new();
    for (i, &byte) in payload.iter().enumerate() {
        threads.retain_mut(|t| match table.step(t.node, byte) {
            Step::Dead => false,
            Step::Table(next) => {
                t.node = next;
                true
            }
            Step::Leaf(sig) => {
                results.push(complete(table, sig, t.origin, i));
                false
            }
        });
        match table.step(ROOT, byte) {
            Step::Dead => {}
            Step::Table(next) => threads.push(SearchThread {
                origin: i,
                node: next,
            }),
            Step::Leaf(sig) => results.push(complete(table, sig, i, i)),
        }
    }
    results
}

fn complete(table: &SignatureTable, sig: SigId, origin: usize, end: usize) -> MatchResult {
    let spec = table.signature(sig).spec;
    MatchResult {
        sig,
        spec,
        offset: match spec {
            SpecType::Header => origin,
            SpecType::Footer => end,
        },
    }
}
