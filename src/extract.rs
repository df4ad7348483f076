//! Extraction state machine
//!
//! Turns one payload's ordered match results into file output. One
//! payload may be sliced across several destinations at once: an
//! extraction continuing from the previous payload, a new one starting
//! mid-payload, and a footer ending one before the payload does. Each
//! open record owns its own byte range of the payload; ranges of
//! different records may overlap, which is what lets a file nested inside
//! another be extracted in full.

use std::fs::File;
use std::io::Write;

use tracing::{debug, warn};

use crate::output::OutputSink;
use crate::search::MatchResult;
use crate::sessions::Session;
use crate::signatures::SignatureTable;
use crate::stats::Statistics;
use crate::types::SpecType;

/// State for one in-progress output file.
pub struct ExtractionRecord {
    file: File,
    file_name: String,
    /// Spec id of the footer that closes this file, when the type has one.
    footer: Option<u32>,
    max_len: u64,
    written: u64,
    /// Byte range of the current payload owned by this record.
    segment: Option<(usize, usize)>,
    closing: bool,
}

impl ExtractionRecord {
    fn new(file: File, file_name: String, footer: Option<u32>, max_len: u64, start: usize) -> Self {
        Self {
            file,
            file_name,
            footer,
            max_len,
            written: 0,
            segment: Some((start, start)),
            closing: false,
        }
    }

    /// Fresh records keep the start their header match set; continuing
    /// records own the payload from its first byte.
    fn begin_segment(&mut self, payload_len: usize) {
        let start = match self.segment {
            Some((s, _)) => s.min(payload_len),
            None => 0,
        };
        self.segment = Some((start, payload_len));
    }

    fn segment_start(&self) -> usize {
        self.segment.map(|(s, _)| s).unwrap_or(0)
    }

    fn end_segment(&mut self, end: usize) {
        if let Some((start, _)) = self.segment {
            self.segment = Some((start, end.max(start)));
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// Applies one payload's matches to the session's extraction list.
pub fn extract(
    table: &SignatureTable,
    session: &mut Session,
    results: &[MatchResult],
    payload: &[u8],
    ts: u64,
    sink: &mut OutputSink,
    stats: &mut Statistics,
) {
    let tuple = session.tuple();

    // headers first: each one opens its own numbered file, even when the
    // same type is already extracting on this flow
    for r in results.iter().filter(|r| r.spec == SpecType::Header) {
        let sig = table.signature(r.sig);
        let footer = table.has_footer(sig.id).then_some(sig.id);
        match sink.open_extract(&sig.ext, tuple) {
            Ok((file, file_name)) => {
                debug!("extracting {file_name} from {tuple}");
                session.extractions.push(ExtractionRecord::new(
                    file,
                    file_name,
                    footer,
                    sig.max_len,
                    r.offset.min(payload.len()),
                ));
            }
            Err(err) => {
                warn!("failed to open output file for {}: {err}", sig.ext);
                stats.extraction_errors += 1;
            }
        }
    }

    for rec in &mut session.extractions {
        rec.begin_segment(payload.len());
    }

    // a footer ends the oldest record still waiting on it; one with no
    // open record is a false match and drops on the floor
    for r in results.iter().filter(|r| r.spec == SpecType::Footer) {
        let id = table.signature(r.sig).id;
        let end = (r.offset + 1).min(payload.len());
        if let Some(rec) = session
            .extractions
            .iter_mut()
            .find(|x| !x.closing && x.footer == Some(id) && x.segment_start() <= r.offset)
        {
            rec.end_segment(end);
            rec.closing = true;
        }
    }

    // write every owned segment, truncating at the type's length cap; a
    // header whose footer never shows still terminates at the cap
    for rec in &mut session.extractions {
        let Some((start, end)) = rec.segment.take() else {
            continue;
        };
        if start >= end {
            continue;
        }
        let span = &payload[start..end];
        let remaining = rec.max_len.saturating_sub(rec.written) as usize;
        let take = span.len().min(remaining);
        if take > 0 {
            if let Err(err) = rec.file.write_all(&span[..take]) {
                warn!("write to {} failed: {err}", rec.file_name);
                stats.extraction_errors += 1;
                rec.closing = true;
                continue;
            }
            rec.written += take as u64;
            stats.bytes_extracted += take as u64;
        }
        if rec.written >= rec.max_len {
            rec.closing = true;
        }
    }

    // sweep: flush and index everything flagged closed
    session.extractions.retain_mut(|rec| {
        if !rec.closing {
            return true;
        }
        if let Err(err) = rec.file.flush() {
            warn!("flush of {} failed: {err}", rec.file_name);
            stats.extraction_errors += 1;
        }
        if let Err(err) = sink.index_entry(&rec.file_name, tuple, ts) {
            warn!("index write for {} failed: {err}", rec.file_name);
            stats.extraction_errors += 1;
        }
        stats.total_files += 1;
        debug!("closed {} after {} bytes", rec.file_name, rec.written);
        false
    });
}
