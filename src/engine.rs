//! Top-level control context
//!
//! One `Engine` value owns the compiled trie, the session table, the
//! output sink and the run counters, and is passed by reference through
//! every entry point. Per payload: find or create the session, scan,
//! extract. Housekeeping runs inline every fixed number of dispatched
//! payloads.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::extract;
use crate::output::OutputSink;
use crate::search;
use crate::sessions::{Session, SessionStore};
use crate::signatures::SignatureTable;
use crate::stats::Statistics;
use crate::types::FourTuple;

/// Sessions idle at least this many seconds are eligible for eviction.
pub const DEFAULT_IDLE_TIMEOUT: u64 = 300;

/// Payloads dispatched between eviction sweeps.
const SWEEP_INTERVAL: u32 = 10_000;

pub enum CommandOutcome {
    Continue,
    Quit,
}

pub struct Engine {
    table: SignatureTable,
    sessions: SessionStore,
    sink: OutputSink,
    stats: Statistics,
    idle_timeout: u64,
    verbose: bool,
    debug: bool,
    sweeping: bool,
    dispatched: u32,
    last_ts: u64,
}

impl Engine {
    pub fn new(
        table: SignatureTable,
        output_dir: &Path,
        source: &str,
        idle_timeout: u64,
    ) -> Result<Self> {
        Ok(Self {
            table,
            sessions: SessionStore::new(),
            sink: OutputSink::new(output_dir, source)?,
            stats: Statistics::new(),
            idle_timeout,
            verbose: false,
            debug: false,
            sweeping: false,
            dispatched: 0,
            last_ts: 0,
        })
    }

    pub fn set_verbose(&mut self, on: bool) {
        self.verbose = on;
    }

    pub fn set_debug(&mut self, on: bool) {
        self.debug = on;
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut Statistics {
        &mut self.stats
    }

    pub fn session(&self, tuple: &FourTuple) -> Option<&Session> {
        self.sessions.get(tuple)
    }

    pub fn files_extracted(&self) -> u32 {
        self.stats.total_files
    }

    /// One unit of work: scan the payload in its session's context and
    /// apply the resulting matches to the extraction list.
    pub fn process_payload(&mut self, tuple: FourTuple, payload: &[u8], ts: u64) {
        self.last_ts = ts;
        self.sink.set_epoch(ts);

        let session = self.sessions.find_or_create(tuple, ts);
        let results = search::scan(&self.table, &mut session.threads, payload);
        if self.verbose {
            for r in &results {
                info!(
                    "{} {:?} match at offset {} on {tuple}",
                    self.table.signature(r.sig).ext,
                    r.spec,
                    r.offset
                );
            }
        }
        if !results.is_empty() || !session.extractions.is_empty() {
            extract::extract(
                &self.table,
                session,
                &results,
                payload,
                ts,
                &mut self.sink,
                &mut self.stats,
            );
        }

        self.dispatched += 1;
        if self.dispatched >= SWEEP_INTERVAL {
            self.dispatched = 0;
            self.sweep(ts);
        }
    }

    /// Inline housekeeping. The guard keeps a command- or signal-driven
    /// re-entry from walking the table while a pass is mutating it.
    fn sweep(&mut self, now: u64) {
        if self.sweeping {
            return;
        }
        self.sweeping = true;
        let removed = self.sessions.expire(now, self.idle_timeout);
        if removed > 0 && self.debug {
            println!("expired {removed} sessions from the table");
        }
        self.sweeping = false;
    }

    /// One operator keystroke.
    pub fn handle_command(&mut self, cmd: u8) -> CommandOutcome {
        match cmd {
            b'q' => return CommandOutcome::Quit,
            b's' => self.stats.print(
                self.sessions.stats(),
                self.sessions.count_active_extractions(),
                false,
            ),
            b'h' => self.sessions.print_status(),
            b'd' => self.sessions.dump(self.last_ts),
            b'f' => {
                for line in self.table.describe() {
                    println!("{line}");
                }
            }
            b'r' => {
                self.stats.reset();
                println!("statistics cleared");
            }
            b'v' => {
                self.verbose = !self.verbose;
                println!("verbose mode {}", if self.verbose { "on" } else { "off" });
            }
            b'n' => {
                self.debug = !self.debug;
                println!("debug mode {}", if self.debug { "on" } else { "off" });
            }
            b'V' => println!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            b'?' => print_help(),
            _ => {}
        }
        CommandOutcome::Continue
    }

    /// Teardown: drop remaining sessions, flush the index, print the
    /// closeout. Already-flushed output files are never lost here.
    pub fn shutdown(&mut self) -> Result<()> {
        self.sessions.clear();
        self.sink.finish()?;
        self.stats.print(self.sessions.stats(), 0, true);
        Ok(())
    }
}

fn print_help() {
    println!("-[command summary]-");
    println!("[d]   - dump session table");
    println!("[f]   - show compiled file types");
    println!("[h]   - session table status");
    println!("[n]   - toggle debug mode");
    println!("[r]   - reset statistics");
    println!("[s]   - display statistics");
    println!("[q]   - quit");
    println!("[V]   - display version");
    println!("[v]   - toggle verbose mode");
    println!("[?]   - help");
}
