//! Session table
//!
//! A fixed-bucket hash table keyed by flow four-tuple. Overload degrades
//! to longer chains, never to incorrect lookups: the hash only picks a
//! bucket, membership is a full-tuple compare. No resizing, no rehashing.

use tracing::debug;

use crate::extract::ExtractionRecord;
use crate::search::SearchThread;
use crate::types::FourTuple;

/// Bucket count, fixed at compile time.
pub const SESSION_BUCKETS: usize = 1024;

const FNV_PRIME: u32 = 0x0100_0193;

/// Per-flow state: the live search threads and the open extractions.
pub struct Session {
    tuple: FourTuple,
    pub(crate) last_seen: u64,
    pub(crate) threads: Vec<SearchThread>,
    pub(crate) extractions: Vec<ExtractionRecord>,
}

impl Session {
    fn new(tuple: FourTuple, now: u64) -> Self {
        Self {
            tuple,
            last_seen: now,
            threads: Vec::new(),
            extractions: Vec::new(),
        }
    }

    pub fn tuple(&self) -> FourTuple {
        self.tuple
    }

    pub fn open_extractions(&self) -> usize {
        self.extractions.len()
    }

    pub fn idle_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_seen)
    }
}

/// Insert-time chain counters. `longest_chain` is a high-water mark,
/// never recomputed after evictions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableStats {
    pub entries: u32,
    pub unchained: u32,
    pub chained: u32,
    pub longest_chain: u32,
}

pub struct SessionStore {
    buckets: Vec<Vec<Session>>,
    stats: TableStats,
}

impl SessionStore {
    pub fn new() -> Self {
        let mut buckets = Vec::with_capacity(SESSION_BUCKETS);
        buckets.resize_with(SESSION_BUCKETS, Vec::new);
        Self {
            buckets,
            stats: TableStats::default(),
        }
    }

    /// FNV-style rolling hash over the tuple's 12 raw bytes, reduced
    /// modulo the bucket count.
    fn bucket(tuple: &FourTuple) -> usize {
        let mut hash: u32 = 0;
        for byte in tuple.raw_bytes() {
            hash = hash.wrapping_mul(FNV_PRIME);
            hash ^= u32::from(byte);
        }
        hash as usize % SESSION_BUCKETS
    }

    /// Returns the session for `tuple`, creating it at the end of its
    /// chain on first sight. A hit refreshes the last-seen timestamp.
    pub fn find_or_create(&mut self, tuple: FourTuple, now: u64) -> &mut Session {
        let b = Self::bucket(&tuple);
        let found = self.buckets[b].iter().position(|s| s.tuple == tuple);
        match found {
            Some(i) => {
                let session = &mut self.buckets[b][i];
                session.last_seen = now;
                session
            }
            None => {
                let chain = self.buckets[b].len() as u32;
                if chain == 0 {
                    self.stats.unchained += 1;
                } else {
                    self.stats.chained += 1;
                    if chain > self.stats.longest_chain {
                        self.stats.longest_chain = chain;
                    }
                }
                self.stats.entries += 1;
                debug!("new session: {tuple}");
                self.buckets[b].push(Session::new(tuple, now));
                let end = self.buckets[b].len() - 1;
                &mut self.buckets[b][end]
            }
        }
    }

    /// Read-only lookup; does not refresh the timestamp.
    pub fn get(&self, tuple: &FourTuple) -> Option<&Session> {
        self.buckets[Self::bucket(tuple)]
            .iter()
            .find(|s| s.tuple == *tuple)
    }

    /// Removes every session idle at least `threshold` seconds, relinking
    /// chains correctly in every position. Open extraction files on an
    /// evicted session are dropped unindexed, treated as abandoned.
    pub fn expire(&mut self, now: u64, threshold: u64) -> usize {
        let mut removed = 0;
        for bucket in &mut self.buckets {
            let mut i = 0;
            while i < bucket.len() {
                if now.saturating_sub(bucket[i].last_seen) >= threshold {
                    bucket.remove(i);
                    if i == 0 {
                        self.stats.unchained = self.stats.unchained.saturating_sub(1);
                    } else {
                        self.stats.chained = self.stats.chained.saturating_sub(1);
                    }
                    self.stats.entries -= 1;
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        }
        removed
    }

    pub fn population(&self) -> u32 {
        self.stats.entries
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.buckets.iter().flatten()
    }

    pub fn count_active_extractions(&self) -> usize {
        self.iter().map(|s| s.extractions.len()).sum()
    }

    /// Drops every session. The longest-chain high-water mark survives.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.stats.entries = 0;
        self.stats.unchained = 0;
        self.stats.chained = 0;
    }

    /// The `h` operator command.
    pub fn print_status(&self) {
        if self.stats.entries == 0 {
            println!("session table empty");
            return;
        }
        println!("session table status");
        println!("table size:\t\t{SESSION_BUCKETS}");
        println!("table population:\t{}", self.stats.entries);
        println!("un-chained entries:\t{}", self.stats.unchained);
        println!("chained entries:\t{}", self.stats.chained);
        println!("longest chain:\t\t{}", self.stats.longest_chain);
    }

    /// The `d` operator command.
    pub fn dump(&self, now: u64) {
        if self.stats.entries == 0 {
            println!("session table empty");
            return;
        }
        for session in self.iter() {
            println!(
                "{} {}s idle, {} open extractions",
                session.tuple,
                session.idle_secs(now),
                session.extractions.len()
            );
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
