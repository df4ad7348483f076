//! Run counters and their printouts.

use std::time::Instant;

use crate::sessions::TableStats;

#[derive(Debug)]
pub struct Statistics {
    pub total_packets: u32,
    pub total_bytes: u64,
    pub total_files: u32,
    pub bytes_extracted: u64,
    pub packet_errors: u32,
    pub extraction_errors: u32,
    started: Instant,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            total_packets: 0,
            total_bytes: 0,
            total_files: 0,
            bytes_extracted: 0,
            packet_errors: 0,
            extraction_errors: 0,
            started: Instant::now(),
        }
    }

    /// Clears counters; the uptime clock keeps running.
    pub fn reset(&mut self) {
        self.total_packets = 0;
        self.total_bytes = 0;
        self.total_files = 0;
        self.bytes_extracted = 0;
        self.packet_errors = 0;
        self.extraction_errors = 0;
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// The `s` operator command, and the closeout at shutdown.
    pub fn print(&self, table: TableStats, extracting: usize, closeout: bool) {
        let label = if closeout {
            "running-time:\t\t\t"
        } else {
            "up-time:\t\t\t"
        };
        println!("{label}{}", format_duration(self.uptime_secs()));
        if !closeout {
            println!("sessions watched:\t\t{}", table.entries);
        }
        println!("packets churned:\t\t{}", self.total_packets);
        println!("bytes churned:\t\t\t{}", self.total_bytes);
        println!("files extracted:\t\t{}", self.total_files);
        println!("bytes extracted:\t\t{}", self.bytes_extracted);
        if !closeout {
            println!("files currently extracting:\t{extracting}");
        }
        println!("packet errors:\t\t\t{}", self.packet_errors);
        println!("extraction errors:\t\t{}", self.extraction_errors);
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders seconds as "2 days 3 hours 4 minutes 5 seconds", dropping
/// zero units.
pub fn format_duration(total: u64) -> String {
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    let mut parts = Vec::new();
    for (n, word) in [
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ] {
        if n > 0 {
            parts.push(format!("{n} {word}{}", if n == 1 { "" } else { "s" }));
        }
    }
    if parts.is_empty() {
        "< 1 second".to_string()
    } else {
        parts.join(" ")
    }
}
