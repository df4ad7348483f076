use std::fmt;
use std::net::Ipv4Addr;

/// One directed TCP flow. Equality is a full-tuple compare; bucketing for
/// the session table hashes `raw_bytes` separately, so colliding tuples
/// are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourTuple {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
}

impl FourTuple {
    pub fn new(src_ip: Ipv4Addr, src_port: u16, dst_ip: Ipv4Addr, dst_port: u16) -> Self {
        Self {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
        }
    }

    /// Canonical 12-byte form fed to the session-table hash.
    pub(crate) fn raw_bytes(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..4].copy_from_slice(&self.src_ip.octets());
        out[4..8].copy_from_slice(&self.dst_ip.octets());
        out[8..10].copy_from_slice(&self.src_port.to_be_bytes());
        out[10..12].copy_from_slice(&self.dst_port.to_be_bytes());
        out
    }
}

impl fmt::Display for FourTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port
        )
    }
}

/// Whether a pattern marks the start or the end of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecType {
    Header,
    Footer,
}

/// A compiled header or footer pattern. The header and footer halves of
/// one file type share an `id`; the trie leaf tells them apart by `spec`.
#[derive(Debug, Clone)]
pub struct Signature {
    pub id: u32,
    pub ext: String,
    pub len: usize,
    pub max_len: u64,
    pub spec: SpecType,
}
