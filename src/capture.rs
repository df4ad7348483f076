//! Capture ingestion
//!
//! Reads pcap and pcapng files and hands the engine one unit of work per
//! TCP payload: the flow four-tuple, the payload bytes, and the capture
//! timestamp in whole seconds. Only IPv4/TCP frames are of interest;
//! anything else is skipped silently, while frames that fail to parse
//! count as packet errors.

use std::fs::File;
use std::path::Path;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap_parser::data::{ETHERTYPE_IPV4, PacketData, get_packetdata};
use pcap_parser::pcapng::Block;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError, create_reader};

use crate::error::{CarveError, Result};
use crate::stats::Statistics;
use crate::types::FourTuple;

const READER_CAPACITY: usize = 65536;

/// One unit of work for the engine.
pub struct CapturedPayload {
    pub tuple: FourTuple,
    pub data: Vec<u8>,
    pub ts: u64,
}

pub struct PacketSource {
    reader: Box<dyn PcapReaderIterator>,
    legacy_linktype: Option<Linktype>,
    if_linktypes: Vec<Linktype>,
}

impl PacketSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = create_reader(READER_CAPACITY, file)
            .map_err(|err| CarveError::Capture(format!("failed to create reader: {err}")))?;
        Ok(Self {
            reader,
            legacy_linktype: None,
            if_linktypes: Vec::new(),
        })
    }

    /// Pulls the next TCP payload, or `None` once the capture is
    /// exhausted (clean end of an offline run, not an error).
    pub fn next_payload(&mut self, stats: &mut Statistics) -> Result<Option<CapturedPayload>> {
        loop {
            match self.reader.next() {
                Ok((offset, block)) => {
                    let captured = handle_block(
                        &block,
                        &mut self.legacy_linktype,
                        &mut self.if_linktypes,
                        stats,
                    );
                    self.reader.consume(offset);
                    if let Some(payload) = captured {
                        return Ok(Some(payload));
                    }
                }
                Err(PcapError::Eof) => return Ok(None),
                Err(PcapError::Incomplete) => {
                    self.reader
                        .refill()
                        .map_err(|err| CarveError::Capture(format!("refill failed: {err}")))?;
                }
                Err(err) => return Err(CarveError::Capture(err.to_string())),
            }
        }
    }
}

fn handle_block(
    block: &PcapBlockOwned<'_>,
    legacy_linktype: &mut Option<Linktype>,
    if_linktypes: &mut Vec<Linktype>,
    stats: &mut Statistics,
) -> Option<CapturedPayload> {
    match block {
        PcapBlockOwned::LegacyHeader(hdr) => {
            *legacy_linktype = Some(hdr.network);
            None
        }
        PcapBlockOwned::Legacy(b) => {
            stats.total_packets += 1;
            stats.total_bytes += u64::from(b.caplen);
            let linktype = legacy_linktype.unwrap_or(Linktype::ETHERNET);
            let packet = get_packetdata(b.data, linktype, b.caplen as usize)?;
            decode(packet, u64::from(b.ts_sec), stats)
        }
        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
            if_linktypes.clear();
            None
        }
        PcapBlockOwned::NG(Block::InterfaceDescription(idb)) => {
            if_linktypes.push(idb.linktype);
            None
        }
        PcapBlockOwned::NG(Block::EnhancedPacket(epb)) => {
            stats.total_packets += 1;
            stats.total_bytes += u64::from(epb.caplen);
            let linktype = if_linktypes.get(epb.if_id as usize).copied()?;
            let packet = get_packetdata(epb.packet_data(), linktype, epb.caplen as usize)?;
            // default interface resolution of one microsecond
            let ts = ((u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low)) / 1_000_000;
            decode(packet, ts, stats)
        }
        _ => None,
    }
}

fn decode(packet: PacketData<'_>, ts: u64, stats: &mut Statistics) -> Option<CapturedPayload> {
    let sliced = match packet {
        PacketData::L2(data) => SlicedPacket::from_ethernet(data),
        PacketData::L3(ethertype, data) if ethertype == ETHERTYPE_IPV4 => {
            SlicedPacket::from_ip(data)
        }
        _ => return None,
    };
    let sliced = match sliced {
        Ok(s) => s,
        Err(_) => {
            stats.packet_errors += 1;
            return None;
        }
    };
    let (ip, tcp) = match (sliced.net, sliced.transport) {
        (Some(NetSlice::Ipv4(ip)), Some(TransportSlice::Tcp(tcp))) => (ip, tcp),
        _ => return None,
    };
    let payload = tcp.payload();
    if payload.is_empty() {
        return None;
    }
    let header = ip.header();
    Some(CapturedPayload {
        tuple: FourTuple::new(
            header.source_addr(),
            tcp.source_port(),
            header.destination_addr(),
            tcp.destination_port(),
        ),
        data: payload.to_vec(),
        ts,
    })
}
