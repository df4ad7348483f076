//! Signature table compiler
//!
//! Compiles header/footer byte patterns into an immutable trie walked by
//! the scanner. Table nodes branch per byte value, with wildcard
//! positions fanning out to one shared child; Leaf nodes terminate a
//! pattern. The trie is built once at startup and is read-only for the
//! life of the run, so every session can scan against it without
//! synchronization.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::{CarveError, Result};
use crate::types::{Signature, SpecType};

/// Longest supported pattern, in bytes.
pub const MAX_PATTERN_LEN: usize = 256;

pub(crate) type NodeId = u32;
pub type SigId = u32;

pub(crate) const ROOT: NodeId = 0;

/// Declarative form of one file type, as read from a signature file.
/// Patterns are hex text; `??` marks a wildcard byte.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureSpec {
    pub ext: String,
    pub max_len: u64,
    pub header: String,
    #[serde(default)]
    pub footer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternByte {
    Literal(u8),
    Wildcard,
}

enum TrieNode {
    Table { children: [Option<NodeId>; 256] },
    Leaf { sig: SigId },
}

/// Outcome of following one trie edge.
pub(crate) enum Step {
    Dead,
    Table(NodeId),
    Leaf(SigId),
}

pub struct SignatureTable {
    nodes: Vec<TrieNode>,
    sigs: Vec<Signature>,
    /// Slot writes made by the spec currently being inserted, as
    /// `(node, slot, previous value)`, replayed in reverse on rejection.
    journal: Vec<(NodeId, usize, Option<NodeId>)>,
    loaded: usize,
    rejected: usize,
}

impl SignatureTable {
    /// Compiles a set of specs. Individual bad specs are warned about and
    /// dropped; only an entirely unusable set is fatal.
    pub fn compile(specs: &[SignatureSpec]) -> Result<Self> {
        let mut table = Self {
            nodes: vec![TrieNode::Table {
                children: [None; 256],
            }],
            sigs: Vec::new(),
            journal: Vec::new(),
            loaded: 0,
            rejected: 0,
        };
        for (id, spec) in specs.iter().enumerate() {
            let nodes_before = table.nodes.len();
            let sigs_before = table.sigs.len();
            table.journal.clear();
            match table.add_spec(id as u32, spec) {
                Ok(()) => table.loaded += 1,
                Err(err) => {
                    warn!("skipping signature {:?}: {err}", spec.ext);
                    table.rollback(nodes_before, sigs_before);
                    table.rejected += 1;
                }
            }
        }
        if table.loaded == 0 {
            return Err(CarveError::EmptyTable);
        }
        Ok(table)
    }

    fn add_spec(&mut self, id: u32, spec: &SignatureSpec) -> Result<()> {
        let header = parse_pattern(&spec.ext, &spec.header)?;
        let footer = match spec.footer.as_deref() {
            Some(text) => Some(parse_pattern(&spec.ext, text)?),
            None => None,
        };
        self.insert(
            &spec.ext,
            &header,
            Signature {
                id,
                ext: spec.ext.clone(),
                len: header.len(),
                max_len: spec.max_len,
                spec: SpecType::Header,
            },
        )?;
        if let Some(pattern) = footer {
            self.insert(
                &spec.ext,
                &pattern,
                Signature {
                    id,
                    ext: spec.ext.clone(),
                    len: pattern.len(),
                    max_len: spec.max_len,
                    spec: SpecType::Footer,
                },
            )?;
        }
        Ok(())
    }

    fn insert(&mut self, ext: &str, pattern: &[PatternByte], sig: Signature) -> Result<()> {
        let sig_id = self.sigs.len() as SigId;
        self.sigs.push(sig);

        let mut node: NodeId = ROOT;
        for (pos, pb) in pattern.iter().enumerate() {
            let is_last = pos + 1 == pattern.len();
            match (*pb, is_last) {
                (PatternByte::Literal(b), false) => {
                    node = self.descend_literal(node, b, ext)?;
                }
                (PatternByte::Literal(b), true) => {
                    self.attach_leaf_literal(node, b, sig_id, ext)?;
                }
                (PatternByte::Wildcard, false) => {
                    node = self.descend_wildcard(node, ext)?;
                }
                (PatternByte::Wildcard, true) => {
                    self.attach_leaf_wildcard(node, sig_id, ext)?;
                }
            }
        }
        Ok(())
    }

    /// Undoes a partially inserted spec. A rejected spec whose header or
    /// wildcard fan-out already reached the trie must not keep matching:
    /// journaled slot writes into nodes that predate the spec are
    /// replayed in reverse, then the nodes added for it are truncated
    /// away.
    fn rollback(&mut self, nodes: usize, sigs: usize) {
        while let Some((node, slot, old)) = self.journal.pop() {
            if (node as usize) < nodes {
                self.children_mut(node)[slot] = old;
            }
        }
        self.nodes.truncate(nodes);
        self.sigs.truncate(sigs);
    }

    fn new_node(&mut self, node: TrieNode) -> NodeId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    fn children(&self, node: NodeId) -> &[Option<NodeId>; 256] {
        match &self.nodes[node as usize] {
            TrieNode::Table { children } => children,
            TrieNode::Leaf { .. } => unreachable!("trie descent stopped at a leaf"),
        }
    }

    fn children_mut(&mut self, node: NodeId) -> &mut [Option<NodeId>; 256] {
        match &mut self.nodes[node as usize] {
            TrieNode::Table { children } => children,
            TrieNode::Leaf { .. } => unreachable!("trie descent stopped at a leaf"),
        }
    }

    /// Every child-slot write goes through here so a rejected spec can be
    /// rolled back exactly.
    fn set_child(&mut self, node: NodeId, slot: usize, value: Option<NodeId>) {
        let old = std::mem::replace(&mut self.children_mut(node)[slot], value);
        self.journal.push((node, slot, old));
    }

    fn empty_slots(&self, node: NodeId) -> Vec<usize> {
        self.children(node)
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.is_none().then_some(i))
            .collect()
    }

    fn descend_literal(&mut self, node: NodeId, byte: u8, ext: &str) -> Result<NodeId> {
        let existing = self.children(node)[byte as usize];
        match existing {
            Some(next) => match self.nodes[next as usize] {
                TrieNode::Table { .. } => Ok(next),
                TrieNode::Leaf { .. } => Err(CarveError::BadSignature {
                    ext: ext.to_string(),
                    reason: "pattern extends one already compiled".to_string(),
                }),
            },
            None => {
                let next = self.new_node(TrieNode::Table {
                    children: [None; 256],
                });
                self.set_child(node, byte as usize, Some(next));
                Ok(next)
            }
        }
    }

    /// Wildcard positions share one child across all 256 slots; slot 0 is
    /// the canonical link when the fan-out already exists. Slots claimed
    /// by a literal edge keep their subtree. A wildcard with no open slot
    /// and no fan-out to reuse could never be reached and is rejected.
    fn descend_wildcard(&mut self, node: NodeId, ext: &str) -> Result<NodeId> {
        let empty = self.empty_slots(node);
        let canonical = self.children(node)[0];
        let shared = match canonical {
            Some(id) if matches!(self.nodes[id as usize], TrieNode::Table { .. }) => id,
            _ if empty.is_empty() => {
                return Err(CarveError::BadSignature {
                    ext: ext.to_string(),
                    reason: "wildcard byte fully shadowed by existing patterns".to_string(),
                });
            }
            _ => self.new_node(TrieNode::Table {
                children: [None; 256],
            }),
        };
        for slot in empty {
            self.set_child(node, slot, Some(shared));
        }
        Ok(shared)
    }

    fn attach_leaf_literal(&mut self, node: NodeId, byte: u8, sig: SigId, ext: &str) -> Result<()> {
        if self.children(node)[byte as usize].is_some() {
            return Err(CarveError::BadSignature {
                ext: ext.to_string(),
                reason: "pattern collides with one already compiled".to_string(),
            });
        }
        let leaf = self.new_node(TrieNode::Leaf { sig });
        self.set_child(node, byte as usize, Some(leaf));
        Ok(())
    }

    fn attach_leaf_wildcard(&mut self, node: NodeId, sig: SigId, ext: &str) -> Result<()> {
        let empty = self.empty_slots(node);
        if empty.is_empty() {
            return Err(CarveError::BadSignature {
                ext: ext.to_string(),
                reason: "wildcard byte fully shadowed by existing patterns".to_string(),
            });
        }
        let leaf = self.new_node(TrieNode::Leaf { sig });
        for slot in empty {
            self.set_child(node, slot, Some(leaf));
        }
        Ok(())
    }

    /// Follows one edge. Leaves have no outgoing edges; a thread parked on
    /// one is already dead.
    pub(crate) fn step(&self, node: NodeId, byte: u8) -> Step {
        let children = match &self.nodes[node as usize] {
            TrieNode::Table { children } => children,
            TrieNode::Leaf { .. } => return Step::Dead,
        };
        match children[byte as usize] {
            None => Step::Dead,
            Some(next) => match &self.nodes[next as usize] {
                TrieNode::Table { .. } => Step::Table(next),
                TrieNode::Leaf { sig } => Step::Leaf(*sig),
            },
        }
    }

    pub fn signature(&self, sig: SigId) -> &Signature {
        &self.sigs[sig as usize]
    }

    /// Whether the given spec id compiled a footer pattern.
    pub fn has_footer(&self, id: u32) -> bool {
        self.sigs
            .iter()
            .any(|s| s.id == id && s.spec == SpecType::Footer)
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// One line per compiled file type, for the `f` operator command.
    pub fn describe(&self) -> Vec<String> {
        self.sigs
            .iter()
            .filter(|s| s.spec == SpecType::Header)
            .map(|s| {
                let kind = if self.has_footer(s.id) {
                    "header+footer"
                } else {
                    "header only"
                };
                format!("{}\t{} bytes max\t{}", s.ext, s.max_len, kind)
            })
            .collect()
    }
}

fn parse_pattern(ext: &str, text: &str) -> Result<Vec<PatternByte>> {
    let bad = |reason: &str| CarveError::BadSignature {
        ext: ext.to_string(),
        reason: reason.to_string(),
    };

    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if digits.is_empty() {
        return Err(bad("empty pattern"));
    }
    if digits.len() % 2 != 0 {
        return Err(bad("odd-length hex pattern"));
    }
    if digits.len() / 2 > MAX_PATTERN_LEN {
        return Err(bad("pattern too long"));
    }

    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks(2) {
        if pair == b"??" {
            out.push(PatternByte::Wildcard);
        } else {
            let mut byte = [0u8; 1];
            hex::decode_to_slice(pair, &mut byte).map_err(|_| bad("invalid hex digit"))?;
            out.push(PatternByte::Literal(byte[0]));
        }
    }
    if out.iter().all(|p| matches!(p, PatternByte::Wildcard)) {
        return Err(bad("wildcard-only pattern matches everything"));
    }
    Ok(out)
}

/// The stock signature set, used when no signature file is given.
pub fn builtin_specs() -> Vec<SignatureSpec> {
    let spec = |ext: &str, max_len: u64, header: &str, footer: Option<&str>| SignatureSpec {
        ext: ext.to_string(),
        max_len,
        header: header.to_string(),
        footer: footer.map(str::to_string),
    };
    vec![
        spec("jpg", 50 * 1024 * 1024, "ffd8ff", Some("ffd9")),
        spec("gif", 5 * 1024 * 1024, "47494638??61", Some("3b")),
        spec(
            "png",
            20 * 1024 * 1024,
            "89504e470d0a1a0a",
            Some("49454e44ae426082"),
        ),
        spec("pdf", 20 * 1024 * 1024, "255044462d", Some("2525454f46")),
        spec("html", 1024 * 1024, "3c68746d6c", Some("3c2f68746d6c3e")),
    ]
}

/// Reads a JSON array of signature specs.
pub fn load_specs(path: &Path) -> Result<Vec<SignatureSpec>> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|err| CarveError::SignatureFile(path.to_path_buf(), err.to_string()))
}
