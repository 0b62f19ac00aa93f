//! Block containers and their integrity rules

use crate::config::Config;
use crate::event::{Event, EventKind};
use crate::merkle;

/// Append failures surfaced to the chain layer.
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error("block {0} is at its event capacity")]
    EventsFull(usize),
}

/// One block: header metadata plus the ordered events it seals.
///
/// Blocks start empty, fill incrementally, and are sealed either by the
/// chain (local seal, no proof-of-work) or by the mining path (nonce search
/// first, then the race check). A `Clone` is a deep copy of header and
/// events and is the unit of inter-node transfer; chains are owned
/// vectors, so there is no successor link to reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: usize,
    timestamp: i64,
    previous_hash: String,
    merkle_root: String,
    nonce: u64,
    hash: String,
    events: Vec<Event>,
}

impl Block {
    /// A fresh, empty block. Merkle root and hash start zeroed; they are
    /// brought in line by [`refresh`](Block::refresh) once contents change.
    pub fn new(cfg: &Config, index: usize, previous_hash: String, timestamp: i64) -> Self {
        Block {
            index,
            timestamp,
            previous_hash,
            merkle_root: cfg.hasher.zero_digest(),
            nonce: 0,
            hash: cfg.hasher.zero_digest(),
            events: Vec::with_capacity(cfg.initial_event_capacity.min(cfg.max_events_per_block)),
        }
    }

    /// Append `event` and recompute the Merkle root and block hash, so the
    /// header is always consistent with the contents after a successful
    /// append.
    pub fn append_event(&mut self, cfg: &Config, event: Event) -> Result<(), BlockError> {
        if self.events.len() >= cfg.max_events_per_block {
            return Err(BlockError::EventsFull(self.index));
        }

        self.events.push(event);
        self.refresh(cfg);

        Ok(())
    }

    /// Recompute the Merkle root from the event sequence, then the block
    /// hash over the concatenation of index, timestamp, previous hash,
    /// Merkle root, and nonce (numbers as decimal strings, no separators).
    pub fn refresh(&mut self, cfg: &Config) {
        self.merkle_root = merkle::merkle_root(&self.event_hashes(), &cfg.hasher);
        self.hash = self.header_hash(cfg, &self.merkle_root);
    }

    fn header_hash(&self, cfg: &Config, merkle_root: &str) -> String {
        let header = format!(
            "{}{}{}{}{}",
            self.index, self.timestamp, self.previous_hash, merkle_root, self.nonce
        );
        cfg.hasher.digest(header.as_bytes())
    }

    fn event_hashes(&self) -> Vec<String> {
        self.events.iter().map(|e| e.hash().to_owned()).collect()
    }

    /// Set the nonce and refresh the block hash. Contents are fixed during
    /// the nonce search, so the stored Merkle root is reused as-is.
    pub(crate) fn set_nonce(&mut self, cfg: &Config, nonce: u64) {
        self.nonce = nonce;
        let root = self.merkle_root.clone();
        self.hash = self.header_hash(cfg, &root);
    }

    /// The difficulty predicate: at least `cfg.difficulty` leading `'0'`
    /// characters, compared on the hash string itself.
    pub fn meets_difficulty(&self, cfg: &Config) -> bool {
        self.hash.bytes().take_while(|&b| b == b'0').count() >= cfg.difficulty
    }

    /// True when the stored Merkle root matches the events and the stored
    /// hash matches the header. Tampered blocks fail the first check.
    pub fn verify(&self, cfg: &Config) -> bool {
        let root = merkle::merkle_root(&self.event_hashes(), &cfg.hasher);
        root == self.merkle_root && self.hash == self.header_hash(cfg, &self.merkle_root)
    }

    /// The hash this block's current contents produce, independent of the
    /// stored header fields. Diverges from [`hash`](Block::hash) exactly
    /// when a block has been tampered with; the consensus oracle compares
    /// blocks by this identity.
    pub fn computed_hash(&self, cfg: &Config) -> String {
        let root = merkle::merkle_root(&self.event_hashes(), &cfg.hasher);
        self.header_hash(cfg, &root)
    }

    /// Overwrite the payload of the first event of `kind` and refresh only
    /// that event's hash, leaving the block header stale. Returns whether
    /// anything was rewritten. This is the malicious path; honest code has
    /// no business here.
    pub(crate) fn falsify_event(&mut self, cfg: &Config, kind: EventKind, payload: &[u8]) -> bool {
        match self.events.iter_mut().find(|e| e.kind() == kind) {
            Some(event) => {
                event.rewrite_payload(cfg, payload);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    #[inline]
    pub fn merkle_root(&self) -> &str {
        &self.merkle_root
    }

    #[inline]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    #[inline]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[inline]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// True once the event count has reached the configured cap.
    pub fn is_full(&self, cfg: &Config) -> bool {
        self.events.len() >= cfg.max_events_per_block
    }
}
