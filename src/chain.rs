//! A node's replica of the ledger

use std::sync::Arc;

use tracing::debug;

use crate::block::{Block, BlockError};
use crate::config::Config;
use crate::event::{Event, EventKind};
use crate::utils;

/// Chain-level append failures.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    BlockFull(#[from] BlockError),
}

/// Why a broadcast block was turned away. Each rejection is silent and
/// local to the rejecting peer.
#[derive(Debug, thiserror::Error)]
pub enum BlockAcceptError {
    #[error("block {index} does not carry {difficulty} leading zeros")]
    WeakProof { index: usize, difficulty: usize },
    #[error("block {index} carries an event that fails validation")]
    InvalidEvent { index: usize },
    #[error("no local block matches previous hash {previous_hash}")]
    UnknownParent { previous_hash: String },
    #[error("block {index} does not extend past the local tip {tip}")]
    NotLonger { index: usize, tip: usize },
}

/// One replica: the committed blocks in order, plus the scratchpad
/// accumulating events for the next index.
///
/// The chain itself is single-threaded data; the owning node wraps it in a
/// `Mutex`, and every invariant below is stated for quiescent points (no
/// holder of that lock mid-mutation):
///
/// - indices run 0..len contiguously, genesis first;
/// - `blocks[i].previous_hash == blocks[i - 1].hash`;
/// - `scratchpad.index == len` and `scratchpad.previous_hash == tip.hash`.
#[derive(Debug, Clone)]
pub struct Chain {
    config: Arc<Config>,
    blocks: Vec<Block>,
    scratchpad: Block,
}

impl Chain {
    /// A chain holding a freshly stamped genesis block.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_genesis_timestamp(config, utils::unix_now())
    }

    /// Genesis creation with a caller-pinned timestamp. The genesis hash is
    /// a pure function of the timestamp, which is how a network gives every
    /// replica an identical genesis.
    pub fn with_genesis_timestamp(config: Arc<Config>, timestamp: i64) -> Self {
        let mut genesis = Block::new(&config, 0, config.hasher.zero_digest(), timestamp);
        genesis.refresh(&config);

        let scratchpad = Block::new(&config, 1, genesis.hash().to_owned(), utils::unix_now());

        Chain {
            config,
            blocks: vec![genesis],
            scratchpad,
        }
    }

    /// Record an event in the scratchpad. A full scratchpad is sealed and
    /// committed, and the append retried once on its replacement.
    pub fn append_event(&mut self, kind: EventKind, payload: &[u8]) -> Result<(), ChainError> {
        let event = Event::new(&self.config, kind, payload);

        match self.scratchpad.append_event(&self.config, event.clone()) {
            Ok(()) => Ok(()),
            Err(BlockError::EventsFull(_)) => {
                self.seal_and_commit();
                self.scratchpad.append_event(&self.config, event)?;
                Ok(())
            }
        }
    }

    /// Seal the scratchpad as it stands, commit it at the tip, and open a
    /// fresh scratchpad above it. No proof-of-work on this path; the
    /// difficulty contract lives with the mining loop.
    pub fn seal_and_commit(&mut self) {
        self.scratchpad.refresh(&self.config);

        let next = Block::new(
            &self.config,
            self.scratchpad.index() + 1,
            self.scratchpad.hash().to_owned(),
            utils::unix_now(),
        );
        let sealed = std::mem::replace(&mut self.scratchpad, next);

        debug!(index = sealed.index(), events = sealed.event_count(), "block sealed");
        self.blocks.push(sealed);
    }

    /// The post-mining race check: commit `candidate` only if it still
    /// extends the tip. Returns `false` when another block won the index,
    /// in which case the candidate is dropped.
    pub fn try_commit_mined(&mut self, candidate: Block) -> bool {
        if candidate.previous_hash() != self.tip().hash() {
            return false;
        }

        self.install_tip(candidate);
        true
    }

    /// Screen a broadcast block. Acceptance appends a clone at the tip and
    /// re-opens the scratchpad above it; any failure leaves the replica
    /// untouched.
    pub fn receive(&mut self, block: &Block) -> Result<(), BlockAcceptError> {
        if !block.meets_difficulty(&self.config) {
            return Err(BlockAcceptError::WeakProof {
                index: block.index(),
                difficulty: self.config.difficulty,
            });
        }

        if !block.events().iter().all(|e| self.config.validator.validate(e)) {
            return Err(BlockAcceptError::InvalidEvent { index: block.index() });
        }

        let parent = self
            .blocks
            .iter()
            .position(|b| b.hash() == block.previous_hash());
        let Some(parent) = parent else {
            return Err(BlockAcceptError::UnknownParent {
                previous_hash: block.previous_hash().to_owned(),
            });
        };

        // Strict append: the parent must be the current tip and the block
        // must carry exactly the next index, so acceptance lengthens the
        // chain by one and keeps index equal to position. Anything else is
        // resolved by synchronization, not broadcast.
        if parent + 1 != self.blocks.len() || block.index() != self.blocks.len() {
            return Err(BlockAcceptError::NotLonger {
                index: block.index(),
                tip: self.tip().index(),
            });
        }

        self.install_tip(block.clone());
        Ok(())
    }

    /// Drop local history in favor of `blocks`, a clone of a longer peer
    /// chain, and rebuild the scratchpad above its tip. Pending scratchpad
    /// events are discarded with the old history.
    pub fn replace_with(&mut self, blocks: Vec<Block>) {
        let Some(tip) = blocks.last() else { return };

        self.scratchpad = Block::new(
            &self.config,
            tip.index() + 1,
            tip.hash().to_owned(),
            utils::unix_now(),
        );
        self.blocks = blocks;
    }

    fn install_tip(&mut self, block: Block) {
        self.scratchpad = Block::new(
            &self.config,
            block.index() + 1,
            block.hash().to_owned(),
            utils::unix_now(),
        );
        self.blocks.push(block);
    }

    /// Malicious rewrite: falsify the first `kind` event of the first
    /// non-genesis block, refreshing only that event's hash. The stale
    /// block header is the point: the replica becomes detectably
    /// inconsistent.
    pub(crate) fn falsify_first(&mut self, kind: EventKind, payload: &[u8]) -> bool {
        let config = Arc::clone(&self.config);
        match self.blocks.get_mut(1) {
            Some(block) => block.falsify_event(&config, kind, payload),
            None => false,
        }
    }

    /// Number of committed blocks, genesis included.
    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The genesis block.
    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// The committed tip. A chain always holds at least its genesis.
    pub fn tip(&self) -> &Block {
        self.blocks.last().unwrap()
    }

    /// All committed blocks in index order.
    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The uncommitted block new events accumulate into.
    #[inline]
    pub fn scratchpad(&self) -> &Block {
        &self.scratchpad
    }

    /// True when some committed block's stored hash equals `hash`.
    pub fn contains(&self, hash: &str) -> bool {
        self.blocks.iter().any(|b| b.hash() == hash)
    }

    /// True when some committed block's content-derived hash equals
    /// `hash`. This is the identity the consensus oracle compares by; a
    /// tampered block keeps its stored hash but loses this one.
    pub fn contains_content(&self, hash: &str) -> bool {
        self.blocks
            .iter()
            .any(|b| b.computed_hash(&self.config) == hash)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{BlockAcceptError, Chain};
    use crate::block::Block;
    use crate::config::Config;
    use crate::event::{self, EventValidator};
    use crate::hash::HashFn;

    fn chain() -> Chain {
        Chain::with_genesis_timestamp(Arc::new(Config::default()), 1_700_000_000)
    }

    /// Config whose difficulty every block passes, for exercising the
    /// acceptance path without mining.
    fn lenient() -> Config {
        Config {
            difficulty: 0,
            ..Config::default()
        }
    }

    #[test]
    fn genesis_only_chain_is_deterministic() {
        let cfg = Config::default();
        let c = chain();

        assert_eq!(c.len(), 1);
        let genesis = c.genesis();
        assert_eq!(genesis.index(), 0);
        assert_eq!(genesis.previous_hash(), cfg.hasher.zero_digest());
        assert!(genesis.events().is_empty());

        let zeros = cfg.hasher.zero_digest();
        let expected = cfg
            .hasher
            .digest(format!("{}{}{}{}{}", 0, 1_700_000_000, zeros, zeros, 0).as_bytes());
        assert_eq!(genesis.hash(), expected);
        assert_eq!(chain().genesis().hash(), genesis.hash());
    }

    #[test]
    fn scratchpad_tracks_the_tip() {
        let c = chain();
        assert_eq!(c.scratchpad().index(), c.len());
        assert_eq!(c.scratchpad().previous_hash(), c.tip().hash());
    }

    #[test]
    fn append_then_seal_advances_the_chain() {
        let mut c = chain();
        c.append_event(event::TRANSFER, br#"{"from":"System","to":"Alice","amount":100}"#)
            .unwrap();

        assert_eq!(c.scratchpad().merkle_root(), c.scratchpad().events()[0].hash());

        c.seal_and_commit();
        assert_eq!(c.len(), 2);
        assert_eq!(c.tip().index(), 1);
        assert_eq!(c.scratchpad().index(), 2);
        assert_eq!(c.scratchpad().previous_hash(), c.tip().hash());
        assert!(c.tip().verify(c.config()));
    }

    #[test]
    fn overflowing_append_seals_and_retries() {
        let mut c = chain();
        let cap = c.config().max_events_per_block;

        for _ in 0..cap {
            c.append_event(event::MESSAGE, b"{}").unwrap();
        }
        assert_eq!(c.len(), 1);
        assert_eq!(c.scratchpad().event_count(), cap);

        c.append_event(event::MESSAGE, b"{}").unwrap();
        assert_eq!(c.len(), 2);
        assert_eq!(c.scratchpad().event_count(), 1);
    }

    #[test]
    fn replayed_appends_build_identical_structures() {
        let mut a = chain();
        let mut b = chain();
        for c in [&mut a, &mut b] {
            c.append_event(event::TRANSFER, b"{\"amount\":1}").unwrap();
            c.append_event(event::MESSAGE, b"{}").unwrap();
            c.seal_and_commit();
        }

        assert_eq!(a.len(), b.len());
        assert_eq!(a.genesis().hash(), b.genesis().hash());
        for (x, y) in a.blocks().iter().zip(b.blocks()) {
            assert_eq!(x.index(), y.index());
            assert_eq!(x.event_count(), y.event_count());
            for (ex, ey) in x.events().iter().zip(y.events()) {
                assert_eq!(ex.kind(), ey.kind());
                assert_eq!(ex.payload(), ey.payload());
            }
        }
    }

    #[test]
    fn race_check_commits_only_on_a_current_tip() {
        let mut c = chain();

        let mut candidate = c.scratchpad().clone();
        candidate.refresh(c.config());
        assert!(c.try_commit_mined(candidate.clone()));
        assert_eq!(c.len(), 2);
        assert_eq!(c.scratchpad().previous_hash(), c.tip().hash());

        // The same candidate lost the race to itself.
        assert!(!c.try_commit_mined(candidate));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn receive_appends_a_broadcast_block() {
        let cfg = Arc::new(lenient());
        let mut sender = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);
        let mut receiver = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);

        sender.append_event(event::TRANSFER, b"{}").unwrap();
        sender.seal_and_commit();

        receiver.receive(&sender.blocks()[1]).unwrap();
        assert_eq!(receiver.len(), 2);
        assert_eq!(receiver.tip().hash(), sender.tip().hash());
        assert_eq!(receiver.scratchpad().previous_hash(), receiver.tip().hash());
    }

    #[test]
    fn receive_rejects_unknown_parents() {
        let cfg = Arc::new(lenient());
        let mut receiver = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);
        let mut stranger = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_600_000_000);

        stranger.seal_and_commit();
        let foreign = stranger.tip().clone();

        assert!(matches!(
            receiver.receive(&foreign),
            Err(BlockAcceptError::UnknownParent { .. })
        ));
        assert_eq!(receiver.len(), 1);
    }

    #[test]
    fn receive_rejects_blocks_that_do_not_lengthen() {
        let cfg = Arc::new(lenient());
        let mut sender = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);
        let mut receiver = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);

        sender.seal_and_commit();
        let block = sender.tip().clone();

        receiver.receive(&block).unwrap();
        assert!(matches!(
            receiver.receive(&block),
            Err(BlockAcceptError::NotLonger { .. })
        ));
    }

    #[test]
    fn receive_rejects_an_overshooting_index() {
        let cfg = Arc::new(lenient());
        let mut receiver = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);

        // Parent is the tip, but the index claims a position far past it.
        let mut forged = Block::new(&cfg, 50, receiver.tip().hash().to_owned(), 1_700_000_001);
        forged.refresh(&cfg);

        assert!(matches!(
            receiver.receive(&forged),
            Err(BlockAcceptError::NotLonger { .. })
        ));
        assert_eq!(receiver.len(), 1);
    }

    #[test]
    fn receive_rejects_weak_proofs() {
        // A hasher that can never produce a leading zero.
        let cfg = Arc::new(Config {
            hasher: HashFn::new("ff", 8, |_| "ffffffff".to_string()),
            ..Config::default()
        });
        let mut sender = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);
        let mut receiver = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);

        sender.seal_and_commit();
        assert!(matches!(
            receiver.receive(&sender.blocks()[1]),
            Err(BlockAcceptError::WeakProof { .. })
        ));
    }

    #[test]
    fn receive_reapplies_the_validation_hook() {
        let permissive = Arc::new(lenient());
        let strict = Arc::new(Config {
            difficulty: 0,
            validator: EventValidator::new("no-transfers", |e| e.kind() != event::TRANSFER),
            ..Config::default()
        });

        let mut sender = Chain::with_genesis_timestamp(Arc::clone(&permissive), 1_700_000_000);
        let mut receiver = Chain::with_genesis_timestamp(strict, 1_700_000_000);

        sender.append_event(event::TRANSFER, b"{}").unwrap();
        sender.seal_and_commit();

        assert!(matches!(
            receiver.receive(&sender.blocks()[1]),
            Err(BlockAcceptError::InvalidEvent { .. })
        ));
    }

    #[test]
    fn replace_with_adopts_a_longer_history() {
        let cfg = Arc::new(lenient());
        let mut longer = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);
        let mut shorter = Chain::with_genesis_timestamp(Arc::clone(&cfg), 1_700_000_000);

        longer.append_event(event::TRANSFER, b"{}").unwrap();
        longer.seal_and_commit();
        longer.seal_and_commit();

        shorter.replace_with(longer.blocks().to_vec());
        assert_eq!(shorter.len(), 3);
        assert_eq!(shorter.tip().hash(), longer.tip().hash());
        assert_eq!(shorter.scratchpad().index(), 3);
        assert_eq!(shorter.scratchpad().previous_hash(), shorter.tip().hash());
    }

    #[test]
    fn continuity_holds_across_mixed_commits() {
        let mut c = chain();
        c.append_event(event::TRANSFER, b"{}").unwrap();
        c.seal_and_commit();
        let mut candidate = c.scratchpad().clone();
        candidate.refresh(c.config());
        assert!(c.try_commit_mined(candidate));

        for (i, pair) in c.blocks().windows(2).enumerate() {
            assert_eq!(pair[1].index(), i + 1);
            assert_eq!(pair[1].previous_hash(), pair[0].hash());
        }
    }
}
