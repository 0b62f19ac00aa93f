//! Runtime configuration shared by every node in a network

use std::time::Duration;

use crate::event::EventValidator;
use crate::hash::HashFn;

/// Tunables for a simulated network. One value is built by the driver and
/// shared (behind an `Arc`) by the registry and every chain replica.
///
/// [`Config::default`] reproduces the reference behavior: 64-character
/// SHA-256 hashes, difficulty 2, blocks of at most 100 events, networks of
/// at most 10 nodes.
#[derive(Debug, Clone)]
pub struct Config {
    /// Leading `'0'` characters a mined block's hash must carry.
    pub difficulty: usize,
    /// Hard cap on events per block.
    pub max_events_per_block: usize,
    /// Event slots pre-allocated in a fresh block.
    pub initial_event_capacity: usize,
    /// Registry bound; `spawn_node` fails past it.
    pub max_nodes: usize,
    /// Nonce trials between cancellation polls during proof-of-work.
    /// Must be nonzero.
    pub pow_yield_interval: u64,
    /// Pause inserted into the nonce search at each yield point.
    pub mining_backoff: Duration,
    /// Pause between miner-loop iterations.
    pub loop_interval: Duration,
    /// Chance per loop iteration that a malicious node rewrites history.
    /// Must lie in `0.0..=1.0`.
    pub tamper_probability: f64,
    /// Fraction of active nodes that must hold a block for the consensus
    /// oracle to report acceptance.
    pub consensus_threshold: f64,
    /// Digest function every hash in the simulation runs through.
    pub hasher: HashFn,
    /// Event admission hook, applied on append and again on broadcast.
    pub validator: EventValidator,
}

impl Config {
    /// Hash width in hex characters.
    pub fn hash_len(&self) -> usize {
        self.hasher.width()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            difficulty: 2,
            max_events_per_block: 100,
            initial_event_capacity: 10,
            max_nodes: 10,
            pow_yield_interval: 10,
            mining_backoff: Duration::from_millis(10),
            loop_interval: Duration::from_millis(50),
            tamper_probability: 0.05,
            consensus_threshold: 0.51,
            hasher: HashFn::sha256(64),
            validator: EventValidator::accept_all(),
        }
    }
}
