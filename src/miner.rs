//! The proof-of-work search and the per-node worker loop

use std::sync::Arc;
use std::thread;

use rand::Rng;
use tracing::debug;

use crate::block::Block;
use crate::config::Config;
use crate::network::Network;
use crate::node::Node;

/// Chance that a yield point skips its backoff, so concurrent miners do
/// not stay in lockstep.
const BACKOFF_SKIP_ODDS: f64 = 0.2;

/// Search for a nonce under which `block`'s hash carries at least
/// `cfg.difficulty` leading `'0'` characters.
///
/// The search starts at zero and counts up. Every `cfg.pow_yield_interval`
/// trials it polls `cancelled`, aborting with `false`, and backs off for
/// `cfg.mining_backoff`, occasionally skipping the pause at random. The one
/// correctness contract: a `true` return means the block's current hash
/// satisfies the difficulty predicate.
pub fn proof_of_work(block: &mut Block, cfg: &Config, cancelled: impl Fn() -> bool) -> bool {
    let mut rng = rand::thread_rng();
    let yield_interval = cfg.pow_yield_interval.max(1);

    let mut nonce: u64 = 0;
    loop {
        block.set_nonce(cfg, nonce);
        if block.meets_difficulty(cfg) {
            return true;
        }

        nonce += 1;
        if nonce % yield_interval == 0 {
            if cancelled() {
                return false;
            }
            if !rng.gen_bool(BACKOFF_SKIP_ODDS) {
                thread::sleep(cfg.mining_backoff);
            }
        }
    }
}

/// Body of a node's worker thread.
///
/// Runs until shutdown or until the node is stopped. Non-mining nodes keep
/// the loop (so stop and restart behave uniformly) but never produce
/// blocks. Each iteration clones the scratchpad under the chain lock,
/// mines on the clone with no lock held, and commits only if the tip is
/// unchanged; losing that race silently discards the candidate.
pub(crate) fn run_worker(network: Arc<Network>, node: Arc<Node>) {
    let cfg = network.config();
    let mut rng = rand::thread_rng();

    while !network.is_shutdown() && node.is_active() {
        if node.is_mining() {
            let mut candidate = node.chain().scratchpad().clone();

            let mined = proof_of_work(&mut candidate, cfg, || {
                network.is_shutdown() || !node.is_active()
            });

            if mined && node.is_active() {
                let committed = node.chain().try_commit_mined(candidate.clone());
                if committed {
                    debug!(
                        node = node.id(),
                        index = candidate.index(),
                        hash = candidate.hash(),
                        "mined block committed"
                    );
                    network.broadcast(&candidate, node.id());
                } else {
                    debug!(node = node.id(), index = candidate.index(), "lost mining race");
                }
            }
        }

        if node.is_malicious() && rng.gen_bool(cfg.tamper_probability) {
            node.tamper();
        }

        thread::sleep(cfg.loop_interval);
    }
}
