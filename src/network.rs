//! The process-wide view: registry, broadcast, consensus, recovery

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, info};

use crate::block::Block;
use crate::chain::Chain;
use crate::config::Config;
use crate::miner;
use crate::node::{Node, NodeId, NodeSpec};
use crate::utils;

/// Registry-level failures.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("network is at its {0}-node capacity")]
    AtCapacity(usize),
    #[error("worker thread for node {id} could not be spawned")]
    Spawn {
        id: NodeId,
        #[source]
        source: std::io::Error,
    },
}

/// A network of simulated nodes.
///
/// One value owns the registry, the shutdown flag, and the configuration
/// every replica shares; workers hold it behind an `Arc`. Every chain in
/// the registry is seeded with the same genesis timestamp, so all replicas
/// agree on the genesis block byte for byte.
///
/// Lock order is registry before chain, everywhere. Mining never holds a
/// lock (candidates are clones), and joins happen only after the registry
/// lock is released.
#[derive(Debug)]
pub struct Network {
    config: Arc<Config>,
    genesis_timestamp: i64,
    nodes: Mutex<Vec<Arc<Node>>>,
    shutdown: AtomicBool,
}

impl Network {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Network {
            config: Arc::new(config),
            genesis_timestamp: utils::unix_now(),
            nodes: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Register a node and start its worker. The returned id doubles as the
    /// node's registry index; the registry only ever grows.
    pub fn spawn_node(self: &Arc<Self>, spec: NodeSpec) -> Result<NodeId, NetworkError> {
        let mut nodes = self.nodes.lock().unwrap();
        if nodes.len() >= self.config.max_nodes {
            return Err(NetworkError::AtCapacity(self.config.max_nodes));
        }

        let id = nodes.len();
        let chain =
            Chain::with_genesis_timestamp(Arc::clone(&self.config), self.genesis_timestamp);
        let node = Arc::new(Node::new(id, chain, spec));

        self.start_worker(&node)?;
        nodes.push(Arc::clone(&node));

        info!(
            node = id,
            mining = spec.mining,
            malicious = spec.malicious,
            "node joined"
        );
        Ok(id)
    }

    fn start_worker(self: &Arc<Self>, node: &Arc<Node>) -> Result<(), NetworkError> {
        let network = Arc::clone(self);
        let worker_node = Arc::clone(node);

        let handle = thread::Builder::new()
            .name(format!("node-{}", node.id()))
            .spawn(move || miner::run_worker(network, worker_node))
            .map_err(|source| NetworkError::Spawn {
                id: node.id(),
                source,
            })?;

        node.set_worker(handle);
        Ok(())
    }

    /// Offer `block` to every other active node. Each peer screens it under
    /// its own chain lock; rejections stay local to the rejecting peer.
    pub fn broadcast(&self, block: &Block, sender: NodeId) {
        let nodes = self.nodes.lock().unwrap();
        for peer in nodes.iter().filter(|n| n.id() != sender && n.is_active()) {
            match peer.chain().receive(block) {
                Ok(()) => debug!(
                    from = sender,
                    to = peer.id(),
                    index = block.index(),
                    "block accepted"
                ),
                Err(reason) => debug!(
                    from = sender,
                    to = peer.id(),
                    index = block.index(),
                    %reason,
                    "block rejected"
                ),
            }
        }
    }

    /// Consensus oracle: true iff the fraction of active nodes holding a
    /// block whose contents produce `block`'s content hash reaches the
    /// configured threshold. Content identity is what makes a tampered
    /// replica drop out of the count even though its stored hash is stale.
    /// Tests and drivers call this; the protocol itself never does.
    pub fn has_consensus(&self, block: &Block) -> bool {
        let target = block.computed_hash(&self.config);

        let nodes = self.nodes.lock().unwrap();
        let mut active = 0usize;
        let mut holders = 0usize;
        for node in nodes.iter().filter(|n| n.is_active()) {
            active += 1;
            if node.chain().contains_content(&target) {
                holders += 1;
            }
        }

        active > 0 && holders as f64 / active as f64 >= self.config.consensus_threshold
    }

    /// Replace `id`'s chain with a clone of the longest chain held by any
    /// other active node, when that chain is strictly longer. Runs under
    /// the registry lock, which serializes every dual-chain acquisition;
    /// peer chain locks are taken one at a time, source before destination.
    /// Unknown ids are ignored.
    pub fn synchronize(&self, id: NodeId) {
        let nodes = self.nodes.lock().unwrap();
        let Some(node) = nodes.get(id) else { return };

        let mut best_len = node.chain().len();
        let mut best: Option<Vec<Block>> = None;
        for peer in nodes.iter().filter(|n| n.id() != id && n.is_active()) {
            let chain = peer.chain();
            if chain.len() > best_len {
                best_len = chain.len();
                best = Some(chain.blocks().to_vec());
            }
        }

        if let Some(blocks) = best {
            node.chain().replace_with(blocks);
            info!(node = id, blocks = best_len, "chain replaced from longest peer");
        }
    }

    /// Deactivate a node and wait for its worker to wind down. Unknown ids
    /// are ignored.
    pub fn stop_node(&self, id: NodeId) {
        let handle = {
            let nodes = self.nodes.lock().unwrap();
            let Some(node) = nodes.get(id) else { return };
            node.set_active(false);
            node.take_worker()
        };

        // The worker may be blocked on the registry lock inside a
        // broadcast; join only after releasing it.
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        info!(node = id, "node stopped");
    }

    /// Reactivate a stopped node with a fresh worker, then pull it up to
    /// the longest chain in the registry. Restarting an active node (or an
    /// unknown id) is ignored.
    pub fn restart_node(self: &Arc<Self>, id: NodeId) -> Result<(), NetworkError> {
        {
            let nodes = self.nodes.lock().unwrap();
            let Some(node) = nodes.get(id) else {
                return Ok(());
            };
            if node.is_active() {
                return Ok(());
            }
            node.set_active(true);
            self.start_worker(node)?;
        }

        self.synchronize(id);
        info!(node = id, "node restarted");
        Ok(())
    }

    /// Raise the shutdown flag and join every worker. Nodes stay
    /// registered and queryable afterwards; only the workers end.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);

        let handles: Vec<_> = {
            let nodes = self.nodes.lock().unwrap();
            nodes.iter().filter_map(|n| n.take_worker()).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
        info!("network shut down");
    }

    /// Handle to a registered node.
    pub fn node(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.lock().unwrap().get(id).cloned()
    }

    /// Number of registered nodes, active or not.
    pub fn node_count(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }

    /// Number of nodes currently participating.
    pub fn active_count(&self) -> usize {
        self.nodes.lock().unwrap().iter().filter(|n| n.is_active()).count()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Network, NetworkError};
    use crate::config::Config;
    use crate::node::NodeSpec;

    /// Listeners only: workers idle, so registry state is deterministic.
    fn quiet_network(max_nodes: usize) -> std::sync::Arc<Network> {
        Network::new(Config {
            max_nodes,
            loop_interval: Duration::from_millis(5),
            ..Config::default()
        })
    }

    #[test]
    fn ids_are_registry_indices() {
        let network = quiet_network(4);
        for expected in 0..3 {
            let id = network.spawn_node(NodeSpec::listener()).unwrap();
            assert_eq!(id, expected);
        }
        assert_eq!(network.node_count(), 3);
        network.shutdown();
    }

    #[test]
    fn registry_is_bounded() {
        let network = quiet_network(2);
        network.spawn_node(NodeSpec::listener()).unwrap();
        network.spawn_node(NodeSpec::listener()).unwrap();

        assert!(matches!(
            network.spawn_node(NodeSpec::listener()),
            Err(NetworkError::AtCapacity(2))
        ));
        network.shutdown();
    }

    #[test]
    fn every_replica_shares_the_genesis_block() {
        let network = quiet_network(4);
        for _ in 0..3 {
            network.spawn_node(NodeSpec::listener()).unwrap();
        }

        let genesis = network.node(0).unwrap().chain().genesis().clone();
        for id in 1..3 {
            let node = network.node(id).unwrap();
            let chain = node.chain();
            assert_eq!(chain.genesis().hash(), genesis.hash());
            assert_eq!(chain.genesis().timestamp(), genesis.timestamp());
            assert!(chain.genesis().events().is_empty());
        }
        network.shutdown();
    }

    #[test]
    fn stop_deactivates_and_unknown_ids_are_ignored() {
        let network = quiet_network(3);
        let id = network.spawn_node(NodeSpec::listener()).unwrap();

        network.stop_node(id);
        assert!(!network.node(id).unwrap().is_active());
        assert_eq!(network.active_count(), 0);
        assert_eq!(network.node_count(), 1);

        network.stop_node(99);
        network.synchronize(99);
        network.shutdown();
    }

    #[test]
    fn consensus_needs_a_majority_of_active_nodes() {
        let network = quiet_network(3);
        let a = network.spawn_node(NodeSpec::listener()).unwrap();
        network.spawn_node(NodeSpec::listener()).unwrap();

        let block = {
            let node = network.node(a).unwrap();
            let mut chain = node.chain();
            chain.seal_and_commit();
            chain.tip().clone()
        };

        // Held by one replica of two: 0.5 misses the 0.51 threshold.
        assert!(!network.has_consensus(&block));

        let blocks = network.node(a).unwrap().chain().blocks().to_vec();
        network.node(1).unwrap().chain().replace_with(blocks);
        assert!(network.has_consensus(&block));
        network.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent() {
        let network = quiet_network(2);
        network.spawn_node(NodeSpec::listener()).unwrap();
        network.shutdown();
        network.shutdown();
        assert!(network.is_shutdown());
    }
}
