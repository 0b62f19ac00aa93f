//! Network participants

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread::JoinHandle;

use tracing::warn;

use crate::chain::Chain;
use crate::event;

/// Index of a node in its network's registry.
pub type NodeId = usize;

/// Payload the tamper procedure writes over a committed transfer.
pub(crate) const FRAUDULENT_TRANSFER: &[u8] =
    br#"{"from":"System","to":"Mallory","amount":1000000}"#;

/// What a node does with its worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpec {
    /// Whether the worker produces blocks.
    pub mining: bool,
    /// Whether the node occasionally rewrites its own committed history.
    pub malicious: bool,
}

impl NodeSpec {
    /// An honest mining node.
    pub fn miner() -> Self {
        NodeSpec {
            mining: true,
            malicious: false,
        }
    }

    /// A node that holds a replica and accepts broadcasts but never mines.
    pub fn listener() -> Self {
        NodeSpec {
            mining: false,
            malicious: false,
        }
    }

    /// A mining node that also tampers with committed blocks.
    pub fn malicious() -> Self {
        NodeSpec {
            mining: true,
            malicious: true,
        }
    }
}

impl Default for NodeSpec {
    fn default() -> Self {
        Self::miner()
    }
}

/// One participant: a chain replica, a worker thread, and the flags
/// describing its behavior. Nodes are created by
/// [`Network::spawn_node`](crate::network::Network::spawn_node) and always
/// live behind an `Arc` shared between the registry and the worker.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    chain: Mutex<Chain>,
    is_mining: bool,
    is_malicious: bool,
    active: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    pub(crate) fn new(id: NodeId, chain: Chain, spec: NodeSpec) -> Self {
        Node {
            id,
            chain: Mutex::new(chain),
            is_mining: spec.mining,
            is_malicious: spec.malicious,
            active: AtomicBool::new(true),
            worker: Mutex::new(None),
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn is_mining(&self) -> bool {
        self.is_mining
    }

    #[inline]
    pub fn is_malicious(&self) -> bool {
        self.is_malicious
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Lock and expose this node's chain replica. A poisoned lock means a
    /// worker already panicked, and the panic is propagated.
    pub fn chain(&self) -> MutexGuard<'_, Chain> {
        self.chain.lock().unwrap()
    }

    pub(crate) fn set_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock().unwrap() = Some(handle);
    }

    pub(crate) fn take_worker(&self) -> Option<JoinHandle<()>> {
        self.worker.lock().unwrap().take()
    }

    /// Rewrite the first transfer in the first committed block with a
    /// fraudulent payload, refreshing only the event hash. The block's
    /// Merkle root and hash are left stale on purpose: the replica is now
    /// detectably inconsistent, and exposing that is what the tamper
    /// exists for. Returns whether anything was rewritten.
    pub fn tamper(&self) -> bool {
        let tampered = self
            .chain()
            .falsify_first(event::TRANSFER, FRAUDULENT_TRANSFER);
        if tampered {
            warn!(node = self.id, "rewrote a committed transfer");
        }
        tampered
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Node, NodeSpec};
    use crate::chain::Chain;
    use crate::config::Config;
    use crate::event;

    fn node(spec: NodeSpec) -> Node {
        let cfg = Arc::new(Config::default());
        Node::new(0, Chain::with_genesis_timestamp(cfg, 1_700_000_000), spec)
    }

    #[test]
    fn spec_flags_carry_through() {
        let n = node(NodeSpec::malicious());
        assert!(n.is_mining());
        assert!(n.is_malicious());
        assert!(n.is_active());

        assert!(!node(NodeSpec::listener()).is_mining());
    }

    #[test]
    fn tamper_corrupts_the_first_committed_transfer() {
        let n = node(NodeSpec::malicious());
        {
            let mut chain = n.chain();
            chain.append_event(event::TRANSFER, b"{\"amount\":5}").unwrap();
            chain.seal_and_commit();
        }

        assert!(n.tamper());

        let chain = n.chain();
        let block = &chain.blocks()[1];
        assert!(!block.verify(chain.config()));
        assert_eq!(block.events()[0].payload(), super::FRAUDULENT_TRANSFER);
    }

    #[test]
    fn tamper_without_a_transfer_is_a_no_op() {
        let n = node(NodeSpec::malicious());
        {
            let mut chain = n.chain();
            chain.append_event(event::MESSAGE, b"{}").unwrap();
            chain.seal_and_commit();
        }

        assert!(!n.tamper());
        let chain = n.chain();
        assert!(chain.blocks()[1].verify(chain.config()));
    }

    #[test]
    fn tamper_skips_a_genesis_only_chain() {
        let n = node(NodeSpec::malicious());
        assert!(!n.tamper());
    }
}
