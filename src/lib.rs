/*!
In-process simulator of a small blockchain network.

Every node owns a replica of a hash-chained ledger and a worker thread
that mines candidate blocks by proof-of-work, commits winners to its own
chain, and broadcasts them to every other active node. Peers accept a
broadcast block only when it extends their tip into a strictly longer
chain; divergence is healed by adopting the longest chain in the registry.
Designated malicious nodes rewrite committed events in place, leaving
their replicas detectably inconsistent, which the consensus oracle then
exposes.

```no_run
use chain_sim::prelude::*;
use chain_sim::event;

let network = Network::new(Config::default());
let alice = network.spawn_node(NodeSpec::miner()).unwrap();
network.spawn_node(NodeSpec::listener()).unwrap();

if let Some(node) = network.node(alice) {
    node.chain()
        .append_event(event::TRANSFER, br#"{"from":"System","to":"Alice","amount":100}"#)
        .unwrap();
}

std::thread::sleep(std::time::Duration::from_secs(2));
network.shutdown();
```
*/

pub mod block;
pub mod chain;
pub mod config;
pub mod event;
pub mod hash;
pub mod merkle;
pub mod miner;
pub mod network;
pub mod node;
pub mod prelude;

pub(crate) mod utils;
