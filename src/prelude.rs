/*!
Re-export of the datatypes needed to assemble and drive a simulated
network. Must be imported manually.

```
use chain_sim::prelude::*;
```
*/

use crate::{block, chain, config, event, hash, merkle, miner, network, node};

pub use block::{Block, BlockError};

pub use chain::{BlockAcceptError, Chain, ChainError};

pub use config::Config;

pub use event::{Event, EventKind, EventValidator};

pub use hash::HashFn;

pub use merkle::{merkle_root, MerkleNode};

pub use miner::proof_of_work;

pub use network::{Network, NetworkError};

pub use node::{Node, NodeId, NodeSpec};
