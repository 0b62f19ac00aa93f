use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chain_sim::event;
use chain_sim::prelude::*;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let start = Instant::now();
    let network = Network::new(Config::default());

    let alice = network.spawn_node(NodeSpec::miner())?;
    network.spawn_node(NodeSpec::miner())?;
    network.spawn_node(NodeSpec::miner())?;
    let mallory = network.spawn_node(NodeSpec::malicious())?;

    if let Some(node) = network.node(alice) {
        let mut chain = node.chain();
        chain.append_event(event::TRANSFER, br#"{"from":"System","to":"Alice","amount":100}"#)?;
        chain.append_event(event::TRANSFER, br#"{"from":"System","to":"Bob","amount":50}"#)?;
        chain.append_event(event::MESSAGE, br#"{"message":"Ledger initialized"}"#)?;
        chain.append_event(event::TRANSFER, br#"{"from":"Alice","to":"Bob","amount":10}"#)?;
        chain.append_event(
            event::CONTRACT_CALL,
            br#"{"action":"contract_execution","contract_id":123}"#,
        )?;
    }

    info!("mining across {} nodes", network.node_count());
    thread::sleep(Duration::from_secs(3));

    // Take a node down, let the rest of the network move on without it,
    // then bring it back and let synchronization catch it up.
    network.stop_node(alice);
    thread::sleep(Duration::from_secs(2));
    network.restart_node(alice)?;
    thread::sleep(Duration::from_secs(1));

    network.shutdown();

    println!("node  blocks  tip                  consensus  flags");
    for id in 0..network.node_count() {
        let Some(node) = network.node(id) else { continue };
        let (len, tip) = {
            let chain = node.chain();
            (chain.len(), chain.tip().clone())
        };
        let accepted = network.has_consensus(&tip);
        let flags = match (node.is_mining(), node.is_malicious()) {
            (_, true) => "malicious",
            (true, false) => "miner",
            (false, false) => "listener",
        };
        println!(
            "{id:<4}  {len:<6}  {}…  {accepted:<9}  {flags}",
            &tip.hash()[..16]
        );
    }
    if let Some(node) = network.node(mallory) {
        let chain = node.chain();
        let intact = chain.blocks().iter().all(|b| b.verify(chain.config()));
        println!("malicious replica internally consistent: {intact}");
    }
    println!("Elapsed time: {:.2} secs", start.elapsed().as_secs_f64());

    Ok(())
}
