//! CLI launcher: stands up a single `chordite` node over UDP, optionally bootstrapping
//! through a known peer.

use chordite::{Node, NodeConfig, Pointer, SystemClock, UdpTransport};
use std::net::SocketAddr;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "chordite-node", about = "run a Chord DHT node")]
struct Opt {
    /// Address to bind and advertise, e.g. 0.0.0.0:7000. A random high port is chosen if
    /// omitted.
    #[structopt(long)]
    listen: Option<SocketAddr>,

    /// Address of an existing ring member to join through. Omit only when standing up
    /// the first node of a new ring.
    #[structopt(long)]
    bootstrap: Option<SocketAddr>,

    /// Seconds between stabilize rounds.
    #[structopt(long, default_value = "10")]
    stabilize_interval: u64,

    /// Seconds to wait for a query response before treating it as failed.
    #[structopt(long, default_value = "10")]
    query_timeout: u64,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    let opt = Opt::from_args();

    let listen = opt.listen.unwrap_or_else(ephemeral_addr);
    let local = Pointer::new(listen);
    log::info!("starting node {} on {}", local.id, listen);

    let config = NodeConfig {
        stabilize_interval: Duration::from_secs(opt.stabilize_interval),
        query_timeout: Duration::from_secs(opt.query_timeout),
        ..NodeConfig::default()
    };

    let transport = UdpTransport::bind(local)?;
    let mut node = Node::new(local, config, transport, SystemClock);
    let known = opt.bootstrap.map(Pointer::new);
    node.start(known)?;
    node.main_loop()?;
    Ok(())
}

/// Picks a random high port on all interfaces when `--listen` is omitted.
fn ephemeral_addr() -> SocketAddr {
    use rand::Rng;
    let port: u16 = rand::thread_rng().gen_range(20000, 60000);
    format!("0.0.0.0:{}", port).parse().unwrap()
}
