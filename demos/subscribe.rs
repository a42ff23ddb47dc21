//! Connects to a publisher and logs every message it coalesces and
//! dispatches, until interrupted.

use clap::Parser;
use tether::{Compression, Node};

#[derive(Parser)]
#[command(about = "Subscribes to a publisher and logs received messages")]
struct Args {
    /// Host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// TCP port to connect to.
    #[arg(long, default_value_t = 7400)]
    port: u16,

    /// The peer is publishing with zlib compression applied.
    #[arg(long)]
    zlib: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let compression = if args.zlib {
        Compression::Zlib
    } else {
        Compression::None
    };

    let node = Node::new(30.0);
    let _subscriber = node.subscribe(&args.host, args.port, compression, |msg_type_id, body| {
        tracing::info!(msg_type_id, bytes = body.len(), "received message");
    })?;

    tracing::info!(host = %args.host, port = args.port, "subscriber connecting");
    node.run();
    Ok(())
}
