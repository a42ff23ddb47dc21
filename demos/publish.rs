//! Publishes an incrementing counter on a fixed message type, once per
//! tick of the node's pacer, until interrupted.

use clap::Parser;
use tether::{Compression, Node};

#[derive(Parser)]
#[command(about = "Publishes a counter message at a fixed rate")]
struct Args {
    /// TCP port to bind the publisher on.
    #[arg(long, default_value_t = 7400)]
    port: u16,

    /// Publish rate in messages per second.
    #[arg(long, default_value_t = 10.0)]
    fps: f64,

    /// Message type id to publish under.
    #[arg(long, default_value_t = 1)]
    msg_type_id: u32,

    /// Apply zlib compression to the outgoing payload.
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

    let mut node = Node::new(args.fps);
    let publisher = node.advertise(args.port, compression)?;

    tracing::info!(port = args.port, "publisher listening");

    let mut count: u64 = 0;
    loop {
        let payload = bytes::Bytes::from(count.to_le_bytes().to_vec());
        publisher.publish(args.msg_type_id, payload);
        count += 1;
        node.sleep().await;
    }
}
