//! End-to-end scenarios run against real TCP sockets on loopback.

use bytes::Bytes;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether::{Compression, Node};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Encodes the same `{msg_type_id, msg_size}` little-endian header the
/// wire codec uses, without reaching into the crate's private modules.
fn header_bytes(msg_type_id: u32, msg_size: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[0..4].copy_from_slice(&msg_type_id.to_le_bytes());
    buf[4..8].copy_from_slice(&msg_size.to_le_bytes());
    buf
}

/// Polls `condition` until it returns `true` or `timeout` elapses,
/// driving `node`'s main executor between checks. Panics on timeout.
async fn wait_for(node: &Node, timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        node.run_once();
        if condition() {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// E1: a single publisher/subscriber pair exchanges one message.
#[tokio::test]
async fn single_publish_is_received() {
    let pub_node = Node::new(1000.0);
    let publisher = pub_node.advertise(0, Compression::None).unwrap();
    let port = publisher.port();

    let sub_node = Node::new(1000.0);
    let received = Arc::new(Mutex::new(None));
    let received_clone = received.clone();
    let _subscriber = sub_node
        .subscribe("127.0.0.1", port, Compression::None, move |type_id, body| {
            *received_clone.lock().unwrap() = Some((type_id, body));
        })
        .unwrap();

    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.publish(42, Bytes::from_static(b"hello"));
        received.lock().unwrap().is_some()
    })
    .await;

    let (type_id, body) = received.lock().unwrap().take().unwrap();
    assert_eq!(type_id, 42);
    assert_eq!(body.as_ref(), b"hello");
}

/// E2: a burst of rapid publishes on one type_id coalesces down to the
/// latest payload by the time a slow handler gets around to it.
#[tokio::test]
async fn rapid_publishes_coalesce_to_latest() {
    let pub_node = Node::new(1000.0);
    let publisher = pub_node.advertise(0, Compression::None).unwrap();
    let port = publisher.port();

    let sub_node = Node::new(1000.0);
    let seen_count = Arc::new(AtomicUsize::new(0));
    let last_value = Arc::new(Mutex::new(0u32));
    let seen_count_clone = seen_count.clone();
    let last_value_clone = last_value.clone();
    let _subscriber = sub_node
        .subscribe("127.0.0.1", port, Compression::None, move |_type_id, body| {
            let value = u32::from_le_bytes(body.as_ref().try_into().unwrap());
            *last_value_clone.lock().unwrap() = value;
            seen_count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    // Wait for the connection to come up before bursting.
    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.peer_count() > 0
    })
    .await;

    for value in 0u32..200 {
        publisher.publish(7, Bytes::from(value.to_le_bytes().to_vec()));
    }

    wait_for(&sub_node, Duration::from_secs(2), || {
        *last_value.lock().unwrap() == 199
    })
    .await;

    // The ACK-gated pipeline guarantees the final value is delivered;
    // it does not guarantee every intermediate value was.
    assert!(seen_count.load(Ordering::SeqCst) < 200);
    assert_eq!(*last_value.lock().unwrap(), 199);
}

/// E3: a subscriber started before its publisher exists reconnects once
/// the publisher comes up.
#[tokio::test]
async fn subscriber_connects_once_publisher_appears() {
    let sub_node = Node::new(1000.0);
    let received = Arc::new(AtomicU32::new(0));
    let received_clone = received.clone();

    // Reserve a port, then drop the temporary listener before the real
    // publisher binds it, so the subscriber's first connect attempts
    // genuinely fail.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = probe.local_addr().unwrap().port();
    drop(probe);

    let _subscriber = sub_node
        .subscribe("127.0.0.1", port, Compression::None, move |_type_id, body| {
            received_clone.store(
                u32::from_le_bytes(body.as_ref().try_into().unwrap()),
                Ordering::SeqCst,
            );
        })
        .unwrap();

    // Give the subscriber a few failed connect attempts before the
    // publisher appears (reconnect backoff is ~30ms).
    tokio::time::sleep(Duration::from_millis(120)).await;

    let pub_node = Node::new(1000.0);
    let publisher = pub_node.advertise(port, Compression::None).unwrap();

    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.publish(3, Bytes::from(9u32.to_le_bytes().to_vec()));
        received.load(Ordering::SeqCst) == 9
    })
    .await;
}

/// E4: one publisher fans a message out to several connected peers.
#[tokio::test]
async fn publish_fans_out_to_multiple_peers() {
    let pub_node = Node::new(1000.0);
    let publisher = pub_node.advertise(0, Compression::None).unwrap();
    let port = publisher.port();

    let sub_node = Node::new(1000.0);
    let counts: Vec<_> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let mut subscribers = Vec::new();
    for counter in &counts {
        let counter = counter.clone();
        subscribers.push(
            sub_node
                .subscribe("127.0.0.1", port, Compression::None, move |_type_id, _body| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap(),
        );
    }

    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.peer_count() == 3
    })
    .await;

    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.publish(1, Bytes::from_static(b"fanout"));
        counts.iter().all(|c| c.load(Ordering::SeqCst) > 0)
    })
    .await;
}

/// E5: a peer that closes the connection after the header but before the
/// body never triggers the handler for that partial message; the
/// subscriber tears the connection down and reconnects cleanly.
#[tokio::test]
async fn mid_frame_disconnect_drops_partial_message_and_reconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let sub_node = Node::new(1000.0);
    let hits = Arc::new(AtomicUsize::new(0));
    let last_body = Arc::new(Mutex::new(None));
    let hits_clone = hits.clone();
    let last_body_clone = last_body.clone();
    let _subscriber = sub_node
        .subscribe("127.0.0.1", port, Compression::None, move |_type_id, body| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
            *last_body_clone.lock().unwrap() = Some(body);
        })
        .unwrap();

    // First connection: write a header declaring a 4-byte body, then
    // close before sending the body.
    let (mut first, _) = listener.accept().await.unwrap();
    first.write_all(&header_bytes(11, 4)).await.unwrap();
    drop(first);

    // Give the subscriber time to notice the truncated read and tear the
    // connection down; no handler should have fired for it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    sub_node.run_once();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Second connection, after the subscriber's reconnect backoff: a
    // complete frame this time.
    let (mut second, _) = listener.accept().await.unwrap();
    second.write_all(&header_bytes(11, 4)).await.unwrap();
    second.write_all(&22u32.to_le_bytes()).await.unwrap();
    let mut ack = [0u8; 1];
    second.read_exact(&mut ack).await.unwrap();

    wait_for(&sub_node, Duration::from_secs(2), || {
        hits.load(Ordering::SeqCst) > 0
    })
    .await;

    let body = last_body.lock().unwrap().take().unwrap();
    assert_eq!(body.as_ref(), &22u32.to_le_bytes());
}

/// E6: a payload large enough to need multiple TCP reads round-trips
/// through zlib compression intact.
#[tokio::test]
async fn zlib_round_trips_large_payload() {
    let pub_node = Node::new(1000.0);
    let publisher = pub_node.advertise(0, Compression::Zlib).unwrap();
    let port = publisher.port();

    use rand::RngCore;
    let mut payload = vec![0u8; 65536];
    rand::thread_rng().fill_bytes(&mut payload);
    let payload = Bytes::from(payload);

    let sub_node = Node::new(1000.0);
    let received = Arc::new(Mutex::new(None));
    let received_clone = received.clone();
    let _subscriber = sub_node
        .subscribe("127.0.0.1", port, Compression::Zlib, move |_type_id, body| {
            *received_clone.lock().unwrap() = Some(body);
        })
        .unwrap();

    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.publish(5, payload.clone());
        received.lock().unwrap().is_some()
    })
    .await;

    let body = received.lock().unwrap().take().unwrap();
    assert_eq!(body, payload);
}

/// Per-type handler overrides via `Subscriber::on` take priority over
/// the node-level default handler for that type only.
#[tokio::test]
async fn per_type_handler_override_takes_priority() {
    let pub_node = Node::new(1000.0);
    let publisher = pub_node.advertise(0, Compression::None).unwrap();
    let port = publisher.port();

    let sub_node = Node::new(1000.0);
    let default_hits = Arc::new(AtomicUsize::new(0));
    let override_hits = Arc::new(AtomicUsize::new(0));
    let default_hits_clone = default_hits.clone();
    let override_hits_clone = override_hits.clone();

    let subscriber = sub_node
        .subscribe("127.0.0.1", port, Compression::None, move |_type_id, _body| {
            default_hits_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    subscriber.on(99, move |_type_id, _body| {
        override_hits_clone.fetch_add(1, Ordering::SeqCst);
    });

    wait_for(&sub_node, Duration::from_secs(2), || {
        publisher.publish(99, Bytes::from_static(b"x"));
        override_hits.load(Ordering::SeqCst) > 0
    })
    .await;

    assert_eq!(default_hits.load(Ordering::SeqCst), 0);
}
