//! Multi-node fan-out, over real loopback TCP sockets rather than the
//! in-process `tokio::io::duplex` pairs the unit tests use.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ring_core::{Builder, RingSnapshot, StaticNode};
use ring_rpc::{BytesMessage, Handler, Messenger};
use ring_util::config::MessengerConfig;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const PAYLOAD_TYPE: u64 = 7;

struct CountingHandler {
	tx: mpsc::UnboundedSender<(SocketAddr, Vec<u8>)>,
}

#[async_trait]
impl Handler for CountingHandler {
	async fn handle(
		&self,
		from: SocketAddr,
		payload: &mut ring_rpc::frame::PayloadReader<'_, tokio::net::tcp::OwnedReadHalf>,
	) -> std::io::Result<()> {
		let bytes = payload.read_to_vec().await.map_err(ring_util::error_to_io)?;
		let _ = self.tx.send((from, bytes));
		Ok(())
	}
}

async fn free_addr() -> SocketAddr {
	let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
	l.local_addr().unwrap()
}

/// Three nodes, two replicas: enough that `send_to_other_replicas` from
/// node A's perspective has two distinct remote targets to reach, and
/// neither of them is A itself.
async fn three_node_ring() -> (u64, SocketAddr, SocketAddr, SocketAddr, RingSnapshot<StaticNode>) {
	let addr_a = free_addr().await;
	let addr_b = free_addr().await;
	let addr_c = free_addr().await;

	let mut builder: Builder<StaticNode> = Builder::new(2);
	builder.add(StaticNode::new(1, 100, vec![1], vec![addr_a]));
	builder.add(StaticNode::new(2, 100, vec![2], vec![addr_b]));
	builder.add(StaticNode::new(3, 100, vec![3], vec![addr_c]));
	let snapshot = builder.snapshot(1);
	(1, addr_a, addr_b, addr_c, snapshot)
}

#[tokio::test]
async fn fan_out_reaches_every_other_replica_but_not_self() {
	let (local_id, addr_a, addr_b, addr_c, ring) = three_node_ring().await;

	let messenger_a = Messenger::new(ring.clone(), MessengerConfig::default());
	let messenger_b = Messenger::new(ring.clone(), MessengerConfig::default());
	let messenger_c = Messenger::new(ring.clone(), MessengerConfig::default());

	let (tx_b, mut rx_b) = mpsc::unbounded_channel();
	let (tx_c, mut rx_c) = mpsc::unbounded_channel();
	messenger_b
		.register_handler(PAYLOAD_TYPE, Arc::new(CountingHandler { tx: tx_b }))
		.await;
	messenger_c
		.register_handler(PAYLOAD_TYPE, Arc::new(CountingHandler { tx: tx_c }))
		.await;

	let (b, c) = (messenger_b.clone(), messenger_c.clone());
	tokio::spawn(async move { b.listen(addr_b).await.unwrap() });
	tokio::spawn(async move { c.listen(addr_c).await.unwrap() });
	tokio::time::sleep(Duration::from_millis(20)).await;

	let done_count = Arc::new(AtomicUsize::new(0));
	let flag = done_count.clone();
	let msg = BytesMessage::new(PAYLOAD_TYPE, b"replicated".to_vec()).with_done_callback(move || {
		flag.fetch_add(1, Ordering::SeqCst);
	});

	// Partition 0 is responsible-nodes-agnostic here: with replica_count=2
	// and 3 nodes in the pool, whichever two nodes the rebalancer picked
	// for partition 0 are the fan-out's targets; node A is always excluded
	// by id regardless of whether the rebalancer happened to place it.
	messenger_a
		.send_to_other_replicas(ring.version(), 0, local_id, msg)
		.await;

	assert_eq!(done_count.load(Ordering::SeqCst), 1);

	let responsible: Vec<u64> = ring.responsible_ids(0).into_iter().flatten().collect();
	let expect_b = responsible.contains(&2);
	let expect_c = responsible.contains(&3);

	if expect_b {
		let (from, bytes) = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
			.await
			.expect("node B should have received the fan-out")
			.unwrap();
		assert_eq!(bytes, b"replicated");
		let _ = from;
	} else {
		assert!(rx_b.try_recv().is_err());
	}

	if expect_c {
		let (from, bytes) = tokio::time::timeout(Duration::from_secs(1), rx_c.recv())
			.await
			.expect("node C should have received the fan-out")
			.unwrap();
		assert_eq!(bytes, b"replicated");
		let _ = from;
	} else {
		assert!(rx_c.try_recv().is_err());
	}

	let _ = addr_a;
	messenger_a.stop();
	messenger_b.stop();
	messenger_c.stop();
}
