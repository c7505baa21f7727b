//! Peer quiescence barrier.
//!
//! Backends take a [`PeerGuard`] for every peer connection they open and drop it when the
//! connection is fully closed. [`PeerBarrier::wait_quiescent`] resolves once no guard is alive.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct PeerBarrier {
	count: Arc<watch::Sender<usize>>,
}

impl Default for PeerBarrier {
	fn default() -> Self {
		Self::new()
	}
}

impl PeerBarrier {
	pub fn new() -> Self {
		let (tx, _) = watch::channel(0);
		Self { count: Arc::new(tx) }
	}

	/// Register a new peer connection.
	#[must_use = "the peer counts as connected until the guard is dropped"]
	pub fn connect(&self) -> PeerGuard {
		self.count.send_modify(|count| *count += 1);
		PeerGuard {
			barrier: self.clone(),
		}
	}

	pub fn connected(&self) -> usize {
		*self.count.borrow()
	}

	pub async fn wait_quiescent(&self) {
		let mut rx = self.count.subscribe();
		// The sender lives in `self`, so the wait can only end by reaching zero.
		let _ = rx.wait_for(|count| *count == 0).await;
	}
}

/// One open peer connection.
#[derive(Debug)]
pub struct PeerGuard {
	barrier: PeerBarrier,
}

impl Drop for PeerGuard {
	fn drop(&mut self) {
		self.barrier
			.count
			.send_modify(|count| *count = count.saturating_sub(1));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	#[tokio::test]
	async fn idle_barrier_is_quiescent() {
		let barrier = PeerBarrier::new();
		barrier.wait_quiescent().await;
		assert_eq!(barrier.connected(), 0);
	}

	#[tokio::test]
	async fn waits_for_last_guard() {
		let barrier = PeerBarrier::new();
		let first = barrier.connect();
		let second = barrier.connect();
		assert_eq!(barrier.connected(), 2);

		drop(first);
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			drop(second);
		});

		barrier.wait_quiescent().await;
		assert_eq!(barrier.connected(), 0);
	}
}
