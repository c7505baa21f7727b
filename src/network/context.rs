//! Cooperative cancellation for sync sessions and rescans.
//!
//! A [`ShutdownSignal`] is the root owned by the controller. Every session and rescan gets its own
//! [`CancelScope`] derived from it: the scope fires when it is canceled explicitly, when the root
//! fires, or when its optional deadline passes, whichever comes first.

use super::peers::PeerBarrier;
use super::types::{Cancellation, EventSink};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// Process-wide shutdown broadcast. Fires at most once.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
	tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownSignal {
	fn default() -> Self {
		Self::new()
	}
}

impl ShutdownSignal {
	pub fn new() -> Self {
		let (tx, _) = watch::channel(false);
		Self { tx: Arc::new(tx) }
	}

	/// Fire the signal. Returns `true` only for the call that actually fired it.
	pub fn trigger(&self) -> bool {
		!self.tx.send_replace(true)
	}

	pub fn is_triggered(&self) -> bool {
		*self.tx.borrow()
	}

	/// Derive a scope that also fires when this signal fires.
	pub fn child(&self, deadline: Option<Instant>) -> CancelScope {
		let (own, _) = watch::channel(false);
		CancelScope {
			own: Arc::new(own),
			parent: self.tx.subscribe(),
			deadline,
		}
	}
}

/// Cancellation handle for one operation.
#[derive(Debug, Clone)]
pub struct CancelScope {
	own: Arc<watch::Sender<bool>>,
	parent: watch::Receiver<bool>,
	deadline: Option<Instant>,
}

impl CancelScope {
	/// A scope with no parent, for callers outside the controller.
	pub fn detached(deadline: Option<Instant>) -> Self {
		ShutdownSignal::new().child(deadline)
	}

	pub fn cancel(&self) {
		self.own.send_replace(true);
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Why the scope fired, or `None` while it is still live.
	pub fn state(&self) -> Option<Cancellation> {
		if *self.own.borrow() || *self.parent.borrow() {
			return Some(Cancellation::Canceled);
		}
		match self.deadline {
			Some(deadline) if Instant::now() >= deadline => Some(Cancellation::DeadlineExceeded),
			_ => None,
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.state().is_some()
	}

	/// Resolves once the scope fires.
	pub async fn cancelled(&self) -> Cancellation {
		if let Some(reason) = self.state() {
			return reason;
		}

		let mut own = self.own.subscribe();
		let mut parent = self.parent.clone();
		let deadline = self.deadline;
		let expiry = async move {
			match deadline {
				Some(deadline) => tokio::time::sleep_until(deadline).await,
				None => std::future::pending::<()>().await,
			}
		};

		tokio::select! {
			_ = own.wait_for(|fired| *fired) => Cancellation::Canceled,
			_ = parent.wait_for(|fired| *fired) => Cancellation::Canceled,
			_ = expiry => Cancellation::DeadlineExceeded,
		}
	}
}

/// Everything a backend's run loop needs from the session driving it.
#[derive(Debug, Clone)]
pub struct RunContext {
	pub cancel: CancelScope,
	pub events: EventSink,
	pub peers: PeerBarrier,
}
