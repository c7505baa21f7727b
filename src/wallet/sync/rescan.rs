use crate::network::{BackendError, CancelScope, NetworkBackend};
use crate::utils::unix_now;
use crate::wallet::sync::progress_tracker::{
	HeadersRescanProgressReport, ProgressReport, SyncProgressTracker,
};
use crate::wallet::sync::session::SyncEnvironment;
use crate::wallet::{WalletHandle, WalletSyncError};

use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Start rescanning the headers of `wallet` from height zero.
///
/// Needs the backend of a live session. Progress is reported through the hub; a failing stream
/// ends the rescan without retry.
pub fn start_rescan(
	env: &Arc<SyncEnvironment>,
	wallet: &Arc<WalletHandle>,
) -> Result<(), WalletSyncError> {
	if env.shutdown.is_triggered() {
		return Err(WalletSyncError::ShuttingDown);
	}

	let scope = env.shutdown.child(None);
	let (generation, backend) = wallet.sync_state().reserve_rescan(scope.clone())?;
	info!("Wallet {}: rescanning headers from height 0", wallet.id());

	tokio::spawn(run_rescan(
		env.clone(),
		wallet.clone(),
		generation,
		backend,
		scope,
	));
	Ok(())
}

/// Stop the wallet's rescan, if one is running.
pub fn cancel_rescan(wallet: &WalletHandle) {
	if wallet.sync_state().cancel_rescan() {
		info!("Wallet {}: canceling rescan", wallet.id());
	}
}

async fn run_rescan(
	env: Arc<SyncEnvironment>,
	wallet: Arc<WalletHandle>,
	generation: u64,
	backend: Arc<dyn NetworkBackend>,
	scope: CancelScope,
) {
	let wallet_id = wallet.id();
	let mut tracker = SyncProgressTracker::new(wallet_id, &env.params, &env.config, None);

	let publish = |report: HeadersRescanProgressReport| {
		let report = ProgressReport::HeadersRescan(report);
		wallet.sync_state().record_report(&report);
		env.hub.notify(&report.into());
	};

	let opened = tokio::select! {
		reason = scope.cancelled() => Err(BackendError::from(reason)),
		result = backend.rescan_from_height(0, scope.clone()) => result,
	};
	let mut stream = match opened {
		Ok(stream) => stream,
		Err(e) => {
			error!("Wallet {}: rescan could not start: {}", wallet_id, e);
			wallet.sync_state().release_rescan(generation);
			return;
		}
	};

	loop {
		let item = tokio::select! {
			reason = scope.cancelled() => {
				info!("Wallet {}: rescan stopped ({:?})", wallet_id, reason);
				break;
			}
			item = stream.next() => item,
		};

		match item {
			Some(Ok(progress)) => {
				publish(tracker.rescan_progress(progress.scanned, progress.total, unix_now()));
			}
			Some(Err(e)) => {
				error!("Wallet {}: rescan failed: {}", wallet_id, e);
				break;
			}
			None => {
				let report = tracker.rescan_report(unix_now());
				debug!(
					"Wallet {}: rescan finished at height {}",
					wallet_id, report.current_rescan_height
				);
				publish(report);
				break;
			}
		}
	}

	wallet.sync_state().release_rescan(generation);
}
