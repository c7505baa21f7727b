//! Progress tracking for wallet synchronization.
//!
//! This module provides the `SyncProgressTracker`, which folds the events of one sync session
//! into phase-specific progress reports with remaining-time estimates. The tracker performs no
//! I/O: every input carries the unix timestamp it happened at, which keeps the estimates
//! reproducible in tests.
//!
//! Elapsed time for a phase excludes inactivity reported while the phase was running, so a
//! suspended application does not drag the estimated rate down.

use crate::config::{NetworkParams, SyncConfig};
use crate::network::NetworkEvent;

use serde::Serialize;

/// Progress of the headers fetch phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadersFetchProgressReport {
    pub wallet_id: i32,
    pub fetched_headers_count: i32,
    pub start_header_height: i32,
    pub current_header_height: i32,
    pub current_header_timestamp: i64,
    pub total_headers_to_fetch: i32,
    pub elapsed_seconds: i64,
    pub target_time_per_block: i64,
    pub headers_fetch_progress: i32,
    pub estimated_seconds_remaining: Option<i64>,
}

/// Progress of the address discovery phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressDiscoveryProgressReport {
    pub wallet_id: i32,
    pub elapsed_seconds: i64,
    pub address_discovery_progress: i32,
    /// `None` when the wallet has no discovery history to estimate from.
    pub estimated_seconds_remaining: Option<i64>,
}

/// Progress of a header rescan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeadersRescanProgressReport {
    pub wallet_id: i32,
    pub current_rescan_height: i32,
    pub total_headers_to_scan: i32,
    pub rescan_progress: i32,
    pub elapsed_seconds: i64,
    pub estimated_seconds_remaining: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProgressReport {
    HeadersFetch(HeadersFetchProgressReport),
    AddressDiscovery(AddressDiscoveryProgressReport),
    HeadersRescan(HeadersRescanProgressReport),
}

/// Start time of a phase and the inactivity total when it started.
#[derive(Debug, Clone, Copy)]
struct PhaseClock {
    started_at: i64,
    inactive_at_start: i64,
}

impl PhaseClock {
    fn start(now: i64, total_inactive_seconds: i64) -> Self {
        Self {
            started_at: now,
            inactive_at_start: total_inactive_seconds,
        }
    }

    fn elapsed(&self, now: i64, total_inactive_seconds: i64) -> i64 {
        let inactive = total_inactive_seconds - self.inactive_at_start;
        (now - self.started_at - inactive).max(1)
    }
}

#[derive(Debug, Clone, Default)]
struct HeadersFetchState {
    clock: Option<PhaseClock>,
    peer_initial_height: Option<i32>,
    start_height: Option<i32>,
    fetched: i32,
    current_height: i32,
    current_header_time: i64,
}

#[derive(Debug, Clone, Default)]
struct DiscoveryState {
    clock: Option<PhaseClock>,
    completed_at: Option<i64>,
    last_progress: i32,
}

#[derive(Debug, Clone, Default)]
struct RescanState {
    clock: Option<PhaseClock>,
    scanned: i32,
    total: i32,
}

/// Service for tracking synchronization progress
///
/// One tracker belongs to one session (or one standalone rescan) and is owned by the task driving
/// it. Other tasks only ever see the reports it produces.
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    wallet_id: i32,
    target_time_per_block: i64,
    inactivity_grace_seconds: i64,
    /// Estimated duration of address discovery, from the wallet's history.
    expected_discovery_seconds: Option<i64>,
    total_inactive_seconds: i64,
    headers: HeadersFetchState,
    discovery: DiscoveryState,
    rescan: RescanState,
}

impl SyncProgressTracker {
    pub fn new(
        wallet_id: i32,
        params: &NetworkParams,
        config: &SyncConfig,
        expected_discovery_seconds: Option<i64>,
    ) -> Self {
        Self {
            wallet_id,
            target_time_per_block: params.target_time_per_block.max(1),
            inactivity_grace_seconds: config.inactivity_grace_seconds,
            expected_discovery_seconds: expected_discovery_seconds.filter(|s| *s > 0),
            total_inactive_seconds: 0,
            headers: HeadersFetchState::default(),
            discovery: DiscoveryState::default(),
            rescan: RescanState::default(),
        }
    }

    /// Fold a backend event into the tracker, returning the report it produces, if any.
    pub fn apply(&mut self, event: &NetworkEvent, now: i64) -> Option<ProgressReport> {
        match event {
            NetworkEvent::HeadersFetchStarted {
                peer_initial_height,
            } => {
                self.start_headers_clock(now);
                if peer_initial_height.is_some() {
                    self.headers.peer_initial_height = *peer_initial_height;
                }
                None
            }
            NetworkEvent::HeadersFetched {
                fetched,
                height,
                header_time,
            } => Some(ProgressReport::HeadersFetch(self.headers_fetched(
                *fetched,
                *height,
                *header_time,
                now,
            ))),
            NetworkEvent::DiscoveryStarted => {
                if self.discovery.clock.is_none() {
                    self.discovery.clock =
                        Some(PhaseClock::start(now, self.total_inactive_seconds));
                }
                Some(ProgressReport::AddressDiscovery(self.discovery_report(now)))
            }
            NetworkEvent::DiscoveryCompleted => {
                if self.discovery.clock.is_none() {
                    self.discovery.clock =
                        Some(PhaseClock::start(now, self.total_inactive_seconds));
                }
                self.discovery.completed_at.get_or_insert(now);
                Some(ProgressReport::AddressDiscovery(self.discovery_report(now)))
            }
            NetworkEvent::RescanStarted => {
                self.start_rescan_clock(now);
                None
            }
            NetworkEvent::RescanProgress { scanned, total } => Some(ProgressReport::HeadersRescan(
                self.rescan_progress(*scanned, *total, now),
            )),
            NetworkEvent::PeersChanged { .. } | NetworkEvent::Synced { .. } => None,
        }
    }

    /// Re-publish address discovery progress while the phase is running.
    pub fn discovery_tick(&mut self, now: i64) -> Option<ProgressReport> {
        if self.discovery.clock.is_some() && self.discovery.completed_at.is_none() {
            Some(ProgressReport::AddressDiscovery(self.discovery_report(now)))
        } else {
            None
        }
    }

    /// Account for `seconds` during which the application was not progressing.
    ///
    /// With no connected peers the reconnection grace period is added on top. Returns the new
    /// inactivity total.
    pub fn add_inactive_time(&mut self, seconds: i64, connected_peers: i32) -> i64 {
        let mut added = seconds.max(0);
        // Trusted node sessions report -1: no peers either.
        if connected_peers <= 0 {
            added += self.inactivity_grace_seconds;
        }
        self.total_inactive_seconds += added;
        self.total_inactive_seconds
    }

    pub fn total_inactive_seconds(&self) -> i64 {
        self.total_inactive_seconds
    }

    /// Record a rescanned batch of `scanned` heights out of `total`.
    pub fn rescan_progress(&mut self, scanned: i32, total: i32, now: i64) -> HeadersRescanProgressReport {
        self.start_rescan_clock(now);
        let rescan = &mut self.rescan;
        rescan.total = rescan.total.max(total);
        let accumulated = rescan.scanned.saturating_add(scanned.max(0));
        rescan.scanned = accumulated.min(rescan.total).max(rescan.scanned);
        self.rescan_report(now)
    }

    /// Current rescan progress without new input.
    pub fn rescan_report(&self, now: i64) -> HeadersRescanProgressReport {
        let elapsed = self
            .rescan
            .clock
            .map(|clock| clock.elapsed(now, self.total_inactive_seconds))
            .unwrap_or(1);
        let RescanState { scanned, total, .. } = self.rescan;

        HeadersRescanProgressReport {
            wallet_id: self.wallet_id,
            current_rescan_height: scanned,
            total_headers_to_scan: total,
            rescan_progress: percentage(scanned, total),
            elapsed_seconds: elapsed,
            estimated_seconds_remaining: estimate_remaining(scanned, total - scanned, elapsed),
        }
    }

    /// Seconds spent discovering addresses, once discovery completed.
    pub fn discovery_time_spent(&self) -> Option<i64> {
        let clock = self.discovery.clock?;
        let completed_at = self.discovery.completed_at?;
        Some(clock.elapsed(completed_at, self.total_inactive_seconds))
    }

    /// Headers fetched so far in this session.
    pub fn fetched_headers(&self) -> i32 {
        self.headers.fetched
    }

    fn start_headers_clock(&mut self, now: i64) {
        if self.headers.clock.is_none() {
            self.headers.clock = Some(PhaseClock::start(now, self.total_inactive_seconds));
        }
    }

    fn start_rescan_clock(&mut self, now: i64) {
        if self.rescan.clock.is_none() {
            self.rescan.clock = Some(PhaseClock::start(now, self.total_inactive_seconds));
        }
    }

    fn headers_fetched(
        &mut self,
        fetched: i32,
        height: i32,
        header_time: i64,
        now: i64,
    ) -> HeadersFetchProgressReport {
        self.start_headers_clock(now);
        let headers = &mut self.headers;
        if headers.start_height.is_none() {
            headers.start_height = Some((height - fetched).max(0));
        }
        headers.fetched = headers.fetched.max(fetched);
        headers.current_height = headers.current_height.max(height);
        headers.current_header_time = headers.current_header_time.max(header_time);

        let elapsed = headers
            .clock
            .map(|clock| clock.elapsed(now, self.total_inactive_seconds))
            .unwrap_or(1);
        let headers_left = self.headers_left(now);
        let headers = &self.headers;
        let total = headers.fetched.saturating_add(headers_left);

        HeadersFetchProgressReport {
            wallet_id: self.wallet_id,
            fetched_headers_count: headers.fetched,
            start_header_height: headers.start_height.unwrap_or(0),
            current_header_height: headers.current_height,
            current_header_timestamp: headers.current_header_time,
            total_headers_to_fetch: total,
            elapsed_seconds: elapsed,
            target_time_per_block: self.target_time_per_block,
            headers_fetch_progress: percentage(headers.fetched, total),
            estimated_seconds_remaining: estimate_remaining(headers.fetched, headers_left, elapsed),
        }
    }

    /// Headers still to fetch: from the best peer's height when it is ahead of us, otherwise
    /// estimated from the age of the newest header.
    fn headers_left(&self, now: i64) -> i32 {
        let headers = &self.headers;
        if let Some(peer_height) = headers.peer_initial_height {
            if peer_height > headers.current_height {
                return peer_height - headers.current_height;
            }
        }
        let age = (now - headers.current_header_time).max(0);
        let blocks = (age + self.target_time_per_block - 1) / self.target_time_per_block;
        i32::try_from(blocks).unwrap_or(i32::MAX)
    }

    fn discovery_report(&mut self, now: i64) -> AddressDiscoveryProgressReport {
        let end = self.discovery.completed_at.unwrap_or(now);
        let elapsed = self
            .discovery
            .clock
            .map(|clock| clock.elapsed(end, self.total_inactive_seconds))
            .unwrap_or(1);

        let (progress, remaining) = if self.discovery.completed_at.is_some() {
            (100, Some(0))
        } else {
            match self.expected_discovery_seconds {
                Some(expected) => {
                    let progress = (elapsed.saturating_mul(100) / expected).min(99) as i32;
                    (progress, Some((expected - elapsed).max(0)))
                }
                None => (0, None),
            }
        };

        let progress = progress.max(self.discovery.last_progress);
        self.discovery.last_progress = progress;

        AddressDiscoveryProgressReport {
            wallet_id: self.wallet_id,
            elapsed_seconds: elapsed,
            address_discovery_progress: progress,
            estimated_seconds_remaining: remaining,
        }
    }
}

fn percentage(done: i32, total: i32) -> i32 {
    if total <= 0 {
        return 100;
    }
    ((i64::from(done) * 100) / i64::from(total)).clamp(0, 100) as i32
}

/// Time left at the observed rate, `None` when nothing was done yet.
fn estimate_remaining(done: i32, left: i32, elapsed: i64) -> Option<i64> {
    if done <= 0 {
        return None;
    }
    let rate = f64::from(done) / elapsed.max(1) as f64;
    Some((f64::from(left.max(0)) / rate).round() as i64)
}
