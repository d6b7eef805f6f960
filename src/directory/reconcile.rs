//! Reconciliation state fed by directory queries
//!
//! Deregistration is eventually consistent on the directory side: a server
//! we just removed keeps echoing back in query results for a few cycles.
//! The grace table absorbs those echoes so the rest of the process only
//! sees listings that are intentionally alive. The health clock remembers
//! when the directory last answered a query in full; the supervisor's
//! sustained-outage escalation keys off that timestamp.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use super::records::DirectoryServer;

/// Per-identity countdown of cycles a deregistered server stays hidden.
#[derive(Debug, Default)]
pub struct GraceTable {
    entries: HashMap<String, u32>,
}

impl GraceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the countdown for an identity. Re-deregistering an
    /// identity always resets its counter to the full window.
    pub fn begin(&mut self, game_id: &str, cycles: u32) {
        self.entries.insert(game_id.to_string(), cycles);
    }

    /// Remaining suppressed cycles for an identity, if it is tracked at all.
    pub fn remaining(&self, game_id: &str) -> Option<u32> {
        self.entries.get(game_id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fold a fresh query result through the grace countdowns.
    ///
    /// For each reported listing:
    /// - counter above zero: decrement and suppress the listing
    /// - counter at zero: the directory still reports it after the full
    ///   window, so the suppression is over; drop the entry and let the
    ///   listing through
    /// - untracked: pass through
    ///
    /// Entries whose identity the directory no longer reports are dropped,
    /// so the table never accumulates dead countdowns.
    pub fn merge(&mut self, remote: Vec<DirectoryServer>) -> Vec<DirectoryServer> {
        let reported: HashSet<String> = remote
            .iter()
            .map(|server| server.tags.game_id.clone())
            .collect();

        let mut merged = Vec::with_capacity(remote.len());
        for server in remote {
            let game_id = server.tags.game_id.clone();
            match self.entries.get(&game_id).copied() {
                Some(counter) if counter > 0 => {
                    self.entries.insert(game_id.clone(), counter - 1);
                    debug!(
                        game_id = %game_id,
                        remaining = counter - 1,
                        "Suppressing stale listing of deregistered server"
                    );
                }
                Some(_) => {
                    debug!(game_id = %game_id, "Suppression window over, listing visible again");
                    self.entries.remove(&game_id);
                    merged.push(server);
                }
                None => merged.push(server),
            }
        }

        self.entries.retain(|game_id, _| reported.contains(game_id));
        merged
    }
}

/// Timestamps of the last fully successful directory interactions.
#[derive(Debug, Clone, Copy)]
pub struct HealthClock {
    pub last_successful_query: Instant,
    pub last_auth: Instant,
}

impl HealthClock {
    /// Both timestamps start at construction time, so a process that never
    /// reaches the directory still escalates one tolerance window after boot.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_successful_query: now,
            last_auth: now,
        }
    }

    pub fn mark_query(&mut self) {
        self.last_successful_query = Instant::now();
    }

    pub fn mark_auth(&mut self) {
        self.last_auth = Instant::now();
    }

    /// Whether the directory has been silent for longer than `tolerance`.
    pub fn outage_exceeds(&self, tolerance: Duration) -> bool {
        self.last_successful_query.elapsed() > tolerance
    }
}

impl Default for HealthClock {
    fn default() -> Self {
        Self::new()
    }
}
