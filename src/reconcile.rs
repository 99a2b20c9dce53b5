//! Event-log state reconciliation.
//!
//! The vendor cloud does not expose "is the door locked" as a queryable
//! fact; it exposes a log of discrete lock/unlock events. Reconciliation
//! folds one time window's batch of log entries into a boolean belief,
//! resolving conflicting signals with a fixed priority table. Entries
//! arrive in no particular order, so the fold is order-independent except
//! for the documented tie-break: a later-seen entry of equal priority wins.

use serde::{Deserialize, Serialize};

/// Vendor-defined event codes recorded against a lock device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCode {
    /// The bolt engaged (autolock or app command).
    LockRecord,
    /// Unlocked with a physical key.
    UnlockKey,
    /// Locked by hand from the inside.
    ManualLock,
    /// Unlocked over Bluetooth.
    UnlockBle,
    /// Unlocked remotely from the phone app.
    UnlockPhoneRemote,
    /// Any code the reconciler does not evaluate.
    #[serde(other)]
    Other,
}

impl LogCode {
    /// Wire name of the code, as the logs API reports it.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCode::LockRecord => "lock_record",
            LogCode::UnlockKey => "unlock_key",
            LogCode::ManualLock => "manual_lock",
            LogCode::UnlockBle => "unlock_ble",
            LogCode::UnlockPhoneRemote => "unlock_phone_remote",
            LogCode::Other => "other",
        }
    }

    /// Parse a wire code; anything unrecognized is `Other`.
    pub fn from_wire(code: &str) -> Self {
        match code {
            "lock_record" => LogCode::LockRecord,
            "unlock_key" => LogCode::UnlockKey,
            "manual_lock" => LogCode::ManualLock,
            "unlock_ble" => LogCode::UnlockBle,
            "unlock_phone_remote" => LogCode::UnlockPhoneRemote,
            _ => LogCode::Other,
        }
    }
}

/// The log codes worth asking the cloud for when reconciling.
pub const RECONCILE_CODES: [&str; 5] = [
    "lock_record",
    "unlock_key",
    "manual_lock",
    "unlock_ble",
    "unlock_phone_remote",
];

/// One device log entry. Immutable; batches are not chronological.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Event code.
    pub code: LogCode,
    /// Event timestamp, epoch milliseconds. Informational only; ordering
    /// within a batch plays no part in conflict resolution.
    pub timestamp_ms: i64,
}

/// Priority and resulting bolt state per evaluated code.
///
/// Kept as one flat table rather than branching so the fold stays total and
/// a new code is a one-line addition.
const PRIORITY: [(LogCode, u8, bool); 5] = [
    (LogCode::LockRecord, 5, true),
    (LogCode::UnlockKey, 4, false),
    (LogCode::ManualLock, 3, true),
    (LogCode::UnlockBle, 2, false),
    (LogCode::UnlockPhoneRemote, 1, false),
];

/// Priority and locked-state mapping for a code, `None` if not evaluated.
fn classify(code: LogCode) -> Option<(u8, bool)> {
    PRIORITY
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, priority, locked)| (*priority, *locked))
}

/// Derived belief about a lock, as of the last reconciliation cycle.
///
/// `None` fields mean "unknown" and are first-class: a cycle without a
/// decisive signal must not collapse unknown into locked or unlocked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockStateSnapshot {
    /// Whether the bolt is believed engaged.
    pub is_locked: Option<bool>,
    /// The log entry that last decided `is_locked`.
    pub last_deciding_entry: Option<LogEntry>,
    /// Battery level as reported by the device, refreshed every cycle.
    pub battery: Option<String>,
}

/// Pick the decisive entry of a batch, if any.
///
/// Scans the whole batch keeping a running maximum; an entry matching the
/// current maximum priority replaces it, so ties resolve to the entry seen
/// later in iteration order. Returns the winner and its locked-state verdict.
pub fn decide(entries: &[LogEntry]) -> Option<(&LogEntry, bool)> {
    let mut best: Option<(u8, &LogEntry, bool)> = None;
    for entry in entries {
        let Some((priority, locked)) = classify(entry.code) else {
            continue;
        };
        match best {
            Some((best_priority, _, _)) if priority < best_priority => {}
            _ => best = Some((priority, entry, locked)),
        }
    }
    best.map(|(_, entry, locked)| (entry, locked))
}

/// Fold a batch of log entries into the next snapshot.
///
/// Pure and deterministic: same batch and same previous snapshot always
/// yield the same result. A batch with no evaluated code returns `previous`
/// unchanged, battery included; absence of signal is never evidence.
pub fn apply(entries: &[LogEntry], previous: &LockStateSnapshot) -> LockStateSnapshot {
    match decide(entries) {
        Some((entry, locked)) => {
            tracing::debug!(
                "reconciled to {} from {} at t={}",
                if locked { "locked" } else { "unlocked" },
                entry.code.as_str(),
                entry.timestamp_ms,
            );
            LockStateSnapshot {
                is_locked: Some(locked),
                last_deciding_entry: Some(entry.clone()),
                battery: previous.battery.clone(),
            }
        }
        None => {
            tracing::debug!("no decisive log entry in batch, keeping previous state");
            previous.clone()
        }
    }
}
