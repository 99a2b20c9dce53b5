//! Per-device lock agent.
//!
//! One [`LockAgent`] per physical lock. The host scheduler drives it
//! serially: at most one `poll_state` or door operation in flight per
//! device, no overlap. Each agent owns its own polling cursor and snapshot,
//! so multiple locks on one account never share mutable state.

use std::sync::Arc;

use crate::api::{CloudApi, LOG_TYPE_ACTION};
use crate::cursor::LogWindowCursor;
use crate::error::AgentError;
use crate::reconcile::{self, LockStateSnapshot, RECONCILE_CODES};

/// Status code carrying the battery level.
pub const BATTERY_CODE: &str = "residual_electricity";

/// Status code carrying the bolt position, used as a fallback snapshot when
/// the log stream is inconclusive.
pub const MOTOR_STATE_CODE: &str = "lock_motor_state";

/// Client-side agent for one smart lock.
pub struct LockAgent {
    device_id: String,
    api: Arc<CloudApi>,
    cursor: LogWindowCursor,
    snapshot: LockStateSnapshot,
}

impl LockAgent {
    /// Create an agent whose polling window starts now.
    pub fn new(api: Arc<CloudApi>, device_id: impl Into<String>) -> Self {
        Self::with_cursor(api, device_id, LogWindowCursor::starting_now())
    }

    /// Create an agent with an explicit cursor (restored state, tests).
    pub fn with_cursor(
        api: Arc<CloudApi>,
        device_id: impl Into<String>,
        cursor: LogWindowCursor,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            api,
            cursor,
            snapshot: LockStateSnapshot::default(),
        }
    }

    /// The device this agent manages.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The belief as of the last completed cycle or operation.
    pub fn snapshot(&self) -> &LockStateSnapshot {
        &self.snapshot
    }

    /// Engage the bolt.
    pub async fn lock(&mut self) -> Result<(), AgentError> {
        self.operate(false).await
    }

    /// Release the bolt.
    pub async fn unlock(&mut self) -> Result<(), AgentError> {
        self.operate(true).await
    }

    /// Ticket-then-operate, two sequential cloud calls.
    ///
    /// There is no partial success: if either step fails the door's
    /// physical state is unknown, never assumed unchanged, and the
    /// snapshot says so.
    async fn operate(&mut self, open: bool) -> Result<(), AgentError> {
        tracing::info!(
            "operating device {}: {}",
            self.device_id,
            if open { "unlock" } else { "lock" }
        );

        let outcome = async {
            let ticket_id = self.api.post_ticket(&self.device_id).await?;
            self.api
                .operate_door(&self.device_id, &ticket_id, open)
                .await
        }
        .await;

        match outcome {
            Ok(()) => {
                self.snapshot.is_locked = Some(!open);
                tracing::info!(
                    "device {} now {}",
                    self.device_id,
                    if open { "unlocked" } else { "locked" }
                );
                Ok(())
            }
            Err(err) => {
                self.snapshot.is_locked = None;
                tracing::error!("door operation failed for {}: {}", self.device_id, err);
                Err(err)
            }
        }
    }

    /// Run one reconciliation cycle and return the updated snapshot.
    ///
    /// Cycle: make sure the credential is fresh, nudge the device to sync,
    /// fetch the log window, fold it into the snapshot, merge the battery
    /// reading, then advance the cursor. Failures propagate without moving
    /// the cursor, so the next cycle retries the same span of time.
    pub async fn poll_state(&mut self) -> Result<LockStateSnapshot, AgentError> {
        self.api.ensure_fresh_credential().await?;
        self.api.sync_device(&self.device_id).await?;

        let window = self.cursor.current_window();
        let entries = self
            .api
            .fetch_logs(
                &self.device_id,
                window.start_ms,
                window.end_ms,
                &RECONCILE_CODES,
                LOG_TYPE_ACTION,
            )
            .await?;

        let decisive = reconcile::decide(&entries).is_some();
        let mut next = reconcile::apply(&entries, &self.snapshot);

        if !decisive {
            // Inconclusive window. Not an error: keep the previous belief,
            // but try the direct bolt-position property as a fresh snapshot
            // of current truth. Best effort only.
            match self.api.fetch_property(&self.device_id, MOTOR_STATE_CODE).await {
                Ok(Some(value)) => {
                    tracing::debug!("fallback motor state for {}: {}", self.device_id, value);
                    next.is_locked = Some(value == "true");
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!("fallback motor state read failed: {}", err);
                }
            }
        }

        // Battery rides along every cycle; a failed read is an explicit
        // unknown, not a stale carry-over.
        next.battery = match self.api.fetch_property(&self.device_id, BATTERY_CODE).await {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!("battery read failed for {}: {}", self.device_id, err);
                None
            }
        };

        self.cursor.advance(!entries.is_empty());
        self.snapshot = next.clone();
        Ok(next)
    }
}
