//! Caller-side reconnection.
//!
//! The channel itself never retries. Callers that want automatic recovery
//! can use [`Backoff`] directly, or hand the channel to a [`Reconnector`]
//! which restarts it after remote-initiated closes and failed handshakes.
//! Locally requested closes (`close()`, `toggle()`) are left alone.
//!
//! # Example
//!
//! ```no_run
//! use fz_notifications::{Backoff, NotificationChannel, Reconnector};
//!
//! # async fn example() -> fz_notifications::Result<()> {
//! let channel = NotificationChannel::for_host("localhost:8080")?;
//! let reconnector = Reconnector::spawn(channel.clone(), Backoff::default());
//! channel.start().await;
//!
//! // ...
//! reconnector.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::channel::{ChannelState, NotificationChannel};

// ============================================================================
// Constants
// ============================================================================

/// Default first retry ceiling.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Default maximum retry ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Exponent cap; 2^16 times any sane initial delay exceeds `max`.
const MAX_EXPONENT: u32 = 16;

// ============================================================================
// Backoff
// ============================================================================

/// Exponential backoff with full jitter.
///
/// Attempt `n` (from 0) waits a uniformly random duration in
/// `[0, min(max, initial * 2^n)]`. With jitter disabled it waits the
/// ceiling itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    attempt: u32,
    jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl Backoff {
    /// Creates a backoff. `max` is raised to `initial` if smaller.
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            attempt: 0,
            jitter: true,
        }
    }

    /// Enables or disables jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Number of delays handed out since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Upper bound of the next delay.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        let factor = 1_u32 << self.attempt.min(MAX_EXPONENT);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Returns the next delay and advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self.ceiling();
        self.attempt = self.attempt.saturating_add(1);
        if !self.jitter {
            return ceiling;
        }

        let ceiling_ms = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
    }

    /// Starts over from the initial delay.
    #[inline]
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

// ============================================================================
// Reconnector
// ============================================================================

/// Background task that restarts a channel after unexpected closes.
///
/// The backoff resets whenever the channel reaches `Open`.
pub struct Reconnector {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Reconnector {
    /// Starts supervising `channel`. Does not start the channel itself.
    #[must_use]
    pub fn spawn(channel: NotificationChannel, backoff: Backoff) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(supervise(channel, backoff, stop_rx));
        Self { stop_tx, task }
    }

    /// Stops supervising and waits for the task to end.
    ///
    /// The channel is left in whatever state it is in.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

async fn supervise(
    channel: NotificationChannel,
    mut backoff: Backoff,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut states = channel.state_changes();

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,

            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }

                let state = *states.borrow_and_update();
                match state {
                    ChannelState::Open => backoff.reset(),
                    ChannelState::Connecting => {}
                    ChannelState::Closed => {
                        let Some(trigger) = channel
                            .last_close()
                            .filter(|event| !event.initiated_locally)
                            .map(|event| event.connection)
                        else {
                            continue;
                        };

                        let delay = backoff.next_delay();
                        info!(
                            attempt = backoff.attempt(),
                            delay_ms = delay.as_millis() as u64,
                            "Reconnecting notification channel"
                        );

                        tokio::select! {
                            _ = &mut stop_rx => break,
                            () = sleep(delay) => {}
                        }

                        // Skip if the caller reopened or closed it meanwhile.
                        let still_down = channel.state() == ChannelState::Closed
                            && channel
                                .last_close()
                                .is_some_and(|event| event.connection == trigger);
                        if still_down {
                            channel.start().await;
                        } else {
                            debug!(%trigger, "Channel changed during backoff, not reconnecting");
                        }
                    }
                }
            }
        }
    }

    debug!("Reconnector stopped");
}

// ============================================================================
// Tests
// ============================================================================
