//! Per-tick transmission of the wire plan.
//!
//! One batched, non-blocking send offers the whole plan. Whatever the
//! link does not accept is retried from the first unsent frame, with a
//! short pause between attempts so the NIC queue can drain, until the
//! frame budget runs out. A frame that misses the budget is dropped; the
//! next tick starts from scratch.

use crate::link::LinkTransport;
use crate::warnings::WarningHolder;
use crate::wire::WirePacketPlan;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

/// Wall-clock budget for getting one plan onto the wire.
pub const SEND_BUDGET: Duration = Duration::from_millis(22);
/// Pause between retries.
pub const RETRY_PAUSE: Duration = Duration::from_micros(500);
/// Consecutive dropped frames tolerated before the operator is warned.
pub const SLOW_FRAME_LIMIT: u32 = 3;
/// How long the slow-frame warning stays up before it may fire again.
pub const SLOW_WARNING_COOLDOWN: Duration = Duration::from_secs(30);
pub const SLOW_WARNING: &str = "Repeated frames taking more than 20ms to send to ColorLight";

/// What happened to one tick's frames.
#[derive(Debug)]
pub enum SendOutcome {
    /// Every frame was accepted by the link.
    Sent { frames: usize, elapsed: Duration },
    /// The budget ran out; the unsent tail was abandoned.
    Dropped {
        sent: usize,
        total: usize,
        elapsed: Duration,
        attempts: u32,
        error: Option<io::Error>,
    },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Sent { elapsed, .. } | Self::Dropped { elapsed, .. } => *elapsed,
        }
    }
}

/// Sends the plan and tracks consecutive failures.
#[derive(Debug)]
pub struct Transmitter {
    budget: Duration,
    pause: Duration,
    slow_count: u32,
    warnings: WarningHolder,
}

impl Transmitter {
    pub fn new(warnings: WarningHolder) -> Self {
        Self::with_timing(warnings, SEND_BUDGET, RETRY_PAUSE)
    }

    pub fn with_timing(warnings: WarningHolder, budget: Duration, pause: Duration) -> Self {
        Self {
            budget,
            pause,
            slow_count: 0,
            warnings,
        }
    }

    /// Consecutive ticks that ended in a drop.
    pub fn slow_count(&self) -> u32 {
        self.slow_count
    }

    /// Offer the whole plan to `link`, retrying until accepted or out of
    /// budget.
    pub fn send_frame<L: LinkTransport>(
        &mut self,
        link: &mut L,
        plan: &WirePacketPlan,
        device: &[u8],
    ) -> SendOutcome {
        let start = Instant::now();
        let frames = plan.frames();
        let total = frames.len();
        if total == 0 {
            return SendOutcome::Sent {
                frames: 0,
                elapsed: start.elapsed(),
            };
        }

        let mut sent = 0;
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            attempts += 1;
            match link.send_batch(&frames[sent..], device) {
                Ok(n) => sent += n.min(total - sent),
                Err(e) => last_error = Some(e),
            }

            if sent == total || start.elapsed() >= self.budget {
                break;
            }
            thread::sleep(self.pause);
        }

        let elapsed = start.elapsed();
        if sent == total {
            self.slow_count = 0;
            tracing::trace!("sent {} frames in {}us", total, elapsed.as_micros());
            return SendOutcome::Sent {
                frames: total,
                elapsed,
            };
        }

        let (code, reason) = match &last_error {
            Some(e) => (e.raw_os_error().unwrap_or(0), e.to_string()),
            None => (0, "no error reported".to_string()),
        };
        tracing::warn!(
            "send failed for ColorLight output (socket: {}  output count: {}/{}  time: {}ms) with error: {}  {}, attempts: {}",
            link.socket_id(),
            sent,
            total,
            elapsed.as_millis(),
            code,
            reason,
            attempts
        );

        self.slow_count += 1;
        if self.slow_count > SLOW_FRAME_LIMIT
            && self
                .warnings
                .add_warning_timeout(SLOW_WARNING, SLOW_WARNING_COOLDOWN)
        {
            tracing::warn!("{}", SLOW_WARNING);
        }

        SendOutcome::Dropped {
            sent,
            total,
            elapsed,
            attempts,
            error: last_error,
        }
    }
}
