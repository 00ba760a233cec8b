use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Outcome of asking the breaker whether a request may go out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// The single attempt let through after the cool-down.
    Probe,
    Rejected,
}

#[derive(Debug, Default)]
struct CircuitStatus {
    consecutive_errors: u32,
    open: bool,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Trips after more than `threshold` consecutive 5xx responses and fails
/// every call fast until `cooldown` has elapsed.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    status: Mutex<CircuitStatus>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            status: Mutex::new(CircuitStatus::default()),
        }
    }

    fn status(&self) -> MutexGuard<'_, CircuitStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn admit(&self) -> Admission {
        self.admit_at(Instant::now())
    }

    pub(crate) fn admit_at(&self, now: Instant) -> Admission {
        let mut status = self.status();
        if !status.open {
            return Admission::Allowed;
        }
        if status.probe_in_flight {
            return Admission::Rejected;
        }
        let cooled_down = match status.opened_at {
            Some(opened_at) => now.saturating_duration_since(opened_at) > self.cooldown,
            None => true,
        };
        if !cooled_down {
            return Admission::Rejected;
        }
        debug!("circuit half-open, admitting one probing request");
        status.consecutive_errors = 0;
        status.probe_in_flight = true;
        Admission::Probe
    }

    /// Post-response hook; the only place that counts server errors.
    pub fn record_status(&self, code: u16) {
        self.record_status_at(code, Instant::now())
    }

    pub(crate) fn record_status_at(&self, code: u16, now: Instant) {
        let mut status = self.status();
        if code >= 500 {
            status.consecutive_errors = status.consecutive_errors.saturating_add(1);
            if status.probe_in_flight {
                warn!("probing request failed with {code}, circuit reopened");
                status.probe_in_flight = false;
                status.opened_at = Some(now);
                return;
            }
            if !status.open && status.consecutive_errors > self.threshold {
                warn!(
                    "circuit opened after {} consecutive server errors",
                    status.consecutive_errors
                );
                status.open = true;
                status.opened_at = Some(now);
            }
            return;
        }

        status.consecutive_errors = 0;
        if status.probe_in_flight {
            debug!("probing request succeeded with {code}, circuit closed");
            status.open = false;
            status.opened_at = None;
            status.probe_in_flight = false;
        }
    }

    /// A network-level failure of the probing request keeps the circuit open.
    pub fn record_network_failure(&self) {
        let mut status = self.status();
        if status.probe_in_flight {
            status.probe_in_flight = false;
            status.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> CircuitState {
        let status = self.status();
        match (status.open, status.probe_in_flight) {
            (false, _) => CircuitState::Closed,
            (true, true) => CircuitState::HalfOpen,
            (true, false) => CircuitState::Open,
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.status().consecutive_errors
    }
}
