use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Remaining-time bookkeeping. Only decrements while armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    remaining: u32,
    armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Not armed, nothing changed.
    Idle,
    Running(u32),
    /// Reached zero on this tick. Disarms itself.
    Expired,
}

impl Countdown {
    pub fn new(duration_seconds: u32) -> Self {
        Self {
            remaining: duration_seconds,
            armed: false,
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Arms the countdown; refuses when no time is left.
    pub fn arm(&mut self) -> bool {
        self.armed = self.remaining > 0;
        self.armed
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn tick(&mut self) -> Tick {
        if !self.armed || self.remaining == 0 {
            return Tick::Idle;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.armed = false;
            Tick::Expired
        } else {
            Tick::Running(self.remaining)
        }
    }
}

/// A spawned periodic or one-shot task that stops when the handle is
/// cancelled or dropped.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: CancellationToken,
}

impl TimerHandle {
    /// Calls `on_tick` every `period`, first after one full period, until it
    /// returns `Break` or the handle goes away.
    pub fn every<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = interval.tick() => {
                        if token.is_cancelled() || on_tick().is_break() {
                            break;
                        }
                    }
                }
            }
        });
        Self { cancel }
    }

    /// Runs `f` once after `delay` unless cancelled first.
    pub fn after<F>(delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                () = time::sleep(delay) => {
                    if !token.is_cancelled() {
                        f();
                    }
                }
            }
        });
        Self { cancel }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
