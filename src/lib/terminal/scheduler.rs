// Copyright 2023 Meta Platforms, Inc. and affiliates.
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Timer/poll driver (spec §4.5), generalized per the §9 design note into a
//! small scheduler trait instead of threading raw event handles everywhere.

/// Default periodic poll interval (spec §4.5, §6): 20 ms.
pub const POLL_PERIOD_MS: u64 = 20;
/// One-shot escape timeout (spec §4.3, §6): 2 s.
pub const ESCAPE_TIMEOUT_MS: u64 = 2_000;

/// Collaborator abstraction over "periodic tick" / "one-shot after N ms" /
/// "wait for any of several signals" (spec §6's Timer collaborator, generalized).
///
/// A real platform would back this with firmware timer events; this crate
/// only needs a caller-driven variant for its own tests and the CLI's offline
/// simulation mode, provided below as [`ManualScheduler`].
pub trait Scheduler {
    /// Advance the scheduler's notion of "now" by `elapsed_ms`, returning
    /// which one-shot timers fired during that interval.
    fn advance(&mut self, elapsed_ms: u64) -> SchedulerEvents;

    /// Arm the one-shot escape timer relative to the current time.
    fn arm_escape_timeout(&mut self);

    /// Cancel the one-shot escape timer (on flush or successful match).
    fn cancel_escape_timeout(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerEvents {
    pub poll_ticks: u32,
    pub escape_timed_out: bool,
}

/// A scheduler driven entirely by explicit `advance()` calls -- no real OS
/// timer. Used by the library's own tests and the CLI's `simulate` subcommand
/// (spec §6: real serial/timer I/O is out of scope).
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now_ms: u64,
    next_poll_ms: u64,
    escape_deadline_ms: Option<u64>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        ManualScheduler {
            now_ms: 0,
            next_poll_ms: POLL_PERIOD_MS,
            escape_deadline_ms: None,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn advance(&mut self, elapsed_ms: u64) -> SchedulerEvents {
        self.now_ms += elapsed_ms;
        let mut events = SchedulerEvents::default();
        while self.next_poll_ms <= self.now_ms {
            events.poll_ticks += 1;
            self.next_poll_ms += POLL_PERIOD_MS;
        }
        if let Some(deadline) = self.escape_deadline_ms {
            if self.now_ms >= deadline {
                events.escape_timed_out = true;
                self.escape_deadline_ms = None;
            }
        }
        events
    }

    fn arm_escape_timeout(&mut self) {
        self.escape_deadline_ms = Some(self.now_ms + ESCAPE_TIMEOUT_MS);
    }

    fn cancel_escape_timeout(&mut self) {
        self.escape_deadline_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_ticks_fire_every_20ms() {
        let mut s = ManualScheduler::new();
        let events = s.advance(45);
        assert_eq!(events.poll_ticks, 2);
        let events = s.advance(20);
        assert_eq!(events.poll_ticks, 1);
    }

    #[test]
    fn escape_timeout_fires_after_2s() {
        let mut s = ManualScheduler::new();
        s.arm_escape_timeout();
        let events = s.advance(1_999);
        assert!(!events.escape_timed_out);
        let events = s.advance(2);
        assert!(events.escape_timed_out);
    }

    #[test]
    fn cancel_prevents_timeout() {
        let mut s = ManualScheduler::new();
        s.arm_escape_timeout();
        s.cancel_escape_timeout();
        let events = s.advance(5_000);
        assert!(!events.escape_timed_out);
    }
}
