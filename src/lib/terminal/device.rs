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

//! Ties fifo + codec + fsm + outbound + scheduler together into one terminal
//! instance, grounded on the `TERMINAL_DEV` struct in `Terminal.h`.

use anyhow::Result as AnyResult;
use log::debug;
use log::info;
use thiserror::Error;

use crate::terminal::codec;
use crate::terminal::console_vars::all_terminal_types;
use crate::terminal::console_vars::ConsoleVariable;
use crate::terminal::console_vars::ConsoleVariableStore;
use crate::terminal::fifo::KeyFifo;
use crate::terminal::fifo::RawFifo;
use crate::terminal::fifo::UnicodeFifo;
use crate::terminal::fsm::Fsm;
use crate::terminal::fsm::FsmError;
use crate::terminal::fsm::KeyData;
use crate::terminal::fsm::TerminalType;
use crate::terminal::outbound::OutboundState;
use crate::terminal::scheduler::ManualScheduler;
use crate::terminal::scheduler::Scheduler;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device is not started")]
    NotStarted,
    #[error(transparent)]
    Fsm(#[from] FsmError),
}

/// Lifecycle mirroring `TerminalConInReset`/`...Start`/`...Stop`: a device
/// must be started before it accepts input or produces output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceLifecycle {
    Stopped,
    Started,
}

/// One logical `TERMINAL_DEV`: the raw byte intake, the Unicode staging
/// FIFO, the escape-sequence recognizer, the decoded key queue, and the
/// outbound cursor/attribute state, all driven by a [`Scheduler`].
pub struct TerminalDevice {
    lifecycle: DeviceLifecycle,
    terminal_type: TerminalType,
    raw: RawFifo,
    unicode: UnicodeFifo,
    keys: KeyFifo,
    fsm: Fsm,
    pub outbound: OutboundState,
    scheduler: ManualScheduler,
}

impl TerminalDevice {
    pub fn new(terminal_type: TerminalType, max_col: u16, max_row: u16) -> Self {
        TerminalDevice {
            lifecycle: DeviceLifecycle::Stopped,
            terminal_type,
            raw: RawFifo::new(),
            unicode: UnicodeFifo::new(),
            keys: KeyFifo::new(),
            fsm: Fsm::new(terminal_type),
            outbound: OutboundState::new(terminal_type, max_col, max_row),
            scheduler: ManualScheduler::new(),
        }
    }

    pub fn start(&mut self) {
        info!("terminal device started ({:?})", self.terminal_type);
        self.lifecycle = DeviceLifecycle::Started;
    }

    pub fn stop(&mut self) {
        info!("terminal device stopped");
        self.lifecycle = DeviceLifecycle::Stopped;
    }

    /// Full bind-start: starts the instance and, for a non-hot-plug device,
    /// appends every supported terminal-type variant of
    /// `parent_device_path` to `ConInDev`/`ConOutDev`/`ErrOutDev`.
    pub fn bind_start(
        &mut self,
        store: &mut impl ConsoleVariableStore,
        parent_device_path: &[u8],
        hot_plug: bool,
    ) -> AnyResult<()> {
        self.start();
        if !hot_plug {
            let terminal_types = all_terminal_types();
            for var in [
                ConsoleVariable::ConIn,
                ConsoleVariable::ConOut,
                ConsoleVariable::ErrOut,
            ] {
                store.append_variants(var, parent_device_path, &terminal_types)?;
            }
        }
        Ok(())
    }

    /// Full bind-stop: removes every variant carrying `parent_device_path`
    /// from the three console variables, then stops the instance.
    pub fn bind_stop(
        &mut self,
        store: &mut impl ConsoleVariableStore,
        parent_device_path: &[u8],
    ) -> AnyResult<()> {
        for var in [
            ConsoleVariable::ConIn,
            ConsoleVariable::ConOut,
            ConsoleVariable::ErrOut,
        ] {
            store.remove_variants(var, parent_device_path)?;
        }
        self.stop();
        Ok(())
    }

    fn require_started(&self) -> Result<(), DeviceError> {
        if self.lifecycle != DeviceLifecycle::Started {
            return Err(DeviceError::NotStarted);
        }
        Ok(())
    }

    /// Feed raw serial bytes in, run the codec and FSM to drain any complete
    /// keys, and advance the escape timeout clock by `elapsed_ms`.
    pub fn feed_bytes(&mut self, bytes: &[u8], elapsed_ms: u64) -> Result<(), DeviceError> {
        self.require_started()?;
        for &b in bytes {
            // Best-effort per spec: a full raw FIFO drops the newest byte,
            // matching the original's silent-discard-on-overflow behavior.
            let _ = self.raw.push_one(b);
        }

        match self.terminal_type {
            TerminalType::VtUtf8 => {
                codec::vtutf8_raw_to_unicode(&mut self.raw, &mut self.unicode)
            }
            _ => codec::ansi_raw_to_unicode(&mut self.raw, &mut self.unicode),
        }
        .ok();

        while let Ok(c) = self.unicode.pop_one() {
            self.fsm.feed(c, &mut self.keys)?;
            if self.fsm.state_is_default() {
                self.scheduler.cancel_escape_timeout();
            } else {
                self.scheduler.arm_escape_timeout();
            }
        }

        let events = self.scheduler.advance(elapsed_ms);
        if events.escape_timed_out {
            debug!("escape timeout fired, flushing pending sequence as literals");
            self.fsm.on_timeout(&mut self.keys)?;
        }
        Ok(())
    }

    /// Drain decoded keys in arrival order.
    pub fn read_key(&mut self) -> Option<KeyData> {
        self.keys.pop_one().ok()
    }

    pub fn write_string(&mut self, text: &[u16]) -> Result<Vec<u8>, DeviceError> {
        self.require_started()?;
        let (bytes, _warnings) = self.outbound.emit_string(text);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::console_vars::InMemoryConsoleVariableStore;

    #[test]
    fn bind_start_records_a_variant_per_terminal_type_when_not_hot_plug() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        let mut store = InMemoryConsoleVariableStore::new();
        dev.bind_start(&mut store, b"parent", false).unwrap();
        assert_eq!(
            store.variants(ConsoleVariable::ConIn).unwrap().len(),
            all_terminal_types().len()
        );
        assert_eq!(
            store.variants(ConsoleVariable::ErrOut).unwrap().len(),
            all_terminal_types().len()
        );
    }

    #[test]
    fn bind_start_skips_variable_updates_for_hot_plug_devices() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        let mut store = InMemoryConsoleVariableStore::new();
        dev.bind_start(&mut store, b"parent", true).unwrap();
        assert!(store.variants(ConsoleVariable::ConIn).unwrap().is_empty());
    }

    #[test]
    fn bind_stop_removes_variants_for_its_parent_path() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        let mut store = InMemoryConsoleVariableStore::new();
        dev.bind_start(&mut store, b"parent", false).unwrap();
        dev.bind_stop(&mut store, b"parent").unwrap();
        assert!(store.variants(ConsoleVariable::ConOut).unwrap().is_empty());
    }

    #[test]
    fn feeding_before_start_is_refused() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        assert!(matches!(
            dev.feed_bytes(b"a", 0),
            Err(DeviceError::NotStarted)
        ));
    }

    #[test]
    fn ordinary_byte_becomes_a_literal_key() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        dev.start();
        dev.feed_bytes(b"a", 0).unwrap();
        let key = dev.read_key().unwrap();
        assert_eq!(key.unicode_char, b'a' as u16);
    }

    #[test]
    fn arrow_sequence_becomes_a_scan_code() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        dev.start();
        dev.feed_bytes(&[0x1B, b'[', b'A'], 0).unwrap();
        let key = dev.read_key().unwrap();
        assert_eq!(key.unicode_char, 0);
    }

    #[test]
    fn write_string_round_trips_through_outbound() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        dev.start();
        let bytes = dev.write_string(&[b'h' as u16, b'i' as u16]).unwrap();
        assert_eq!(bytes, vec![b'h', b'i']);
    }

    #[test]
    fn escape_timeout_flushes_pending_as_literals() {
        let mut dev = TerminalDevice::new(TerminalType::Vt100, 80, 25);
        dev.start();
        dev.feed_bytes(&[0x1B], 0).unwrap();
        assert!(dev.read_key().is_none());
        dev.feed_bytes(&[], 2_001).unwrap();
        let key = dev.read_key().unwrap();
        assert_eq!(key.unicode_char, 0x1B);
    }
}
