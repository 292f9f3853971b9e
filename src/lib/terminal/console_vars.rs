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

//! Console-device NVRAM bookkeeping (spec §6, "Persisted state"): on
//! bind-start a non-hot-plug device appends one device-path variant per
//! supported terminal type to each of `ConInDev`/`ConOutDev`/`ErrOutDev`
//! under the EFI global variable GUID; on bind-stop all variants carrying
//! its parent device path are removed. Kept as a trait so the core stays
//! free of a real NVRAM dependency; [`SysfsConsoleVariableStore`] is the
//! glue backing it with `/sys/firmware/efi/efivars`, reusing the
//! mount/immutability/lock helpers the source project already carries for
//! this exact purpose in `hii::efivarfs`/`chattr`/`file_lock`.

use std::fs::File;
use std::io::Read;
use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use log::debug;

use crate::chattr::EfivarsImmutabilityGuard;
use crate::file_lock::FileLock;
use crate::hii::efivarfs::EfivarsMountGuard;
use crate::terminal::fsm::TerminalType;

const EFI_GLOBAL_VARIABLE_GUID: &str = "8BE4DF61-93CA-11D2-AA0D-00E098032B8C";
const LOCK_FILE_PATH: &str = "/run/lock/efibootmgr-remount";

const EFI_VARIABLE_NON_VOLATILE: u32 = 0x0000_0001;
const EFI_VARIABLE_BOOTSERVICE_ACCESS: u32 = 0x0000_0002;
const EFI_VARIABLE_RUNTIME_ACCESS: u32 = 0x0000_0004;
const DEFAULT_ATTRS: u32 =
    EFI_VARIABLE_NON_VOLATILE | EFI_VARIABLE_BOOTSERVICE_ACCESS | EFI_VARIABLE_RUNTIME_ACCESS;

/// Which of the three console-device variables a bind touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleVariable {
    ConIn,
    ConOut,
    ErrOut,
}

impl ConsoleVariable {
    fn name(self) -> &'static str {
        match self {
            ConsoleVariable::ConIn => "ConInDev",
            ConsoleVariable::ConOut => "ConOutDev",
            ConsoleVariable::ErrOut => "ErrOutDev",
        }
    }
}

/// The messaging vendor-GUID node a device path carries to select a
/// supported terminal type; an unrecognized GUID rejects the bind.
fn device_path_guid(terminal_type: TerminalType) -> &'static str {
    match terminal_type {
        TerminalType::PcAnsi => "E0C14753-F9BE-11D2-9A0C-0090273FC14D",
        TerminalType::Vt100 => "DFA66065-B419-11D3-9A2D-0090273FC14D",
        TerminalType::Vt100Plus => "7BAEC218-B419-11D3-9A2D-0090273FC14D",
        TerminalType::VtUtf8 => "AD15A0D6-8BEC-4ACF-A073-D01DE77E2D88",
        TerminalType::TtyTerm => "DFA66065-B419-11D3-9A2D-0090273FC14E",
        TerminalType::Linux => "7BAEC218-B419-11D3-9A2D-0090273FC14E",
        TerminalType::XtermR6 => "7BAEC218-B419-11D3-9A2D-0090273FC150",
        TerminalType::Vt400 => "7BAEC218-B419-11D3-9A2D-0090273FC151",
        TerminalType::Sco => "7BAEC218-B419-11D3-9A2D-0090273FC152",
    }
}

fn terminal_type_from_guid(guid: &str) -> Option<TerminalType> {
    all_terminal_types()
        .into_iter()
        .find(|&t| device_path_guid(t) == guid)
}

pub fn all_terminal_types() -> [TerminalType; 9] {
    [
        TerminalType::PcAnsi,
        TerminalType::Vt100,
        TerminalType::Vt100Plus,
        TerminalType::VtUtf8,
        TerminalType::TtyTerm,
        TerminalType::Linux,
        TerminalType::XtermR6,
        TerminalType::Vt400,
        TerminalType::Sco,
    ]
}

/// One device-path variant recorded in a console variable: a parent
/// device path plus the vendor-GUID node selecting a terminal type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePathVariant {
    pub parent_device_path: Vec<u8>,
    pub terminal_type: TerminalType,
}

/// `append_variants`/`remove_variants` mutate the variable's full variant
/// list as a unit, matching how TerminalDxe rewrites the whole variable on
/// each bind transition rather than patching it in place.
pub trait ConsoleVariableStore {
    fn variants(&self, var: ConsoleVariable) -> Result<Vec<DevicePathVariant>>;
    fn append_variants(
        &mut self,
        var: ConsoleVariable,
        parent_device_path: &[u8],
        terminal_types: &[TerminalType],
    ) -> Result<()>;
    fn remove_variants(&mut self, var: ConsoleVariable, parent_device_path: &[u8]) -> Result<()>;
}

fn encode_variants(variants: &[DevicePathVariant]) -> Vec<u8> {
    let mut out = Vec::new();
    for variant in variants {
        let path = &variant.parent_device_path;
        out.extend_from_slice(&(path.len() as u16).to_le_bytes());
        out.extend_from_slice(path);
        out.extend_from_slice(device_path_guid(variant.terminal_type).as_bytes());
    }
    out
}

fn decode_variants(raw: &[u8]) -> Vec<DevicePathVariant> {
    let mut variants = Vec::new();
    let mut cursor = 0usize;
    while cursor + 2 <= raw.len() {
        let path_len = u16::from_le_bytes([raw[cursor], raw[cursor + 1]]) as usize;
        cursor += 2;
        if cursor + path_len + 36 > raw.len() {
            break;
        }
        let parent_device_path = raw[cursor..cursor + path_len].to_vec();
        cursor += path_len;
        let guid_str = match std::str::from_utf8(&raw[cursor..cursor + 36]) {
            Ok(s) => s,
            Err(_) => break,
        };
        cursor += 36;
        match terminal_type_from_guid(guid_str) {
            Some(terminal_type) => variants.push(DevicePathVariant {
                parent_device_path,
                terminal_type,
            }),
            None => continue,
        }
    }
    variants
}

/// Backs [`ConsoleVariableStore`] with the real `/sys/firmware/efi/efivars`
/// filesystem, reusing the same mount-remount/immutability/flock dance the
/// source project uses for writing any other EFI variable.
pub struct SysfsConsoleVariableStore;

impl SysfsConsoleVariableStore {
    pub fn new() -> Self {
        SysfsConsoleVariableStore
    }

    fn var_path(name: &str) -> String {
        format!(
            "/sys/firmware/efi/efivars/{}-{}",
            name, EFI_GLOBAL_VARIABLE_GUID
        )
    }

    fn read_raw(name: &str) -> Result<Vec<u8>> {
        let path = Self::var_path(name);
        match File::open(&path) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)
                    .context("failed to read console variable")?;
                // efivarfs prepends a 4-byte attributes word to the payload.
                Ok(if buf.len() >= 4 {
                    buf[4..].to_vec()
                } else {
                    Vec::new()
                })
            }
            Err(_) => Ok(Vec::new()),
        }
    }

    fn write_raw(name: &str, payload: &[u8]) -> Result<()> {
        let path = Self::var_path(name);
        let mut lock = FileLock::new(LOCK_FILE_PATH);
        lock.lock()?;
        let _mount = EfivarsMountGuard::new().context("failed to mount efivars rw")?;
        let _immutable = EfivarsImmutabilityGuard::new(&path)
            .context("failed to clear immutability attribute")?;

        let mut out = Vec::with_capacity(4 + payload.len());
        out.extend_from_slice(&DEFAULT_ATTRS.to_le_bytes());
        out.extend_from_slice(payload);

        debug!("writing {} bytes to {}", out.len(), path);
        File::create(&path)
            .context("failed to open console variable for writing")?
            .write_all(&out)
            .context("failed to write console variable")?;
        Ok(())
    }
}

impl Default for SysfsConsoleVariableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleVariableStore for SysfsConsoleVariableStore {
    fn variants(&self, var: ConsoleVariable) -> Result<Vec<DevicePathVariant>> {
        Ok(decode_variants(&Self::read_raw(var.name())?))
    }

    fn append_variants(
        &mut self,
        var: ConsoleVariable,
        parent_device_path: &[u8],
        terminal_types: &[TerminalType],
    ) -> Result<()> {
        let mut variants = self.variants(var)?;
        for &terminal_type in terminal_types {
            variants.push(DevicePathVariant {
                parent_device_path: parent_device_path.to_vec(),
                terminal_type,
            });
        }
        Self::write_raw(var.name(), &encode_variants(&variants))
    }

    fn remove_variants(&mut self, var: ConsoleVariable, parent_device_path: &[u8]) -> Result<()> {
        let variants = self.variants(var)?;
        let kept: Vec<_> = variants
            .into_iter()
            .filter(|v| v.parent_device_path != parent_device_path)
            .collect();
        Self::write_raw(var.name(), &encode_variants(&kept))
    }
}

/// In-memory fixture for tests and the CLI's simulation subcommand, in the
/// same spirit as the in-memory `Serial`/`Screen` fixtures named in spec §6.
#[derive(Default)]
pub struct InMemoryConsoleVariableStore {
    con_in: Vec<DevicePathVariant>,
    con_out: Vec<DevicePathVariant>,
    err_out: Vec<DevicePathVariant>,
}

impl InMemoryConsoleVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, var: ConsoleVariable) -> &mut Vec<DevicePathVariant> {
        match var {
            ConsoleVariable::ConIn => &mut self.con_in,
            ConsoleVariable::ConOut => &mut self.con_out,
            ConsoleVariable::ErrOut => &mut self.err_out,
        }
    }
}

impl ConsoleVariableStore for InMemoryConsoleVariableStore {
    fn variants(&self, var: ConsoleVariable) -> Result<Vec<DevicePathVariant>> {
        Ok(match var {
            ConsoleVariable::ConIn => self.con_in.clone(),
            ConsoleVariable::ConOut => self.con_out.clone(),
            ConsoleVariable::ErrOut => self.err_out.clone(),
        })
    }

    fn append_variants(
        &mut self,
        var: ConsoleVariable,
        parent_device_path: &[u8],
        terminal_types: &[TerminalType],
    ) -> Result<()> {
        let slot = self.slot(var);
        for &terminal_type in terminal_types {
            slot.push(DevicePathVariant {
                parent_device_path: parent_device_path.to_vec(),
                terminal_type,
            });
        }
        Ok(())
    }

    fn remove_variants(&mut self, var: ConsoleVariable, parent_device_path: &[u8]) -> Result<()> {
        self.slot(var)
            .retain(|v| v.parent_device_path != parent_device_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        let variants = vec![
            DevicePathVariant {
                parent_device_path: vec![1, 2, 3],
                terminal_type: TerminalType::Vt100,
            },
            DevicePathVariant {
                parent_device_path: vec![9],
                terminal_type: TerminalType::VtUtf8,
            },
        ];
        let encoded = encode_variants(&variants);
        assert_eq!(decode_variants(&encoded), variants);
    }

    #[test]
    fn decode_stops_cleanly_on_truncated_trailer() {
        let mut encoded = encode_variants(&[DevicePathVariant {
            parent_device_path: vec![1, 2, 3],
            terminal_type: TerminalType::Vt100,
        }]);
        encoded.truncate(encoded.len() - 1);
        assert!(decode_variants(&encoded).is_empty());
    }

    #[test]
    fn append_adds_one_variant_per_terminal_type() {
        let mut store = InMemoryConsoleVariableStore::new();
        store
            .append_variants(
                ConsoleVariable::ConIn,
                b"parent",
                &[TerminalType::Vt100, TerminalType::VtUtf8],
            )
            .unwrap();
        assert_eq!(store.variants(ConsoleVariable::ConIn).unwrap().len(), 2);
        assert!(store.variants(ConsoleVariable::ConOut).unwrap().is_empty());
    }

    #[test]
    fn remove_clears_only_the_matching_parent_path() {
        let mut store = InMemoryConsoleVariableStore::new();
        store
            .append_variants(ConsoleVariable::ConOut, b"a", &[TerminalType::Vt100])
            .unwrap();
        store
            .append_variants(ConsoleVariable::ConOut, b"b", &[TerminalType::Vt100])
            .unwrap();
        store
            .remove_variants(ConsoleVariable::ConOut, b"a")
            .unwrap();
        let remaining = store.variants(ConsoleVariable::ConOut).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].parent_device_path, b"b");
    }
}
