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

//! Shared status vocabulary used across the terminal and HII subsystems (spec §7).

/// Status kinds surfaced at collaborator contract boundaries.
///
/// This is not itself an [`std::error::Error`] impl; per-subsystem error enums
/// (`FifoError`, `FsmError`, `CodecError`, `ParseError`, `EvalError`,
/// `BrowserError`, `StorageError`) wrap the relevant variant and add their own
/// context (offending opcode, offset, codepoint).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareStatus {
    InvalidParameter,
    NotFound,
    NotReady,
    DeviceError,
    OutOfResources,
    Unsupported,
    AlreadyStarted,
    WarnUnknownGlyph,
    AccessDenied,
    Timeout,
}

impl std::fmt::Display for FirmwareStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FirmwareStatus::InvalidParameter => "invalid parameter",
            FirmwareStatus::NotFound => "not found",
            FirmwareStatus::NotReady => "not ready",
            FirmwareStatus::DeviceError => "device error",
            FirmwareStatus::OutOfResources => "out of resources",
            FirmwareStatus::Unsupported => "unsupported",
            FirmwareStatus::AlreadyStarted => "already started",
            FirmwareStatus::WarnUnknownGlyph => "unknown glyph substituted",
            FirmwareStatus::AccessDenied => "access denied",
            FirmwareStatus::Timeout => "timeout",
        };
        f.write_str(s)
    }
}
