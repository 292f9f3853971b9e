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

//! Outbound sequencer (spec §4.4), grounded on `TerminalConOut.c`: the glyph
//! table, the in-place attribute-template patching technique, and the TTY
//! auto-wrap workaround.

use log::warn;

use crate::status::FirmwareStatus;
use crate::terminal::fsm::TerminalType;

const ESC: u8 = 0x1B;

/// `UnicodeToPcAnsiOrAscii`: box-draw/block/geometric/arrow glyphs (Unicode
/// pages 0x2500 and 0x2100) map to a PC-ANSI high-bit byte or an ASCII
/// approximation, terminated in the source by a zero sentinel.
const GLYPH_TABLE: &[(u16, u8, u8)] = &[
    (0x2500, 0xC4, b'-'), // BOXDRAW_HORIZONTAL
    (0x2502, 0xB3, b'|'), // BOXDRAW_VERTICAL
    (0x250C, 0xDA, b'+'), // BOXDRAW_DOWN_RIGHT
    (0x2510, 0xBF, b'+'), // BOXDRAW_DOWN_LEFT
    (0x2514, 0xC0, b'+'), // BOXDRAW_UP_RIGHT
    (0x2518, 0xD9, b'+'), // BOXDRAW_UP_LEFT
    (0x251C, 0xC3, b'+'), // BOXDRAW_VERTICAL_RIGHT
    (0x2524, 0xB4, b'+'), // BOXDRAW_VERTICAL_LEFT
    (0x252C, 0xC2, b'+'), // BOXDRAW_DOWN_HORIZONTAL
    (0x2534, 0xC1, b'+'), // BOXDRAW_UP_HORIZONTAL
    (0x253C, 0xC5, b'+'), // BOXDRAW_VERTICAL_HORIZONTAL
    (0x2550, 0xCD, b'='), // BOXDRAW_DOUBLE_HORIZONTAL
    (0x2551, 0xBA, b'|'), // BOXDRAW_DOUBLE_VERTICAL
    (0x2588, 0xDB, b'#'), // BLOCKELEMENT_FULL_BLOCK
    (0x2591, 0xB0, b'.'), // BLOCKELEMENT_LIGHT_SHADE
    (0x25B2, 0x1E, b'^'), // GEOMETRICSHAPE_UP_TRIANGLE
    (0x25BC, 0x1F, b'v'), // GEOMETRICSHAPE_DOWN_TRIANGLE
    (0x2190, 0x1B, b'<'), // ARROW_LEFT
    (0x2191, 0x18, b'^'), // ARROW_UP
    (0x2192, 0x1A, b'>'), // ARROW_RIGHT
    (0x2193, 0x19, b'v'), // ARROW_DOWN
];

fn glyph_lookup(c: u16) -> Option<(u8, u8)> {
    GLYPH_TABLE
        .iter()
        .find(|&&(u, _, _)| u == c)
        .map(|&(_, pc_ansi, ascii)| (pc_ansi, ascii))
}

fn is_control(c: u16) -> bool {
    matches!(c, 0x00 | 0x08 | 0x0A | 0x0D | 0x09)
}

fn is_valid_for_output(terminal_type: TerminalType, c: u16) -> bool {
    if terminal_type == TerminalType::VtUtf8 {
        return true;
    }
    (0x20..=0x7E).contains(&c) || is_control(c) || glyph_lookup(c).is_some()
}

/// Cursor/attribute bookkeeping owned by a terminal instance's outbound side.
pub struct OutboundState {
    terminal_type: TerminalType,
    pub col: u16,
    pub row: u16,
    pub max_col: u16,
    pub max_row: u16,
    pub attribute: u8,
    last_emitted_attribute: Option<u8>,
    pub output_escape_allowed: bool,
}

impl OutboundState {
    pub fn new(terminal_type: TerminalType, max_col: u16, max_row: u16) -> Self {
        OutboundState {
            terminal_type,
            col: 0,
            row: 0,
            max_col,
            max_row,
            attribute: 0,
            last_emitted_attribute: None,
            output_escape_allowed: true,
        }
    }

    /// Encode and emit a UCS-2 string, returning the bytes that would be
    /// written to the serial collaborator plus any warning statuses raised
    /// for substituted glyphs (spec §7 `WARN_UNKNOWN_GLYPH`).
    pub fn emit_string(&mut self, text: &[u16]) -> (Vec<u8>, Vec<FirmwareStatus>) {
        let mut bytes = Vec::new();
        let mut warnings = Vec::new();
        for &c in text {
            self.emit_one(c, &mut bytes, &mut warnings);
        }
        (bytes, warnings)
    }

    fn emit_one(&mut self, c: u16, bytes: &mut Vec<u8>, warnings: &mut Vec<FirmwareStatus>) {
        if !is_valid_for_output(self.terminal_type, c) {
            warn!("outbound: no glyph for {:#x}, substituting '?'", c);
            warnings.push(FirmwareStatus::WarnUnknownGlyph);
            bytes.push(b'?');
            self.advance_cursor();
            return;
        }

        if self.terminal_type == TerminalType::VtUtf8 {
            bytes.extend(super::codec::unicode_to_utf8(c));
        } else if let Some((pc_ansi, ascii)) = glyph_lookup(c) {
            if self.terminal_type == TerminalType::PcAnsi {
                bytes.push(pc_ansi);
            } else {
                bytes.push(ascii);
            }
        } else {
            bytes.push(c as u8);
        }

        match c {
            0x08 => self.col = self.col.saturating_sub(1), // BS
            0x0A => self.row = (self.row + 1).min(self.max_row.saturating_sub(1)), // LF
            0x0D => self.col = 0,                          // CR
            _ => self.advance_cursor_with_wrap_workaround(bytes),
        }
    }

    fn advance_cursor(&mut self) {
        self.col += 1;
        if self.col >= self.max_col {
            self.col = 0;
            self.row = (self.row + 1).min(self.max_row.saturating_sub(1));
        }
    }

    fn advance_cursor_with_wrap_workaround(&mut self, bytes: &mut Vec<u8>) {
        let wrapped = self.col + 1 >= self.max_col;
        self.advance_cursor();
        if wrapped
            && self.terminal_type == TerminalType::TtyTerm
            && !self.output_escape_allowed
        {
            bytes.push(b'\r');
            bytes.push(b'\n');
        }
    }

    /// `ESC [ 0 ; fg ; bg m` built by patching three ASCII-digit positions of
    /// a fixed template in place, per `TerminalConOutSetAttribute`.
    pub fn set_attribute(&mut self, attr: u8) -> Option<Vec<u8>> {
        if self.last_emitted_attribute == Some(attr) {
            return None; // throughput suppression (spec §9: no desync correction)
        }
        self.attribute = attr;
        self.last_emitted_attribute = Some(attr);

        let foreground = attr & 0x07;
        let bright = (attr >> 3) & 0x01;
        let background = (attr >> 4) & 0x07;

        let mut template: Vec<u8> = vec![
            ESC, b'[', b'0', b'm', ESC, b'[', b'4', b'0', b'm', ESC, b'[', b'4', b'0', b'm',
        ];
        const BRIGHT_CONTROL_OFFSET: usize = 2;
        const FOREGROUND_CONTROL_OFFSET: usize = 6;
        const BACKGROUND_CONTROL_OFFSET: usize = 11;
        template[BRIGHT_CONTROL_OFFSET] = b'0' + bright;
        template[FOREGROUND_CONTROL_OFFSET] = b'0' + foreground;
        template[BACKGROUND_CONTROL_OFFSET] = b'0' + background;
        Some(template)
    }

    pub fn clear_screen(&mut self) -> Vec<u8> {
        self.col = 0;
        self.row = 0;
        format!("{}[2J", ESC as char).into_bytes()
    }

    /// `ESC [ r ; c H` (1-based); TTY same-row movement uses `ESC [ n C/D`.
    pub fn set_cursor_position(&mut self, col: u16, row: u16) -> Vec<u8> {
        let bytes = if self.terminal_type == TerminalType::TtyTerm && row == self.row {
            if col > self.col {
                format!("{}[{}C", ESC as char, col - self.col).into_bytes()
            } else if col < self.col {
                format!("{}[{}D", ESC as char, self.col - col).into_bytes()
            } else {
                Vec::new()
            }
        } else {
            format!("{}[{};{}H", ESC as char, row + 1, col + 1).into_bytes()
        };
        self.col = col;
        self.row = row;
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_round_trips() {
        let mut s = OutboundState::new(TerminalType::Vt100, 80, 25);
        s.set_attribute(0x1A).unwrap();
        assert_eq!(s.attribute, 0x1A);
    }

    #[test]
    fn repeated_attribute_is_suppressed() {
        let mut s = OutboundState::new(TerminalType::Vt100, 80, 25);
        assert!(s.set_attribute(0x05).is_some());
        assert!(s.set_attribute(0x05).is_none());
    }

    #[test]
    fn cursor_round_trips_within_bounds() {
        let mut s = OutboundState::new(TerminalType::Vt100, 80, 25);
        s.set_cursor_position(10, 5);
        assert_eq!((s.col, s.row), (10, 5));
    }

    #[test]
    fn backspace_decrements_column_clamped_at_zero() {
        let mut s = OutboundState::new(TerminalType::Vt100, 80, 25);
        let (_, _) = s.emit_string(&[0x08]);
        assert_eq!(s.col, 0);
    }

    #[test]
    fn unknown_glyph_substitutes_and_warns() {
        let mut s = OutboundState::new(TerminalType::Vt100, 80, 25);
        let (bytes, warnings) = s.emit_string(&[0x4E2D]); // CJK, not in glyph table
        assert_eq!(bytes, vec![b'?']);
        assert_eq!(warnings, vec![FirmwareStatus::WarnUnknownGlyph]);
    }

    #[test]
    fn box_draw_glyph_uses_pc_ansi_byte_on_pc_ansi_terminal() {
        let mut s = OutboundState::new(TerminalType::PcAnsi, 80, 25);
        let (bytes, warnings) = s.emit_string(&[0x2500]);
        assert_eq!(bytes, vec![0xC4]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn box_draw_glyph_uses_ascii_approximation_elsewhere() {
        let mut s = OutboundState::new(TerminalType::Vt100, 80, 25);
        let (bytes, _) = s.emit_string(&[0x2502]);
        assert_eq!(bytes, vec![b'|']);
    }
}
