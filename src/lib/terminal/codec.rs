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

//! Inbound byte->codepoint codecs (spec §4.2), grounded on `Ansi.c` and `Vtutf8.c`.

use log::warn;
use thiserror::Error;

use crate::terminal::fifo::RawFifo;
use crate::terminal::fifo::UnicodeFifo;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    #[error("unicode fifo is full, codepoint dropped")]
    UnicodeFifoFull,
}

/// `AnsiRawDataToUnicode`: move each raw byte directly into the Unicode FIFO.
/// Control bytes below 0x20 pass through unchanged -- the FSM consumes them.
pub fn ansi_raw_to_unicode(raw: &mut RawFifo, unicode: &mut UnicodeFifo) -> Result<(), CodecError> {
    while !raw.is_empty() && !unicode.is_full() {
        let byte = raw.pop_one().expect("checked non-empty above");
        unicode
            .push_one(byte as u16)
            .map_err(|_| CodecError::UnicodeFifoFull)?;
    }
    Ok(())
}

/// `GetOneValidUtf8Char` + `Utf8ToUnicode`: pull bytes until a complete 1-3
/// byte UTF-8 codepoint is assembled, popping eagerly and restarting on any
/// malformed continuation byte (spec §9 -- this is intentionally kept, not
/// hardened with lookahead).
pub fn vtutf8_raw_to_unicode(raw: &mut RawFifo, unicode: &mut UnicodeFifo) -> Result<(), CodecError> {
    while !raw.is_empty() && !unicode.is_full() {
        match get_one_valid_utf8_char(raw) {
            Some(codepoint) => {
                unicode
                    .push_one(codepoint)
                    .map_err(|_| CodecError::UnicodeFifoFull)?;
            }
            None => {
                // Raw FIFO ran dry mid-sequence; the unread prefix was already
                // consumed (matches the source's eager-pop behavior) and the
                // next call starts a fresh search.
                break;
            }
        }
    }
    Ok(())
}

/// Mirrors the source's `ValidBytes` state machine: 0 (searching for a lead
/// byte), 2 (mid two-byte sequence), 3 (mid three-byte sequence, `Index`
/// tracks which continuation byte is next).
fn get_one_valid_utf8_char(raw: &mut RawFifo) -> Option<u16> {
    let mut valid_bytes: u8 = 0;
    let mut index: u8 = 0;
    let mut b0: u8 = 0;
    let mut b1: u8 = 0;
    let mut b2: u8 = 0;

    while let Ok(temp) = raw.pop_one() {
        match valid_bytes {
            0 => {
                if temp & 0x80 == 0 {
                    return Some(temp as u16);
                } else if temp & 0xE0 == 0xC0 {
                    valid_bytes = 2;
                    b1 = temp;
                } else if temp & 0xF0 == 0xE0 {
                    valid_bytes = 3;
                    b2 = temp;
                    index = 1;
                } else {
                    warn!("vt-utf8: malformed lead byte {:#x}, restarting", temp);
                    valid_bytes = 0;
                }
            }
            2 => {
                if temp & 0xC0 == 0x80 {
                    b0 = temp;
                    return Some(decode_two(b0, b1));
                } else {
                    warn!("vt-utf8: malformed continuation byte {:#x}, restarting", temp);
                    valid_bytes = 0;
                }
            }
            3 => {
                if temp & 0xC0 == 0x80 {
                    if index == 1 {
                        b1 = temp;
                        index = 2;
                    } else {
                        b0 = temp;
                        return Some(decode_three(b0, b1, b2));
                    }
                } else {
                    warn!("vt-utf8: malformed continuation byte {:#x}, restarting", temp);
                    valid_bytes = 0;
                    index = 0;
                }
            }
            _ => unreachable!(),
        }
    }
    None
}

fn decode_two(byte0: u8, byte1: u8) -> u16 {
    let lo = (byte1 << 6) | (byte0 & 0x3f);
    let hi = (byte1 >> 2) & 0x07;
    (lo as u16) | ((hi as u16) << 8)
}

fn decode_three(byte0: u8, byte1: u8, byte2: u8) -> u16 {
    let lo = (byte1 << 6) | (byte0 & 0x3f);
    let hi = (byte2 << 4) | ((byte1 >> 2) & 0x0f);
    (lo as u16) | ((hi as u16) << 8)
}

/// `UnicodeToUtf8`: encode one UCS-2 codepoint as 1-3 UTF-8 bytes.
pub fn unicode_to_utf8(unicode: u16) -> Vec<u8> {
    if unicode < 0x0080 {
        vec![(unicode as u8) & 0x7f]
    } else if unicode < 0x0800 {
        let byte0 = unicode as u8;
        let byte1 = (unicode >> 8) as u8;
        vec![
            (((byte1 << 2) + (byte0 >> 6)) & 0x1f) + 0xc0,
            (byte0 & 0x3f) + 0x80,
        ]
    } else {
        let byte0 = unicode as u8;
        let byte1 = (unicode >> 8) as u8;
        vec![
            ((byte1 >> 4) & 0x0f) + 0xe0,
            (((byte1 << 2) + (byte0 >> 6)) & 0x3f) + 0x80,
            (byte0 & 0x3f) + 0x80,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_raw(bytes: &[u8]) -> RawFifo {
        let mut raw = RawFifo::new();
        for &b in bytes {
            raw.push_one(b).unwrap();
        }
        raw
    }

    #[test]
    fn ansi_codec_passes_bytes_through_verbatim() {
        let mut raw = fill_raw(&[0x41, 0x01, 0x7f]);
        let mut unicode = UnicodeFifo::new();
        ansi_raw_to_unicode(&mut raw, &mut unicode).unwrap();
        assert_eq!(unicode.pop_one(), Ok(0x41));
        assert_eq!(unicode.pop_one(), Ok(0x01));
        assert_eq!(unicode.pop_one(), Ok(0x7f));
    }

    #[test]
    fn vtutf8_decodes_one_two_three_byte_sequences() {
        let mut raw = fill_raw(&[0x41, 0xC2, 0xA9, 0xE2, 0x98, 0x83]);
        let mut unicode = UnicodeFifo::new();
        vtutf8_raw_to_unicode(&mut raw, &mut unicode).unwrap();
        assert_eq!(unicode.pop_one(), Ok(0x41));
        assert_eq!(unicode.pop_one(), Ok(0x00A9)); // copyright sign
        assert_eq!(unicode.pop_one(), Ok(0x2603)); // snowman
        assert!(unicode.is_empty());
    }

    #[test]
    fn vtutf8_restarts_on_malformed_continuation() {
        // 0xC2 starts a two-byte sequence, 0x41 is not a continuation byte:
        // the decoder drops the partial sequence and restarts, treating 0x41
        // as the next lead byte (source-compatible, see spec §9).
        let mut raw = fill_raw(&[0xC2, 0x41]);
        let mut unicode = UnicodeFifo::new();
        vtutf8_raw_to_unicode(&mut raw, &mut unicode).unwrap();
        assert_eq!(unicode.pop_one(), Ok(0x41));
        assert!(unicode.is_empty());
    }

    #[test]
    fn vtutf8_leaves_partial_sequence_for_next_call() {
        let mut raw = fill_raw(&[0xE2, 0x98]);
        let mut unicode = UnicodeFifo::new();
        vtutf8_raw_to_unicode(&mut raw, &mut unicode).unwrap();
        assert!(unicode.is_empty());
        assert!(raw.is_empty()); // bytes were consumed per the eager-pop behavior
    }

    #[test]
    fn utf8_boundary_cases() {
        assert_eq!(unicode_to_utf8(0x007F), vec![0x7F]);
        assert_eq!(unicode_to_utf8(0x07FF), vec![0xDF, 0xBF]);
        assert_eq!(unicode_to_utf8(0x0800), vec![0xE0, 0xA0, 0x80]);
    }

    #[test]
    fn encode_decode_round_trip_below_0x80() {
        for c in 0u16..0x80 {
            let bytes = unicode_to_utf8(c);
            assert_eq!(bytes.len(), 1);
            let mut raw = fill_raw(&bytes);
            let mut unicode = UnicodeFifo::new();
            vtutf8_raw_to_unicode(&mut raw, &mut unicode).unwrap();
            assert_eq!(unicode.pop_one(), Ok(c));
        }
    }
}
