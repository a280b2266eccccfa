/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::BufRead;

use super::jpeg_code;
use crate::helpers::has_ff;
use crate::recode_error::{err_exit_code, ExitCode, RecodeError, Result};

// Implementation of bit reader on top of JPEG data stream as read by a reader
pub struct BitReader<R> {
    inner: R,
    bits: u64,
    bits_left: u32,
    cpos: u32,
    eof: bool,
    read_ahead_bytes: u32,
}

impl<R: BufRead> BitReader<R> {
    pub fn new(inner: R) -> Self {
        BitReader {
            inner,
            bits: 0,
            bits_left: 0,
            cpos: 0,
            eof: false,
            read_ahead_bytes: 0,
        }
    }

    #[inline(always)]
    pub fn read(&mut self, bits_to_read: u32) -> Result<u16> {
        if bits_to_read == 0 {
            return Ok(0);
        }

        if self.bits_left < bits_to_read {
            self.fill_register(bits_to_read)?;
        }

        let retval =
            (self.bits >> (self.bits_left - bits_to_read) & ((1 << bits_to_read) - 1)) as u16;
        self.bits_left -= bits_to_read;
        Ok(retval)
    }

    #[inline(always)]
    pub fn peek(&self) -> (u8, u32) {
        (
            ((self.bits.wrapping_shl(64 - self.bits_left)) >> 56) as u8,
            self.bits_left,
        )
    }

    #[inline(always)]
    pub fn advance(&mut self, bits: u32) {
        self.bits_left -= bits;
    }

    #[inline(always)]
    pub fn fill_register(&mut self, bits_to_read: u32) -> Result<()> {
        // first consume the read_ahead bytes that we have now consumed
        // (otherwise we wouldn't have been called)
        self.inner.consume(self.read_ahead_bytes as usize);
        self.read_ahead_bytes = 0;

        let fb = self.inner.fill_buf()?;

        // if we have 8 bytes and there is no 0xff in them, then we can just read the bits directly as big endian
        let v = match fb.get(..8).map(<[u8; 8]>::try_from) {
            Some(Ok(b)) if !has_ff(u64::from_le_bytes(b)) => u64::from_be_bytes(b),
            _ => return self.fill_register_slow(bits_to_read),
        };

        // only fill 63 bits not 64 to avoid having to special case
        // of self.bits << 64 which is a nop
        let bytes_to_read = (63 - self.bits_left) / 8;

        self.bits = self.bits << (bytes_to_read * 8) | v >> (64 - bytes_to_read * 8);
        self.bits_left += bytes_to_read * 8;
        self.read_ahead_bytes = (self.bits_left - bits_to_read) / 8;

        self.inner
            .consume((bytes_to_read - self.read_ahead_bytes) as usize);

        Ok(())
    }

    #[cold]
    fn fill_register_slow(&mut self, bits_to_read: u32) -> Result<()> {
        loop {
            let fb = self.inner.fill_buf()?;
            if let &[b, ..] = fb {
                self.inner.consume(1);

                // 0xff is an escape code, if the next byte is zero, then it is just a normal 0xff
                if b == 0xff {
                    let mut buffer = [0u8];

                    if self.inner.read(&mut buffer)? == 0 {
                        // a stream that ends in the middle of an escape is treated as truncated
                        self.eof = true;
                        self.bits = (self.bits << 8) | 0xff;
                        self.bits_left += 8;
                    } else if buffer[0] == 0 {
                        // this was an escaped FF
                        self.bits = (self.bits << 8) | 0xff;
                        self.bits_left += 8;
                    } else {
                        // a marker in the middle of entropy coded data that is not a restart
                        // where we expected one, which we have no way to reproduce
                        return Err(RecodeError::new(
                            ExitCode::InvalidResetCode,
                            format!(
                                "invalid reset {0:x} {1:x} code found in stream",
                                0xff, buffer[0]
                            ),
                        ));
                    }
                } else {
                    self.bits = (self.bits << 8) | u64::from(b);
                    self.bits_left += 8;
                }
            } else {
                // past the end of the stream everything reads as zero, the caller checks
                // is_eof to find out that the data was truncated
                self.eof = true;
                self.bits_left += 8;
                self.bits <<= 8;
            }

            if self.bits_left >= bits_to_read {
                break;
            }
        }
        Ok(())
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Used to verify whether this image is using 1s or 0s as fill bits.
    /// Records the fill bit in `pad_bit` if it was unknown so far.
    pub fn read_and_verify_fill_bits(&mut self, pad_bit: &mut Option<u8>) -> Result<()> {
        self.undo_read_ahead();

        // if there are bits left, we need to see whether they
        // are 1s or zeros.
        if self.bits_left > 0 && !self.eof {
            let num_bits_to_read = self.bits_left;
            let actual = self.read(num_bits_to_read)?;
            let all_one = (1 << num_bits_to_read) - 1;

            match *pad_bit {
                None => {
                    if actual == 0 {
                        *pad_bit = Some(0);
                    } else if actual == all_one {
                        *pad_bit = Some(0xff);
                    } else {
                        return err_exit_code(
                            ExitCode::InvalidPadding,
                            format!(
                                "inconsistent pad bits num_bits={0} pattern={1:b}",
                                num_bits_to_read, actual
                            ),
                        );
                    }
                }
                Some(x) => {
                    // if we already saw a padding, then it should match
                    let expected = u16::from(x) & all_one;
                    if actual != expected {
                        return err_exit_code(
                            ExitCode::InvalidPadding,
                            format!(
                                "padding of {0} bits should be {2:b} actual={1:b}",
                                num_bits_to_read, actual, expected
                            ),
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Reads the restart marker that has to follow a completed restart interval
    pub fn verify_reset_code(&mut self) -> Result<()> {
        self.undo_read_ahead();

        let mut h = [0u8; 2];
        self.inner.read_exact(&mut h)?;
        if h[0] != 0xff || h[1] != (jpeg_code::RST0 + (self.cpos as u8 & 7)) {
            return err_exit_code(
                ExitCode::InvalidResetCode,
                format!("invalid reset code {0:x} {1:x} found in stream", h[0], h[1]),
            );
        }

        // start from scratch after RST
        self.cpos += 1;
        self.bits = 0;
        self.bits_left = 0;

        Ok(())
    }

    /// "puts back" read_ahead bits that were read ahead from the buffer but not consumed.
    ///
    /// After calling this method read_ahead_bytes is 0 and the only bits that are
    /// left are part of the current byte.
    pub fn undo_read_ahead(&mut self) {
        while self.bits_left >= 8 && self.read_ahead_bytes > 0 {
            self.bits_left -= 8;
            self.bits >>= 8;
            self.read_ahead_bytes -= 1;
        }

        if self.read_ahead_bytes > 0 {
            self.inner.consume(self.read_ahead_bytes as usize);
            self.read_ahead_bytes = 0;
        }
    }

    /// gives back the underlying reader, positioned after the last byte that was consumed
    pub fn into_inner(mut self) -> R {
        self.undo_read_ahead();
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // test reading a simple bit pattern with an escaped 0xff inside it.
    #[test]
    fn read_simple() {
        let arr = [0x12u8, 0x34, 0x45, 0x67, 0x89, 0xff, 00, 0xee];

        let mut b = BitReader::new(Cursor::new(&arr));

        assert_eq!(1, b.read(4).unwrap());
        assert_eq!(2, b.read(4).unwrap());
        assert_eq!(3, b.read(4).unwrap());
        assert_eq!(4, b.read(4).unwrap());
        assert_eq!(4, b.read(4).unwrap());
        assert_eq!(0x56, b.read(8).unwrap()); // 8 bits between 0x45 and 0x67
        assert_eq!(0x78, b.read(8).unwrap());
        assert_eq!(0x9f, b.read(8).unwrap());
        assert_eq!(0xfe, b.read(8).unwrap());
        assert_eq!(0xe, b.read(4).unwrap());
        assert!(!b.is_eof());

        // read an empty byte passed the end of the stream.. should be zero and trigger EOF
        assert_eq!(0, b.read(8).unwrap());
        assert!(b.is_eof());
    }

    #[test]
    fn restart_markers_are_verified() {
        let arr = [0b1010_1111u8, 0xff, 0xd0, 0x80, 0xff, 0xd2];
        let mut b = BitReader::new(Cursor::new(&arr));

        assert_eq!(0b1010, b.read(4).unwrap());
        let mut pad = None;
        b.read_and_verify_fill_bits(&mut pad).unwrap();
        assert_eq!(pad, Some(0xff));
        b.verify_reset_code().unwrap();

        assert_eq!(1, b.read(1).unwrap());
        b.read_and_verify_fill_bits(&mut pad).unwrap_err();
    }

    #[test]
    fn wrong_restart_number_is_rejected() {
        let arr = [0xffu8, 0xd1];
        let mut b = BitReader::new(Cursor::new(&arr));

        let e = b.verify_reset_code().unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::InvalidResetCode);
    }

    #[test]
    fn stray_marker_is_rejected() {
        let arr = [0x12u8, 0xff, 0xd9];
        let mut b = BitReader::new(Cursor::new(&arr));

        assert_eq!(0x12, b.read(8).unwrap());
        let e = b.read(8).unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::InvalidResetCode);
    }

    #[test]
    fn into_inner_stops_after_consumed_bytes() {
        let arr = [0x12u8, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf0, 0x11, 0x22];
        let mut b = BitReader::new(Cursor::new(&arr));

        assert_eq!(0x123, b.read(12).unwrap());
        b.read_and_verify_fill_bits(&mut Some(0)).unwrap_err();

        let mut b = BitReader::new(Cursor::new(&arr));
        assert_eq!(0x1234, b.read(16).unwrap());
        assert_eq!(b.into_inner().position(), 2);
    }
}
