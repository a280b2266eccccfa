/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use log::warn;

/// once at least this many bytes have been handed to the output, the prefix
/// of the buffer is dropped so the retained buffer stays small
const RELEASE_THRESHOLD: usize = 64 * 1024;

/// Packs variable length huffman codes into bytes.
///
/// Unlike a plain JPEG bit writer this one does NOT escape 0xff, the bytes are kept raw
/// so that the byte stuffing can be done incrementally as the data is handed to the output.
/// The buffer is consumed from the front: `buffer_offset` is the absolute position of the first
/// retained byte and the caller releases bytes it has already copied out.
pub struct BitWriter {
    data_buffer: Vec<u8>,
    fill_register: u64,
    current_bit: u32,
    buffer_offset: u64,
    max_size: usize,
    overflowed: bool,
}

impl BitWriter {
    /// `preload` is the initial capacity, `max_size` the most bytes we will ever retain
    pub fn new(preload: usize, max_size: usize) -> Self {
        BitWriter {
            data_buffer: Vec::with_capacity(preload.min(max_size)),
            fill_register: 0,
            current_bit: 64,
            buffer_offset: 0,
            max_size,
            overflowed: false,
        }
    }

    #[inline(always)]
    fn push_bytes(&mut self, bytes: &[u8]) {
        if self.data_buffer.len() + bytes.len() > self.max_size {
            self.mark_overflow();
            return;
        }

        self.data_buffer.extend_from_slice(bytes);
    }

    #[cold]
    #[inline(never)]
    fn mark_overflow(&mut self) {
        if !self.overflowed {
            warn!(
                "entropy buffer exceeded its limit of {0} bytes, dropping output",
                self.max_size
            );
        }
        self.overflowed = true;
    }

    /// moves the whole bytes sitting in the register into the buffer, leaving at most 7 bits behind
    pub fn flush_whole_bytes(&mut self) {
        while self.current_bit <= 56 {
            let b = (self.fill_register >> 56) as u8;
            self.push_bytes(&[b]);

            self.fill_register <<= 8;
            self.current_bit += 8;
        }
    }

    /// appends the low `new_bits` bits of `val`, most significant bit first
    #[inline(always)]
    pub fn write(&mut self, val: u32, new_bits: u32) {
        debug_assert!(
            val < (1 << new_bits),
            "value {0} should fit into the number of {1} bits provided",
            val,
            new_bits
        );

        // first see if everything fits in the current register
        if new_bits <= self.current_bit {
            self.fill_register |= (val as u64).wrapping_shl(self.current_bit - new_bits); // support corner case where new_bits is zero, we don't want to panic
            self.current_bit -= new_bits;
        } else {
            // fill the register to the 64 bit boundary and move it to the buffer in one go
            let fill = self.fill_register | (val as u64).wrapping_shr(new_bits - self.current_bit);

            let leftover_new_bits = new_bits - self.current_bit;
            let leftover_val = val & ((1 << leftover_new_bits) - 1);

            self.push_bytes(&fill.to_be_bytes());

            self.fill_register = (leftover_val as u64).wrapping_shl(64 - leftover_new_bits);
            self.current_bit = 64 - leftover_new_bits;
        }
    }

    /// fills the partial byte with the pad bits (bit i of fillbit is used for the i-th pad bit)
    pub fn pad(&mut self, fillbit: u8) {
        let mut offset = 1;
        while (self.current_bit & 7) != 0 {
            self.write(if (fillbit & offset) != 0 { 1 } else { 0 }, 1);
            offset <<= 1;
        }

        self.flush_whole_bytes();
    }

    /// true if no partial byte is pending
    pub fn has_no_remainder(&self) -> bool {
        (self.current_bit & 7) == 0
    }

    /// raw (unescaped) bytes that are still retained
    pub fn buffer(&self) -> &[u8] {
        &self.data_buffer
    }

    /// absolute position of the first retained byte
    pub fn buffer_offset(&self) -> u64 {
        self.buffer_offset
    }

    /// absolute position just past the last byte in the buffer
    pub fn position(&self) -> u64 {
        self.buffer_offset + self.data_buffer.len() as u64
    }

    /// absolute number of whole bytes produced so far, counting the ones still in the register
    pub fn whole_bytes_position(&self) -> u64 {
        self.position() + u64::from((64 - self.current_bit) / 8)
    }

    /// number of bytes retained in the buffer
    pub fn amount_buffered(&self) -> usize {
        self.data_buffer.len()
    }

    /// true if bytes were dropped because the buffer would have grown past its maximum size
    pub fn has_overflowed(&self) -> bool {
        self.overflowed
    }

    /// drops the bytes before absolute position `upto`, which the caller has already consumed
    pub fn release_flushed(&mut self, upto: u64) {
        let consumed = upto.saturating_sub(self.buffer_offset) as usize;
        let consumed = consumed.min(self.data_buffer.len());

        if consumed >= RELEASE_THRESHOLD {
            self.data_buffer.drain(..consumed);
            self.buffer_offset += consumed as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::helpers::u16_bit_length;
    use crate::jpeg::bit_reader::BitReader;

    fn stuff(raw: &[u8]) -> Vec<u8> {
        let mut r = Vec::new();
        for &b in raw {
            r.push(b);
            if b == 0xff {
                r.push(0);
            }
        }
        r
    }

    // write a test pattern containing an 0xff and make sure it stays unescaped
    #[test]
    fn write_simple() {
        let arr = [0x12, 0x34, 0x45, 0x67, 0x89, 0xff, 0xee];

        let mut b = BitWriter::new(1024, 1024);

        b.write(1, 4);
        b.write(2, 4);
        b.write(3, 4);
        b.write(4, 4);
        b.write(4, 4);
        b.write(0x56, 8);
        b.write(0x78, 8);
        b.write(0x9f, 8);
        b.write(0xfe, 8);
        b.write(0xe, 4);

        assert!(b.has_no_remainder());
        b.flush_whole_bytes();

        assert_eq!(b.buffer(), &arr[..]);
        assert_eq!(b.position(), 7);
        assert_eq!(b.whole_bytes_position(), 7);
    }

    #[test]
    fn whole_bytes_in_register_are_counted() {
        let mut b = BitWriter::new(16, 16);
        b.write(0xabc, 12);
        assert_eq!(b.position(), 0);
        assert_eq!(b.whole_bytes_position(), 1);

        b.write(0xf, 4);
        assert_eq!(b.whole_bytes_position(), 2);

        b.flush_whole_bytes();
        assert_eq!(b.position(), 2);
        assert_eq!(b.whole_bytes_position(), 2);
    }

    #[test]
    fn pad_with_ones_and_zeros() {
        let mut b = BitWriter::new(16, 16);
        b.write(0b101, 3);
        assert!(!b.has_no_remainder());
        b.pad(0xff);
        assert!(b.has_no_remainder());
        assert_eq!(b.buffer(), &[0b1011_1111]);

        b.write(0b1, 1);
        b.pad(0);
        assert_eq!(b.buffer(), &[0b1011_1111, 0b1000_0000]);
    }

    // verify the the bits roundtrip correctly in a fairly simple scenario
    #[test]
    fn roundtrip_bits() {
        let mut b = BitWriter::new(1024, 1 << 20);
        for i in 1..2048 {
            b.write(i, u16_bit_length(i as u16) as u32);
        }

        b.pad(0xff);

        let buf = stuff(b.buffer());

        let mut r = BitReader::new(Cursor::new(&buf[..]));

        for i in 1..2048 {
            assert_eq!(i, r.read(u16_bit_length(i) as u32).unwrap());
        }

        let mut pad = Some(0xff);
        r.read_and_verify_fill_bits(&mut pad).unwrap();
    }

    /// verify the the bits roundtrip correctly with random bits
    #[test]
    fn roundtrip_randombits() {
        #[derive(Copy, Clone)]
        enum Action {
            Write(u16, u8),
            Pad(u8),
        }

        use rand::Rng;

        const ITERATIONS: usize = 10000;

        let mut rng = crate::helpers::get_rand_from_seed([0u8; 32]);
        let mut test_data = Vec::with_capacity(ITERATIONS);

        for _ in 0..ITERATIONS {
            let bits = rng.gen_range(0..=16);

            let t = rng.gen_range(0..=3);
            let v = match t {
                0 => 0,
                1 => 0xffff,
                _ => rng.gen_range(0..=65535),
            };

            let v = v & ((1 << bits) - 1);

            if rng.gen_range(0..100) == 0 {
                test_data.push(Action::Pad(0xff));
            } else {
                test_data.push(Action::Write(v as u16, bits as u8));
            }
        }
        test_data.push(Action::Pad(0xff));

        let mut b = BitWriter::new(1024, 1 << 20);
        for &i in &test_data {
            match i {
                Action::Write(v, bits) => b.write(v as u32, bits as u32),
                Action::Pad(fill) => b.pad(fill),
            }
        }
        let buf = stuff(b.buffer());

        let mut r = BitReader::new(Cursor::new(&buf[..]));

        for a in test_data {
            match a {
                Action::Write(code, numbits) => {
                    assert_eq!(
                        code,
                        r.read(numbits as u32).unwrap(),
                        "read unexpected result"
                    );
                }
                Action::Pad(fill) => {
                    let mut pad = Some(fill);
                    r.read_and_verify_fill_bits(&mut pad).unwrap();
                }
            }
        }
    }

    #[test]
    fn overflow_is_flagged_and_bounded() {
        let mut b = BitWriter::new(4, 16);
        for _ in 0..100 {
            b.write(0xabcd, 16);
        }
        b.pad(0);

        assert!(b.has_overflowed());
        assert!(b.amount_buffered() <= 16);
    }

    #[test]
    fn release_keeps_absolute_positions() {
        let mut b = BitWriter::new(1024, 1 << 20);
        for _ in 0..RELEASE_THRESHOLD + 10 {
            b.write(0x5a, 8);
        }
        b.flush_whole_bytes();
        assert_eq!(b.position(), (RELEASE_THRESHOLD + 10) as u64);

        // below the threshold nothing is dropped
        b.release_flushed(100);
        assert_eq!(b.buffer_offset(), 0);

        b.release_flushed(RELEASE_THRESHOLD as u64 + 2);
        assert_eq!(b.buffer_offset(), RELEASE_THRESHOLD as u64 + 2);
        assert_eq!(b.amount_buffered(), 8);
        assert_eq!(b.position(), (RELEASE_THRESHOLD + 10) as u64);
    }
}
