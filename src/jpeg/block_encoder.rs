/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/*
Copyright (c) 2006...2016, Matthias Stirner and HTW Aalen University
All rights reserved.

Redistribution and use in source and binary forms, with or without
modification, are permitted provided that the following conditions are
met:

1. Redistributions of source code must retain the above copyright
notice, this list of conditions and the following disclaimer.

2. Redistributions in binary form must reproduce the above copyright
notice, this list of conditions and the following disclaimer in the
documentation and/or other materials provided with the distribution.

THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED
TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A
PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED
TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
*/

use crate::recode_error::{err_exit_code, ExitCode, Result};

use super::bit_writer::BitWriter;
use super::jpeg_header::HuffCodes;

/// largest magnitude category a baseline DC difference can have
const MAX_DC_CATEGORY: u8 = 11;

/// largest magnitude category a baseline AC coefficient can have
const MAX_AC_CATEGORY: u8 = 10;

/// Encodes a single block of coefficients into the entropy coded stream.
pub trait BlockEncoder {
    /// Writes `block` (zigzag order, DC already differenced against its predictor)
    /// and returns the index one past the last non-zero coefficient.
    fn encode_block(
        &mut self,
        huffw: &mut BitWriter,
        dctbl: &HuffCodes,
        actbl: &HuffCodes,
        block: &[i16; 64],
    ) -> Result<usize>;
}

/// Baseline sequential Huffman coding of a block.
#[derive(Default, Debug, Clone, Copy)]
pub struct HuffmanBlockEncoder {}

impl BlockEncoder for HuffmanBlockEncoder {
    #[inline(never)]
    fn encode_block(
        &mut self,
        huffw: &mut BitWriter,
        dctbl: &HuffCodes,
        actbl: &HuffCodes,
        block: &[i16; 64],
    ) -> Result<usize> {
        // encode DC
        write_coef(huffw, block[0], 0, dctbl, MAX_DC_CATEGORY)?;

        let mut z = 0;
        let mut eob = 0;

        // encode AC
        for bpos in 1..64 {
            // if nonzero is encountered
            let tmp = block[bpos];
            if tmp == 0 {
                z += 1;
                continue;
            }

            // if we have 16 or more zero, we need to write them in blocks of 16
            while z >= 16 {
                write_symbol(huffw, actbl, 0xF0)?;
                z -= 16;
            }

            write_coef(huffw, tmp, z, actbl, MAX_AC_CATEGORY)?;

            // reset zeroes
            z = 0;
            eob = bpos + 1;
        }

        // write eob if needed
        if z != 0 {
            write_symbol(huffw, actbl, 0x00)?;
        }

        Ok(eob)
    }
}

/// writes a bare huffman symbol, failing if the table has no code for it
#[inline(always)]
fn write_symbol(huffw: &mut BitWriter, tbl: &HuffCodes, symbol: u8) -> Result<()> {
    let len = tbl.c_len[usize::from(symbol)];
    if len == 0 {
        return missing_code(symbol);
    }

    huffw.write(tbl.c_val[usize::from(symbol)].into(), len.into());
    Ok(())
}

/// encodes a coefficient which is a huffman code specifying the size followed
/// by the coefficient itself
#[inline(always)]
fn write_coef(huffw: &mut BitWriter, coef: i16, z: u8, tbl: &HuffCodes, max_category: u8) -> Result<()> {
    // vli encode
    let (n, s) = envli(coef);
    if s > max_category {
        return err_exit_code(
            ExitCode::CodingError,
            format!("coefficient {0} too large for baseline coding", coef),
        );
    }

    let hc = usize::from(((z & 0xf) << 4) + s);
    let len = tbl.c_len[hc];
    if len == 0 {
        return missing_code(hc as u8);
    }

    // write to huffman writer (combine into single write)
    let val = (u32::from(tbl.c_val[hc]) << s) | u32::from(n);
    let new_bits = u32::from(len) + u32::from(s);
    huffw.write(val, new_bits);

    Ok(())
}

#[cold]
fn missing_code<T>(symbol: u8) -> Result<T> {
    err_exit_code(
        ExitCode::CodingError,
        format!("huffman table has no code for symbol {0:#04x}", symbol),
    )
}

/// prepares a coefficient for encoding. Calculates the bitlength s and makes v positive
/// by adding (1 << s) - 1 if the number is negative
#[inline(always)]
fn envli(v: i16) -> (u16, u8) {
    if v == 0 {
        return (0, 0);
    }

    let s = 16 - v.unsigned_abs().leading_zeros();
    let n = if v > 0 {
        v as u32
    } else {
        (i32::from(v) - 1 + (1 << s)) as u32
    };

    (n as u16, s as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::helpers::devli;
    use crate::jpeg::bit_reader::BitReader;

    /// table where symbol s gets the 8 bit code s (only a subset of symbols present)
    fn identity_table(symbols: impl Iterator<Item = u8>) -> HuffCodes {
        let mut hc = HuffCodes::default();
        for s in symbols {
            hc.c_val[usize::from(s)] = u16::from(s);
            hc.c_len[usize::from(s)] = 8;
        }
        hc
    }

    #[test]
    fn envli_matches_devli() {
        for v in -2047i16..=2047 {
            let (n, s) = envli(v);
            assert_eq!(devli(s, n), v, "value {0}", v);
        }
    }

    #[test]
    fn encodes_zero_runs_and_eob() {
        let dc = identity_table(0..12);
        let ac = identity_table(0..=255);

        let mut block = [0i16; 64];
        block[0] = -3;
        block[20] = 1;

        let mut huffw = BitWriter::new(64, 1024);
        let eob = HuffmanBlockEncoder::default()
            .encode_block(&mut huffw, &dc, &ac, &block)
            .unwrap();
        huffw.pad(0xff);

        assert_eq!(eob, 21);

        let mut r = BitReader::new(Cursor::new(huffw.buffer()));
        // DC: category 2, value -3 -> 00
        assert_eq!(r.read(8).unwrap(), 2);
        assert_eq!(r.read(2).unwrap(), 0);
        // 19 zeros: one ZRL, then run of 3 with category 1
        assert_eq!(r.read(8).unwrap(), 0xF0);
        assert_eq!(r.read(8).unwrap(), 0x31);
        assert_eq!(r.read(1).unwrap(), 1);
        // EOB
        assert_eq!(r.read(8).unwrap(), 0x00);
    }

    #[test]
    fn full_block_has_no_eob() {
        let dc = identity_table(0..12);
        let ac = identity_table(1..=255);

        let block = [1i16; 64];
        let mut huffw = BitWriter::new(64, 1024);
        let eob = HuffmanBlockEncoder::default()
            .encode_block(&mut huffw, &dc, &ac, &block)
            .unwrap();
        assert_eq!(eob, 64);
    }

    #[test]
    fn missing_symbols_are_coding_errors() {
        let dc = identity_table(0..12);
        let ac = identity_table(1..=255);

        // needs an EOB which the AC table lacks
        let mut block = [0i16; 64];
        block[1] = 5;

        let mut huffw = BitWriter::new(64, 1024);
        let e = HuffmanBlockEncoder::default()
            .encode_block(&mut huffw, &dc, &ac, &block)
            .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::CodingError);
    }

    #[test]
    fn out_of_range_dc_is_coding_error() {
        let dc = identity_table(0..=255);
        let ac = identity_table(0..=255);

        let mut block = [0i16; 64];
        block[0] = i16::MIN;

        let mut huffw = BitWriter::new(64, 1024);
        let e = HuffmanBlockEncoder::default()
            .encode_block(&mut huffw, &dc, &ac, &block)
            .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::CodingError);
    }
}
