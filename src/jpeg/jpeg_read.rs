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

use std::io::BufRead;

use log::{debug, info};

use crate::consts::*;
use crate::enabled_features::EnabledFeatures;
use crate::helpers::*;
use crate::recode_error::{err_exit_code, AddContext, ExitCode, Result};

use super::bit_reader::BitReader;
use super::block_based_image::BlockBasedImage;
use super::jpeg_code;
use super::jpeg_header::{HuffTree, JpegHeader, ReconstructionInfo};
use super::jpeg_position_state::{JpegPositionState, McuPositionIterator};

/// Reads a baseline JPEG file and returns everything needed to write it back bit for bit.
///
/// The coefficients end up in one `BlockBasedImage` per component (zigzag order, DC already
/// undifferenced). Anything about the bitstream that the recoder cannot derive from the
/// coefficients (pad bits, stray restart markers, trailing bytes) goes into the `ReconstructionInfo`.
///
/// Files that use coding choices the recoder would not reproduce are rejected rather than
/// decomposed, since they could never be written back identically.
pub fn read_jpeg_file<R: BufRead>(
    reader: &mut R,
    enabled_features: &EnabledFeatures,
) -> Result<(JpegHeader, ReconstructionInfo, Vec<BlockBasedImage>)> {
    let mut startheader = [0u8; 2];
    reader.read_exact(&mut startheader).context()?;
    if startheader != SOI {
        return err_exit_code(
            ExitCode::UnsupportedJpeg,
            "jpeg must start with with 0xff 0xd8",
        );
    }

    let mut jpeg_header = JpegHeader::default();
    let mut rinfo = ReconstructionInfo::default();

    if !jpeg_header
        .parse(reader, enabled_features, &mut rinfo.raw_jpeg_header)
        .context()?
    {
        return err_exit_code(ExitCode::UnsupportedJpeg, "Jpeg does not contain scans");
    }

    verify_baseline_scan(&jpeg_header).context()?;

    let mut image_data: Vec<BlockBasedImage> = (0..jpeg_header.cmpc)
        .map(|i| BlockBasedImage::new(&jpeg_header, i))
        .collect();

    let mut bit_reader = BitReader::new(&mut *reader);
    let mut cpos = read_scan(&jpeg_header, &mut bit_reader, &mut image_data, &mut rinfo).context()?;

    // restart markers that follow the end of the scan don't start a new interval,
    // so remember how many there were to be able to write them again
    let mut extra_rst: u8 = 0;
    let reader = bit_reader.into_inner();
    loop {
        let fb = reader.fill_buf().context()?;
        if extra_rst < u8::MAX
            && fb.len() >= 2
            && fb[0] == 0xff
            && fb[1] == jpeg_code::RST0 + (cpos as u8 & 7)
        {
            reader.consume(2);
            cpos += 1;
            extra_rst += 1;
        } else {
            break;
        }
    }

    if extra_rst > 0 {
        debug!("{0} extra restart markers after scan", extra_rst);
        rinfo.rst_err.push(extra_rst);
    }

    // everything else, including the EOI marker, is kept verbatim
    reader.read_to_end(&mut rinfo.garbage_data).context()?;

    info!(
        "decomposed {0}x{1} jpeg with {2} components, header={3} garbage={4} bytes",
        jpeg_header.img_width,
        jpeg_header.img_height,
        jpeg_header.cmpc,
        rinfo.raw_jpeg_header.len(),
        rinfo.garbage_data.len()
    );

    Ok((jpeg_header, rinfo, image_data))
}

/// rejects everything about the frame and scan that cannot be recoded by the baseline recoder
fn verify_baseline_scan(jpeg_header: &JpegHeader) -> Result<()> {
    if jpeg_header.jpeg_type == JpegType::Progressive {
        return err_exit_code(
            ExitCode::ProgressiveUnsupported,
            "progressive jpegs cannot be recoded as baseline",
        );
    }

    if jpeg_header.cs_cmpc != jpeg_header.cmpc {
        return err_exit_code(
            ExitCode::UnsupportedJpeg,
            format!(
                "scan codes {0} of {1} components, only fully interleaved scans are supported",
                jpeg_header.cs_cmpc, jpeg_header.cmpc
            ),
        );
    }

    if jpeg_header.cs_from != 0
        || jpeg_header.cs_to != 63
        || jpeg_header.cs_sah != 0
        || jpeg_header.cs_sal != 0
    {
        return err_exit_code(
            ExitCode::UnsupportedJpeg,
            "spectral selection or successive approximation in sequential scan",
        );
    }

    // should have both AC and DC components
    jpeg_header.verify_huffman_table(true, true)
}

/// Decodes all the blocks of the scan into `image_data`.
///
/// Returns the number of restart markers that were read.
fn read_scan<R: BufRead>(
    jpeg_header: &JpegHeader,
    bit_reader: &mut BitReader<R>,
    image_data: &mut [BlockBasedImage],
    rinfo: &mut ReconstructionInfo,
) -> Result<u32> {
    let mut state = JpegPositionState::new(jpeg_header);
    let mut cpos = 0;

    let mut sta = JpegDecodeStatus::DecodeInProgress;
    while sta != JpegDecodeStatus::ScanCompleted {
        // restart wait counter and DC predictors start over for every interval
        state.reset_rstw(jpeg_header);
        let mut lastdc = [0i16; 4];

        sta = JpegDecodeStatus::DecodeInProgress;
        while sta == JpegDecodeStatus::DecodeInProgress {
            let cmp = state.get_cmp();

            let mut block = [0i16; 64];
            let eob = decode_block_seq(
                bit_reader,
                jpeg_header.get_huff_dc_tree(cmp),
                jpeg_header.get_huff_ac_tree(cmp),
                &mut block,
            )
            .context()?;

            if bit_reader.is_eof() {
                return err_exit_code(
                    ExitCode::ShortRead,
                    format!("scan data truncated in mcu {0}", state.get_mcu()),
                );
            }

            // a zero run that goes right up to the EOB would be written as a plain EOB
            if eob > 1 && block[eob - 1] == 0 {
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    "cannot encode image with eob after last 0",
                );
            }

            // fix dc
            block[0] = block[0].wrapping_add(lastdc[cmp]);
            lastdc[cmp] = block[0];

            image_data[cmp].set_block_data(state.get_dpos(), &block);

            sta = state.next_mcu_pos(jpeg_header).context()?;
        }

        bit_reader
            .read_and_verify_fill_bits(&mut rinfo.pad_bit)
            .context()?;

        // verify that we got the right RST code here since the above should do 1 interval.
        // If we didn't then we won't re-encode the file binary identical so there's no point in continuing
        if sta == JpegDecodeStatus::RestartIntervalExpired {
            bit_reader.verify_reset_code().context()?;
            cpos += 1;
        }
    }

    Ok(cpos)
}

/// sequential block decoding routine
///
/// Returns the position of the EOB, or 64 if the block was coded all the way to the end.
#[inline(never)]
pub(crate) fn decode_block_seq<R: BufRead>(
    bit_reader: &mut BitReader<R>,
    dctree: &HuffTree,
    actree: &HuffTree,
    block: &mut [i16; 64],
) -> Result<usize> {
    // decode dc
    block[0] = read_dc(bit_reader, dctree)?;

    // decode ac
    let mut bpos: usize = 1;
    while bpos < 64 {
        // decode next
        if let Some((z, coef)) = read_coef(bit_reader, actree)? {
            if (z + bpos) >= 64 {
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    "zero run extends past the end of the block",
                );
            }

            // no need to write the zeros since we are already zero initialized
            bpos += z;

            block[bpos] = coef;
            bpos += 1;
        } else {
            // EOB
            return Ok(bpos);
        }
    }

    Ok(64)
}

/// Reads and decodes next Huffman code from BitReader using the provided tree
#[inline(always)]
fn next_huff_code<R: BufRead>(bit_reader: &mut BitReader<R>, ctree: &HuffTree) -> Result<u8> {
    let mut node: u16 = 0;

    while node < 256 {
        node = ctree.node[usize::from(node)][usize::from(bit_reader.read(1)?)];
    }

    if node == 0xffff {
        err_exit_code(ExitCode::UnsupportedJpeg, "illegal Huffman code detected")
    } else {
        Ok((node - 256) as u8)
    }
}

/// reads the next huffman symbol, using the peek table for codes up to 8 bits
#[inline(always)]
fn read_symbol<R: BufRead>(bit_reader: &mut BitReader<R>, tree: &HuffTree) -> Result<u8> {
    loop {
        // peek ahead to see if we can decode the symbol immediately
        // given what has already been read into the bitreader
        let (peek_value, peek_len) = bit_reader.peek();

        // use lookup table to figure out the first code in this byte and how long it is
        let (code, code_len) = tree.peek_code[usize::from(peek_value)];

        if u32::from(code_len) <= peek_len {
            // found code directly, so advance by the number of bits immediately
            bit_reader.advance(u32::from(code_len));
            return Ok(code);
        } else if peek_len < 8 {
            // peek code works with up to 8 bits at a time. If we had less
            // than this, then we need to read more bits into the bitreader
            bit_reader.fill_register(8)?;
        } else {
            // take slow path since we have a code that is bigger than 8 bits (but pretty rare)
            return next_huff_code(bit_reader, tree);
        }
    }
}

fn read_dc<R: BufRead>(bit_reader: &mut BitReader<R>, tree: &HuffTree) -> Result<i16> {
    let hc = read_symbol(bit_reader, tree)?;

    if lbits(hc, 4) != 0 {
        return err_exit_code(
            ExitCode::UnsupportedJpeg,
            "not expecting non-zero run in DC coefficient",
        );
    }

    let literal_bits = rbits(hc, 4);
    if literal_bits > 11 {
        return err_exit_code(
            ExitCode::CoefficientOutOfRange,
            format!("DC difference of category {0} is out of range", literal_bits),
        );
    }

    let value = bit_reader.read(u32::from(literal_bits))?;
    Ok(devli(literal_bits, value))
}

/// reads an AC coefficient, returning the zero run and the value, or None for EOB
#[inline(always)]
fn read_coef<R: BufRead>(
    bit_reader: &mut BitReader<R>,
    tree: &HuffTree,
) -> Result<Option<(usize, i16)>> {
    let hc = read_symbol(bit_reader, tree)?;

    // analyse code
    if hc == 0 {
        return Ok(None);
    }

    let z = usize::from(lbits(hc, 4));
    let literal_bits = rbits(hc, 4);

    if literal_bits == 0 && z != 15 {
        // only ZRL may have a zero size, the other codes are undefined
        return err_exit_code(
            ExitCode::UnsupportedJpeg,
            format!("undefined AC symbol {0:#04x}", hc),
        );
    }

    if literal_bits > 10 {
        return err_exit_code(
            ExitCode::CoefficientOutOfRange,
            format!("AC coefficient of category {0} is out of range", literal_bits),
        );
    }

    let value = bit_reader.read(u32::from(literal_bits))?;
    Ok(Some((z, devli(literal_bits, value))))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use crate::jpeg::bit_writer::BitWriter;
    use crate::jpeg::block_encoder::{BlockEncoder, HuffmanBlockEncoder};
    use crate::jpeg::jpeg_header::HuffCodes;

    /// canonical table where symbols 0..n all get codes of `len` bits
    fn flat_tables(symbols: &[u8], len: usize) -> (HuffCodes, HuffTree) {
        let mut segment = vec![0u8; 16];
        segment[len - 1] = symbols.len() as u8;
        segment.extend_from_slice(symbols);

        let hc = HuffCodes::construct_from_segment(&segment).unwrap();
        let ht = HuffTree::construct_hufftree(&hc, false).unwrap();
        (hc, ht)
    }

    #[test]
    fn decode_matches_encode() {
        let dc_symbols: Vec<u8> = (0..12).collect();
        let ac_symbols: Vec<u8> = (0..=255).filter(|x| x & 0xf <= 10).collect();

        let (dc_codes, dc_tree) = flat_tables(&dc_symbols, 4);
        let (ac_codes, ac_tree) = flat_tables(&ac_symbols, 8);

        let mut blocks = Vec::new();
        let mut b = [0i16; 64];
        b[0] = -100;
        b[1] = 1023;
        b[40] = -7;
        blocks.push(b);
        blocks.push([0; 64]);
        let mut b = [3i16; 64];
        b[0] = 2047;
        blocks.push(b);

        let mut huffw = BitWriter::new(1024, 1 << 16);
        let mut enc = HuffmanBlockEncoder::default();
        let mut eobs = Vec::new();
        for b in &blocks {
            eobs.push(enc.encode_block(&mut huffw, &dc_codes, &ac_codes, b).unwrap());
        }
        huffw.pad(0xff);

        // stuff the raw bytes the way the output would
        let mut stuffed = Vec::new();
        for &x in huffw.buffer() {
            stuffed.push(x);
            if x == 0xff {
                stuffed.push(0);
            }
        }

        let mut r = BitReader::new(Cursor::new(&stuffed[..]));
        for (b, &eob) in blocks.iter().zip(eobs.iter()) {
            let mut decoded = [0i16; 64];
            let decoded_eob = decode_block_seq(&mut r, &dc_tree, &ac_tree, &mut decoded).unwrap();
            assert_eq!(&decoded, b);
            if eob < 64 {
                assert_eq!(decoded_eob, eob.max(1));
            }
        }

        let mut pad = None;
        r.read_and_verify_fill_bits(&mut pad).unwrap();
        assert!(!r.is_eof());
    }

    #[test]
    fn undefined_ac_symbol_rejected() {
        // AC table only containing 0x10 (run of 1, size 0)
        let (_, dc_tree) = flat_tables(&[0], 1);
        let (_, ac_tree) = flat_tables(&[0x10, 0x00], 1);

        // DC code "0", then AC code "0" which is symbol 0x10
        let data = [0b0000_0000u8];
        let mut r = BitReader::new(Cursor::new(&data[..]));
        let mut block = [0i16; 64];
        let e = decode_block_seq(&mut r, &dc_tree, &ac_tree, &mut block).unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::UnsupportedJpeg);
    }
}
