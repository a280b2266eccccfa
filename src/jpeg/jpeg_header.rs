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

use std::io::Read;

use crate::consts::JpegType;
use crate::enabled_features::EnabledFeatures;
use crate::helpers::*;
use crate::recode_error::{err_exit_code, AddContext, ExitCode, Result};

use super::component_info::ComponentInfo;
use super::jpeg_code;

/// Huffman code for each of the 256 possible symbols of a table.
#[derive(Copy, Clone, Debug)]
pub struct HuffCodes {
    /// code bits of each symbol, right aligned
    pub c_val: [u16; 256],
    /// length of the code of each symbol, 0 if the symbol isn't defined
    pub c_len: [u16; 256],
}

impl Default for HuffCodes {
    fn default() -> Self {
        HuffCodes {
            c_val: [0; 256],
            c_len: [0; 256],
        }
    }
}

impl HuffCodes {
    /// Constructs from the format encoded by JPEG
    ///
    /// Tree consists of a 16 byte table with the number of codes for each bit length,
    /// followed by the actual codes for that length appended together.
    pub fn construct_from_segment(segment: &[u8]) -> Result<Self> {
        let clen_offset = 0;
        let cval_offset = 16;

        let mut hc = HuffCodes::default();

        ensure_space(segment, clen_offset, 16).context()?;

        // creating huffman-codes
        let mut k = 0;
        let mut code: u32 = 0;

        // symbol-value of code is its position in the table
        for i in 0..16 {
            let len = (1 + i) as u16;

            for _ in 0..segment[clen_offset + i] {
                ensure_space(segment, cval_offset, k + 1).context()?;

                if code >= (1u32 << len) {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        "invalid huffman code layout, too many codes for a given length",
                    );
                }

                let symbol = usize::from(segment[cval_offset + k]);
                hc.c_len[symbol] = len;
                hc.c_val[symbol] = code as u16;

                k += 1;
                code += 1;
            }

            code <<= 1;
        }

        Ok(hc)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct HuffTree {
    pub node: [[u16; 2]; 256],
    pub peek_code: [(u8, u8); 256],
}

impl Default for HuffTree {
    fn default() -> Self {
        HuffTree {
            node: [[0; 2]; 256],
            peek_code: [(0, 0); 256],
        }
    }
}

impl HuffTree {
    /// construct the huffman tree codes from the HuffCodes as a source
    pub fn construct_hufftree(hc: &HuffCodes, accept_invalid_dht: bool) -> Result<Self> {
        let mut ht = HuffTree::default();

        // work through every code creating links between the nodes (represented through ints)
        let mut nextfree = 1;
        for i in 0..256 {
            let mut node = 0;

            if hc.c_len[i] > 0 {
                let mut j = hc.c_len[i] - 1;
                while j > 0 {
                    if node <= 0xff {
                        let branch = usize::from((hc.c_val[i] >> j) & 1);
                        if ht.node[node][branch] == 0 {
                            ht.node[node][branch] = nextfree;
                            nextfree += 1;
                        }

                        node = usize::from(ht.node[node][branch]);
                    } else if !accept_invalid_dht {
                        return err_exit_code(ExitCode::UnsupportedJpeg, "Huffman table out of space");
                    }

                    j -= 1;
                }
            }

            if node <= 0xff {
                // last link is number of targetvalue + 256
                if hc.c_len[i] > 0 {
                    let branch = usize::from(hc.c_val[i] & 1);
                    ht.node[node][branch] = (i + 256) as u16;
                }
            } else if !accept_invalid_dht {
                return err_exit_code(ExitCode::UnsupportedJpeg, "Huffman table out of space");
            }
        }

        // every illegal code node gets 0xffff so that decoding stops there
        for x in &mut ht.node {
            if x[0] == 0 {
                x[0] = 0xffff;
            }
            if x[1] == 0 {
                x[1] = 0xffff;
            }
        }

        // precalculate decoding peeking into the stream. This lets us quickly decode
        // small code without jumping through the node table
        for peekbyte in 0..256 {
            let mut node = 0;
            let mut len: u8 = 0;

            while node < 256 && len <= 7 {
                node = ht.node[usize::from(node)][(peekbyte >> (7 - len)) & 0x1];

                len += 1;
            }

            if node == 0xffff || node < 256 {
                // invalid code or code was too long to fit, so take the long path to decode it
                ht.peek_code[peekbyte] = (0, 0xff);
            } else {
                ht.peek_code[peekbyte] = ((node - 256) as u8, len);
            }
        }
        Ok(ht)
    }
}

/// Image description built from the header segments. Cloned and updated
/// as the DHT, DRI and SOS segments in front of each scan are replayed.
#[derive(Debug, Clone)]
pub struct JpegHeader {
    /// quantization tables 4 x 64
    pub q_tables: [[u16; 64]; 4],
    h_codes: [[HuffCodes; 4]; 2], // huffman codes (access via get_huff_xx_codes)
    h_trees: [[HuffTree; 4]; 2],  // huffman decoding trees (access via get_huff_xx_tree)
    /// true if huffman table is set
    pub ht_set: [[bool; 4]; 2],
    /// components
    pub cmp_info: [ComponentInfo; 4],
    /// component count
    pub cmpc: usize,
    /// width of image
    pub img_width: u32,
    /// height of image
    pub img_height: u32,

    /// coding process of the frame
    pub jpeg_type: JpegType,
    /// max horizontal sample factor
    pub sfhm: u32,
    /// max verical sample factor
    pub sfvm: u32,
    /// mcus per line
    pub mcuh: u32,
    /// mcus per column
    pub mcuv: u32,
    /// count of mcus
    pub mcuc: u32,

    /// restart interval
    pub rsti: u32,
    /// component count in current scan
    pub cs_cmpc: usize,
    /// component numbers in current scan
    pub cs_cmp: [usize; 4],

    /// begin - band of current scan ( inclusive )
    pub cs_from: u8,
    /// end - band of current scan ( inclusive )
    pub cs_to: u8,
    /// successive approximation bit pos high
    pub cs_sah: u8,
    /// successive approximation bit pos low
    pub cs_sal: u8,
}

/// What the segment that was just parsed means for the caller.
#[derive(Debug, PartialEq)]
pub enum ParseSegmentResult {
    /// more header segments follow
    Continue,
    /// end of image
    EOI,
    /// start of scan, entropy coded data follows
    SOS,
}

impl Default for JpegHeader {
    fn default() -> Self {
        JpegHeader {
            q_tables: [[0; 64]; 4],
            h_codes: [[HuffCodes::default(); 4]; 2],
            h_trees: [[HuffTree::default(); 4]; 2],
            ht_set: [[false; 4]; 2],
            cmp_info: [
                ComponentInfo::default(),
                ComponentInfo::default(),
                ComponentInfo::default(),
                ComponentInfo::default(),
            ],
            cmpc: 0,
            img_width: 0,
            img_height: 0,
            jpeg_type: JpegType::Unknown,
            sfhm: 0,
            sfvm: 0,
            mcuh: 0,
            mcuv: 0,
            mcuc: 0,
            rsti: 0,
            cs_cmpc: 0,
            cs_from: 0,
            cs_to: 0,
            cs_sah: 0,
            cs_sal: 0,
            cs_cmp: [0; 4],
        }
    }
}

impl JpegHeader {
    /// DC huffman codes used by component `cmp`
    pub fn get_huff_dc_codes(&self, cmp: usize) -> &HuffCodes {
        &self.h_codes[0][usize::from(self.cmp_info[cmp].huff_dc & 3)]
    }

    pub(crate) fn get_huff_dc_tree(&self, cmp: usize) -> &HuffTree {
        &self.h_trees[0][usize::from(self.cmp_info[cmp].huff_dc & 3)]
    }

    /// AC huffman codes used by component `cmp`
    pub fn get_huff_ac_codes(&self, cmp: usize) -> &HuffCodes {
        &self.h_codes[1][usize::from(self.cmp_info[cmp].huff_ac & 3)]
    }

    pub(crate) fn get_huff_ac_tree(&self, cmp: usize) -> &HuffTree {
        &self.h_trees[1][usize::from(self.cmp_info[cmp].huff_ac & 3)]
    }

    /// Reads marker segments until the next start of scan, appending every byte read to `raw_header`.
    ///
    /// Returns false if the end of image marker (or the end of the stream) came first.
    pub fn parse<R: Read>(
        &mut self,
        reader: &mut R,
        enabled_features: &EnabledFeatures,
        raw_header: &mut Vec<u8>,
    ) -> Result<bool> {
        loop {
            match self
                .read_next_segment(reader, enabled_features, raw_header)
                .context()?
            {
                ParseSegmentResult::EOI => {
                    return Ok(false);
                }
                ParseSegmentResult::SOS => {
                    break;
                }
                ParseSegmentResult::Continue => {}
            }
        }

        self.calculate_geometry().context()?;

        Ok(true)
    }

    /// checks that the frame is complete and derives the block and MCU counts from it
    fn calculate_geometry(&mut self) -> Result<()> {
        if self.cmpc == 0 {
            return err_exit_code(
                ExitCode::UnsupportedJpeg,
                "header contains incomplete information",
            );
        }

        for cmp in 0..self.cmpc {
            if (self.cmp_info[cmp].sfv == 0)
                || (self.cmp_info[cmp].sfh == 0)
                || (self.q_tables[usize::from(self.cmp_info[cmp].q_table_index)][0] == 0)
                || (self.jpeg_type == JpegType::Unknown)
            {
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    "header contains incomplete information (components)",
                );
            }
        }

        self.sfhm = 0;
        self.sfvm = 0;
        for cmp in 0..self.cmpc {
            self.sfhm = self.sfhm.max(self.cmp_info[cmp].sfh);
            self.sfvm = self.sfvm.max(self.cmp_info[cmp].sfv);
        }

        self.mcuh = self.img_width.div_ceil(8 * self.sfhm);
        self.mcuv = self.img_height.div_ceil(8 * self.sfvm);
        self.mcuc = self.mcuh * self.mcuv;

        for cmp in 0..self.cmpc {
            let ci = &mut self.cmp_info[cmp];
            ci.mbs = ci.sfh * ci.sfv;
            ci.bch = self.mcuh * ci.sfh;
            ci.bcv = self.mcuv * ci.sfv;
            ci.bc = ci.bch * ci.bcv;
            ci.nch = (self.img_width * ci.sfh).div_ceil(8 * self.sfhm);
            ci.ncv = (self.img_height * ci.sfv).div_ceil(8 * self.sfvm);
            ci.nc = ci.nch * ci.ncv;
        }

        Ok(())
    }

    /// verifies that the huffman tables for the given types are present for the current scan, and if not, return an error
    pub fn verify_huffman_table(&self, dc_present: bool, ac_present: bool) -> Result<()> {
        for icsc in 0..self.cs_cmpc {
            let icmp = self.cs_cmp[icsc];

            if dc_present && !self.ht_set[0][usize::from(self.cmp_info[icmp].huff_dc)] {
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    format!("DC huffman table missing for component {0}", icmp),
                );
            } else if ac_present && !self.ht_set[1][usize::from(self.cmp_info[icmp].huff_ac)] {
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    format!("AC huffman table missing for component {0}", icmp),
                );
            }
        }

        Ok(())
    }

    /// reads one marker segment, records its raw bytes and interprets it
    fn read_next_segment<R: Read>(
        &mut self,
        reader: &mut R,
        enabled_features: &EnabledFeatures,
        raw_header: &mut Vec<u8>,
    ) -> Result<ParseSegmentResult> {
        let mut header = [0u8; 4];

        if reader.read(&mut header[0..1]).context()? == 0 {
            // didn't get an EOI
            return Ok(ParseSegmentResult::EOI);
        }

        if header[0] != 0xff {
            return err_exit_code(ExitCode::UnsupportedJpeg, "invalid header encountered");
        }

        reader.read_exact(&mut header[1..2]).context()?;
        if header[1] == jpeg_code::EOI {
            return Ok(ParseSegmentResult::EOI);
        }

        // now read the second two bytes so we can get the size of the segment
        reader.read_exact(&mut header[2..]).context()?;

        let segment_size = b_short(header[2], header[3]);
        if segment_size < 2 {
            return err_exit_code(ExitCode::UnsupportedJpeg, "segment is too short");
        }

        let mut segment_data = vec![0u8; usize::from(segment_size) - 2];
        reader.read_exact(&mut segment_data).context()?;

        raw_header.extend_from_slice(&header);
        raw_header.extend_from_slice(&segment_data);

        self.parse_segment(header[1], &segment_data, enabled_features)
    }

    /// Interprets the body of a single marker segment (without the marker and length).
    pub fn parse_segment(
        &mut self,
        btype: u8,
        segment: &[u8],
        enabled_features: &EnabledFeatures,
    ) -> Result<ParseSegmentResult> {
        let mut hpos = 0;
        let len = segment.len();

        match btype {
            jpeg_code::DHT => {
                // build huffman trees & codes
                while hpos < len {
                    let lval = usize::from(lbits(segment[hpos], 4));
                    let rval = usize::from(rbits(segment[hpos], 4));
                    if (lval >= 2) || (rval >= 4) {
                        break;
                    }

                    hpos += 1;

                    self.h_codes[lval][rval] =
                        HuffCodes::construct_from_segment(&segment[hpos..]).context()?;
                    self.h_trees[lval][rval] = HuffTree::construct_hufftree(
                        &self.h_codes[lval][rval],
                        enabled_features.accept_invalid_dht,
                    )
                    .context()?;
                    self.ht_set[lval][rval] = true;

                    ensure_space(segment, hpos, 16)?;

                    let skip: usize = 16 + segment[hpos..hpos + 16]
                        .iter()
                        .map(|&x| usize::from(x))
                        .sum::<usize>();

                    hpos += skip;
                }

                if hpos != len {
                    return err_exit_code(ExitCode::UnsupportedJpeg, "size mismatch in dht marker");
                }
            }

            jpeg_code::DQT => {
                // copy quantization tables to internal memory
                while hpos < len {
                    let lval = usize::from(lbits(segment[hpos], 4));
                    let rval = usize::from(rbits(segment[hpos], 4));
                    if lval >= 2 || rval >= 4 {
                        return err_exit_code(ExitCode::UnsupportedJpeg, "DQT has invalid index");
                    }

                    hpos += 1;
                    let width = if lval == 0 { 1 } else { 2 };
                    ensure_space(segment, hpos, 64 * width).context()?;

                    for i in 0..64 {
                        self.q_tables[rval][i] = if lval == 0 {
                            u16::from(segment[hpos + i])
                        } else {
                            b_short(segment[hpos + (2 * i)], segment[hpos + (2 * i) + 1])
                        };

                        if self.q_tables[rval][i] == 0 && enabled_features.reject_dqts_with_zeros {
                            return err_exit_code(ExitCode::UnsupportedJpeg, "DQT has zero value");
                        }
                    }

                    hpos += 64 * width;
                }

                if hpos != len {
                    return err_exit_code(ExitCode::UnsupportedJpeg, "size mismatch in dqt marker");
                }
            }

            jpeg_code::DRI => {
                ensure_space(segment, hpos, 2).context()?;
                self.rsti = u32::from(b_short(segment[hpos], segment[hpos + 1]));
            }

            jpeg_code::SOS => {
                ensure_space(segment, hpos, 1).context()?;

                self.cs_cmpc = usize::from(segment[hpos]);

                if self.cs_cmpc == 0 {
                    return err_exit_code(ExitCode::UnsupportedJpeg, "zero components in scan");
                }

                if self.cs_cmpc > self.cmpc {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        format!(
                            "{0} components in scan, only {1} are allowed",
                            self.cs_cmpc, self.cmpc
                        ),
                    );
                }

                hpos += 1;
                for i in 0..self.cs_cmpc {
                    ensure_space(segment, hpos, 2).context()?;

                    let cmp = match self.cmp_info[..self.cmpc]
                        .iter()
                        .position(|c| c.jid == segment[hpos])
                    {
                        Some(c) => c,
                        None => {
                            return err_exit_code(
                                ExitCode::UnsupportedJpeg,
                                "component id mismatch in start-of-scan",
                            );
                        }
                    };

                    self.cs_cmp[i] = cmp;
                    self.cmp_info[cmp].huff_dc = lbits(segment[hpos + 1], 4);
                    self.cmp_info[cmp].huff_ac = rbits(segment[hpos + 1], 4);

                    if (self.cmp_info[cmp].huff_dc >= 4) || (self.cmp_info[cmp].huff_ac >= 4) {
                        return err_exit_code(
                            ExitCode::UnsupportedJpeg,
                            "huffman table number mismatch",
                        );
                    }

                    hpos += 2;
                }

                ensure_space(segment, hpos, 3).context()?;

                self.cs_from = segment[hpos];
                self.cs_to = segment[hpos + 1];
                self.cs_sah = lbits(segment[hpos + 2], 4);
                self.cs_sal = rbits(segment[hpos + 2], 4);

                if (self.cs_from > self.cs_to) || (self.cs_from > 63) || (self.cs_to > 63) {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        "spectral selection parameter out of range",
                    );
                }

                if (self.cs_sah >= 12) || (self.cs_sal >= 12) {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        "successive approximation parameter out of range",
                    );
                }

                return Ok(ParseSegmentResult::SOS);
            }

            jpeg_code::SOF0 | jpeg_code::SOF1 | jpeg_code::SOF2 => {
                if self.jpeg_type != JpegType::Unknown {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        "image cannot have multiple SOF blocks",
                    );
                }

                self.jpeg_type = if btype == jpeg_code::SOF2 {
                    JpegType::Progressive
                } else {
                    JpegType::Sequential
                };

                ensure_space(segment, hpos, 6).context()?;

                // check data precision, only 8 bit is allowed
                let lval = segment[hpos];
                if lval != 8 {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        format!("{0} bit data precision is not supported", lval),
                    );
                }

                self.img_height = u32::from(b_short(segment[hpos + 1], segment[hpos + 2]));
                self.img_width = u32::from(b_short(segment[hpos + 3], segment[hpos + 4]));

                if self.img_height == 0 || self.img_width == 0 {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        "image dimensions can't be zero",
                    );
                }

                if self.img_height > enabled_features.max_jpeg_height
                    || self.img_width > enabled_features.max_jpeg_width
                {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        format!(
                            "image dimensions larger than {0}x{1}",
                            enabled_features.max_jpeg_width, enabled_features.max_jpeg_height
                        ),
                    );
                }

                self.cmpc = usize::from(segment[hpos + 5]);

                if self.cmpc > 4 {
                    return err_exit_code(
                        ExitCode::UnsupportedJpeg,
                        format!("image has {0} components, max 4 are supported", self.cmpc),
                    );
                }

                hpos += 6;

                for cmp in 0..self.cmpc {
                    ensure_space(segment, hpos, 3).context()?;

                    self.cmp_info[cmp].jid = segment[hpos];
                    self.cmp_info[cmp].sfh = u32::from(lbits(segment[hpos + 1], 4));
                    self.cmp_info[cmp].sfv = u32::from(rbits(segment[hpos + 1], 4));

                    if self.cmp_info[cmp].sfv > 2 || self.cmp_info[cmp].sfh > 2 {
                        return err_exit_code(
                            ExitCode::SamplingBeyondTwoUnsupported,
                            "Sampling type beyond to not supported",
                        );
                    }

                    let quantization_table_value = segment[hpos + 2];
                    if usize::from(quantization_table_value) >= self.q_tables.len() {
                        return err_exit_code(
                            ExitCode::UnsupportedJpeg,
                            "quantizationTableValue too big",
                        );
                    }

                    self.cmp_info[cmp].q_table_index = quantization_table_value;
                    hpos += 3;
                }
            }

            jpeg_code::SOF3..=jpeg_code::SOF15 => {
                // lossless, hierarchical and arithmetic coded frames
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    format!("sof{0} marker found, coding process not supported", btype & 0xf),
                );
            }

            jpeg_code::APP0..=0xEF | jpeg_code::COM => {
                // application data and comments are kept verbatim in the raw header
            }

            jpeg_code::RST0..=jpeg_code::RST7 => {
                return err_exit_code(ExitCode::UnsupportedJpeg, "rst marker found out of place");
            }

            jpeg_code::SOI => {
                return err_exit_code(ExitCode::UnsupportedJpeg, "soi marker found out of place");
            }

            jpeg_code::EOI => {
                return err_exit_code(ExitCode::UnsupportedJpeg, "eoi marker found out of place");
            }

            _ => {
                return err_exit_code(
                    ExitCode::UnsupportedJpeg,
                    format!("unknown marker found: FF {0:X}", btype),
                );
            }
        }

        Ok(ParseSegmentResult::Continue)
    }
}

/// Everything besides the coefficients that is needed to write back the exact original file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionInfo {
    /// marker segments following SOI up to and including the SOS of the scan
    pub raw_jpeg_header: Vec<u8>,

    /// value of the padding bits (0 or 0xff), None if the scan never needed any
    pub pad_bit: Option<u8>,

    /// restart markers that followed the scan without starting a new interval, indexed by scan
    pub rst_err: Vec<u8>,

    /// bytes after the entropy coded data, starting with the EOI marker for well formed files
    pub garbage_data: Vec<u8>,
}

fn ensure_space(segment: &[u8], hpos: usize, amount: usize) -> Result<()> {
    if hpos + amount > segment.len() {
        return err_exit_code(ExitCode::UnsupportedJpeg, "segment too small");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    /// DHT body with the given class/index, `counts[i]` codes of length i+1 and the symbols
    fn dht_body(class_index: u8, counts: &[u8; 16], symbols: &[u8]) -> Vec<u8> {
        let mut r = vec![class_index];
        r.extend_from_slice(counts);
        r.extend_from_slice(symbols);
        r
    }

    #[test]
    fn huffman_codes_are_canonical() {
        // two codes of length 2, one of length 3
        let mut counts = [0u8; 16];
        counts[1] = 2;
        counts[2] = 1;
        let body = dht_body(0x00, &counts, &[5, 7, 9]);

        let hc = HuffCodes::construct_from_segment(&body[1..]).unwrap();
        assert_eq!((hc.c_val[5], hc.c_len[5]), (0b00, 2));
        assert_eq!((hc.c_val[7], hc.c_len[7]), (0b01, 2));
        assert_eq!((hc.c_val[9], hc.c_len[9]), (0b100, 3));
        assert_eq!(hc.c_len[0], 0);

        let tree = HuffTree::construct_hufftree(&hc, false).unwrap();
        assert_eq!(tree.peek_code[0b0100_0000], (7, 2));
        assert_eq!(tree.peek_code[0b1001_0000], (9, 3));
        assert_eq!(tree.peek_code[0b1111_0000], (0, 0xff));
    }

    #[test]
    fn too_many_codes_rejected() {
        let mut counts = [0u8; 16];
        counts[0] = 3; // only 2 codes of length 1 exist
        let body = dht_body(0x00, &counts, &[1, 2, 3]);

        let e = HuffCodes::construct_from_segment(&body[1..]).unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::UnsupportedJpeg);
    }

    fn segment(marker: u8, body: &[u8]) -> Vec<u8> {
        let mut r = vec![0xff, marker];
        r.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
        r.extend_from_slice(body);
        r
    }

    fn minimal_header(sof: u8, width: u16, height: u16, sampling: &[u8]) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend(segment(jpeg_code::DQT, &[[0u8].as_slice(), &[1u8; 64]].concat()));

        let mut sof_body = vec![8];
        sof_body.extend_from_slice(&height.to_be_bytes());
        sof_body.extend_from_slice(&width.to_be_bytes());
        sof_body.push(sampling.len() as u8);
        for (i, &s) in sampling.iter().enumerate() {
            sof_body.extend_from_slice(&[i as u8 + 1, s, 0]);
        }
        h.extend(segment(sof, &sof_body));

        let mut counts = [0u8; 16];
        counts[0] = 1;
        h.extend(segment(jpeg_code::DHT, &dht_body(0x00, &counts, &[0])));
        h.extend(segment(jpeg_code::DHT, &dht_body(0x10, &counts, &[0])));

        let mut sos = vec![sampling.len() as u8];
        for i in 0..sampling.len() {
            sos.extend_from_slice(&[i as u8 + 1, 0x00]);
        }
        sos.extend_from_slice(&[0, 63, 0]);
        h.extend(segment(jpeg_code::SOS, &sos));
        h
    }

    #[test]
    fn parse_computes_geometry() {
        let raw = minimal_header(jpeg_code::SOF0, 33, 17, &[0x22, 0x11, 0x11]);

        let mut jh = JpegHeader::default();
        let mut recorded = Vec::new();
        assert!(jh
            .parse(&mut Cursor::new(&raw), &EnabledFeatures::default(), &mut recorded)
            .unwrap());

        assert_eq!(recorded, raw);
        assert_eq!(jh.jpeg_type, JpegType::Sequential);
        assert_eq!((jh.sfhm, jh.sfvm), (2, 2));
        assert_eq!((jh.mcuh, jh.mcuv, jh.mcuc), (3, 2, 6));

        let luma = &jh.cmp_info[0];
        assert_eq!((luma.bch, luma.bcv, luma.bc, luma.mbs), (6, 4, 24, 4));
        assert_eq!((luma.nch, luma.ncv), (5, 3));

        let chroma = &jh.cmp_info[1];
        assert_eq!((chroma.bch, chroma.bcv, chroma.mbs), (3, 2, 1));
        assert_eq!((chroma.nch, chroma.ncv), (3, 2));

        assert_eq!(jh.cs_cmpc, 3);
        jh.verify_huffman_table(true, true).unwrap();
    }

    #[test]
    fn parse_flags_progressive() {
        let raw = minimal_header(jpeg_code::SOF2, 8, 8, &[0x11]);

        let mut jh = JpegHeader::default();
        jh.parse(&mut Cursor::new(&raw), &EnabledFeatures::default(), &mut Vec::new())
            .unwrap();
        assert_eq!(jh.jpeg_type, JpegType::Progressive);
    }

    #[test]
    fn unsupported_frames_rejected() {
        let raw = minimal_header(0xC9, 8, 8, &[0x11]);

        let mut jh = JpegHeader::default();
        let e = jh
            .parse(&mut Cursor::new(&raw), &EnabledFeatures::default(), &mut Vec::new())
            .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::UnsupportedJpeg);
    }

    #[test]
    fn dri_updates_restart_interval() {
        let mut jh = JpegHeader::default();
        jh.parse_segment(jpeg_code::DRI, &[0x01, 0x02], &EnabledFeatures::default())
            .unwrap();
        assert_eq!(jh.rsti, 0x102);

        let e = jh
            .parse_segment(jpeg_code::DRI, &[0x01], &EnabledFeatures::default())
            .unwrap_err();
        assert_eq!(e.exit_code(), ExitCode::UnsupportedJpeg);
    }
}
