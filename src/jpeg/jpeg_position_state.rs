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

use crate::consts::JpegDecodeStatus;
use crate::recode_error::{err_exit_code, ExitCode, Result};

use super::jpeg_header::JpegHeader;

/// Walks the coding units of a scan in bitstream order.
///
/// Implementations own the whole coding-unit position (mcu, component, sub block,
/// block position and restart countdown); callers only observe it through the getters.
pub trait McuPositionIterator {
    /// positions the iterator on the first block of the scan described by `jh`
    fn start_scan(&mut self, jh: &JpegHeader);

    /// restarts the countdown to the next restart marker
    fn reset_rstw(&mut self, jh: &JpegHeader);

    /// component of the current block
    fn get_cmp(&self) -> usize;

    /// position of the current block within its component
    fn get_dpos(&self) -> u32;

    /// index of the current coding unit, for diagnostics
    fn get_mcu(&self) -> u32;

    /// advances to the next block, returning whether the scan goes on, a restart is due or the scan is done
    fn next_mcu_pos(&mut self, jh: &JpegHeader) -> Result<JpegDecodeStatus>;
}

/// used to keep track of position while encoding or decoding a jpeg
#[derive(Debug, Default, Clone)]
pub struct JpegPositionState {
    /// current component
    cmp: usize,

    /// current minimum coded unit
    mcu: u32,

    /// index of component in the scan
    csc: usize,

    /// offset within mcu
    sub: u32,

    /// current block position in image for this component
    dpos: u32,

    /// number of mcus left until reset interval
    rstw: u32,
}

impl JpegPositionState {
    /// iterator positioned at the start of the current scan of `jh`
    pub fn new(jh: &JpegHeader) -> Self {
        let mut state = JpegPositionState::default();
        state.start_scan(jh);
        state
    }

    /// calculates next position (non interleaved)
    fn next_mcu_pos_noninterleaved(&mut self, jh: &JpegHeader) -> JpegDecodeStatus {
        // increment position
        self.dpos += 1;
        self.mcu += 1;

        let cmp_info = &jh.cmp_info[self.cmp];

        // fix for non interleaved mcu - horizontal
        if cmp_info.bch != cmp_info.nch && self.dpos % cmp_info.bch == cmp_info.nch {
            self.dpos += cmp_info.bch - cmp_info.nch;
        }

        // fix for non interleaved mcu - vertical
        if cmp_info.bcv != cmp_info.ncv && self.dpos / cmp_info.bch == cmp_info.ncv {
            self.dpos = cmp_info.bc;
        }

        // check position
        if self.dpos >= cmp_info.bc {
            return JpegDecodeStatus::ScanCompleted;
        } else if jh.rsti > 0 {
            self.rstw -= 1;
            if self.rstw == 0 {
                return JpegDecodeStatus::RestartIntervalExpired;
            }
        }

        JpegDecodeStatus::DecodeInProgress
    }

    /// block position of sub block `sub` of mcu `mcu` in the interleaved layout
    fn interleaved_dpos(jh: &JpegHeader, cmp: usize, mcu: u32, sub: u32) -> u32 {
        let ci = &jh.cmp_info[cmp];

        if ci.sfv > 1 {
            let row = (mcu / jh.mcuh) * ci.sfv + sub / ci.sfh;
            let col = (mcu % jh.mcuh) * ci.sfh + sub % ci.sfh;
            row * ci.bch + col
        } else if ci.sfh > 1 {
            // single row of sub blocks, so they sit next to each other
            mcu * ci.mbs + sub
        } else {
            // no calculations needed without subsampling
            mcu
        }
    }
}

impl McuPositionIterator for JpegPositionState {
    fn start_scan(&mut self, jh: &JpegHeader) {
        self.cmp = jh.cs_cmp[0];
        self.mcu = 0;
        self.csc = 0;
        self.sub = 0;
        self.dpos = 0;
        self.rstw = jh.rsti;
    }

    fn reset_rstw(&mut self, jh: &JpegHeader) {
        self.rstw = jh.rsti;
    }

    fn get_cmp(&self) -> usize {
        self.cmp
    }

    fn get_dpos(&self) -> u32 {
        self.dpos
    }

    fn get_mcu(&self) -> u32 {
        self.mcu
    }

    fn next_mcu_pos(&mut self, jh: &JpegHeader) -> Result<JpegDecodeStatus> {
        if jh.cs_cmpc == 0 || jh.cmp_info[self.cmp].bc == 0 {
            return err_exit_code(
                ExitCode::CodingError,
                "scan has no blocks to iterate over",
            );
        }

        // if there is just one component, go the simple route
        if jh.cs_cmpc == 1 {
            return Ok(self.next_mcu_pos_noninterleaved(jh));
        }

        let mut sta = JpegDecodeStatus::DecodeInProgress;

        // increment all counts where needed
        self.sub += 1;
        if self.sub >= jh.cmp_info[self.cmp].mbs {
            self.sub = 0;
            self.csc += 1;

            if self.csc >= jh.cs_cmpc {
                self.csc = 0;
                self.mcu += 1;

                if self.mcu >= jh.mcuc {
                    sta = JpegDecodeStatus::ScanCompleted;
                } else if jh.rsti > 0 {
                    self.rstw -= 1;
                    if self.rstw == 0 {
                        sta = JpegDecodeStatus::RestartIntervalExpired;
                    }
                }
            }

            self.cmp = jh.cs_cmp[self.csc];
        }

        self.dpos = Self::interleaved_dpos(jh, self.cmp, self.mcu, self.sub);

        Ok(sta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::consts::JpegType;

    /// header with the geometry filled in the same way the parser derives it
    fn header(width: u32, height: u32, sampling: &[(u32, u32)], scan: &[usize], rsti: u32) -> JpegHeader {
        let mut jh = JpegHeader::default();
        jh.jpeg_type = JpegType::Sequential;
        jh.img_width = width;
        jh.img_height = height;
        jh.cmpc = sampling.len();
        jh.rsti = rsti;

        jh.sfhm = sampling.iter().map(|s| s.0).max().unwrap();
        jh.sfvm = sampling.iter().map(|s| s.1).max().unwrap();
        jh.mcuh = width.div_ceil(8 * jh.sfhm);
        jh.mcuv = height.div_ceil(8 * jh.sfvm);
        jh.mcuc = jh.mcuh * jh.mcuv;

        for (i, &(sfh, sfv)) in sampling.iter().enumerate() {
            let ci = &mut jh.cmp_info[i];
            ci.sfh = sfh;
            ci.sfv = sfv;
            ci.mbs = sfh * sfv;
            ci.bch = jh.mcuh * sfh;
            ci.bcv = jh.mcuv * sfv;
            ci.bc = ci.bch * ci.bcv;
            ci.nch = (width * sfh).div_ceil(8 * jh.sfhm);
            ci.ncv = (height * sfv).div_ceil(8 * jh.sfvm);
            ci.nc = ci.nch * ci.ncv;
        }

        jh.cs_cmpc = scan.len();
        jh.cs_cmp[..scan.len()].copy_from_slice(scan);
        jh
    }

    /// runs a whole scan returning (cmp, dpos, status) for every block visited
    fn walk(jh: &JpegHeader) -> Vec<(usize, u32, JpegDecodeStatus)> {
        let mut state = JpegPositionState::new(jh);
        let mut r = Vec::new();
        loop {
            let cmp = state.get_cmp();
            let dpos = state.get_dpos();
            let sta = state.next_mcu_pos(jh).unwrap();
            r.push((cmp, dpos, sta));
            match sta {
                JpegDecodeStatus::ScanCompleted => break,
                JpegDecodeStatus::RestartIntervalExpired => state.reset_rstw(jh),
                JpegDecodeStatus::DecodeInProgress => {}
            }
        }
        r
    }

    #[test]
    fn single_component_visits_every_block() {
        let jh = header(24, 16, &[(1, 1)], &[0], 0);
        let r = walk(&jh);

        let positions: Vec<u32> = r.iter().map(|x| x.1).collect();
        assert_eq!(positions, [0, 1, 2, 3, 4, 5]);
        assert_eq!(r.last().unwrap().2, JpegDecodeStatus::ScanCompleted);
    }

    #[test]
    fn restart_interval_expires_between_mcus() {
        let jh = header(24, 8, &[(1, 1)], &[0], 1);
        let r = walk(&jh);

        let status: Vec<JpegDecodeStatus> = r.iter().map(|x| x.2).collect();
        assert_eq!(
            status,
            [
                JpegDecodeStatus::RestartIntervalExpired,
                JpegDecodeStatus::RestartIntervalExpired,
                JpegDecodeStatus::ScanCompleted
            ]
        );
    }

    #[test]
    fn interleaved_420_order() {
        // 2x2 luma with two 1x1 chroma, image of 2x1 mcus
        let jh = header(32, 16, &[(2, 2), (1, 1), (1, 1)], &[0, 1, 2], 0);
        let r = walk(&jh);

        let visited: Vec<(usize, u32)> = r.iter().map(|x| (x.0, x.1)).collect();
        assert_eq!(
            visited,
            [
                (0, 0),
                (0, 1),
                (0, 4),
                (0, 5),
                (1, 0),
                (2, 0),
                (0, 2),
                (0, 3),
                (0, 6),
                (0, 7),
                (1, 1),
                (2, 1),
            ]
        );
        assert_eq!(r.last().unwrap().2, JpegDecodeStatus::ScanCompleted);
    }

    #[test]
    fn interleaved_422_order() {
        // 2x1 luma, blocks of a single mcu sit next to each other
        let jh = header(32, 8, &[(2, 1), (1, 1)], &[0, 1], 0);
        let r = walk(&jh);

        let visited: Vec<(usize, u32)> = r.iter().map(|x| (x.0, x.1)).collect();
        assert_eq!(visited, [(0, 0), (0, 1), (1, 0), (0, 2), (0, 3), (1, 1)]);
    }

    #[test]
    fn noninterleaved_skips_padding_blocks() {
        // chroma of a 4:2:0 image with an odd width only codes the blocks inside the image
        let jh = header(24, 8, &[(2, 2), (1, 1)], &[1], 0);
        assert_eq!(jh.cmp_info[1].bch, 2);
        assert_eq!(jh.cmp_info[1].nch, 2);

        let luma = header(24, 8, &[(2, 2), (1, 1)], &[0], 0);
        let r = walk(&luma);
        let positions: Vec<u32> = r.iter().map(|x| x.1).collect();

        // bch = 4, nch = 3, ncv = 1
        assert_eq!(positions, [0, 1, 2]);
        assert_eq!(walk(&jh).len(), 2);
    }

    #[test]
    fn empty_scan_is_an_error() {
        let mut jh = header(8, 8, &[(1, 1)], &[0], 0);
        jh.cs_cmpc = 0;

        let mut state = JpegPositionState::new(&jh);
        assert_eq!(
            state.next_mcu_pos(&jh).unwrap_err().exit_code(),
            ExitCode::CodingError
        );
    }
}
