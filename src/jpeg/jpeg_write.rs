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

use std::io::Write;

use log::{debug, info, warn};

use crate::consts::{JpegDecodeStatus, JpegType, SOI};
use crate::enabled_features::EnabledFeatures;
use crate::helpers::b_short;
use crate::recode_error::{err_exit_code, AddContext, ExitCode, RecodeError, Result};

use super::bit_writer::BitWriter;
use super::block_based_image::BlockBasedImage;
use super::block_encoder::BlockEncoder;
use super::bounded_writer::BoundedWriter;
use super::byte_stuffer::{sync_jpeg_huffman, RecodeProgress};
use super::jpeg_code;
use super::jpeg_header::{JpegHeader, ReconstructionInfo};
use super::jpeg_position_state::McuPositionIterator;

/// retained entropy data may exceed the size bound by the block that crossed it
const CROSSING_BLOCK_ALLOWANCE: u64 = 1024;

/// Writes the baseline JPEG described by the header bytes, coefficients and reconstruction
/// info to `writer`, never writing more than `max_file_size` bytes.
///
/// If the image needs more than `max_file_size` bytes, the entropy coded data is cut off
/// where the bound was reached and the trailing garbage data is still written, since room
/// for it was reserved up front. Returns the number of bytes written.
#[allow(clippy::too_many_arguments)]
pub fn recode_baseline_jpeg<W: Write, E: BlockEncoder, P: McuPositionIterator>(
    writer: &mut W,
    jpeg_header: &JpegHeader,
    rinfo: &ReconstructionInfo,
    image_data: &[BlockBasedImage],
    max_file_size: u64,
    enabled_features: &EnabledFeatures,
    block_encoder: &mut E,
    position: &mut P,
) -> Result<u64> {
    let garbage = &rinfo.garbage_data;
    let pad_bit = rinfo.pad_bit.unwrap_or(0);

    // the garbage data is written last, so make sure there is always room for it
    let mut out = BoundedWriter::new(
        &mut *writer,
        max_file_size.saturating_sub(garbage.len() as u64),
    );
    let mut huffw = BitWriter::new(
        enabled_features.bit_writer_preload,
        entropy_buffer_limit(max_file_size, enabled_features),
    );
    let mut progress = RecodeProgress::new();

    // tables and scan parameters get updated as the header is replayed
    let mut jh = jpeg_header.clone();

    out.write(&SOI);

    while replay_header(&mut jh, rinfo, &mut progress, &mut out, enabled_features).context()? {
        match jh.jpeg_type {
            JpegType::Sequential => {}
            JpegType::Progressive => {
                return err_exit_code(
                    ExitCode::ProgressiveUnsupported,
                    "progressive jpegs cannot be recoded as baseline",
                );
            }
            JpegType::Unknown => {
                return err_exit_code(ExitCode::UnsupportedJpeg, "scan found before frame header");
            }
        }

        if jh.cs_cmpc != image_data.len() || jh.cmpc != image_data.len() {
            return err_exit_code(
                ExitCode::UnsupportedJpeg,
                format!(
                    "scan has {0} components but there are {1} coefficient stores",
                    jh.cs_cmpc,
                    image_data.len()
                ),
            );
        }

        progress.within_scan = true;

        encode_scan(
            &jh,
            image_data,
            pad_bit,
            block_encoder,
            position,
            &mut huffw,
            &mut progress,
            &mut out,
        )
        .context()?;

        // restart markers that were in the original file after the scan without
        // starting a new interval
        if let Some(&extra) = rinfo.rst_err.get(progress.scan as usize - 1) {
            for _ in 0..extra {
                out.write(&[0xFF, jpeg_code::RST0 + (progress.cpos as u8 & 7)]);
                progress.cpos += 1;
            }
        }

        debug!(
            "scan {0} done with {1} restart markers, {2} bytes written",
            progress.scan,
            progress.num_rst_markers_this_scan,
            out.size()
        );

        progress.num_rst_markers_this_scan = 0;
        progress.within_scan = false;
        progress.scan += 1;

        if out.has_reached_bound() {
            check_decompression_memory_bound(&huffw, &out, max_file_size, enabled_features)
                .context()?;
            break;
        }
    }

    if huffw.has_overflowed() {
        return err_exit_code(
            ExitCode::OutOfMemory,
            "entropy coded data did not fit in the bit writer",
        );
    }

    sync_output(&mut progress, &mut out, &mut huffw, true);

    out.set_bound(max_file_size);
    check_decompression_memory_bound(&huffw, &out, max_file_size, enabled_features).context()?;

    if !garbage.is_empty() {
        out.write(garbage);
    }

    out.flush();
    if let Err(e) = out.check_error() {
        warn!("write error, possibly drive is full: {0}", e);
        return Err(e);
    }

    info!(
        "recoded {0} scans, {1} restart markers, {2} bytes",
        progress.scan - 1,
        progress.rpos,
        out.size()
    );

    Ok(out.size())
}

/// Copies the header segments up to and including the next SOS to the output, feeding
/// the ones that change how the scan is coded to the header parser.
///
/// Returns false once the header bytes are exhausted without another scan.
fn replay_header<W: Write>(
    jh: &mut JpegHeader,
    rinfo: &ReconstructionInfo,
    progress: &mut RecodeProgress,
    out: &mut BoundedWriter<W>,
    enabled_features: &EnabledFeatures,
) -> Result<bool> {
    let header = &rinfo.raw_jpeg_header;
    let start = progress.hpos;
    let mut found_sos = false;

    while progress.hpos + 4 <= header.len() {
        let hpos = progress.hpos;
        if header[hpos] != 0xFF {
            return err_exit_code(
                ExitCode::UnsupportedJpeg,
                format!("expected marker at header offset {0}", hpos),
            );
        }

        let btype = header[hpos + 1];
        let end = hpos + 2 + usize::from(b_short(header[hpos + 2], header[hpos + 3]));
        if end > header.len() || end < hpos + 4 {
            return err_exit_code(
                ExitCode::UnsupportedJpeg,
                format!("segment {0:X} does not fit in the header", btype),
            );
        }

        if matches!(btype, jpeg_code::DHT | jpeg_code::DRI | jpeg_code::SOS) {
            jh.parse_segment(btype, &header[hpos + 4..end], enabled_features)
                .context()?;
        }

        progress.hpos = end;

        if btype == jpeg_code::SOS {
            found_sos = true;
            break;
        }
    }

    out.write(&header[start..progress.hpos]);

    Ok(found_sos)
}

/// Encodes every block of the current scan, with restart markers between the intervals.
#[allow(clippy::too_many_arguments)]
fn encode_scan<W: Write, E: BlockEncoder, P: McuPositionIterator>(
    jh: &JpegHeader,
    image_data: &[BlockBasedImage],
    pad_bit: u8,
    block_encoder: &mut E,
    position: &mut P,
    huffw: &mut BitWriter,
    progress: &mut RecodeProgress,
    out: &mut BoundedWriter<W>,
) -> Result<()> {
    position.start_scan(jh);

    loop {
        // DC prediction starts over at the beginning of the scan and after every restart
        let mut lastdc = [0i16; 4];
        position.reset_rstw(jh);

        let sta = loop {
            let cmp = position.get_cmp();

            let mut block = *image_data[cmp].get_block(position.get_dpos());
            let dc = block[0];
            block[0] = dc.wrapping_sub(lastdc[cmp]);
            lastdc[cmp] = dc;

            #[cfg(feature = "detailed_tracing")]
            log::trace!(
                "scan={0} mcu={1} cmp={2} dpos={3} dc_diff={4}",
                progress.scan,
                position.get_mcu(),
                cmp,
                position.get_dpos(),
                block[0]
            );

            let result = block_encoder
                .encode_block(
                    huffw,
                    jh.get_huff_dc_codes(cmp),
                    jh.get_huff_ac_codes(cmp),
                    &block,
                )
                .and_then(|_| position.next_mcu_pos(jh));

            let mut sta = match result {
                Ok(sta) => sta,
                Err(e) => {
                    warn!(
                        "encode error in scan {0} / mcu {1}",
                        progress.scan,
                        position.get_mcu()
                    );
                    return Err(RecodeError::new(
                        e.exit_code(),
                        format!(
                            "encode error in scan {0} / mcu {1}: {2}",
                            progress.scan,
                            position.get_mcu(),
                            e.message()
                        ),
                    ));
                }
            };

            // hand over what we have so far so the entropy buffer doesn't keep growing
            if huffw.has_no_remainder() {
                sync_output(progress, out, huffw, false);
            }

            // nothing more will fit, so stop producing entropy coded data. Complete bytes
            // that haven't been synced yet count against the bound too.
            let unsynced = huffw.whole_bytes_position().saturating_sub(progress.ipos);
            if out.has_reached_bound() || unsynced >= out.remaining() {
                sta = JpegDecodeStatus::ScanCompleted;
            }

            if sta != JpegDecodeStatus::DecodeInProgress {
                break sta;
            }
        };

        // pad the interval to a whole byte
        huffw.pad(pad_bit);
        if !huffw.has_no_remainder() {
            return err_exit_code(
                ExitCode::AssertionFailure,
                "bit writer not byte aligned after padding",
            );
        }

        sync_output(progress, out, huffw, false);

        match sta {
            JpegDecodeStatus::RestartIntervalExpired => {
                out.write(&[0xFF, jpeg_code::RST0 + (progress.cpos as u8 & 7)]);
                progress.rpos += 1;
                progress.cpos += 1;
                progress.num_rst_markers_this_scan += 1;
            }
            JpegDecodeStatus::ScanCompleted | JpegDecodeStatus::DecodeInProgress => {
                return Ok(());
            }
        }
    }
}

/// most entropy coded bytes the bit writer may retain while writing at most `max_file_size` bytes
fn entropy_buffer_limit(max_file_size: u64, enabled_features: &EnabledFeatures) -> usize {
    let limit = max_file_size.saturating_add(CROSSING_BLOCK_ALLOWANCE);
    usize::try_from(limit)
        .unwrap_or(usize::MAX)
        .min(enabled_features.bit_writer_max_size)
}

/// drains the completed bytes of the bit writer into the output
fn sync_output<W: Write>(
    progress: &mut RecodeProgress,
    out: &mut BoundedWriter<W>,
    huffw: &mut BitWriter,
    final_flush: bool,
) {
    huffw.flush_whole_bytes();
    sync_jpeg_huffman(
        progress,
        out,
        huffw.buffer(),
        huffw.buffer_offset(),
        final_flush,
    );
    huffw.release_flushed(progress.ipos);
}

/// Fails if more output or entropy data was produced than the caller's limits allow, which
/// would mean the output bound was not honored somewhere.
pub(crate) fn check_decompression_memory_bound<W: Write>(
    huffw: &BitWriter,
    out: &BoundedWriter<W>,
    max_file_size: u64,
    enabled_features: &EnabledFeatures,
) -> Result<()> {
    if out.size() > max_file_size {
        return err_exit_code(
            ExitCode::MemoryBoundExceeded,
            format!(
                "wrote {0} bytes, more than the limit of {1}",
                out.size(),
                max_file_size
            ),
        );
    }

    if huffw.amount_buffered() > enabled_features.bit_writer_max_size {
        return err_exit_code(
            ExitCode::MemoryBoundExceeded,
            format!(
                "retained {0} bytes of entropy coded data, more than the limit of {1}",
                huffw.amount_buffered(),
                enabled_features.bit_writer_max_size
            ),
        );
    }

    Ok(())
}

/// entry points for the criterion benchmarks
pub mod benchmarks {
    use super::*;

    use crate::jpeg::block_encoder::HuffmanBlockEncoder;
    use crate::jpeg::jpeg_header::HuffCodes;

    /// encodes 64 blocks with a flat 8 bit huffman table
    #[inline(never)]
    pub fn benchmark_encode_block() -> Box<dyn FnMut()> {
        let symbols: Vec<u8> = (0..=255u8).filter(|x| x & 0xf <= 10).collect();
        let mut segment = vec![0u8; 16];
        segment[7] = symbols.len() as u8;
        segment.extend_from_slice(&symbols);
        let codes = HuffCodes::construct_from_segment(&segment).unwrap_or_default();

        let mut block = [0i16; 64];
        for (i, c) in block.iter_mut().enumerate() {
            *c = ((i * 37) % 41) as i16 - 20;
        }

        Box::new(move || {
            let mut huffw = BitWriter::new(64 * 1024, 1 << 20);
            let mut encoder = HuffmanBlockEncoder::default();

            for _ in 0..64 {
                let _ = encoder.encode_block(&mut huffw, &codes, &codes, &block);
            }

            std::hint::black_box(huffw.position());
        })
    }
}
