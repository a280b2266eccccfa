/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::Write;

use bytemuck::cast;
use log::trace;
use wide::u8x16;

use super::bounded_writer::BoundedWriter;

/// Cursor over a whole recode operation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RecodeProgress {
    /// offset into the raw header bytes that have been replayed so far
    pub hpos: usize,
    /// absolute offset into the entropy coded data that has been handed to the output
    pub ipos: u64,
    /// current scan, starting at 1
    pub scan: u32,
    /// number of restart markers written in total
    pub rpos: u32,
    /// restart cycle position, the low 3 bits select the RSTn marker
    pub cpos: u32,
    pub num_rst_markers_this_scan: u32,
    pub within_scan: bool,
}

impl RecodeProgress {
    pub fn new() -> Self {
        RecodeProgress {
            scan: 1,
            ..Default::default()
        }
    }
}

/// returns true if any of the 16 bytes is 0xff
#[inline(always)]
fn chunk_contains_ff(chunk: [u8; 16]) -> bool {
    let v: u8x16 = cast(chunk);
    let eq = v.cmp_eq(u8x16::splat(0xff));
    cast::<u8x16, u128>(eq) != 0
}

/// copies bytes one at a time, following every 0xff with a 0x00
#[inline(never)]
fn stuff_bytes<W: Write>(writer: &mut BoundedWriter<W>, data: &[u8]) {
    let mut start = 0;
    for (i, &b) in data.iter().enumerate() {
        if b == 0xff {
            writer.write(&data[start..=i]);
            writer.write_byte(0);
            start = i + 1;
        }
    }
    writer.write(&data[start..]);
}

/// Copies the entropy coded bytes that have not been written yet to the output, escaping 0xff.
///
/// `entropy` is the retained part of the raw entropy buffer and `entropy_offset` the absolute position
/// of its first byte. Everything from `progress.ipos` to the end of `entropy` is written, and `ipos` is
/// advanced past it. Calling this again without new data writes nothing.
///
/// The work is split in three phases: single bytes up to the next 16 byte boundary, then 16 byte chunks
/// that are copied in one go unless they contain an 0xff, and finally the remaining tail.
pub fn sync_jpeg_huffman<W: Write>(
    progress: &mut RecodeProgress,
    writer: &mut BoundedWriter<W>,
    entropy: &[u8],
    entropy_offset: u64,
    final_flush: bool,
) {
    debug_assert!(
        progress.ipos >= entropy_offset,
        "bytes were released before they were written"
    );

    let start = usize::try_from(progress.ipos.saturating_sub(entropy_offset)).unwrap_or(usize::MAX);
    let pending = entropy.get(start..).unwrap_or(&[]);

    if final_flush {
        trace!(
            "final entropy flush of {0} bytes at offset {1}",
            pending.len(),
            progress.ipos
        );
    }

    if pending.is_empty() {
        return;
    }

    let lead = ((16 - (progress.ipos % 16)) % 16) as usize;
    let (head, aligned) = pending.split_at(lead.min(pending.len()));

    stuff_bytes(writer, head);

    let mut chunks = aligned.chunks_exact(16);
    for chunk in &mut chunks {
        match <[u8; 16]>::try_from(chunk) {
            Ok(c) if !chunk_contains_ff(c) => {
                writer.write(chunk);
            }
            _ => stuff_bytes(writer, chunk),
        }
    }

    stuff_bytes(writer, chunks.remainder());

    progress.ipos += pending.len() as u64;
}

/// entry points for the criterion benchmarks
pub mod benchmarks {
    use super::*;

    /// stuffs 1MB of entropy coded data with roughly one 0xff every 200 bytes
    #[inline(never)]
    pub fn benchmark_byte_stuffing() -> Box<dyn FnMut()> {
        let data: Vec<u8> = (0..1024 * 1024u32)
            .map(|i| {
                let x = i.wrapping_mul(2654435761) >> 24;
                if x % 200 == 0 {
                    0xff
                } else {
                    x as u8 & 0x7f
                }
            })
            .collect();

        Box::new(move || {
            let mut writer = BoundedWriter::new(std::io::sink(), u64::MAX);
            let mut progress = RecodeProgress::new();

            sync_jpeg_huffman(&mut progress, &mut writer, &data, 0, true);

            std::hint::black_box(writer.size());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::Rng;
    use rstest::rstest;

    fn stuff_scalar(data: &[u8]) -> Vec<u8> {
        let mut r = Vec::with_capacity(data.len() * 2);
        for &b in data {
            r.push(b);
            if b == 0xff {
                r.push(0);
            }
        }
        r
    }

    fn sync_all(data: &[u8], steps: &[usize]) -> (Vec<u8>, RecodeProgress) {
        let mut w = BoundedWriter::new(Vec::new(), u64::MAX);
        let mut progress = RecodeProgress::new();

        for &s in steps {
            sync_jpeg_huffman(&mut progress, &mut w, &data[..s], 0, false);
        }
        sync_jpeg_huffman(&mut progress, &mut w, data, 0, true);

        (w.into_inner(), progress)
    }

    #[test]
    fn chunk_detection_matches_scalar() {
        for pos in 0..16 {
            let mut c = [0x12u8; 16];
            assert!(!chunk_contains_ff(c));
            c[pos] = 0xff;
            assert!(chunk_contains_ff(c), "missed 0xff at {0}", pos);
            c[pos] = 0xfe;
            assert!(!chunk_contains_ff(c));
        }
    }

    #[rstest]
    fn stuffing_equals_scalar(
        #[values(0, 1, 15, 16, 17, 31, 32, 33, 100, 1000)] len: usize,
        #[values(0, 1, 5, 50, 255)] ff_density: u32,
    ) {
        let mut rng = crate::helpers::get_rand_from_seed([len as u8; 32]);

        let data: Vec<u8> = (0..len)
            .map(|_| {
                if rng.gen_range(0..256) < ff_density {
                    0xff
                } else {
                    rng.gen()
                }
            })
            .collect();

        let (out, progress) = sync_all(&data, &[]);
        assert_eq!(out, stuff_scalar(&data));
        assert_eq!(progress.ipos, len as u64);
    }

    #[test]
    fn long_ff_runs_across_chunks() {
        let mut data = vec![0x01u8; 7];
        data.extend(std::iter::repeat(0xff).take(40));
        data.extend_from_slice(&[0x02; 20]);
        data.extend(std::iter::repeat(0xff).take(16));

        let (out, _) = sync_all(&data, &[]);
        assert_eq!(out, stuff_scalar(&data));
    }

    #[test]
    fn incremental_flushes_match_single_flush() {
        let mut rng = crate::helpers::get_rand_from_seed([7; 32]);
        let data: Vec<u8> = (0..5000)
            .map(|_| if rng.gen_range(0..8) == 0 { 0xff } else { rng.gen() })
            .collect();

        let (out, _) = sync_all(&data, &[3, 3, 19, 64, 65, 1000, 1001, 4095]);
        assert_eq!(out, stuff_scalar(&data));
    }

    #[test]
    fn idempotent_flush() {
        let data = [0xffu8, 0x00, 0x13, 0xff];
        let mut w = BoundedWriter::new(Vec::new(), u64::MAX);
        let mut progress = RecodeProgress::new();

        sync_jpeg_huffman(&mut progress, &mut w, &data, 0, false);
        let before = (progress.clone(), w.size());

        sync_jpeg_huffman(&mut progress, &mut w, &data, 0, false);
        sync_jpeg_huffman(&mut progress, &mut w, &data, 0, true);

        assert_eq!(before, (progress, w.size()));
        assert_eq!(w.into_inner(), [0xff, 0x00, 0x00, 0x13, 0xff, 0x00]);
    }

    #[test]
    fn respects_buffer_offset() {
        // the first 100 bytes were already written and released by the producer
        let data: Vec<u8> = (0..200u32).map(|x| (x * 37) as u8 | 0x80).collect();
        let mut w = BoundedWriter::new(Vec::new(), u64::MAX);
        let mut progress = RecodeProgress {
            ipos: 120,
            ..RecodeProgress::new()
        };

        sync_jpeg_huffman(&mut progress, &mut w, &data[100..], 100, false);

        assert_eq!(progress.ipos, 200);
        assert_eq!(w.into_inner(), stuff_scalar(&data[120..]));
    }
}
