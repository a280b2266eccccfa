/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::consts::{CONTAINER_MAGIC, CONTAINER_VERSION};
use crate::recode_error::{err_exit_code, AddContext, ExitCode, Result};

use super::block_based_image::BlockBasedImage;
use super::jpeg_header::{JpegHeader, ReconstructionInfo};

/// Every coded block takes at least a DC code and an EOB, so at least two bits.
const MIN_BLOCKS_PER_BYTE: u64 = 4;

/// Blocks are read one at a time, so a container can't make us reserve more than this up front.
const INITIAL_BLOCK_CAPACITY: usize = 4096;

/// Writes the decomposition of a JPEG file of `original_size` bytes.
///
/// Layout: magic, version, original size (u32 LE), then a zlib stream with the raw header,
/// the pad bit, the restart errors, the garbage data and the coefficients of every component.
pub fn write_container<W: Write>(
    writer: &mut W,
    original_size: u32,
    rinfo: &ReconstructionInfo,
    image_data: &[BlockBasedImage],
) -> Result<()> {
    writer.write_all(&CONTAINER_MAGIC)?;
    writer.write_u8(CONTAINER_VERSION)?;
    writer.write_u32::<LittleEndian>(original_size)?;

    let mut encoder = ZlibEncoder::new(writer, Compression::default());

    write_bytes(&mut encoder, &rinfo.raw_jpeg_header).context()?;

    match rinfo.pad_bit {
        None => encoder.write_all(&[0, 0])?,
        Some(p) => encoder.write_all(&[1, p])?,
    }

    write_bytes(&mut encoder, &rinfo.rst_err).context()?;
    write_bytes(&mut encoder, &rinfo.garbage_data).context()?;

    encoder.write_u8(u8::try_from(image_data.len())?)?;
    for image in image_data {
        encoder.write_u32::<LittleEndian>(image.get_block_width())?;
        encoder.write_u32::<LittleEndian>(image.get_block_height())?;
        encoder.write_u32::<LittleEndian>(u32::try_from(image.blocks_stored())?)?;

        let mut buf = Vec::with_capacity(image.blocks_stored() * 128);
        for block in image.blocks() {
            for &c in block {
                buf.write_i16::<LittleEndian>(c)?;
            }
        }
        encoder.write_all(&buf)?;
    }

    encoder.finish().context()?;

    Ok(())
}

/// Reads back what `write_container` wrote, returning the original file size.
pub fn read_container<R: Read>(
    reader: &mut R,
    max_file_size: u32,
) -> Result<(u32, ReconstructionInfo, Vec<BlockBasedImage>)> {
    let mut magic = [0u8; 3];
    reader.read_exact(&mut magic).context()?;
    if magic != CONTAINER_MAGIC {
        return err_exit_code(ExitCode::BadContainerFile, "container magic not found");
    }

    let version = reader.read_u8()?;
    if version != CONTAINER_VERSION {
        return err_exit_code(
            ExitCode::VersionUnsupported,
            format!("container version {0} is not supported", version),
        );
    }

    let original_size = reader.read_u32::<LittleEndian>()?;
    if original_size > max_file_size {
        return err_exit_code(
            ExitCode::BadContainerFile,
            format!(
                "original size {0} larger than the limit of {1}",
                original_size, max_file_size
            ),
        );
    }

    let mut decoder = ZlibDecoder::new(reader);

    let mut rinfo = ReconstructionInfo {
        raw_jpeg_header: read_bytes(&mut decoder, original_size).context()?,
        ..Default::default()
    };

    let has_pad = decoder.read_u8()?;
    let pad = decoder.read_u8()?;
    rinfo.pad_bit = match has_pad {
        0 => None,
        1 => Some(pad),
        _ => {
            return err_exit_code(ExitCode::BadContainerFile, "invalid pad bit flag");
        }
    };

    rinfo.rst_err = read_bytes(&mut decoder, original_size).context()?;
    rinfo.garbage_data = read_bytes(&mut decoder, original_size).context()?;

    let components = decoder.read_u8()?;
    if components == 0 || components > 4 {
        return err_exit_code(
            ExitCode::BadContainerFile,
            format!("invalid component count {0}", components),
        );
    }

    // the original file can't have coded more blocks than this
    let mut blocks_left = u64::from(original_size) * MIN_BLOCKS_PER_BYTE;

    let mut image_data = Vec::with_capacity(usize::from(components));
    for _ in 0..components {
        let block_width = decoder.read_u32::<LittleEndian>()?;
        let block_height = decoder.read_u32::<LittleEndian>()?;
        let stored = decoder.read_u32::<LittleEndian>()?;

        if u64::from(stored) > u64::from(block_width) * u64::from(block_height) {
            return err_exit_code(
                ExitCode::BadContainerFile,
                "more blocks stored than the component has",
            );
        }

        if u64::from(stored) > blocks_left {
            return err_exit_code(
                ExitCode::BadContainerFile,
                format!(
                    "{0} blocks stored but a {1} byte file can't hold that many",
                    stored, original_size
                ),
            );
        }
        blocks_left -= u64::from(stored);

        let stored = usize::try_from(stored)?;
        let mut blocks = Vec::with_capacity(stored.min(INITIAL_BLOCK_CAPACITY));
        for _ in 0..stored {
            let mut block = [0i16; 64];
            decoder.read_i16_into::<LittleEndian>(&mut block).context()?;
            blocks.push(block);
        }

        image_data.push(BlockBasedImage::from_blocks(block_width, block_height, blocks));
    }

    // shouldn't be any more data
    let mut remaining = Vec::new();
    if decoder.read_to_end(&mut remaining)? != 0 {
        return err_exit_code(ExitCode::BadContainerFile, "extra data after coefficients");
    }

    Ok((original_size, rinfo, image_data))
}

/// Fails unless there is one coefficient store per frame component with the dimensions
/// the frame header gives it.
pub fn check_geometry(jh: &JpegHeader, image_data: &[BlockBasedImage]) -> Result<()> {
    if image_data.len() != jh.cmpc {
        return err_exit_code(
            ExitCode::BadContainerFile,
            format!(
                "container has {0} components but the frame has {1}",
                image_data.len(),
                jh.cmpc
            ),
        );
    }

    for (i, (image, ci)) in image_data.iter().zip(&jh.cmp_info).enumerate() {
        if image.get_block_width() != ci.bch || image.get_block_height() != ci.bcv {
            return err_exit_code(
                ExitCode::BadContainerFile,
                format!(
                    "component {0} is {1}x{2} blocks but the frame needs {3}x{4}",
                    i,
                    image.get_block_width(),
                    image.get_block_height(),
                    ci.bch,
                    ci.bcv
                ),
            );
        }
    }

    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    writer.write_u32::<LittleEndian>(u32::try_from(data.len())?)?;
    writer.write_all(data)?;
    Ok(())
}

/// reads a length prefixed buffer, which can't be longer than the file it came from
fn read_bytes<R: Read>(reader: &mut R, limit: u32) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len > limit {
        return err_exit_code(
            ExitCode::BadContainerFile,
            format!("field of {0} bytes larger than the original file", len),
        );
    }

    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;
    Ok(data)
}
