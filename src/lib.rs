/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

#![doc = include_str!("../README.md")]
// Don't allow any unsafe code by default. Since this code has to potentially deal with
// badly/maliciously formatted images, we want this extra level of safety.
#![forbid(unsafe_code)]
#![forbid(trivial_casts)]
#![forbid(trivial_numeric_casts)]
#![forbid(non_ascii_idents)]
#![forbid(unused_extern_crates)]
#![forbid(unused_import_braces)]
#![forbid(redundant_lifetimes)]
#![forbid(single_use_lifetimes)]
#![forbid(unused_lifetimes)]
#![forbid(unused_macro_rules)]
#![forbid(macro_use_extern_crate)]
#![forbid(missing_unsafe_on_extern)]
#![deny(missing_docs)]

mod consts;
mod helpers;
mod jpeg;
mod metrics;

mod enabled_features;
mod recode_error;

#[doc(hidden)]
pub mod micro_benchmark;

use std::io::{Cursor, Read, Write};

use log::info;

pub use consts::{JpegDecodeStatus, JpegType};
pub use enabled_features::EnabledFeatures;
pub use helpers::catch_unwind_result;
pub use jpeg::block_based_image::BlockBasedImage;
pub use jpeg::block_encoder::{BlockEncoder, HuffmanBlockEncoder};
pub use jpeg::jpeg_header::{HuffCodes, JpegHeader, ParseSegmentResult, ReconstructionInfo};
pub use jpeg::jpeg_position_state::{JpegPositionState, McuPositionIterator};
pub use jpeg::jpeg_write::recode_baseline_jpeg;
pub use jpeg::{BitWriter, ComponentInfo};
pub use metrics::{CpuTimeMeasure, Metrics};
pub use recode_error::{ExitCode, RecodeError};

use crate::jpeg::container::{check_geometry, read_container, write_container};
use crate::jpeg::jpeg_read::read_jpeg_file;
use crate::recode_error::{err_exit_code, AddContext, Result};

static PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

static GIT_VERSION: &str = git_version::git_version!(
    args = ["--abbrev=40", "--always", "--dirty=M"],
    fallback = "0"
);

/// Returns the version string of the library, which includes the package version and the git version.
/// This is useful for debugging and logging purposes to know the exact version of the library is being used
pub fn get_version_string() -> String {
    format!("{}-{}", PACKAGE_VERSION, GIT_VERSION)
}

/// A baseline JPEG split into its header, its coefficients and the information needed
/// to write it back bit for bit.
#[derive(Debug, Clone)]
pub struct DecomposedJpeg {
    header: JpegHeader,
    rinfo: ReconstructionInfo,
    image_data: Vec<BlockBasedImage>,
}

impl DecomposedJpeg {
    /// Builds a decomposition from parts that were produced elsewhere.
    ///
    /// # Arguments
    /// * `raw_header` - The marker segments that follow SOI, up to and including the SOS of the last scan.
    /// * `garbage` - Bytes written after the entropy coded data, normally starting with EOI.
    /// * `pad_bit` - Value used to pad the entropy coded data to whole bytes.
    /// * `rst_err` - Number of extra restart markers that follow each scan.
    /// * `image_data` - One coefficient store per component.
    ///
    /// The header bytes are parsed up to the first scan, so they have to describe a frame.
    pub fn from_parts(
        raw_header: Vec<u8>,
        garbage: Vec<u8>,
        pad_bit: Option<u8>,
        rst_err: Vec<u8>,
        image_data: Vec<BlockBasedImage>,
        enabled_features: &EnabledFeatures,
    ) -> Result<Self> {
        let rinfo = ReconstructionInfo {
            raw_jpeg_header: raw_header,
            pad_bit,
            rst_err,
            garbage_data: garbage,
        };

        Self::from_reconstruction(rinfo, image_data, enabled_features)
    }

    fn from_reconstruction(
        rinfo: ReconstructionInfo,
        image_data: Vec<BlockBasedImage>,
        enabled_features: &EnabledFeatures,
    ) -> Result<Self> {
        let mut header = JpegHeader::default();
        let mut scratch = Vec::new();

        if !header
            .parse(
                &mut Cursor::new(&rinfo.raw_jpeg_header),
                enabled_features,
                &mut scratch,
            )
            .context()?
        {
            return err_exit_code(ExitCode::UnsupportedJpeg, "header bytes contain no scan");
        }

        Ok(DecomposedJpeg {
            header,
            rinfo,
            image_data,
        })
    }

    /// reads a container, returning the original file size and its decomposition
    fn from_container<R: Read>(
        reader: &mut R,
        enabled_features: &EnabledFeatures,
    ) -> Result<(u32, Self)> {
        let (original_size, rinfo, image_data) =
            read_container(reader, enabled_features.max_jpeg_file_size).context()?;

        let jpeg = Self::from_reconstruction(rinfo, image_data, enabled_features).context()?;
        check_geometry(&jpeg.header, &jpeg.image_data).context()?;

        Ok((original_size, jpeg))
    }

    /// header as parsed up to the first scan
    pub fn header(&self) -> &JpegHeader {
        &self.header
    }

    /// header bytes, pad bit, extra restart markers and trailing bytes
    pub fn reconstruction_info(&self) -> &ReconstructionInfo {
        &self.rinfo
    }

    /// coefficients of every component
    pub fn image_data(&self) -> &[BlockBasedImage] {
        &self.image_data
    }
}

/// Decomposes a baseline JPEG. Files larger than `max_jpeg_file_size` are rejected
/// without reading more than one byte past the limit.
pub fn read_jpeg<R: Read>(
    reader: &mut R,
    enabled_features: &EnabledFeatures,
) -> Result<DecomposedJpeg> {
    let limit = u64::from(enabled_features.max_jpeg_file_size);

    let mut data = Vec::new();
    reader.take(limit + 1).read_to_end(&mut data).context()?;

    if data.len() as u64 > limit {
        return err_exit_code(
            ExitCode::UnsupportedJpeg,
            format!("jpeg is larger than the limit of {0} bytes", limit),
        );
    }

    let (header, rinfo, image_data) =
        read_jpeg_file(&mut Cursor::new(&data), enabled_features).context()?;

    Ok(DecomposedJpeg {
        header,
        rinfo,
        image_data,
    })
}

/// Writes the JPEG back out with the Huffman block encoder, never writing more than
/// `max_file_size` bytes. Returns the number of bytes written.
pub fn recode_jpeg<W: Write>(
    jpeg: &DecomposedJpeg,
    writer: &mut W,
    max_file_size: u64,
    enabled_features: &EnabledFeatures,
) -> Result<u64> {
    let mut position = JpegPositionState::new(&jpeg.header);

    recode_baseline_jpeg(
        writer,
        &jpeg.header,
        &jpeg.rinfo,
        &jpeg.image_data,
        max_file_size,
        enabled_features,
        &mut HuffmanBlockEncoder::default(),
        &mut position,
    )
}

/// Packs a JPEG into the compact container format.
///
/// Before anything is written the decomposition is recoded and compared against the input,
/// so a file that cannot be reproduced exactly is rejected instead of being stored.
pub fn encode_container<W: Write>(
    jpeg_data: &[u8],
    writer: &mut W,
    enabled_features: &EnabledFeatures,
) -> Result<()> {
    let jpeg = read_jpeg(&mut Cursor::new(jpeg_data), enabled_features).context()?;

    let mut verify = Vec::with_capacity(jpeg_data.len());
    let size = recode_jpeg(
        &jpeg,
        &mut verify,
        jpeg_data.len() as u64,
        enabled_features,
    )
    .context()?;

    if size != jpeg_data.len() as u64 || verify.len() != jpeg_data.len() {
        return err_exit_code(
            ExitCode::VerificationLengthMismatch,
            format!(
                "recoded {0} bytes but the original has {1}",
                verify.len(),
                jpeg_data.len()
            ),
        );
    }

    if let Some(pos) = verify.iter().zip(jpeg_data).position(|(a, b)| a != b) {
        return err_exit_code(
            ExitCode::VerificationContentMismatch,
            format!("recoded file differs at offset {0}", pos),
        );
    }

    write_container(
        writer,
        u32::try_from(jpeg_data.len())?,
        &jpeg.rinfo,
        &jpeg.image_data,
    )
    .context()?;

    info!("packed {0} byte jpeg into container", jpeg_data.len());

    Ok(())
}

/// Unpacks a container back into the original JPEG, returning the number of bytes written.
pub fn decode_container<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    enabled_features: &EnabledFeatures,
) -> Result<u64> {
    let (original_size, jpeg) = DecomposedJpeg::from_container(reader, enabled_features).context()?;

    let size = recode_jpeg(&jpeg, writer, u64::from(original_size), enabled_features).context()?;
    if size != u64::from(original_size) {
        return err_exit_code(
            ExitCode::VerificationLengthMismatch,
            format!(
                "wrote {0} bytes but the container expected {1}",
                size, original_size
            ),
        );
    }

    Ok(size)
}

/// used by utility to dump out the contents of a jpeg file or container for debugging purposes
pub fn dump_jpeg(input_data: &[u8], all: bool, enabled_features: &EnabledFeatures) -> Result<()> {
    let jpeg = if input_data.starts_with(&consts::SOI) {
        read_jpeg(&mut Cursor::new(input_data), enabled_features).context()?
    } else {
        DecomposedJpeg::from_container(&mut Cursor::new(input_data), enabled_features)
            .context()?
            .1
    };

    println!("parsed header:");
    let s = format!("{0:?}", jpeg.header);
    println!("{0}", s.replace("},", "},\r\n").replace("],", "],\r\n"));

    println!(
        "header={0} bytes, pad_bit={1:?}, rst_err={2:?}, garbage={3} bytes",
        jpeg.rinfo.raw_jpeg_header.len(),
        jpeg.rinfo.pad_bit,
        jpeg.rinfo.rst_err,
        jpeg.rinfo.garbage_data.len()
    );

    if all {
        for (i, image) in jpeg.image_data.iter().enumerate() {
            println!("Component {0}", i);
            for (dpos, block) in image.blocks().iter().enumerate() {
                print!("dpos={0} ", dpos);
                print!("{0}", block[0]);
                for c in &block[1..] {
                    print!(",{0}", c);
                }
                println!();
            }
        }
    }

    Ok(())
}
