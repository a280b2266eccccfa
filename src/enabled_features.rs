/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::{DEFAULT_BIT_WRITER_PRELOAD, DEFAULT_MAX_FILE_SIZE};

/// Limits and compatibility switches used when decomposing and recoding. Tighten these
/// when processing untrusted input.
#[derive(Debug, Clone)]
pub struct EnabledFeatures {
    /// maximum jpeg width
    pub max_jpeg_width: u32,

    /// maximum jpeg height
    pub max_jpeg_height: u32,

    /// largest jpeg file we will read, also the default bound for recoding
    pub max_jpeg_file_size: u32,

    /// accept huffman tables whose code lengths are over-subscribed
    pub accept_invalid_dht: bool,

    /// reject quantization tables that contain zeros
    pub reject_dqts_with_zeros: bool,

    /// initial capacity of the entropy coded buffer
    pub bit_writer_preload: usize,

    /// most entropy coded bytes that may be retained before they are written out
    pub bit_writer_max_size: usize,
}

impl Default for EnabledFeatures {
    fn default() -> Self {
        Self {
            max_jpeg_width: 16386,
            max_jpeg_height: 16386,
            max_jpeg_file_size: DEFAULT_MAX_FILE_SIZE,
            accept_invalid_dht: false,
            reject_dqts_with_zeros: true,
            bit_writer_preload: DEFAULT_BIT_WRITER_PRELOAD,
            bit_writer_max_size: 128 * 1024 * 1024,
        }
    }
}

impl EnabledFeatures {
    /// parameters that allow everything
    pub fn all() -> Self {
        Self {
            max_jpeg_width: u32::MAX,
            max_jpeg_height: u32::MAX,
            max_jpeg_file_size: u32::MAX,
            accept_invalid_dht: true,
            reject_dqts_with_zeros: false,
            bit_writer_preload: DEFAULT_BIT_WRITER_PRELOAD,
            bit_writer_max_size: usize::MAX,
        }
    }
}
