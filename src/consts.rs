/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

/// Outcome of advancing the coding position by one block.
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum JpegDecodeStatus {
    /// more blocks follow in the current restart interval
    DecodeInProgress,
    /// the restart interval ended, a restart marker comes next
    RestartIntervalExpired,
    /// the last block of the scan was coded
    ScanCompleted,
}

/// Coding process declared by the frame header.
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum JpegType {
    /// no frame header seen yet
    Unknown,
    /// baseline or extended sequential huffman
    Sequential,
    /// progressive huffman
    Progressive,
}

pub const SOI: [u8; 2] = [0xFF, crate::jpeg::jpeg_code::SOI];

/// Magic bytes at the start of a container file
pub const CONTAINER_MAGIC: [u8; 3] = *b"JRC";

pub const CONTAINER_VERSION: u8 = 1;

/// Preload capacity of the entropy bit writer, matching what a typical
/// camera image produces for its entropy coded data.
pub const DEFAULT_BIT_WRITER_PRELOAD: usize = 4096 * 1024 + 1024;

pub const DEFAULT_MAX_FILE_SIZE: u32 = 128 * 1024 * 1024;
