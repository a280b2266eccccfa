/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Reading, storing and byte-exact recoding of baseline JPEGs.
//!
//! The JPEG is never decoded into pixels. A file is split into its header bytes, the
//! quantized DCT coefficients of every block and the small amount of information needed
//! to recreate the exact entropy coded bitstream (pad bits, stray restart markers and
//! whatever follows the last scan). Recoding runs the other way and must reproduce the
//! original file bit-for-bit.

mod bit_reader;
mod bit_writer;
mod bounded_writer;
pub(crate) mod byte_stuffer;
mod component_info;
pub mod jpeg_code;

pub mod block_based_image;
pub mod block_encoder;
pub mod container;
pub mod jpeg_header;
pub mod jpeg_position_state;
pub mod jpeg_read;
pub mod jpeg_write;

pub use bit_writer::BitWriter;
pub use component_info::ComponentInfo;
