/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use super::jpeg_header::JpegHeader;

static EMPTY_BLOCK: [i16; 64] = [0; 64];

/// Coefficient store for one component.
///
/// Blocks are kept in zigzag order, `block_width` blocks per row. Storage grows as blocks are
/// written so that a truncated image only costs the memory of the part that was decoded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockBasedImage {
    block_width: u32,
    block_height: u32,
    image: Vec<[i16; 64]>,
}

impl BlockBasedImage {
    /// sized to hold every block (including the padding blocks of partial mcus) of component `component`
    pub fn new(jh: &JpegHeader, component: usize) -> Self {
        let ci = &jh.cmp_info[component];
        Self::with_dimensions(ci.bch, ci.bcv)
    }

    /// empty store for a component that is `block_width` x `block_height` blocks
    pub fn with_dimensions(block_width: u32, block_height: u32) -> Self {
        BlockBasedImage {
            block_width,
            block_height,
            image: Vec::new(),
        }
    }

    /// builds the store from blocks that were decoded elsewhere
    pub fn from_blocks(block_width: u32, block_height: u32, blocks: Vec<[i16; 64]>) -> Self {
        BlockBasedImage {
            block_width,
            block_height,
            image: blocks,
        }
    }

    /// blocks per row
    pub fn get_block_width(&self) -> u32 {
        self.block_width
    }

    /// rows of blocks
    pub fn get_block_height(&self) -> u32 {
        self.block_height
    }

    /// number of blocks that actually have storage behind them
    pub fn blocks_stored(&self) -> usize {
        self.image.len()
    }

    /// the stored blocks in raster order
    pub fn blocks(&self) -> &[[i16; 64]] {
        &self.image
    }

    /// block at `dpos`, blocks that were never written read as all zero
    #[inline(always)]
    pub fn get_block(&self, dpos: u32) -> &[i16; 64] {
        self.image.get(dpos as usize).unwrap_or(&EMPTY_BLOCK)
    }

    /// stores `block` at `dpos`, growing the storage if needed
    pub fn set_block_data(&mut self, dpos: u32, block: &[i16; 64]) {
        let dpos = dpos as usize;
        if dpos >= self.image.len() {
            self.image.resize(dpos + 1, [0; 64]);
        }

        self.image[dpos] = *block;
    }
}

#[test]
fn missing_blocks_read_as_zero() {
    let mut img = BlockBasedImage::with_dimensions(4, 2);
    assert_eq!(img.blocks_stored(), 0);
    assert_eq!(img.get_block(3), &[0; 64]);

    let mut b = [0i16; 64];
    b[0] = 12;
    b[63] = -1;
    img.set_block_data(2, &b);

    assert_eq!(img.blocks_stored(), 3);
    assert_eq!(img.get_block(2), &b);
    assert_eq!(img.get_block(0), &[0; 64]);
    assert_eq!(img.get_block(7), &[0; 64]);
}
