/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::io::Write;

use log::warn;

use crate::recode_error::{AddContext, Result};

const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Output sink that never accepts more than `bound` bytes in total.
///
/// Anything written past the bound is silently dropped, so the producer can keep running and
/// poll `has_reached_bound` at its own pace. IO errors from the underlying writer are stored
/// and reported by `check_error` instead of being returned from every write.
pub struct BoundedWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    bound: u64,
    bytes_written: u64,
    error: Option<std::io::Error>,
}

impl<W: Write> BoundedWriter<W> {
    pub fn new(inner: W, bound: u64) -> Self {
        BoundedWriter {
            inner,
            buffer: Vec::with_capacity(WRITE_BUFFER_SIZE),
            bound,
            bytes_written: 0,
            error: None,
        }
    }

    /// sets the maximum total number of bytes this writer will accept (including what was already written)
    pub fn set_bound(&mut self, bound: u64) {
        self.bound = bound;
    }

    /// bytes that can still be written before the bound is reached
    pub fn remaining(&self) -> u64 {
        self.bound.saturating_sub(self.bytes_written)
    }

    pub fn has_reached_bound(&self) -> bool {
        self.bytes_written >= self.bound
    }

    /// writes as much of `data` as fits under the bound, returns the number of bytes accepted
    pub fn write(&mut self, data: &[u8]) -> usize {
        let accepted = data
            .len()
            .min(usize::try_from(self.remaining()).unwrap_or(usize::MAX));

        self.buffer.extend_from_slice(&data[..accepted]);
        self.bytes_written += accepted as u64;

        if self.buffer.len() >= WRITE_BUFFER_SIZE {
            self.flush_buffer();
        }

        accepted
    }

    #[inline(always)]
    pub fn write_byte(&mut self, b: u8) -> usize {
        self.write(&[b])
    }

    fn flush_buffer(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        if self.error.is_none() {
            if let Err(e) = self.inner.write_all(&self.buffer) {
                warn!("write to output failed: {0}", e);
                self.error = Some(e);
            }
        }

        self.buffer.clear();
    }

    /// hands all buffered bytes to the underlying writer and flushes it
    pub fn flush(&mut self) {
        self.flush_buffer();

        if self.error.is_none() {
            if let Err(e) = self.inner.flush() {
                warn!("flush of output failed: {0}", e);
                self.error = Some(e);
            }
        }
    }

    /// returns the first IO error seen by the writer, if any
    pub fn check_error(&mut self) -> Result<()> {
        match self.error.take() {
            Some(e) => Err::<(), _>(e).context(),
            None => Ok(()),
        }
    }

    /// total number of bytes accepted so far
    pub fn size(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(mut self) -> W {
        self.flush();
        self.inner
    }
}
