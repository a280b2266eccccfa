/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::recode_error::{ExitCode, RecodeError};

/// Helper function to catch panics and convert them into the appropriate RecodeError
pub fn catch_unwind_result<R>(
    f: impl FnOnce() -> Result<R, RecodeError>,
) -> Result<R, RecodeError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(r) => r,
        Err(err) => {
            if let Some(message) = err.downcast_ref::<&str>() {
                Err(RecodeError::new(ExitCode::AssertionFailure, *message))
            } else if let Some(message) = err.downcast_ref::<String>() {
                Err(RecodeError::new(ExitCode::AssertionFailure, message))
            } else {
                Err(RecodeError::new(
                    ExitCode::AssertionFailure,
                    "unknown panic",
                ))
            }
        }
    }
}

#[cfg(test)]
#[inline(always)]
pub const fn u16_bit_length(v: u16) -> u8 {
    16 - v.leading_zeros() as u8
}

/// returns true if the 64 bit value contains an 0xff byte.
/// Uses fancy bit manipulation to avoid branches.
#[inline(always)]
pub fn has_ff(v: u64) -> bool {
    (v & 0x8080808080808080 & !v.wrapping_add(0x0101010101010101)) != 0
}

/// Expands an s-bit magnitude category value back into the signed coefficient.
#[inline(always)]
pub const fn devli(s: u8, value: u16) -> i16 {
    let shifted = 1 << s;

    if value & (shifted >> 1) != 0 {
        value as i16
    } else {
        value.wrapping_add(2).wrapping_add(!shifted) as i16
    }
}

/// check to make sure the behavior hasn't changed even with the optimization
#[test]
fn devli_test() {
    for s in 0u8..15 {
        for value in 0..(1 << s) {
            assert_eq!(
                devli(s, value),
                if s == 0 {
                    value as i16
                } else if value < (1 << (s as u16 - 1)) {
                    value as i16 + (-1 << s as i16) + 1
                } else {
                    value as i16
                }
            );
        }
    }
}

#[inline(always)]
pub const fn b_short(v1: u8, v2: u8) -> u16 {
    ((v1 as u16) << 8) + v2 as u16
}

/// low nibble of a packed sampling/table selector byte
#[inline(always)]
pub const fn rbits(c: u8, n: usize) -> u8 {
    c & (0xFF >> (8 - n))
}

/// high nibble of a packed sampling/table selector byte
#[inline(always)]
pub const fn lbits(c: u8, n: usize) -> u8 {
    c >> (8 - n)
}

#[test]
fn nibble_test() {
    assert_eq!(lbits(0x21, 4), 2);
    assert_eq!(rbits(0x21, 4), 1);
    assert_eq!(b_short(0x12, 0x34), 0x1234);
}

#[cfg(test)]
pub fn get_rand_from_seed(seed: [u8; 32]) -> rand_chacha::ChaCha12Rng {
    use rand_chacha::rand_core::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    ChaCha12Rng::from_seed(seed)
}
