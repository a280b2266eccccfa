/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

pub use crate::jpeg::byte_stuffer::benchmarks::benchmark_byte_stuffing;

pub use crate::jpeg::jpeg_write::benchmarks::benchmark_encode_block;
