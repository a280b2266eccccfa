/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::time::Duration;

#[cfg(any(target_os = "windows", target_os = "linux"))]
use cpu_time::ThreadTime;

/// platform independent threadtime measurement
pub struct CpuTimeMeasure {
    #[cfg(any(target_os = "windows", target_os = "linux"))]
    start: ThreadTime,
    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    start: std::time::SystemTime,
}

impl CpuTimeMeasure {
    /// starts measuring from now
    pub fn new() -> Self {
        Self {
            #[cfg(any(target_os = "windows", target_os = "linux"))]
            start: ThreadTime::now(),
            #[cfg(not(any(target_os = "windows", target_os = "linux")))]
            start: std::time::SystemTime::now(),
        }
    }

    /// cpu time used by this thread since the measure was created
    pub fn elapsed(&self) -> Duration {
        #[cfg(any(target_os = "windows", target_os = "linux"))]
        {
            self.start.elapsed()
        }
        #[cfg(not(any(target_os = "windows", target_os = "linux")))]
        {
            // wall clock can go backwards, in which case we just report nothing
            self.start.elapsed().unwrap_or_default()
        }
    }
}

impl Default for CpuTimeMeasure {
    fn default() -> Self {
        Self::new()
    }
}

/// Totals collected over one or more operations.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Metrics {
    /// number of jpeg files processed
    pub files: u32,
    /// bytes of jpeg data read or produced
    pub jpeg_bytes: u64,
    /// bytes of container data read or produced
    pub container_bytes: u64,
    /// thread cpu time spent
    pub cpu_time: Duration,
}

impl Metrics {
    /// adds the numbers of a single operation
    pub fn record(&mut self, jpeg_bytes: u64, container_bytes: u64, cpu_time: Duration) {
        self.files += 1;
        self.jpeg_bytes += jpeg_bytes;
        self.container_bytes += container_bytes;
        self.cpu_time += cpu_time;
    }

    /// combines the totals of another set of metrics into this one
    pub fn merge_from(&mut self, other: &Metrics) {
        self.files += other.files;
        self.jpeg_bytes += other.jpeg_bytes;
        self.container_bytes += other.container_bytes;
        self.cpu_time += other.cpu_time;
    }

    /// container size as a percentage of the jpeg size
    pub fn ratio(&self) -> f64 {
        if self.jpeg_bytes == 0 {
            0.0
        } else {
            self.container_bytes as f64 * 100.0 / self.jpeg_bytes as f64
        }
    }
}

#[test]
fn metrics_accumulate() {
    let mut a = Metrics::default();
    a.record(1000, 800, Duration::from_millis(5));

    let mut b = Metrics::default();
    b.record(1000, 700, Duration::from_millis(7));
    b.merge_from(&a);

    assert_eq!(b.files, 2);
    assert_eq!(b.jpeg_bytes, 2000);
    assert_eq!(b.cpu_time, Duration::from_millis(12));
    assert!((b.ratio() - 75.0).abs() < 1e-9);
    assert_eq!(Metrics::default().ratio(), 0.0);
}
