#![allow(dead_code)]

use std::time::Duration;

pub const SHORT_TIMEOUT: Duration = Duration::from_millis(500);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(3);
pub const STRESS_TIMEOUT: Duration = Duration::from_secs(15);
pub const ITEMS_LOW: usize = 50;
pub const ITEMS_MEDIUM: usize = 200;
pub const ITEMS_HIGH: usize = 1000;

/// Per-item processing delay of the slow consumers.
pub const SLOW_CONSUMER: Duration = Duration::from_millis(100);
/// Emission period of the fast producers.
pub const FAST_PRODUCER: Duration = Duration::from_millis(10);
