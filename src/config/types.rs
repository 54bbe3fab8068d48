use serde::{Deserialize, Serialize};

use crate::device::codec::FlyGestureTable;
use crate::device::constants::{DEFAULT_THROTTLE_PERIOD, DEVICE_NAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub matrix_brightness: f32,
    pub throttle_period_ms: u64,
    // not written to the device unless set
    pub heartbeat_interval_secs: Option<u64>,
    pub fly_gesture_table: FlyGestureTable,
    pub log_level: LogLevel,
    // prefix of the advertised name to look for while scanning
    pub device_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            matrix_brightness: 1.0,
            throttle_period_ms: DEFAULT_THROTTLE_PERIOD,
            heartbeat_interval_secs: None,
            fly_gesture_table: FlyGestureTable::default(),
            log_level: LogLevel::Info,
            device_name: DEVICE_NAME.to_string(),
        }
    }
}
