use std::io;
use std::str::Utf8Error;
use std::time::Duration;
use thiserror::Error;
use btleplug;
use serde_json;

use crate::device::registry::Endpoint;
use crate::device::types::SessionState;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to run (device): {source}")]
    Device { #[from] source: DeviceError },

    #[error("Failed to run (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to run (runtime): {source}")]
    Runtime { #[from] source: io::Error },

    #[error("No device found")]
    NoDevice,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapters available")]
    NoAdapters,

    #[error("The {0} characteristic is not available")]
    MissingCharacteristic(Endpoint),

    #[error("{operation} did not complete within {deadline:?}")]
    Timeout { operation: &'static str, deadline: Duration },

    #[error("The device disconnected")]
    TransportDisconnected,

    #[error("Can not {operation} while {state}")]
    InvalidStateTransition { operation: &'static str, state: SessionState },

    #[error("Unrecognized telegram from the {endpoint} characteristic: {payload:02x?}")]
    UnrecognizedTelegram { endpoint: Endpoint, payload: Vec<u8> },

    #[error("Writing to the {endpoint} characteristic failed: {source}")]
    WriteFailed { endpoint: Endpoint, source: Box<DeviceError> },
}

impl DeviceError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }

    pub fn is_invalid_state_transition(&self) -> bool {
        matches!(self, DeviceError::InvalidStateTransition { .. })
    }
}
