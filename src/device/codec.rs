//! Telegram decoding and LED frame encoding.
//!
//! Pure functions only; the session decides what to do with the results.

use serde::{Deserialize, Serialize};

use crate::device::constants::{
    FLAG_BUILTIN_MATRIX, FLAG_FADE_TRANSITION, LED_FRAME_LEN, MAX_DISPLAY_INTERVAL,
};
use crate::device::matrix::{DisplayOption, DisplayOptions, LedMatrix};
use crate::device::registry::Endpoint;
use crate::device::types::{Gesture, GestureEvent};
use crate::error::DeviceError;

const SWIPE_TOUCH_GESTURES: [Gesture; 12] = [
    Gesture::SwipeLeft,
    Gesture::SwipeRight,
    Gesture::SwipeUp,
    Gesture::SwipeDown,
    Gesture::TouchLeft,
    Gesture::TouchRight,
    Gesture::TouchTop,
    Gesture::TouchBottom,
    Gesture::LongTouchLeft,
    Gesture::LongTouchRight,
    Gesture::LongTouchTop,
    Gesture::LongTouchBottom,
];

const BUTTON_PRESSED: u8 = 1;
const FLY_LEFT: u8 = 0;
const FLY_RIGHT: u8 = 1;
const FLY_TOWARDS: u8 = 2;
const FLY_BACKWARDS: u8 = 3;
const FLY_UP_DOWN: u8 = 4;

/// Fly gesture codes differ between firmware generations. Older firmware reports moving
/// towards / away from the device as codes 2 and 3, newer firmware never sends them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlyGestureTable {
    #[default]
    Extended,
    Reduced,
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Telegram {
    Battery(u8),
    Heartbeat(Vec<u8>),
    Gesture(GestureEvent),
}

fn unrecognized(endpoint: Endpoint, payload: &[u8]) -> DeviceError {
    DeviceError::UnrecognizedTelegram { endpoint, payload: payload.to_vec() }
}

fn first_byte(endpoint: Endpoint, payload: &[u8]) -> Result<u8, DeviceError> {
    payload.first().copied().ok_or_else(|| unrecognized(endpoint, payload))
}

pub fn decode_button(payload: &[u8]) -> Result<GestureEvent, DeviceError> {
    let value = first_byte(Endpoint::Button, payload)?;
    let gesture = if value == BUTTON_PRESSED { Gesture::ButtonPress } else { Gesture::ButtonRelease };
    Ok(GestureEvent::new(gesture, value.into()))
}

pub fn decode_swipe_touch(payload: &[u8]) -> Result<GestureEvent, DeviceError> {
    let value = first_byte(Endpoint::SwipeTouch, payload)?;
    match SWIPE_TOUCH_GESTURES.get(usize::from(value)) {
        Some(gesture) => Ok(GestureEvent::new(*gesture, value.into())),
        None => Err(unrecognized(Endpoint::SwipeTouch, payload)),
    }
}

pub fn decode_rotation(payload: &[u8]) -> Result<GestureEvent, DeviceError> {
    match payload {
        [low, high, ..] => {
            let delta = i16::from_le_bytes([*low, *high]);
            Ok(GestureEvent::new(Gesture::Rotate, delta.into()))
        },
        _ => Err(unrecognized(Endpoint::Rotation, payload)),
    }
}

pub fn decode_fly(payload: &[u8], table: FlyGestureTable) -> Result<GestureEvent, DeviceError> {
    let value = first_byte(Endpoint::Fly, payload)?;
    let gesture = match (value, table) {
        (FLY_LEFT, _) => Gesture::FlyLeft,
        (FLY_RIGHT, _) => Gesture::FlyRight,
        (FLY_TOWARDS, FlyGestureTable::Extended) => Gesture::FlyTowards,
        (FLY_BACKWARDS, FlyGestureTable::Extended) => Gesture::FlyBackwards,
        (FLY_UP_DOWN, _) => {
            // the distance is carried in the second byte
            return match payload.get(1) {
                Some(distance) => Ok(GestureEvent::new(Gesture::FlyUpDown, (*distance as i8).into())),
                None => Err(unrecognized(Endpoint::Fly, payload)),
            };
        },
        _ => return Err(unrecognized(Endpoint::Fly, payload)),
    };

    Ok(GestureEvent::new(gesture, value.into()))
}

/// Decodes a notification received from `endpoint`.
pub fn decode(endpoint: Endpoint, payload: &[u8], fly_table: FlyGestureTable) -> Result<Telegram, DeviceError> {
    let gesture = match endpoint {
        Endpoint::Battery => return Ok(Telegram::Battery(first_byte(endpoint, payload)?)),
        Endpoint::Heartbeat => return Ok(Telegram::Heartbeat(payload.to_vec())),
        Endpoint::Button => decode_button(payload)?,
        Endpoint::SwipeTouch => decode_swipe_touch(payload)?,
        Endpoint::Rotation => decode_rotation(payload)?,
        Endpoint::Fly => decode_fly(payload, fly_table)?,
        _ => return Err(unrecognized(endpoint, payload)),
    };

    Ok(Telegram::Gesture(gesture))
}

/// Decodes the ASCII payload of the version/model characteristics.
pub fn decode_ascii(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

pub fn brightness_byte(brightness: f32) -> u8 {
    (brightness * 255.0).round().clamp(0.0, 255.0) as u8
}

pub fn display_interval_byte(display_interval: f64) -> u8 {
    (display_interval * 10.0).round().clamp(0.0, 255.0) as u8
}

pub fn clamp_brightness(brightness: f32) -> f32 {
    if brightness.is_nan() {
        return 0.0;
    }
    brightness.clamp(0.0, 1.0)
}

pub fn clamp_display_interval(display_interval: f64) -> f64 {
    display_interval.clamp(0.0, MAX_DISPLAY_INTERVAL)
}

/// Encodes an LED matrix display command.
///
/// Bytes 0..=10 hold the 81 LEDs, LED `8k+i` in bit `i` of byte `k`. The upper bits of byte 10
/// carry the fade transition and built-in flags, byte 11 the brightness and byte 12 the display
/// interval in tenths of a second.
pub fn encode_led_frame(
    matrix: &LedMatrix,
    brightness: f32,
    display_interval: f64,
    options: DisplayOptions,
) -> [u8; LED_FRAME_LEN] {
    let mut frame = [0u8; LED_FRAME_LEN];

    for (index, led) in matrix.leds().iter().enumerate() {
        if *led {
            frame[index / 8] |= 1 << (index % 8);
        }
    }

    if options.contains(DisplayOption::WithFadeTransition) {
        frame[10] |= FLAG_FADE_TRANSITION;
    }
    if matrix.is_builtin() {
        frame[10] |= FLAG_BUILTIN_MATRIX;
    }
    frame[11] = brightness_byte(brightness);
    frame[12] = display_interval_byte(display_interval);

    frame
}
