use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    ButtonPress,
    ButtonRelease,
    Rotate,
    SwipeLeft,
    SwipeRight,
    SwipeUp,
    SwipeDown,
    TouchLeft,
    TouchRight,
    TouchTop,
    TouchBottom,
    LongTouchLeft,
    LongTouchRight,
    LongTouchTop,
    LongTouchBottom,
    FlyLeft,
    FlyRight,
    FlyTowards,
    FlyBackwards,
    FlyUpDown,
}

/// A decoded gesture. The meaning of `value` depends on the gesture: the signed delta for
/// [`Gesture::Rotate`], the signed distance for [`Gesture::FlyUpDown`] and the raw telegram
/// byte for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureEvent {
    pub gesture: Gesture,
    pub value: i32,
}

impl GestureEvent {
    pub fn new(gesture: Gesture, value: i32) -> Self {
        GestureEvent { gesture, value }
    }

    pub fn is_rotation(&self) -> bool {
        self.gesture == Gesture::Rotate
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    StateChange(SessionState),
    FirmwareVersionRead(String),
    HardwareVersionRead(String),
    ColorRead(String),
    MatrixDisplayed,
    BatteryChanged(u8), // [0, 100]
    Heartbeat(Vec<u8>),
    Gesture(GestureEvent),
    ThrottledGesture(GestureEvent),
}
