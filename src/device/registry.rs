use std::fmt;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::device::constants::{
    BATTERY_LEVEL_CHARACTERISTIC, BUTTON_CHARACTERISTIC, FIRMWARE_REVISION_CHARACTERISTIC,
    FLY_CALIBRATION_CHARACTERISTIC, FLY_CHARACTERISTIC, HARDWARE_REVISION_CHARACTERISTIC,
    HEARTBEAT_CHARACTERISTIC, LEGACY_LED_MATRIX_CHARACTERISTIC, LED_MATRIX_CHARACTERISTIC,
    MODEL_NUMBER_CHARACTERISTIC, REBOOT_TO_DFU_CHARACTERISTIC, ROTATION_CHARACTERISTIC,
    SWIPE_TOUCH_CHARACTERISTIC,
};

/// Logical role of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Button,
    Rotation,
    SwipeTouch,
    Fly,
    Battery,
    Heartbeat,
    FirmwareVersion,
    HardwareVersion,
    ModelNumber,
    RebootToDfu,
    FlyCalibration,
    LedMatrix,
}

impl Endpoint {
    /// Endpoints that push notifications, in the order they are subscribed.
    pub const NOTIFYING: [Endpoint; 6] = [
        Endpoint::Button,
        Endpoint::SwipeTouch,
        Endpoint::Rotation,
        Endpoint::Fly,
        Endpoint::Battery,
        Endpoint::Heartbeat,
    ];

    pub fn uuid(&self) -> Uuid {
        match self {
            Endpoint::Button => BUTTON_CHARACTERISTIC,
            Endpoint::Rotation => ROTATION_CHARACTERISTIC,
            Endpoint::SwipeTouch => SWIPE_TOUCH_CHARACTERISTIC,
            Endpoint::Fly => FLY_CHARACTERISTIC,
            Endpoint::Battery => BATTERY_LEVEL_CHARACTERISTIC,
            Endpoint::Heartbeat => HEARTBEAT_CHARACTERISTIC,
            Endpoint::FirmwareVersion => FIRMWARE_REVISION_CHARACTERISTIC,
            Endpoint::HardwareVersion => HARDWARE_REVISION_CHARACTERISTIC,
            Endpoint::ModelNumber => MODEL_NUMBER_CHARACTERISTIC,
            Endpoint::RebootToDfu => REBOOT_TO_DFU_CHARACTERISTIC,
            Endpoint::FlyCalibration => FLY_CALIBRATION_CHARACTERISTIC,
            Endpoint::LedMatrix => LED_MATRIX_CHARACTERISTIC,
        }
    }

    pub fn from_uuid(uuid: &Uuid) -> Option<Endpoint> {
        if *uuid == LEGACY_LED_MATRIX_CHARACTERISTIC {
            return Some(Endpoint::LedMatrix);
        }

        ALL_ENDPOINTS.iter().copied().find(|endpoint| endpoint.uuid() == *uuid)
    }

    pub fn is_notifying(&self) -> bool {
        Endpoint::NOTIFYING.contains(self)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Endpoint::Button => "button",
            Endpoint::Rotation => "rotation",
            Endpoint::SwipeTouch => "swipe/touch",
            Endpoint::Fly => "fly",
            Endpoint::Battery => "battery",
            Endpoint::Heartbeat => "heartbeat",
            Endpoint::FirmwareVersion => "firmware version",
            Endpoint::HardwareVersion => "hardware version",
            Endpoint::ModelNumber => "model number",
            Endpoint::RebootToDfu => "reboot to DFU",
            Endpoint::FlyCalibration => "fly calibration",
            Endpoint::LedMatrix => "LED matrix",
        };

        write!(f, "{}", result)
    }
}

const ALL_ENDPOINTS: [Endpoint; 12] = [
    Endpoint::Button,
    Endpoint::Rotation,
    Endpoint::SwipeTouch,
    Endpoint::Fly,
    Endpoint::Battery,
    Endpoint::Heartbeat,
    Endpoint::FirmwareVersion,
    Endpoint::HardwareVersion,
    Endpoint::ModelNumber,
    Endpoint::RebootToDfu,
    Endpoint::FlyCalibration,
    Endpoint::LedMatrix,
];

/// Capabilities that depend on the firmware of the connected device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub reboot_to_dfu: bool,
    pub fly_calibration: bool,
}

/// Maps endpoints to native characteristic handles. The session keeps exactly one of these
/// behind a single lock; it is filled while connecting and cleared on teardown.
#[derive(Debug, Clone)]
pub struct EndpointRegistry<H> {
    handles: IndexMap<Endpoint, H>,
}

impl<H: Clone> EndpointRegistry<H> {
    pub fn new() -> Self {
        EndpointRegistry { handles: IndexMap::new() }
    }

    /// Registers a discovered characteristic. Returns the endpoint it was registered as, or
    /// `None` if the characteristic plays no role for us.
    pub fn register(&mut self, characteristic_uuid: &Uuid, handle: H) -> Option<Endpoint> {
        let endpoint = Endpoint::from_uuid(characteristic_uuid)?;

        if *characteristic_uuid == LEGACY_LED_MATRIX_CHARACTERISTIC {
            // the current characteristic wins if the device exposes both
            self.handles.entry(endpoint).or_insert(handle);
        } else {
            self.handles.insert(endpoint, handle);
        }

        Some(endpoint)
    }

    pub fn get(&self, endpoint: Endpoint) -> Option<&H> {
        self.handles.get(&endpoint)
    }

    pub fn contains(&self, endpoint: Endpoint) -> bool {
        self.handles.contains_key(&endpoint)
    }

    /// Handles of all notifying endpoints, or the first notifying endpoint that is missing.
    pub fn notifying(&self) -> Result<Vec<(Endpoint, H)>, Endpoint> {
        Endpoint::NOTIFYING
            .iter()
            .map(|endpoint| match self.handles.get(endpoint) {
                Some(handle) => Ok((*endpoint, handle.clone())),
                None => Err(*endpoint),
            })
            .collect()
    }

    /// Handles of the notifying endpoints that are present.
    pub fn present_notifying(&self) -> Vec<(Endpoint, H)> {
        self.handles
            .iter()
            .filter(|(endpoint, _)| endpoint.is_notifying())
            .map(|(endpoint, handle)| (*endpoint, handle.clone()))
            .collect()
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            reboot_to_dfu: self.contains(Endpoint::RebootToDfu),
            fly_calibration: self.contains(Endpoint::FlyCalibration),
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }
}

impl<H: Clone> Default for EndpointRegistry<H> {
    fn default() -> Self {
        EndpointRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_mapping_is_bidirectional() {
        for endpoint in ALL_ENDPOINTS {
            assert_eq!(Endpoint::from_uuid(&endpoint.uuid()), Some(endpoint));
        }
        assert_eq!(Endpoint::from_uuid(&LEGACY_LED_MATRIX_CHARACTERISTIC), Some(Endpoint::LedMatrix));
        assert_eq!(Endpoint::from_uuid(&Uuid::nil()), None);
    }

    #[test]
    fn test_register_ignores_unknown() {
        let mut registry = EndpointRegistry::new();
        assert_eq!(registry.register(&Uuid::nil(), 1u16), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_current_led_matrix_wins_over_legacy() {
        let mut registry = EndpointRegistry::new();
        registry.register(&LED_MATRIX_CHARACTERISTIC, 1u16);
        registry.register(&LEGACY_LED_MATRIX_CHARACTERISTIC, 2u16);
        assert_eq!(registry.get(Endpoint::LedMatrix), Some(&1));
        assert_eq!(registry.len(), 1);

        let mut registry = EndpointRegistry::new();
        registry.register(&LEGACY_LED_MATRIX_CHARACTERISTIC, 2u16);
        registry.register(&LED_MATRIX_CHARACTERISTIC, 1u16);
        assert_eq!(registry.get(Endpoint::LedMatrix), Some(&1));
    }

    #[test]
    fn test_notifying_reports_missing_endpoint() {
        let mut registry = EndpointRegistry::new();
        for (i, endpoint) in Endpoint::NOTIFYING.iter().enumerate() {
            if *endpoint != Endpoint::Heartbeat {
                registry.register(&endpoint.uuid(), i);
            }
        }
        assert_eq!(registry.notifying().unwrap_err(), Endpoint::Heartbeat);
        assert_eq!(registry.present_notifying().len(), 5);

        registry.register(&HEARTBEAT_CHARACTERISTIC, 99);
        let handles = registry.notifying().unwrap();
        assert_eq!(handles.len(), 6);
        assert_eq!(handles[0], (Endpoint::Button, 0));
    }

    #[test]
    fn test_capabilities_and_clear() {
        let mut registry = EndpointRegistry::new();
        assert_eq!(registry.capabilities(), Capabilities::default());

        registry.register(&REBOOT_TO_DFU_CHARACTERISTIC, ());
        assert_eq!(
            registry.capabilities(),
            Capabilities { reboot_to_dfu: true, fly_calibration: false },
        );

        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.capabilities().reboot_to_dfu);
    }
}
