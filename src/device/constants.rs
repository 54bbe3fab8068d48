use uuid::Uuid;

/**
 * How long (milliseconds) subscribing to, or unsubscribing from, all notification
 * characteristics may take.
 */
pub const SUBSCRIBE_DEADLINE: u64 = 5000;

/**
 * How long (milliseconds) a single initial read of a characteristic may take.
 */
pub const READ_DEADLINE: u64 = 1000;

/**
 * How long (milliseconds) an acknowledged write to a characteristic may take.
 */
pub const WRITE_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) checking if the peripheral is still connected may take
 */
pub const IS_CONNECTED_DEADLINE: u64 = 2000;

/**
 * How long (milliseconds) to scan for advertising devices before giving up.
 */
pub const SCAN_DURATION: u64 = 5000;

/**
 * How often (milliseconds) to query the adapters for new peripherals while scanning.
 */
pub const SCAN_POLL_DELAY: u64 = 250;

/**
 * Default period (milliseconds) over which rotation deltas are coalesced.
 */
pub const DEFAULT_THROTTLE_PERIOD: u64 = 700;

/**
 * Default display interval (seconds) of an LED matrix.
 */
pub const DEFAULT_DISPLAY_INTERVAL: f64 = 2.0;

/**
 * The longest display interval (seconds) representable in an LED frame (255 * 0.1s).
 */
pub const MAX_DISPLAY_INTERVAL: f64 = 25.5;

/**
 * Advertised local name of the device.
 */
pub const DEVICE_NAME: &str = "Nuimo";

pub const LED_COUNT: usize = 81;
pub const LED_FRAME_LEN: usize = 13;

pub const FLAG_FADE_TRANSITION: u8 = 1 << 4;
pub const FLAG_BUILTIN_MATRIX: u8 = 1 << 5;

pub const COMMAND_TRIGGER: [u8; 1] = [0x01];

// services
pub const NUIMO_SERVICE: Uuid = Uuid::from_u128(0xf29b1525_cb19_40f3_be5c_7241ecb82fd2);
pub const LED_MATRIX_SERVICE: Uuid = Uuid::from_u128(0xf29b1523_cb19_40f3_be5c_7241ecb82fd1);
pub const BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
pub const DEVICE_INFORMATION_SERVICE: Uuid = Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb);

pub const REQUIRED_SERVICES: [Uuid; 4] = [
    NUIMO_SERVICE,
    LED_MATRIX_SERVICE,
    BATTERY_SERVICE,
    DEVICE_INFORMATION_SERVICE,
];

// gesture characteristics
pub const BUTTON_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1529_cb19_40f3_be5c_7241ecb82fd2);
pub const ROTATION_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1528_cb19_40f3_be5c_7241ecb82fd2);
pub const SWIPE_TOUCH_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1527_cb19_40f3_be5c_7241ecb82fd2);
pub const FLY_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1526_cb19_40f3_be5c_7241ecb82fd2);

// command / status characteristics
pub const HEARTBEAT_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b152b_cb19_40f3_be5c_7241ecb82fd2);
pub const REBOOT_TO_DFU_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b152a_cb19_40f3_be5c_7241ecb82fd2);
pub const FLY_CALIBRATION_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b152c_cb19_40f3_be5c_7241ecb82fd2);
pub const LED_MATRIX_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b152d_cb19_40f3_be5c_7241ecb82fd2);
// older firmware exposes the matrix through the separate LED matrix service
pub const LEGACY_LED_MATRIX_CHARACTERISTIC: Uuid = Uuid::from_u128(0xf29b1524_cb19_40f3_be5c_7241ecb82fd1);

// standard characteristics
pub const BATTERY_LEVEL_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);
pub const FIRMWARE_REVISION_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a26_0000_1000_8000_00805f9b34fb);
pub const HARDWARE_REVISION_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a27_0000_1000_8000_00805f9b34fb);
pub const MODEL_NUMBER_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002a24_0000_1000_8000_00805f9b34fb);
