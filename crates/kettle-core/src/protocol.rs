//! Wire constants for the Mi Kettle Pro GATT profile
//!
//! Service and characteristic identifiers, login opcodes and the fixed byte
//! layouts shared by the codec and the session driver. These values must match
//! the device firmware exactly.

use uuid::Uuid;

// ----------------------------------------------------------------------------
// Services
// ----------------------------------------------------------------------------

/// Xiaomi authentication service
pub const SERVICE_AUTH_UUID: Uuid = Uuid::from_u128(0x0000FE95_0000_1000_8000_00805F9B34FB);

/// Kettle business-data service
pub const SERVICE_BIZ_UUID: Uuid = Uuid::from_u128(0x01344736_0000_1000_8000_262837236156);

/// Services that must be present before a session may log in
pub const REQUIRED_SERVICES: [Uuid; 2] = [SERVICE_AUTH_UUID, SERVICE_BIZ_UUID];

// ----------------------------------------------------------------------------
// Characteristics
// ----------------------------------------------------------------------------

/// Login bootstrap channel ("init")
pub const AUTH_INIT_UUID: Uuid = Uuid::from_u128(0x00000010_0000_1000_8000_00805F9B34FB);

/// Random/token exchange channel
pub const AUTH_UUID: Uuid = Uuid::from_u128(0x00000019_0000_1000_8000_00805F9B34FB);

/// Primary setting characteristic, target of action opcodes
pub const WARM_SETTING_PRIMARY_UUID: Uuid =
    Uuid::from_u128(0x0000AA01_0000_1000_8000_00805F9B34FB);

/// Secondary setting characteristic
pub const WARM_SETTING_SECONDARY_UUID: Uuid =
    Uuid::from_u128(0x0000AA05_0000_1000_8000_00805F9B34FB);

/// Status notifications
pub const WARM_STATUS_UUID: Uuid = Uuid::from_u128(0x0000AA02_0000_1000_8000_00805F9B34FB);

/// Mode configuration record, read side
pub const READ_MODE_CONFIG_UUID: Uuid = Uuid::from_u128(0x0000AA03_0000_1000_8000_00805F9B34FB);

/// Mode configuration record, write side
pub const WRITE_MODE_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000AA04_0000_1000_8000_00805F9B34FB);

/// Characteristics that must be present across the two required services
pub const REQUIRED_CHARACTERISTICS: [Uuid; 7] = [
    AUTH_INIT_UUID,
    AUTH_UUID,
    WARM_SETTING_PRIMARY_UUID,
    WARM_SETTING_SECONDARY_UUID,
    WARM_STATUS_UUID,
    READ_MODE_CONFIG_UUID,
    WRITE_MODE_CONFIG_UUID,
];

/// Characteristics with notification delivery enabled after validation
pub const NOTIFY_CHARACTERISTICS: [Uuid; 3] = [AUTH_UUID, AUTH_INIT_UUID, WARM_STATUS_UUID];

/// Short human-readable name for a known characteristic, used in logs
pub fn characteristic_name(uuid: &Uuid) -> &'static str {
    match *uuid {
        AUTH_INIT_UUID => "auth-init",
        AUTH_UUID => "auth",
        WARM_SETTING_PRIMARY_UUID => "warm-setting-primary",
        WARM_SETTING_SECONDARY_UUID => "warm-setting-secondary",
        WARM_STATUS_UUID => "warm-status",
        READ_MODE_CONFIG_UUID => "read-mode-config",
        WRITE_MODE_CONFIG_UUID => "write-mode-config",
        _ => "unknown",
    }
}

// ----------------------------------------------------------------------------
// Login opcodes
// ----------------------------------------------------------------------------

/// First bootstrap write on the init channel
pub const OP_AUTH_INIT_1: &[u8] = &[0xA4];
/// Second bootstrap write on the init channel
pub const OP_AUTH_INIT_2: &[u8] = &[0x24, 0x00, 0x00, 0x00];
/// App announces its random value
pub const OP_PREPARE_RAND: &[u8] = &[0x00, 0x00, 0x00, 0x0B, 0x01, 0x00];
/// App announces its token
pub const OP_PREPARE_TOKEN: &[u8] = &[0x00, 0x00, 0x00, 0x0A, 0x02, 0x00];
/// Login confirmed (init channel)
pub const OP_SUCCESS: &[u8] = &[0x21, 0x00, 0x00, 0x00];
/// Device reports an existing login (init channel)
pub const OP_ALREADY_LOGIN: &[u8] = &[0xE2, 0x00, 0x00, 0x00];
/// Device announces its random value
pub const OP_DEV_PREPARE_RAND: &[u8] = &[0x00, 0x00, 0x00, 0x0D, 0x01, 0x00];
/// Device announces its token
pub const OP_DEV_PREPARE_TOKEN: &[u8] = &[0x00, 0x00, 0x00, 0x0C, 0x02, 0x00];
/// Ready acknowledgement, both directions
pub const ACK_READY: &[u8] = &[0x00, 0x00, 0x01, 0x01];
/// Success acknowledgement, both directions
pub const ACK_SUCCESS: &[u8] = &[0x00, 0x00, 0x01, 0x00];

/// Tag of the first fragment of a split payload
pub const FRAGMENT_PREFIX_FIRST: [u8; 2] = [0x01, 0x00];
/// Tag of the second fragment of a split payload
pub const FRAGMENT_PREFIX_SECOND: [u8; 2] = [0x02, 0x00];

/// HKDF info string for login key derivation
pub const LOGIN_INFO: &[u8] = b"mible-login-info";

// ----------------------------------------------------------------------------
// Records and opcodes on the business-data service
// ----------------------------------------------------------------------------

/// Minimum length of a status notification
pub const STATUS_FRAME_MIN_LEN: usize = 11;

/// Length of the mode configuration record
pub const MODE_CONFIG_LEN: usize = 10;
/// Bytes per mode configuration segment
pub const MODE_SEGMENT_LEN: usize = 2;
/// Segments in the mode configuration record
pub const MODE_SEGMENT_COUNT: usize = MODE_CONFIG_LEN / MODE_SEGMENT_LEN;

/// Segment (and mode index) holding the warm setpoint
pub const WARM_INDEX: usize = 3;
/// Segment (and mode index) holding the heat setpoint
pub const HEAT_INDEX: usize = 4;
/// Trailing marker byte of a setpoint segment
pub const SETPOINT_MARKER: u8 = 0x18;

/// Action opcode: start heating
pub const ACTION_HEAT: u8 = 0x04;
/// Action opcode: keep warm, which also stops an ongoing boil
pub const ACTION_WARM: u8 = 0x03;

// ----------------------------------------------------------------------------
// Supported hardware
// ----------------------------------------------------------------------------

/// Advertised names of supported Mi Kettle Pro hardware revisions
pub const SUPPORTED_MODELS: [&str; 8] = [
    "MiKetv9", "MiKetv10", "MiKetv11", "MiKetv12", "MiKetv13", "MiKetv14", "MiKetv15", "MiKetv16",
];

/// Check whether an advertised device name is a supported kettle
pub fn is_supported_model(name: &str) -> bool {
    SUPPORTED_MODELS.contains(&name)
}
