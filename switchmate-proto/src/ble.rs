//! BLE GATT Service Protocol Constants for Switchmate switches
//!
//! The switch exposes one vendor service with two characteristics we care
//! about: the auth characteristic (pairing) and the state characteristic
//! (signed on/off commands). Both reply through notifications.

use uuid::Uuid;

/// BLE Service UUID: 00001523-1212-efde-1523-785feabcd123
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x00001523_1212_efde_1523_785feabcd123);

/// Auth Characteristic UUID (write/notify)
pub const AUTH_UUID: Uuid = Uuid::from_u128(0x00001529_1212_efde_1523_785feabcd123);

/// State Characteristic UUID (write/notify)
pub const STATE_UUID: Uuid = Uuid::from_u128(0x00001526_1212_efde_1523_785feabcd123);

/// Command payloads
pub mod commands {
    /// Ask the switch for a new auth key. The switch answers on the auth
    /// characteristic once its button has been pressed.
    pub const REQUEST_AUTH: [u8; 5] = [0x00, 0x00, 0x00, 0x00, 0x01];

    /// Opcode for setting the relay state
    pub const SET_STATE: u8 = 0x01;

    /// Unsigned set-state command; must go through
    /// [`sign_command`](crate::sign::sign_command) before it is written.
    pub fn set_state(on: bool) -> [u8; 2] {
        [SET_STATE, if on { 0x01 } else { 0x00 }]
    }
}

/// Prefix of a successful auth notification, followed by the raw key bytes
pub const AUTH_RESPONSE_PREFIX: [u8; 3] = [0x20, 0x01, 0x00];

/// Offset of the status byte in a state notification (0 means accepted)
pub const STATE_STATUS_OFFSET: usize = 2;

/// Offset of the error code in a rejected state notification
pub const STATE_ERROR_CODE_OFFSET: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuids_match_the_vendor_strings() {
        assert_eq!(
            SERVICE_UUID,
            Uuid::parse_str("00001523-1212-EFDE-1523-785FEABCD123").unwrap()
        );
        assert_eq!(
            AUTH_UUID.to_string(),
            "00001529-1212-efde-1523-785feabcd123"
        );
        assert_eq!(
            STATE_UUID.to_string(),
            "00001526-1212-efde-1523-785feabcd123"
        );
    }

    #[test]
    fn set_state_payloads() {
        assert_eq!(commands::set_state(true), [0x01, 0x01]);
        assert_eq!(commands::set_state(false), [0x01, 0x00]);
    }
}
