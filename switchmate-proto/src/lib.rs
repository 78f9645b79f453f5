//! Switchmate wire protocol - GATT constants, signed commands and notifications

pub mod ble;
pub mod sign;

pub use sign::{sign, sign_command, signature_bytes};

/// Notifications the switch sent that we cannot accept
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("failed to get an auth key, did you press the button in time?")]
    AuthRejected,
    #[error("toggle failed with code: {}", code_text(.code))]
    ToggleRejected { code: Option<u8> },
    #[error("notification too short: {0} bytes")]
    ShortNotification(usize),
}

fn code_text(code: &Option<u8>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Notification on the auth characteristic carrying a fresh key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub key: Vec<u8>,
}

impl AuthResponse {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        match data.strip_prefix(&ble::AUTH_RESPONSE_PREFIX[..]) {
            Some(key) if !key.is_empty() => Ok(Self { key: key.to_vec() }),
            _ => Err(ProtocolError::AuthRejected),
        }
    }
}

/// Notification on the state characteristic acknowledging a set-state write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateResponse {
    pub status: u8,
    pub error_code: Option<u8>,
}

impl StateResponse {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let status = *data
            .get(ble::STATE_STATUS_OFFSET)
            .ok_or(ProtocolError::ShortNotification(data.len()))?;
        Ok(Self {
            status,
            error_code: data.get(ble::STATE_ERROR_CODE_OFFSET).copied(),
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0x00
    }

    /// `Ok(())` when the switch accepted the command
    pub fn into_result(self) -> Result<(), ProtocolError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(ProtocolError::ToggleRejected {
                code: self.error_code,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_response_carries_key() {
        let resp = AuthResponse::from_bytes(&[0x20, 0x01, 0x00, 0xde, 0xad, 0xbe, 0xef]).unwrap();
        assert_eq!(resp.key, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn auth_response_rejections() {
        assert_eq!(
            AuthResponse::from_bytes(&[0x20, 0x01, 0x01, 0xaa]),
            Err(ProtocolError::AuthRejected)
        );
        // length must be > 3
        assert_eq!(
            AuthResponse::from_bytes(&[0x20, 0x01, 0x00]),
            Err(ProtocolError::AuthRejected)
        );
        assert_eq!(AuthResponse::from_bytes(&[]), Err(ProtocolError::AuthRejected));
    }

    #[test]
    fn state_response_ok() {
        let resp = StateResponse::from_bytes(&[0xaa, 0xbb, 0x00, 0xcc, 0xdd]).unwrap();
        assert!(resp.is_ok());
        assert_eq!(resp.into_result(), Ok(()));
    }

    #[test]
    fn state_response_error_code() {
        let resp = StateResponse::from_bytes(&[0xaa, 0xbb, 0x07, 0xcc, 0x05]).unwrap();
        assert!(!resp.is_ok());
        assert_eq!(
            resp.into_result(),
            Err(ProtocolError::ToggleRejected { code: Some(5) })
        );
    }

    #[test]
    fn state_response_without_code() {
        let resp = StateResponse::from_bytes(&[0x00, 0x00, 0x01]).unwrap();
        assert_eq!(
            resp.into_result(),
            Err(ProtocolError::ToggleRejected { code: None })
        );
    }

    #[test]
    fn state_response_too_short() {
        assert_eq!(
            StateResponse::from_bytes(&[0x00, 0x00]),
            Err(ProtocolError::ShortNotification(2))
        );
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            ProtocolError::ToggleRejected { code: Some(5) }.to_string(),
            "toggle failed with code: 5"
        );
        assert_eq!(
            ProtocolError::ToggleRejected { code: None }.to_string(),
            "toggle failed with code: unknown"
        );
    }
}
