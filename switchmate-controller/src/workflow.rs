//! What a single invocation asks of the switch

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use uuid::Uuid;

use crate::Error;
use crate::adapter::PeripheralId;

/// Deadline for pairing and toggling unless overridden
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("auth key is invalid: {0}")]
    Base64(#[from] data_encoding::DecodeError),
    #[error("auth key is empty")]
    Empty,
}

/// Pairing key handed out by the switch, base64 at the command line
#[derive(Clone, PartialEq, Eq)]
pub struct AuthKey(Vec<u8>);

impl AuthKey {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, InputError> {
        if bytes.is_empty() {
            return Err(InputError::Empty);
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for AuthKey {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = data_encoding::BASE64.decode(s.trim().as_bytes())?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&data_encoding::BASE64.encode(&self.0))
    }
}

// keep keys out of debug logs
impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuthKey({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SwitchPosition {
    On,
    #[default]
    Off,
}

impl SwitchPosition {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl fmt::Display for SwitchPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "on",
            Self::Off => "off",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Discover,
    Authenticate,
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Workflow {
    /// Report switches as they show up, for `wait` or until killed
    Discover { wait: Option<Duration> },
    /// Obtain a fresh auth key
    Authenticate { peripheral: PeripheralId },
    /// Set the relay with a signed command
    Toggle {
        peripheral: PeripheralId,
        position: SwitchPosition,
        key: AuthKey,
    },
}

impl Workflow {
    pub fn discover(wait: Option<Duration>) -> Self {
        Self::Discover { wait }
    }

    pub fn authenticate(peripheral: &str) -> Result<Self, Error> {
        Ok(Self::Authenticate {
            peripheral: parse_peripheral(peripheral)?,
        })
    }

    /// The key is checked before the peripheral id, so a bad key is reported
    /// even when both are wrong.
    pub fn toggle(position: SwitchPosition, peripheral: &str, key: &str) -> Result<Self, Error> {
        let key: AuthKey = key.parse()?;
        Ok(Self::Toggle {
            peripheral: parse_peripheral(peripheral)?,
            position,
            key,
        })
    }

    pub fn mode(&self) -> Mode {
        match self {
            Self::Discover { .. } => Mode::Discover,
            Self::Authenticate { .. } => Mode::Authenticate,
            Self::Toggle { .. } => Mode::Toggle,
        }
    }

    /// How long the supervisor lets this workflow run
    pub fn deadline(&self, options: &Options) -> Option<Duration> {
        match self {
            Self::Discover { wait } => *wait,
            Self::Authenticate { .. } | Self::Toggle { .. } => options.timeout,
        }
    }
}

/// Command line ids are UUIDs, the form CoreBluetooth gives peripherals. Ids
/// of other platforms (BlueZ object paths, MAC addresses) are passed to the
/// library by building the workflow variant directly.
fn parse_peripheral(s: &str) -> Result<PeripheralId, Error> {
    Uuid::parse_str(s)
        .map(PeripheralId::from)
        .map_err(|e| Error::Usage(format!("invalid device uuid {s:?}: {e}")))
}

/// Knobs the command line can turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Deadline for pairing/toggling; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Options {
    /// A zero timeout disables the deadline
    pub fn with_timeout_secs(secs: u64) -> Self {
        Self {
            timeout: (secs > 0).then(|| Duration::from_secs(secs)),
        }
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: &str = "6f3a2a52-8b1a-4c5e-9d0e-1f2a3b4c5d6e";

    #[test]
    fn key_roundtrips_through_base64() {
        let key: AuthKey = "3q2+7w==".parse().unwrap();
        assert_eq!(key.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(key.to_string(), "3q2+7w==");
    }

    #[test]
    fn invalid_keys() {
        assert!(matches!(
            "not-valid-base64!!".parse::<AuthKey>(),
            Err(InputError::Base64(_))
        ));
        assert_eq!("".parse::<AuthKey>(), Err(InputError::Empty));
    }

    #[test]
    fn debug_hides_key() {
        let key: AuthKey = "3q2+7w==".parse().unwrap();
        assert_eq!(format!("{key:?}"), "AuthKey(4 bytes)");
    }

    #[test]
    fn toggle_rejects_bad_key_first() {
        let err = Workflow::toggle(SwitchPosition::On, "not-a-uuid", "not-valid-base64!!")
            .unwrap_err();
        assert!(matches!(err, Error::Input(InputError::Base64(_))));
    }

    #[test]
    fn toggle_rejects_bad_uuid() {
        let err = Workflow::toggle(SwitchPosition::On, "not-a-uuid", "3q2+7w==").unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn authenticate_parses_uuid() {
        let workflow = Workflow::authenticate(DEVICE).unwrap();
        assert_eq!(workflow.mode(), Mode::Authenticate);
        assert!(Workflow::authenticate("kitchen").is_err());
    }

    #[test]
    fn deadlines() {
        let options = Options::default();
        assert_eq!(
            Workflow::authenticate(DEVICE).unwrap().deadline(&options),
            Some(DEFAULT_TIMEOUT)
        );
        assert_eq!(Workflow::discover(None).deadline(&options), None);
        assert_eq!(
            Workflow::discover(Some(Duration::from_secs(5))).deadline(&options),
            Some(Duration::from_secs(5))
        );
        assert_eq!(Options::with_timeout_secs(0).timeout, None);
        assert_eq!(
            Options::with_timeout_secs(10).timeout,
            Some(Duration::from_secs(10))
        );
    }
}
