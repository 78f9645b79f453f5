//! Command state machine
//!
//! A sans-IO machine: [`Machine::start`] and [`Machine::handle`] consume
//! events (adapter completions, unsolicited adapter traffic, the deadline)
//! and return the [`Action`]s to perform next. Only one BLE operation is ever
//! requested at a time; the next one is emitted by the completion of the
//! previous one.

use std::fmt;

use switchmate_proto::ble::{self, commands};
use switchmate_proto::{AuthResponse, StateResponse, sign_command};
use uuid::Uuid;

use crate::Error;
use crate::adapter::{AdapterError, AdapterEvent, DiscoveredPeripheral, PeripheralId, WriteMode};
use crate::workflow::{AuthKey, Mode, SwitchPosition, Workflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Scanning,
    Connecting,
    DiscoveringService,
    DiscoveringCharacteristic,
    Subscribing,
    Writing,
    AwaitingNotification,
    Terminal,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Connecting => "connecting",
            Self::DiscoveringService => "discovering services",
            Self::DiscoveringCharacteristic => "discovering characteristics",
            Self::Subscribing => "subscribing",
            Self::Writing => "writing",
            Self::AwaitingNotification => "waiting for the switch to answer",
            Self::Terminal => "finished",
        })
    }
}

/// What a successful invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Discovered peripherals were already streamed out as they arrived
    Discovered,
    AuthKey(AuthKey),
    Toggled(SwitchPosition),
}

pub type Outcome = Result<Report, Error>;

/// Work the machine asks its driver to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StartScan { service: Uuid },
    StopScan,
    Connect { peripheral: PeripheralId },
    DiscoverServices { service: Uuid },
    DiscoverCharacteristics { service: Uuid, characteristic: Uuid },
    Subscribe { characteristic: Uuid },
    Write {
        characteristic: Uuid,
        payload: Vec<u8>,
        mode: WriteMode,
    },
    /// Print a discovered peripheral
    Report(DiscoveredPeripheral),
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ScanStarted(Result<(), AdapterError>),
    PeripheralDiscovered(DiscoveredPeripheral),
    Connected(Result<(), AdapterError>),
    ServicesDiscovered(Result<Vec<Uuid>, AdapterError>),
    CharacteristicsDiscovered(Result<Vec<Uuid>, AdapterError>),
    Subscribed(Result<(), AdapterError>),
    WriteCompleted(Result<(), AdapterError>),
    ValueUpdated { characteristic: Uuid, value: Vec<u8> },
    Disconnected,
    AdapterClosed,
    DeadlineReached,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Self::ScanStarted(_) => "scan start",
            Self::PeripheralDiscovered(_) => "discovery",
            Self::Connected(_) => "connect completion",
            Self::ServicesDiscovered(_) => "service discovery",
            Self::CharacteristicsDiscovered(_) => "characteristic discovery",
            Self::Subscribed(_) => "subscription ack",
            Self::WriteCompleted(_) => "write ack",
            Self::ValueUpdated { .. } => "notification",
            Self::Disconnected => "disconnect",
            Self::AdapterClosed => "adapter shutdown",
            Self::DeadlineReached => "deadline",
        }
    }

    /// The adapter error a failed completion carries
    fn adapter_error(&self) -> Option<&AdapterError> {
        match self {
            Self::ScanStarted(Err(e))
            | Self::Connected(Err(e))
            | Self::ServicesDiscovered(Err(e))
            | Self::CharacteristicsDiscovered(Err(e))
            | Self::Subscribed(Err(e))
            | Self::WriteCompleted(Err(e)) => Some(e),
            _ => None,
        }
    }
}

impl From<AdapterEvent> for Event {
    fn from(event: AdapterEvent) -> Self {
        match event {
            AdapterEvent::Discovered(peripheral) => Self::PeripheralDiscovered(peripheral),
            AdapterEvent::ValueUpdated {
                characteristic,
                value,
            } => Self::ValueUpdated {
                characteristic,
                value,
            },
            AdapterEvent::Disconnected => Self::Disconnected,
        }
    }
}

/// Mutable state of one invocation
#[derive(Debug)]
pub struct Session {
    mode: Mode,
    peripheral: Option<PeripheralId>,
    service: Option<Uuid>,
    characteristic: Option<Uuid>,
    desired_characteristic: Option<Uuid>,
    auth_key: Vec<u8>,
    position: Option<SwitchPosition>,
    scanning: bool,
    /// A connect request is outstanding; cancelling it counts as a disconnect
    connecting: bool,
    connected: bool,
    state: State,
}

impl Session {
    pub fn new(workflow: Workflow) -> Self {
        let mode = workflow.mode();
        let mut session = Self {
            mode,
            peripheral: None,
            service: None,
            characteristic: None,
            desired_characteristic: None,
            auth_key: Vec::new(),
            position: None,
            scanning: false,
            connecting: false,
            connected: false,
            state: State::Idle,
        };

        match workflow {
            Workflow::Discover { .. } => {}
            Workflow::Authenticate { peripheral } => {
                session.peripheral = Some(peripheral);
                session.desired_characteristic = Some(ble::AUTH_UUID);
            }
            Workflow::Toggle {
                peripheral,
                position,
                key,
            } => {
                session.peripheral = Some(peripheral);
                session.desired_characteristic = Some(ble::STATE_UUID);
                session.auth_key = key.as_bytes().to_vec();
                session.position = Some(position);
            }
        }
        session
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn peripheral(&self) -> Option<&PeripheralId> {
        self.peripheral.as_ref()
    }

    pub fn service(&self) -> Option<Uuid> {
        self.service
    }

    pub fn characteristic(&self) -> Option<Uuid> {
        self.characteristic
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

pub struct Machine {
    session: Session,
    outcome: Option<Outcome>,
}

impl Machine {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            session: Session::new(workflow),
            outcome: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> State {
        self.session.state
    }

    pub fn is_terminal(&self) -> bool {
        self.session.state == State::Terminal
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// Hand the terminal outcome to the caller; `None` before termination
    /// and on every call after the first
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        self.outcome.take()
    }

    /// Kick off the workflow. Only does anything in [`State::Idle`].
    pub fn start(&mut self) -> Vec<Action> {
        if self.session.state != State::Idle {
            return Vec::new();
        }

        match self.session.mode {
            Mode::Discover => {
                log::info!("Scanning for peripherals...");
                self.session.state = State::Scanning;
                self.session.scanning = true;
                vec![Action::StartScan {
                    service: ble::SERVICE_UUID,
                }]
            }
            Mode::Authenticate | Mode::Toggle => {
                let Some(peripheral) = self.session.peripheral.clone() else {
                    return self.fail(Error::Usage("no device uuid given".to_string()));
                };
                log::info!("Connecting to device {peripheral}...");
                self.session.state = State::Connecting;
                self.session.connecting = true;
                vec![Action::Connect { peripheral }]
            }
        }
    }

    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.is_terminal() {
            log::debug!("ignoring {} after termination", event.name());
            return Vec::new();
        }
        log::debug!("{} while {}", event.name(), self.session.state);

        if matches!(event, Event::Connected(_)) {
            self.session.connecting = false;
        }
        if let Some(err) = event.adapter_error() {
            if matches!(event, Event::ScanStarted(_)) {
                self.session.scanning = false;
            }
            return self.fail(err.clone().into());
        }

        match (self.session.state, event) {
            (_, Event::DeadlineReached) => self.deadline_reached(),
            (_, Event::Disconnected) if self.session.connected => {
                self.session.connected = false;
                self.fail(AdapterError::Disconnected.into())
            }
            (_, Event::Disconnected) => {
                log::debug!("ignoring disconnect of a device we never connected to");
                Vec::new()
            }
            (_, Event::AdapterClosed) => self.fail(AdapterError::EventsClosed.into()),

            (State::Scanning, Event::ScanStarted(_)) => Vec::new(),
            (State::Scanning, Event::PeripheralDiscovered(peripheral)) => {
                vec![Action::Report(peripheral)]
            }
            (_, Event::PeripheralDiscovered(peripheral)) => {
                log::debug!("ignoring discovery of {}", peripheral.id);
                Vec::new()
            }

            (State::Connecting, Event::Connected(_)) => {
                log::info!("Connected, discovering services...");
                self.session.connected = true;
                self.session.state = State::DiscoveringService;
                vec![Action::DiscoverServices {
                    service: ble::SERVICE_UUID,
                }]
            }
            (State::DiscoveringService, Event::ServicesDiscovered(Ok(services))) => {
                self.services_discovered(&services)
            }
            (State::DiscoveringCharacteristic, Event::CharacteristicsDiscovered(Ok(found))) => {
                self.characteristics_discovered(&found)
            }
            (State::Subscribing, Event::Subscribed(_)) => self.subscribed(),
            (State::Writing, Event::WriteCompleted(_)) => {
                if self.session.mode == Mode::Authenticate {
                    log::info!("The device is ready to pair, press the button on the switchmate.");
                } else {
                    log::debug!("write acknowledged");
                }
                self.session.state = State::AwaitingNotification;
                Vec::new()
            }

            // the switch may answer before the write ack has been processed
            (
                State::Writing | State::AwaitingNotification,
                Event::ValueUpdated {
                    characteristic,
                    value,
                },
            ) if self.session.characteristic == Some(characteristic) => self.interpret(&value),
            (_, Event::ValueUpdated { characteristic, .. }) => {
                log::debug!("ignoring notification on {characteristic}");
                Vec::new()
            }

            (state, event) => self.fail(Error::UnexpectedEvent {
                state,
                event: event.name(),
            }),
        }
    }

    fn services_discovered(&mut self, services: &[Uuid]) -> Vec<Action> {
        let Some(service) = services.iter().copied().find(|s| *s == ble::SERVICE_UUID) else {
            return self.fail(Error::ServiceMissing);
        };
        let Some(characteristic) = self.session.desired_characteristic else {
            return self.fail(Error::ServiceMissing);
        };

        log::info!("Discovering characteristics...");
        self.session.service = Some(service);
        self.session.state = State::DiscoveringCharacteristic;
        vec![Action::DiscoverCharacteristics {
            service,
            characteristic,
        }]
    }

    fn characteristics_discovered(&mut self, found: &[Uuid]) -> Vec<Action> {
        let Some(desired) = self.session.desired_characteristic else {
            return self.fail(Error::ServiceMissing);
        };
        if !found.contains(&desired) {
            return self.fail(Error::CharacteristicMissing(desired));
        }

        log::info!("Got characteristics, requesting subscription...");
        self.session.characteristic = Some(desired);
        self.session.state = State::Subscribing;
        vec![Action::Subscribe {
            characteristic: desired,
        }]
    }

    fn subscribed(&mut self) -> Vec<Action> {
        let Some(characteristic) = self.session.characteristic else {
            return self.fail(Error::CharacteristicMissing(Uuid::nil()));
        };

        log::info!("Got subscription, writing command...");
        self.session.state = State::Writing;
        vec![Action::Write {
            characteristic,
            payload: self.command(),
            mode: WriteMode::WithResponse,
        }]
    }

    fn command(&self) -> Vec<u8> {
        match self.session.mode {
            Mode::Authenticate => commands::REQUEST_AUTH.to_vec(),
            Mode::Toggle => {
                let on = self.session.position.is_some_and(SwitchPosition::is_on);
                sign_command(&commands::set_state(on), &self.session.auth_key)
            }
            Mode::Discover => Vec::new(),
        }
    }

    fn interpret(&mut self, value: &[u8]) -> Vec<Action> {
        match self.session.mode {
            Mode::Authenticate => {
                let key = AuthResponse::from_bytes(value)
                    .map_err(Error::from)
                    .and_then(|resp| AuthKey::from_bytes(resp.key).map_err(Error::from));
                match key {
                    Ok(key) => self.finish(Ok(Report::AuthKey(key))),
                    Err(e) => self.fail(e),
                }
            }
            Mode::Toggle => {
                match StateResponse::from_bytes(value).and_then(StateResponse::into_result) {
                    Ok(()) => {
                        let position = self.session.position.unwrap_or_default();
                        self.finish(Ok(Report::Toggled(position)))
                    }
                    Err(e) => self.fail(e.into()),
                }
            }
            Mode::Discover => Vec::new(),
        }
    }

    fn deadline_reached(&mut self) -> Vec<Action> {
        match self.session.mode {
            Mode::Discover => self.finish(Ok(Report::Discovered)),
            Mode::Authenticate | Mode::Toggle => {
                let state = self.session.state;
                self.fail(Error::Timeout(state))
            }
        }
    }

    fn fail(&mut self, err: Error) -> Vec<Action> {
        log::debug!("failing while {}: {err}", self.session.state);
        self.finish(Err(err))
    }

    /// Enter [`State::Terminal`] and release whatever the session holds
    fn finish(&mut self, outcome: Outcome) -> Vec<Action> {
        self.session.state = State::Terminal;
        self.outcome = Some(outcome);

        let mut cleanup = Vec::new();
        if self.session.scanning {
            self.session.scanning = false;
            cleanup.push(Action::StopScan);
        }
        if self.session.connected || self.session.connecting {
            self.session.connected = false;
            self.session.connecting = false;
            cleanup.push(Action::Disconnect);
        }
        cleanup
    }
}
