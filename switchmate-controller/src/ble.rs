//! btleplug implementation of [`RadioAdapter`]
//!
//! Uses the first Bluetooth adapter the platform reports. Scan results come
//! from the adapter's central event stream; notifications from the
//! connected peripheral's notification stream.

use std::collections::HashSet;
use std::pin::Pin;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{self, Adapter, Manager, Peripheral};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::adapter::{
    AdapterError, AdapterEvent, DiscoveredPeripheral, PeripheralId, RadioAdapter, WriteMode,
};

type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

pub struct BtleAdapter {
    adapter: Adapter,
    central_events: EventStream<CentralEvent>,
    sightings: Sightings,
    /// An unfiltered scan started by [`BtleAdapter::resolve`] is running
    resolving: bool,
    peripheral: Option<Peripheral>,
    characteristics: Vec<Characteristic>,
    notifications: Option<EventStream<ValueNotification>>,
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, AdapterError> {
    let manager = Manager::new().await.map_err(platform_error)?;
    let adapters = manager.adapters().await.map_err(platform_error)?;
    adapters.into_iter().next().ok_or(AdapterError::NoAdapter)
}

fn platform_error(e: btleplug::Error) -> AdapterError {
    AdapterError::Platform(e.to_string())
}

impl BtleAdapter {
    pub async fn new() -> Result<Self, AdapterError> {
        let adapter = get_adapter().await?;
        if let Ok(info) = adapter.adapter_info().await {
            log::debug!("using bluetooth adapter {info}");
        }
        let central_events = adapter.events().await.map_err(platform_error)?;

        Ok(Self {
            adapter,
            central_events,
            sightings: Sightings::default(),
            resolving: false,
            peripheral: None,
            characteristics: Vec::new(),
            notifications: None,
        })
    }

    /// Find `id` among the peripherals the platform already knows about,
    /// scanning for it if it has not been seen yet
    async fn resolve(&mut self, id: &PeripheralId) -> Result<Peripheral, AdapterError> {
        let known = self.adapter.peripherals().await.map_err(platform_error)?;
        if let Some(peripheral) = known.into_iter().find(|p| id.matches(&p.id().to_string())) {
            return Ok(peripheral);
        }

        log::debug!("{id} is not known yet, scanning for it");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| AdapterError::Scan(e.to_string()))?;
        self.resolving = true;

        let mut found = None;
        while let Some(event) = self.central_events.next().await {
            if let CentralEvent::DeviceDiscovered(pid) = event {
                if id.matches(&pid.to_string()) {
                    found = Some(pid);
                    break;
                }
            }
        }

        self.stop_resolving().await;
        let pid = found.ok_or_else(|| AdapterError::PeripheralNotFound(id.to_string()))?;
        self.adapter
            .peripheral(&pid)
            .await
            .map_err(|_| AdapterError::PeripheralNotFound(id.to_string()))
    }

    /// Stop the scan `resolve` started, if it is still running. `resolve` is
    /// cancelled when the deadline wins, so this also runs on disconnect.
    async fn stop_resolving(&mut self) {
        if !self.resolving {
            return;
        }
        self.resolving = false;
        if let Err(e) = self.adapter.stop_scan().await {
            log::warn!("failed to stop scan: {e}");
        }
    }

    /// Describe `id` if it is the first time this scan sees it. Devices the
    /// stack had cached before the scan only ever show up as updates, which
    /// the platform filter does not cover.
    async fn sighting(
        &mut self,
        id: &platform::PeripheralId,
        prefiltered: bool,
    ) -> Option<DiscoveredPeripheral> {
        let peripheral = self.adapter.peripheral(id).await.ok()?;
        let props = peripheral.properties().await.ok().flatten();
        let advertised = props.as_ref().map(|p| p.services.as_slice()).unwrap_or_default();

        let id = id.to_string();
        if !self.sightings.first(&id, advertised, prefiltered) {
            return None;
        }
        Some(DiscoveredPeripheral {
            id: PeripheralId::new(id),
            name: props.as_ref().and_then(|p| p.local_name.clone()),
            rssi: props.and_then(|p| p.rssi),
        })
    }

    fn connected(&self) -> Result<Peripheral, AdapterError> {
        self.peripheral.clone().ok_or(AdapterError::NotConnected)
    }

    fn characteristic(&self, uuid: Uuid) -> Result<Characteristic, AdapterError> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(AdapterError::NotConnected)
    }
}

/// Peripherals already reported by the running scan
#[derive(Debug, Default)]
struct Sightings {
    service: Option<Uuid>,
    reported: HashSet<String>,
}

impl Sightings {
    fn begin(&mut self, service: Uuid) {
        self.service = Some(service);
        self.reported.clear();
    }

    fn end(&mut self) {
        self.service = None;
    }

    fn is_scanning(&self) -> bool {
        self.service.is_some()
    }

    /// True the first time a scan sees `id`. Sightings the platform did not
    /// filter must advertise the scanned service.
    fn first(&mut self, id: &str, advertised: &[Uuid], prefiltered: bool) -> bool {
        let Some(service) = self.service else {
            return false;
        };
        if !prefiltered && !advertised.contains(&service) {
            return false;
        }
        self.reported.insert(id.to_string())
    }
}

enum Incoming {
    Value(ValueNotification),
    Central(Option<CentralEvent>),
}

async fn next_notification(
    notifications: &mut Option<EventStream<ValueNotification>>,
) -> Option<ValueNotification> {
    match notifications {
        Some(stream) => stream.next().await,
        None => futures::future::pending().await,
    }
}

#[async_trait]
impl RadioAdapter for BtleAdapter {
    async fn start_scan(&mut self, service: Uuid) -> Result<(), AdapterError> {
        let filter = ScanFilter {
            services: vec![service],
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| AdapterError::Scan(e.to_string()))?;
        self.sightings.begin(service);
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), AdapterError> {
        self.sightings.end();
        self.adapter
            .stop_scan()
            .await
            .map_err(|e| AdapterError::Scan(e.to_string()))
    }

    async fn connect(&mut self, peripheral: &PeripheralId) -> Result<(), AdapterError> {
        let device = self.resolve(peripheral).await?;
        device
            .connect()
            .await
            .map_err(|e| AdapterError::Connect(e.to_string()))?;
        self.peripheral = Some(device);
        Ok(())
    }

    async fn discover_services(&mut self, service: Uuid) -> Result<Vec<Uuid>, AdapterError> {
        let device = self.connected()?;
        device
            .discover_services()
            .await
            .map_err(|e| AdapterError::DiscoverServices(e.to_string()))?;

        Ok(device
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .map(|s| s.uuid)
            .collect())
    }

    async fn discover_characteristics(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<Uuid>, AdapterError> {
        let device = self.connected()?;
        self.characteristics = device
            .services()
            .into_iter()
            .filter(|s| s.uuid == service)
            .flat_map(|s| s.characteristics.into_iter())
            .filter(|c| c.uuid == characteristic)
            .collect();

        Ok(self.characteristics.iter().map(|c| c.uuid).collect())
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<(), AdapterError> {
        let device = self.connected()?;
        let characteristic = self.characteristic(characteristic)?;

        let notifications = device
            .notifications()
            .await
            .map_err(|e| AdapterError::Subscribe(e.to_string()))?;
        device
            .subscribe(&characteristic)
            .await
            .map_err(|e| AdapterError::Subscribe(e.to_string()))?;
        self.notifications = Some(notifications);
        Ok(())
    }

    async fn write(
        &mut self,
        characteristic: Uuid,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<(), AdapterError> {
        let device = self.connected()?;
        let characteristic = self.characteristic(characteristic)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };

        device
            .write(&characteristic, data, write_type)
            .await
            .map_err(|e| AdapterError::Write(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), AdapterError> {
        self.stop_resolving().await;
        self.notifications = None;
        self.characteristics.clear();
        match self.peripheral.take() {
            Some(device) => device
                .disconnect()
                .await
                .map_err(|e| AdapterError::Disconnect(e.to_string())),
            None => Ok(()),
        }
    }

    async fn next_event(&mut self) -> Option<AdapterEvent> {
        loop {
            let incoming = tokio::select! {
                Some(value) = next_notification(&mut self.notifications) => Incoming::Value(value),
                event = self.central_events.next() => Incoming::Central(event),
            };

            match incoming {
                Incoming::Value(notification) => {
                    return Some(AdapterEvent::ValueUpdated {
                        characteristic: notification.uuid,
                        value: notification.value,
                    });
                }
                Incoming::Central(None) => return None,
                Incoming::Central(Some(CentralEvent::DeviceDiscovered(id)))
                    if self.sightings.is_scanning() =>
                {
                    if let Some(peripheral) = self.sighting(&id, true).await {
                        return Some(AdapterEvent::Discovered(peripheral));
                    }
                }
                Incoming::Central(Some(CentralEvent::DeviceUpdated(id)))
                    if self.sightings.is_scanning() =>
                {
                    if let Some(peripheral) = self.sighting(&id, false).await {
                        return Some(AdapterEvent::Discovered(peripheral));
                    }
                }
                Incoming::Central(Some(CentralEvent::DeviceDisconnected(id))) => {
                    let ours = self.peripheral.as_ref().is_some_and(|p| p.id() == id);
                    if ours {
                        return Some(AdapterEvent::Disconnected);
                    }
                }
                Incoming::Central(Some(_)) => {}
            }
        }
    }
}
