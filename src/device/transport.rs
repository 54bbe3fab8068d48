use std::fmt::Debug;
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info};
use uuid::Uuid;

use crate::error::DeviceError;

/// A GATT service and the characteristics found in it.
#[derive(Debug, Clone)]
pub struct DiscoveredService<H> {
    pub uuid: Uuid,
    pub characteristics: Vec<(Uuid, H)>,
}

/// A value pushed by a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub uuid: Uuid,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    WithResponse,
    WithoutResponse,
}

impl From<WriteKind> for WriteType {
    fn from(kind: WriteKind) -> Self {
        match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        }
    }
}

/// The host BLE stack as seen by a session, bound to a single device.
///
/// Deadlines are enforced by the session; implementations simply await the stack.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Native characteristic handle.
    type Handle: Clone + Debug + Send + Sync + 'static;

    /// Stable address of the device.
    fn address(&self) -> String;

    async fn connect(&self) -> Result<(), DeviceError>;

    async fn is_connected(&self) -> Result<bool, DeviceError>;

    async fn discover_services(&self) -> Result<Vec<DiscoveredService<Self::Handle>>, DeviceError>;

    /// Stream of values pushed by subscribed characteristics.
    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, DeviceError>;

    /// Yields once for every link loss reported by the stack.
    async fn disconnections(&self) -> Result<BoxStream<'static, ()>, DeviceError>;

    async fn subscribe(&self, handle: &Self::Handle) -> Result<(), DeviceError>;

    async fn unsubscribe(&self, handle: &Self::Handle) -> Result<(), DeviceError>;

    async fn read(&self, handle: &Self::Handle) -> Result<Vec<u8>, DeviceError>;

    async fn write(&self, handle: &Self::Handle, data: &[u8], kind: WriteKind) -> Result<(), DeviceError>;

    /// Drops the link and any native resources held for it.
    async fn release(&self) -> Result<(), DeviceError>;
}

/// [`Transport`] backed by `btleplug`.
#[derive(Debug, Clone)]
pub struct BtleplugTransport {
    adapter: Adapter,
    peripheral: Peripheral,
}

impl BtleplugTransport {
    pub fn new(adapter: Adapter, peripheral: Peripheral) -> Self {
        BtleplugTransport { adapter, peripheral }
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Handle = Characteristic;

    fn address(&self) -> String {
        self.peripheral.address().to_string()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        if self.peripheral.is_connected().await? {
            debug!("Peripheral {} is already connected", self.address());
            return Ok(());
        }

        info!("Connecting to peripheral {}...", self.address());
        self.peripheral.connect().await?;
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        Ok(self.peripheral.is_connected().await?)
    }

    async fn discover_services(&self) -> Result<Vec<DiscoveredService<Characteristic>>, DeviceError> {
        info!("Discovering services...");
        self.peripheral.discover_services().await?;

        let services = self.peripheral.services()
            .into_iter()
            .map(|service| DiscoveredService {
                uuid: service.uuid,
                characteristics: service.characteristics
                    .into_iter()
                    .map(|characteristic| (characteristic.uuid, characteristic))
                    .collect(),
            })
            .collect();

        Ok(services)
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, DeviceError> {
        let stream = self.peripheral.notifications().await?;

        Ok(stream
            .map(|notification| Notification { uuid: notification.uuid, value: notification.value })
            .boxed())
    }

    async fn disconnections(&self) -> Result<BoxStream<'static, ()>, DeviceError> {
        let events = self.adapter.events().await?;
        let peripheral_id = self.peripheral.id();

        Ok(events
            .filter_map(move |event| {
                let lost = matches!(&event, CentralEvent::DeviceDisconnected(id) if *id == peripheral_id);
                async move { if lost { Some(()) } else { None } }
            })
            .boxed())
    }

    async fn subscribe(&self, handle: &Characteristic) -> Result<(), DeviceError> {
        debug!("Subscribing to characteristic {:?} {:?}", handle.service_uuid, handle.uuid);
        self.peripheral.subscribe(handle).await?;
        Ok(())
    }

    async fn unsubscribe(&self, handle: &Characteristic) -> Result<(), DeviceError> {
        debug!("Unsubscribing from characteristic {:?} {:?}", handle.service_uuid, handle.uuid);
        self.peripheral.unsubscribe(handle).await?;
        Ok(())
    }

    async fn read(&self, handle: &Characteristic) -> Result<Vec<u8>, DeviceError> {
        Ok(self.peripheral.read(handle).await?)
    }

    async fn write(&self, handle: &Characteristic, data: &[u8], kind: WriteKind) -> Result<(), DeviceError> {
        self.peripheral.write(handle, data, kind.into()).await?;
        Ok(())
    }

    async fn release(&self) -> Result<(), DeviceError> {
        if self.peripheral.is_connected().await? {
            info!("Disconnecting from peripheral {}", self.address());
            self.peripheral.disconnect().await?;
        }
        Ok(())
    }
}
