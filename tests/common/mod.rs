#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::sleep;
use uuid::Uuid;

use nuimo_driver::device::constants::{
    BATTERY_LEVEL_CHARACTERISTIC, BATTERY_SERVICE, BUTTON_CHARACTERISTIC,
    DEVICE_INFORMATION_SERVICE, FIRMWARE_REVISION_CHARACTERISTIC, FLY_CALIBRATION_CHARACTERISTIC,
    FLY_CHARACTERISTIC, HARDWARE_REVISION_CHARACTERISTIC, HEARTBEAT_CHARACTERISTIC,
    LEGACY_LED_MATRIX_CHARACTERISTIC, LED_MATRIX_CHARACTERISTIC, LED_MATRIX_SERVICE,
    MODEL_NUMBER_CHARACTERISTIC, NUIMO_SERVICE, REBOOT_TO_DFU_CHARACTERISTIC,
    ROTATION_CHARACTERISTIC, SWIPE_TOUCH_CHARACTERISTIC,
};
use nuimo_driver::device::session::{ConnectionSession, SessionSettings};
use nuimo_driver::device::transport::{DiscoveredService, Notification, Transport, WriteKind};
use nuimo_driver::device::types::DeviceEvent;
use nuimo_driver::error::DeviceError;

pub const ADDRESS: &str = "c4:d7:54:71:e2:ce";

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Connect,
    IsConnected,
    Discover,
    Subscribe(Uuid),
    Unsubscribe(Uuid),
    Read(Uuid),
    Write(Uuid, Vec<u8>, WriteKind),
    Release,
}

struct FakeState {
    services: Vec<DiscoveredService<Uuid>>,
    ops: Vec<Op>,
    connected: bool,
    connect_delay: Duration,
    subscribe_delay: Duration,
    unsubscribe_delay: Duration,
    drop_link_on_status_query: bool,
    read_delays: HashMap<Uuid, Duration>,
    values: HashMap<Uuid, Vec<u8>>,
    fail_writes: bool,
    notifications: Option<UnboundedSender<Notification>>,
    disconnections: Option<UnboundedSender<()>>,
}

/// In-memory device. Characteristic handles are the characteristic UUIDs.
#[derive(Clone)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

pub fn nuimo_services() -> Vec<DiscoveredService<Uuid>> {
    let service = |uuid: Uuid, characteristics: &[Uuid]| DiscoveredService {
        uuid,
        characteristics: characteristics.iter().map(|c| (*c, *c)).collect(),
    };

    vec![
        service(NUIMO_SERVICE, &[
            BUTTON_CHARACTERISTIC,
            ROTATION_CHARACTERISTIC,
            SWIPE_TOUCH_CHARACTERISTIC,
            FLY_CHARACTERISTIC,
            HEARTBEAT_CHARACTERISTIC,
            REBOOT_TO_DFU_CHARACTERISTIC,
            FLY_CALIBRATION_CHARACTERISTIC,
            LED_MATRIX_CHARACTERISTIC,
        ]),
        service(LED_MATRIX_SERVICE, &[LEGACY_LED_MATRIX_CHARACTERISTIC]),
        service(BATTERY_SERVICE, &[BATTERY_LEVEL_CHARACTERISTIC]),
        service(DEVICE_INFORMATION_SERVICE, &[
            FIRMWARE_REVISION_CHARACTERISTIC,
            HARDWARE_REVISION_CHARACTERISTIC,
            MODEL_NUMBER_CHARACTERISTIC,
        ]),
    ]
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport::with_services(nuimo_services())
    }

    pub fn with_services(services: Vec<DiscoveredService<Uuid>>) -> Self {
        let values = HashMap::from([
            (FIRMWARE_REVISION_CHARACTERISTIC, b"3.0.1".to_vec()),
            (HARDWARE_REVISION_CHARACTERISTIC, b"1.2".to_vec()),
            (MODEL_NUMBER_CHARACTERISTIC, b"black".to_vec()),
            (BATTERY_LEVEL_CHARACTERISTIC, vec![87]),
        ]);

        FakeTransport {
            state: Arc::new(Mutex::new(FakeState {
                services,
                ops: Vec::new(),
                connected: false,
                connect_delay: Duration::from_millis(10),
                subscribe_delay: Duration::ZERO,
                unsubscribe_delay: Duration::ZERO,
                drop_link_on_status_query: false,
                read_delays: HashMap::new(),
                values,
                fail_writes: false,
                notifications: None,
                disconnections: None,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn record(&self, op: Op) {
        self.lock().ops.push(op);
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn count(&self, predicate: impl Fn(&Op) -> bool) -> usize {
        self.lock().ops.iter().filter(|op| predicate(op)).count()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>, WriteKind)> {
        self.lock().ops
            .iter()
            .filter_map(|op| match op {
                Op::Write(uuid, data, kind) => Some((*uuid, data.clone(), *kind)),
                _ => None,
            })
            .collect()
    }

    pub fn set_subscribe_delay(&self, delay: Duration) {
        self.lock().subscribe_delay = delay;
    }

    pub fn set_unsubscribe_delay(&self, delay: Duration) {
        self.lock().unsubscribe_delay = delay;
    }

    /// The next status query reports the link lost but still answers "connected", the way a
    /// stack event can overtake a status read.
    pub fn drop_link_on_status_query(&self) {
        self.lock().drop_link_on_status_query = true;
    }

    pub fn set_read_delay(&self, uuid: Uuid, delay: Duration) {
        self.lock().read_delays.insert(uuid, delay);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn notify(&self, uuid: Uuid, value: &[u8]) {
        let sender = self.lock().notifications.clone().expect("Not listening for notifications");
        sender.unbounded_send(Notification { uuid, value: value.to_vec() }).unwrap();
    }

    /// Simulates the stack reporting link loss.
    pub fn drop_link(&self) {
        let sender = {
            let mut state = self.lock();
            state.connected = false;
            state.disconnections.clone().expect("Not listening for disconnections")
        };
        sender.unbounded_send(()).unwrap();
    }
}

#[async_trait]
impl Transport for FakeTransport {
    type Handle = Uuid;

    fn address(&self) -> String {
        ADDRESS.to_string()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        self.record(Op::Connect);
        let delay = self.lock().connect_delay;
        sleep(delay).await;
        self.lock().connected = true;
        Ok(())
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        self.record(Op::IsConnected);
        let drop_link = std::mem::replace(&mut self.lock().drop_link_on_status_query, false);
        if drop_link {
            let connected = self.lock().connected;
            self.drop_link();
            sleep(Duration::from_millis(5)).await;
            return Ok(connected);
        }
        Ok(self.lock().connected)
    }

    async fn discover_services(&self) -> Result<Vec<DiscoveredService<Uuid>>, DeviceError> {
        self.record(Op::Discover);
        Ok(self.lock().services.clone())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, Notification>, DeviceError> {
        let (sender, receiver): (_, UnboundedReceiver<Notification>) = unbounded();
        self.lock().notifications = Some(sender);
        Ok(receiver.boxed())
    }

    async fn disconnections(&self) -> Result<BoxStream<'static, ()>, DeviceError> {
        let (sender, receiver): (_, UnboundedReceiver<()>) = unbounded();
        self.lock().disconnections = Some(sender);
        Ok(receiver.boxed())
    }

    async fn subscribe(&self, handle: &Uuid) -> Result<(), DeviceError> {
        self.record(Op::Subscribe(*handle));
        let delay = self.lock().subscribe_delay;
        sleep(delay).await;
        Ok(())
    }

    async fn unsubscribe(&self, handle: &Uuid) -> Result<(), DeviceError> {
        self.record(Op::Unsubscribe(*handle));
        let delay = self.lock().unsubscribe_delay;
        sleep(delay).await;
        if !self.lock().connected {
            return Err(DeviceError::Btle { source: btleplug::Error::NotConnected });
        }
        Ok(())
    }

    async fn read(&self, handle: &Uuid) -> Result<Vec<u8>, DeviceError> {
        self.record(Op::Read(*handle));
        let delay = self.lock().read_delays.get(handle).copied().unwrap_or(Duration::ZERO);
        sleep(delay).await;
        Ok(self.lock().values.get(handle).cloned().unwrap_or_default())
    }

    async fn write(&self, handle: &Uuid, data: &[u8], kind: WriteKind) -> Result<(), DeviceError> {
        self.record(Op::Write(*handle, data.to_vec(), kind));
        if self.lock().fail_writes {
            return Err(DeviceError::Btle { source: btleplug::Error::NotConnected });
        }
        Ok(())
    }

    async fn release(&self) -> Result<(), DeviceError> {
        self.record(Op::Release);
        let mut state = self.lock();
        state.connected = false;
        state.notifications = None;
        state.disconnections = None;
        Ok(())
    }
}

pub fn session(transport: &FakeTransport) -> ConnectionSession<FakeTransport> {
    ConnectionSession::new(transport.clone(), SessionSettings::default())
}

/// Everything published so far.
pub fn drain(receiver: &mut UnboundedReceiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = receiver.try_next() {
        events.push(event);
    }
    events
}

/// Lets spawned tasks run; the clock is paused in these tests so this costs nothing.
pub async fn settle() {
    sleep(Duration::from_millis(20)).await;
}
