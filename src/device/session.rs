use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::codec::{self, FlyGestureTable, Telegram};
use crate::device::constants::{
    COMMAND_TRIGGER, DEFAULT_THROTTLE_PERIOD, IS_CONNECTED_DEADLINE, READ_DEADLINE, REQUIRED_SERVICES,
    SUBSCRIBE_DEADLINE, WRITE_DEADLINE,
};
use crate::device::events::EventBus;
use crate::device::matrix::{DisplayOption, DisplayOptions, LedMatrix};
use crate::device::registry::{Capabilities, Endpoint, EndpointRegistry};
use crate::device::throttle::RotationThrottle;
use crate::device::transport::{Notification, Transport, WriteKind};
use crate::device::types::{DeviceEvent, SessionState};
use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub matrix_brightness: f32,
    pub throttle_period: Duration,
    // None leaves the device default alone
    pub heartbeat_interval: Option<Duration>,
    pub fly_gesture_table: FlyGestureTable,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            matrix_brightness: 1.0,
            throttle_period: Duration::from_millis(DEFAULT_THROTTLE_PERIOD),
            heartbeat_interval: None,
            fly_gesture_table: FlyGestureTable::default(),
        }
    }
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        SessionSettings {
            matrix_brightness: codec::clamp_brightness(config.matrix_brightness),
            throttle_period: Duration::from_millis(config.throttle_period_ms),
            heartbeat_interval: config.heartbeat_interval_secs.map(Duration::from_secs),
            fly_gesture_table: config.fly_gesture_table,
        }
    }
}

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared<T: Transport> {
    transport: T,
    identifier: String,
    state: Mutex<SessionState>,
    // link loss reported while connecting, checked before becoming Connected
    link_lost: AtomicBool,
    // the only lock guarding endpoint lookups, (un)subscriptions and teardown
    registry: tokio::sync::Mutex<EndpointRegistry<T::Handle>>,
    capabilities: Mutex<Capabilities>,
    settings: Mutex<SessionSettings>,
    bus: EventBus,
    throttle: RotationThrottle,
    listener: Mutex<Option<Listener>>,
    cancel: CancellationToken,
}

impl<T: Transport> Shared<T> {
    fn state(&self) -> SessionState {
        *self.state.lock().expect("Failed to lock session state")
    }

    fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.lock().expect("Failed to lock session state");
        if *state == new_state {
            return;
        }

        info!("Session {} is {}", self.identifier, new_state);
        *state = new_state;
        self.bus.publish(DeviceEvent::StateChange(new_state));
    }

    /// Moves to `to` if the current state is one of `from`, as a single step.
    fn transition(&self, from: &[SessionState], to: SessionState, operation: &'static str) -> Result<(), DeviceError> {
        let mut state = self.state.lock().expect("Failed to lock session state");
        if !from.contains(&*state) {
            return Err(DeviceError::InvalidStateTransition { operation, state: *state });
        }

        info!("Session {} is {}", self.identifier, to);
        *state = to;
        self.bus.publish(DeviceEvent::StateChange(to));
        Ok(())
    }

    /// Connecting → Connected, unless the link was lost on the way.
    fn finish_connect(&self) -> Result<(), DeviceError> {
        let mut state = self.state.lock().expect("Failed to lock session state");
        if self.link_lost.swap(false, Ordering::SeqCst) {
            return Err(DeviceError::TransportDisconnected);
        }

        info!("Session {} is {}", self.identifier, SessionState::Connected);
        *state = SessionState::Connected;
        self.bus.publish(DeviceEvent::StateChange(SessionState::Connected));
        Ok(())
    }

    /// Returns true if the loss was recorded for a connect still in progress.
    fn record_link_loss_while_connecting(&self) -> bool {
        let state = self.state.lock().expect("Failed to lock session state");
        if *state != SessionState::Connecting {
            return false;
        }

        self.link_lost.store(true, Ordering::SeqCst);
        true
    }

    fn settings(&self) -> std::sync::MutexGuard<'_, SessionSettings> {
        self.settings.lock().expect("Failed to lock session settings")
    }

    fn handle_notification(&self, notification: Notification) {
        let endpoint = match Endpoint::from_uuid(&notification.uuid) {
            Some(endpoint) => endpoint,
            None => {
                debug!("Notification from unknown characteristic {:?}", notification.uuid);
                return;
            },
        };

        let fly_gesture_table = self.settings().fly_gesture_table;

        match codec::decode(endpoint, &notification.value, fly_gesture_table) {
            Ok(Telegram::Battery(level)) => self.bus.publish(DeviceEvent::BatteryChanged(level)),
            Ok(Telegram::Heartbeat(payload)) => self.bus.publish(DeviceEvent::Heartbeat(payload)),
            Ok(Telegram::Gesture(event)) => {
                self.bus.publish(DeviceEvent::Gesture(event));
                self.throttle.push(event);
            },
            // firmware may send codes we do not know about
            Err(err) => debug!("Dropping telegram: {}", err),
        }
    }
}

impl<T: Transport> Drop for Shared<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Races `fut` against a deadline (milliseconds). The future is dropped when the deadline
/// passes, so the operation can safely be retried.
async fn with_deadline<V, F>(operation: &'static str, deadline: u64, fut: F) -> Result<V, DeviceError>
where
    F: Future<Output = Result<V, DeviceError>>,
{
    let deadline = Duration::from_millis(deadline);

    tokio::select! {
        _ = sleep(deadline) => Err(DeviceError::Timeout { operation, deadline }),
        result = fut => result,
    }
}

/// A session with a single device.
///
/// All state transitions are serialized: a second `connect` while the first is still running
/// fails with [`DeviceError::InvalidStateTransition`] and leaves the session alone. Explicit
/// disconnects and link loss reported by the transport share one teardown, which runs at most
/// once per connection.
///
/// Must be created inside a tokio runtime.
pub struct ConnectionSession<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ConnectionSession<T> {
    fn clone(&self) -> Self {
        ConnectionSession { shared: self.shared.clone() }
    }
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        let cancel = CancellationToken::new();
        let bus = EventBus::new();
        let throttle = RotationThrottle::spawn(cancel.child_token(), settings.throttle_period, bus.clone());
        let identifier = transport.address().to_uppercase();

        let shared = Shared {
            transport,
            identifier,
            state: Mutex::new(SessionState::Disconnected),
            link_lost: AtomicBool::new(false),
            registry: tokio::sync::Mutex::new(EndpointRegistry::new()),
            capabilities: Mutex::new(Capabilities::default()),
            settings: Mutex::new(settings),
            bus,
            throttle,
            listener: Mutex::new(None),
            cancel,
        };

        ConnectionSession { shared: Arc::new(shared) }
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Receives every event emitted from now on.
    pub fn subscribe(&self) -> UnboundedReceiver<DeviceEvent> {
        self.shared.bus.subscribe()
    }

    pub fn attach(&self, sender: UnboundedSender<DeviceEvent>) {
        self.shared.bus.attach(sender);
    }

    pub fn matrix_brightness(&self) -> f32 {
        self.shared.settings().matrix_brightness
    }

    pub fn set_matrix_brightness(&self, brightness: f32) {
        self.shared.settings().matrix_brightness = codec::clamp_brightness(brightness);
    }

    pub fn throttle_period(&self) -> Duration {
        self.shared.settings().throttle_period
    }

    pub fn set_throttle_period(&self, period: Duration) {
        self.shared.settings().throttle_period = period;
        self.shared.throttle.set_period(period);
    }

    pub fn fly_gesture_table(&self) -> FlyGestureTable {
        self.shared.settings().fly_gesture_table
    }

    pub fn set_fly_gesture_table(&self, table: FlyGestureTable) {
        self.shared.settings().fly_gesture_table = table;
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.shared.settings().heartbeat_interval
    }

    /// Stores the interval and, when connected, writes it to the device (whole seconds,
    /// saturating at 255). While disconnected the interval is written on the next connect.
    pub async fn set_heartbeat_interval(&self, interval: Duration) -> Result<(), DeviceError> {
        self.shared.settings().heartbeat_interval = Some(interval);

        if self.state() != SessionState::Connected {
            debug!("Not connected; heartbeat interval will be written on connect");
            return Ok(());
        }

        self.write_heartbeat_interval(interval).await
    }

    async fn write_heartbeat_interval(&self, interval: Duration) -> Result<(), DeviceError> {
        let seconds = interval.as_secs().min(u8::MAX.into()) as u8;
        let handle = self.handle(Endpoint::Heartbeat).await?;

        self.write(Endpoint::Heartbeat, &handle, &[seconds], WriteKind::WithoutResponse).await
    }

    pub fn supports_reboot_to_dfu(&self) -> bool {
        self.capabilities().reboot_to_dfu
    }

    pub fn supports_fly_calibration(&self) -> bool {
        self.capabilities().fly_calibration
    }

    fn capabilities(&self) -> Capabilities {
        *self.shared.capabilities.lock().expect("Failed to lock capabilities")
    }

    async fn handle(&self, endpoint: Endpoint) -> Result<T::Handle, DeviceError> {
        let registry = self.shared.registry.lock().await;
        registry.get(endpoint).cloned().ok_or(DeviceError::MissingCharacteristic(endpoint))
    }

    async fn write(&self, endpoint: Endpoint, handle: &T::Handle, data: &[u8], kind: WriteKind) -> Result<(), DeviceError> {
        let transport = &self.shared.transport;

        with_deadline("write", WRITE_DEADLINE, transport.write(handle, data, kind))
            .await
            .map_err(|source| DeviceError::WriteFailed { endpoint, source: Box::new(source) })
    }

    pub async fn connect(&self) -> Result<(), DeviceError> {
        self.shared.transition(&[SessionState::Disconnected], SessionState::Connecting, "connect")?;
        self.shared.link_lost.store(false, Ordering::SeqCst);

        match self.establish().await.and_then(|()| self.shared.finish_connect()) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!("Connecting to {} failed: {}", self.identifier(), err);
                if let Err(teardown_err) = self.teardown(&[SessionState::Connecting]).await {
                    warn!("Cleaning up after failed connect: {}", teardown_err);
                }
                Err(err)
            },
        }
    }

    async fn establish(&self) -> Result<(), DeviceError> {
        let transport = &self.shared.transport;

        transport.connect().await?;
        let services = transport.discover_services().await?;

        {
            let mut registry = self.shared.registry.lock().await;
            registry.clear();

            for service_uuid in REQUIRED_SERVICES {
                let service = match services.iter().find(|service| service.uuid == service_uuid) {
                    Some(service) => service,
                    None => {
                        warn!("Service {:?} not found", service_uuid);
                        continue;
                    },
                };

                for (uuid, handle) in &service.characteristics {
                    if let Some(endpoint) = registry.register(uuid, handle.clone()) {
                        debug!("Registered {} characteristic {:?}", endpoint, uuid);
                    }
                }
            }

            let notifying = registry.notifying().map_err(DeviceError::MissingCharacteristic)?;

            // listen before subscribing so no notification is missed
            self.start_listener().await?;

            with_deadline("subscribe", SUBSCRIBE_DEADLINE, async {
                for (endpoint, handle) in &notifying {
                    debug!("Subscribing to {} characteristic", endpoint);
                    transport.subscribe(handle).await?;
                }
                Ok::<(), DeviceError>(())
            }).await?;

            *self.shared.capabilities.lock().expect("Failed to lock capabilities") = registry.capabilities();
        }

        self.read_device_information().await;

        let heartbeat_interval = self.heartbeat_interval();
        if let Some(interval) = heartbeat_interval {
            if let Err(err) = self.write_heartbeat_interval(interval).await {
                warn!("Failed to write heartbeat interval: {}", err);
            }
        }

        if !with_deadline("is_connected", IS_CONNECTED_DEADLINE, transport.is_connected()).await? {
            return Err(DeviceError::TransportDisconnected);
        }

        Ok(())
    }

    async fn read_device_information(&self) {
        let bus = &self.shared.bus;

        if let Some(value) = self.read_initial(Endpoint::FirmwareVersion).await {
            bus.publish(DeviceEvent::FirmwareVersionRead(codec::decode_ascii(&value)));
        }
        if let Some(value) = self.read_initial(Endpoint::HardwareVersion).await {
            bus.publish(DeviceEvent::HardwareVersionRead(codec::decode_ascii(&value)));
        }
        if let Some(value) = self.read_initial(Endpoint::ModelNumber).await {
            bus.publish(DeviceEvent::ColorRead(codec::decode_ascii(&value)));
        }
        if let Some(value) = self.read_initial(Endpoint::Battery).await {
            match value.first() {
                Some(level) => bus.publish(DeviceEvent::BatteryChanged(*level)),
                None => warn!("Empty battery level read"),
            }
        }
    }

    /// A failed or timed out read is logged and otherwise ignored.
    async fn read_initial(&self, endpoint: Endpoint) -> Option<Vec<u8>> {
        let handle = match self.handle(endpoint).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!("Skipping read: {}", err);
                return None;
            },
        };

        match with_deadline("read", READ_DEADLINE, self.shared.transport.read(&handle)).await {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("Reading the {} characteristic failed: {}", endpoint, err);
                None
            },
        }
    }

    async fn start_listener(&self) -> Result<(), DeviceError> {
        let notifications = self.shared.transport.notifications().await?;
        let disconnections = self.shared.transport.disconnections().await?;
        let cancel = self.shared.cancel.child_token();
        let handle = listen_task(cancel.clone(), Arc::downgrade(&self.shared), notifications, disconnections);

        let previous = self.shared.listener
            .lock()
            .expect("Failed to lock listener")
            .replace(Listener { cancel, handle });

        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        Ok(())
    }

    async fn stop_listener(&self) {
        let listener = self.shared.listener.lock().expect("Failed to lock listener").take();

        if let Some(listener) = listener {
            listener.cancel.cancel();
            debug!("Waiting for listen task to stop");
            if let Err(err) = listener.handle.await {
                warn!("Failed to join listen task: {:?}", err);
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), DeviceError> {
        self.teardown(&[SessionState::Connected]).await
    }

    async fn handle_link_loss(&self) {
        warn!("Connection to {} lost", self.identifier());

        if self.shared.record_link_loss_while_connecting() {
            debug!("Link lost while connecting; the connect will fail");
            return;
        }

        if let Err(err) = self.teardown(&[SessionState::Connected]).await {
            debug!("Ignoring link loss: {}", err);
        }
    }

    /// Best effort: individual failures are logged, the session always ends up disconnected.
    async fn teardown(&self, from: &[SessionState]) -> Result<(), DeviceError> {
        self.shared.transition(from, SessionState::Disconnecting, "disconnect")?;

        self.stop_listener().await;
        self.shared.throttle.flush();

        {
            let transport = &self.shared.transport;
            let mut registry = self.shared.registry.lock().await;
            let notifying = registry.present_notifying();

            let unsubscribed = with_deadline("unsubscribe", SUBSCRIBE_DEADLINE, async {
                for (endpoint, handle) in &notifying {
                    if let Err(err) = transport.unsubscribe(handle).await {
                        warn!("Failed to unsubscribe from {} characteristic: {}", endpoint, err);
                    }
                }
                Ok::<(), DeviceError>(())
            }).await;
            if let Err(err) = unsubscribed {
                warn!("{}", err);
            }

            if let Err(err) = with_deadline("release", SUBSCRIBE_DEADLINE, transport.release()).await {
                warn!("Failed to release device: {}", err);
            }

            registry.clear();
        }

        *self.shared.capabilities.lock().expect("Failed to lock capabilities") = Capabilities::default();
        self.shared.set_state(SessionState::Disconnected);
        Ok(())
    }

    /// Shows `matrix` for `display_interval` seconds (clamped to [0, 25.5]). Ignored unless
    /// connected. With [`DisplayOption::WithoutWriteResponse`] the write is not awaited and no
    /// [`DeviceEvent::MatrixDisplayed`] is emitted.
    pub async fn display_led_matrix(
        &self,
        matrix: &LedMatrix,
        display_interval: f64,
        options: DisplayOptions,
    ) -> Result<(), DeviceError> {
        if self.state() != SessionState::Connected {
            debug!("Not connected; ignoring LED matrix");
            return Ok(());
        }

        let brightness = self.matrix_brightness();
        let frame = codec::encode_led_frame(matrix, brightness, codec::clamp_display_interval(display_interval), options);
        let handle = self.handle(Endpoint::LedMatrix).await?;

        if options.contains(DisplayOption::WithoutWriteResponse) {
            let session = self.clone();
            spawn(async move {
                let result = session.shared.transport
                    .write(&handle, &frame, WriteKind::WithoutResponse)
                    .await;
                if let Err(err) = result {
                    warn!("Failed to write LED matrix: {}", err);
                }
            });
            return Ok(());
        }

        self.write(Endpoint::LedMatrix, &handle, &frame, WriteKind::WithResponse).await?;
        self.shared.bus.publish(DeviceEvent::MatrixDisplayed);
        Ok(())
    }

    pub async fn reboot_to_dfu(&self) -> Result<(), DeviceError> {
        self.trigger(Endpoint::RebootToDfu).await
    }

    pub async fn calibrate_fly_sensor(&self) -> Result<(), DeviceError> {
        self.trigger(Endpoint::FlyCalibration).await
    }

    async fn trigger(&self, endpoint: Endpoint) -> Result<(), DeviceError> {
        let handle = self.handle(endpoint).await?;
        info!("Triggering {} on {}", endpoint, self.identifier());
        self.write(endpoint, &handle, &COMMAND_TRIGGER, WriteKind::WithoutResponse).await
    }
}

fn listen_task<T: Transport>(
    cancel: CancellationToken,
    shared: Weak<Shared<T>>,
    mut notifications: BoxStream<'static, Notification>,
    mut disconnections: BoxStream<'static, ()>,
) -> JoinHandle<()> {
    spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(notification) = notifications.next() => {
                    match shared.upgrade() {
                        Some(shared) => shared.handle_notification(notification),
                        None => break 'mainloop,
                    }
                },
                Some(()) = disconnections.next() => {
                    let session = match shared.upgrade() {
                        Some(shared) => ConnectionSession { shared },
                        None => break 'mainloop,
                    };
                    // teardown joins this task, so it can not run on it
                    spawn(async move {
                        session.handle_link_loss().await;
                    });
                },
            }
        }
    })
}
