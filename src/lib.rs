use std::env;
use std::path::PathBuf;
use std::time::Duration;
use btleplug::platform::Manager;
use futures::channel::mpsc::unbounded;
use futures::StreamExt;
use log::{error, info, warn};

use crate::config::io::ConfigIO;
use crate::config::types::{Config, LogLevel};
use crate::device::constants::{DEFAULT_DISPLAY_INTERVAL, SCAN_DURATION};
use crate::device::matrix::{DisplayOption, DisplayOptions, LedMatrix};
use crate::device::scanner::scan;
use crate::device::session::{ConnectionSession, SessionSettings};
use crate::device::transport::BtleplugTransport;
use crate::device::types::{DeviceEvent, SessionState};
use crate::error::{AppRunError, ConfigError, DeviceError};

pub mod config;
pub mod device;
pub mod error;

pub fn init_logging(level: LogLevel) {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                humantime::format_rfc3339(std::time::SystemTime::now()),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level.into())
        .chain(std::io::stderr());

    if let Ok(log_file) = env::var("LOG_FILE") {
        dispatch = dispatch.chain(
            fern::log_file(log_file).expect("Failed to open LOG_FILE")
        );
    }

    dispatch.apply().expect("Failed to initialize logger");
}

/// What the monitor should do once connected.
#[derive(Debug, Clone, Default)]
pub struct MonitorOptions {
    pub config_path: Option<PathBuf>,
    pub pattern: Option<String>,
    pub display_interval: Option<f64>,
    pub fade: bool,
    pub scan_duration: Option<Duration>,
}

pub fn run(options: MonitorOptions) -> Result<(), AppRunError> {
    let config_io = match &options.config_path {
        Some(path) => ConfigIO::open_sync(path)?,
        None => ConfigIO::new_sync()?,
    };
    let mut locker = config_io.locker()?;
    let _guard = locker.lock()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let config = load_config(&config_io).await?;
        init_logging(config.log_level);
        info!(concat!("Nuimo monitor ", env!("CARGO_PKG_VERSION")));

        monitor(options, config).await
    })
}

async fn load_config(config_io: &ConfigIO) -> Result<Config, ConfigError> {
    match config_io.read().await {
        Ok(config) => Ok(config),
        Err(err) if err.is_file_not_found_error() => Ok(Config::default()),
        Err(err) => Err(err),
    }
}

fn log_event(identifier: &str, event: &DeviceEvent) {
    match event {
        DeviceEvent::StateChange(state) => info!("{}: {}", identifier, state),
        DeviceEvent::FirmwareVersionRead(version) => info!("{}: firmware {}", identifier, version),
        DeviceEvent::HardwareVersionRead(version) => info!("{}: hardware {}", identifier, version),
        DeviceEvent::ColorRead(color) => info!("{}: color {}", identifier, color),
        DeviceEvent::MatrixDisplayed => info!("{}: matrix displayed", identifier),
        DeviceEvent::BatteryChanged(level) => info!("{}: battery {}%", identifier, level),
        DeviceEvent::Heartbeat(payload) => info!("{}: heartbeat {:02x?}", identifier, payload),
        DeviceEvent::Gesture(event) => info!("{}: {:?} {}", identifier, event.gesture, event.value),
        DeviceEvent::ThrottledGesture(event) => info!("{}: throttled {:?} {}", identifier, event.gesture, event.value),
    }
}

async fn monitor(options: MonitorOptions, config: Config) -> Result<(), AppRunError> {
    let manager = Manager::new().await.map_err(DeviceError::from)?;
    let scan_duration = options.scan_duration.unwrap_or(Duration::from_millis(SCAN_DURATION));

    let transport: BtleplugTransport = scan(&manager, &config.device_name, scan_duration)
        .await?
        .into_iter()
        .next()
        .ok_or(AppRunError::NoDevice)?;

    let session = ConnectionSession::new(transport, SessionSettings::from(&config));
    let (sender, mut events) = unbounded();
    session.attach(sender);
    session.connect().await?;

    info!(
        "Connected to {} (reboot to DFU: {}, fly calibration: {})",
        session.identifier(),
        session.supports_reboot_to_dfu(),
        session.supports_fly_calibration(),
    );

    if let Some(pattern) = &options.pattern {
        let mut display_options = DisplayOptions::empty();
        if options.fade {
            display_options |= DisplayOption::WithFadeTransition;
        }
        let display_interval = options.display_interval.unwrap_or(DEFAULT_DISPLAY_INTERVAL);

        if let Err(err) = session.display_led_matrix(&LedMatrix::from_pattern(pattern), display_interval, display_options).await {
            error!("Failed to display LED matrix: {}", err);
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    'mainloop: loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break 'mainloop;
            },
            event = events.next() => match event {
                Some(event) => {
                    log_event(session.identifier(), &event);
                    if event == DeviceEvent::StateChange(SessionState::Disconnected) {
                        break 'mainloop;
                    }
                },
                None => break 'mainloop,
            },
        }
    }

    if session.state() == SessionState::Connected {
        if let Err(err) = session.disconnect().await {
            warn!("Disconnect failed: {}", err);
        }
    }

    Ok(())
}
