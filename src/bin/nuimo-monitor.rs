use std::path::PathBuf;
use std::time::Duration;
use clap::Parser;
use nuimo_driver::{run, MonitorOptions};
use nuimo_driver::error::{AppRunError, ConfigError};

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Connects to the first Nuimo found and logs its events.\n\nExample: nuimo-monitor --pattern \"*   *   *\" --fade", long_about = None)]
struct Args {
    /// Use this config file instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// LED pattern to show after connecting; every character except ' ' and '0' is a lit LED
    #[arg(long)]
    pattern: Option<String>,

    /// How long (seconds) to show the pattern, at most 25.5
    #[arg(long)]
    display_interval: Option<f64>,

    /// Fade the pattern in
    #[arg(long)]
    fade: bool,

    /// How long (seconds) to scan for devices
    #[arg(long)]
    scan_secs: Option<u64>,
}

fn main() -> Result<(), AppRunError> {
    let args = Args::parse();

    let options = MonitorOptions {
        config_path: args.config,
        pattern: args.pattern,
        display_interval: args.display_interval,
        fade: args.fade,
        scan_duration: args.scan_secs.map(Duration::from_secs),
    };

    match run(options) {
        Err(AppRunError::ConfigError { source: ConfigError::CanNotLock { .. } }) => {
            eprintln!("Another instance is already driving the device");
            Ok(())
        },
        Err(err) => {
            eprintln!("Unexpected error: {}", err);
            Err(err)
        },
        Ok(_) => Ok(()),
    }
}
