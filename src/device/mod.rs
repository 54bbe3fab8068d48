pub mod codec;
pub mod constants;
pub mod events;
pub mod matrix;
pub mod registry;
pub mod scanner;
pub mod session;
pub mod throttle;
pub mod transport;
pub mod types;
