//! The SynthStyle background context as a native process: file-backed local
//! storage, the backend over HTTP and a framed stdio bridge to the browser.

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod error;
pub mod host;

pub use bridge::Bridge;
pub use config::Config;
pub use error::HostError;
pub use host::Host;
