#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod lock;
mod paths;
pub mod renderer;
pub mod session;
pub mod store;
pub mod telemetry;

#[doc(hidden)]
pub mod test_harness;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub use lock::AdvisoryLocks;
pub use session::SessionContext;
