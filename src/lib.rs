//! Client for the Bosch Indego lawn mower cloud API.
//!
//! [`IndegoClient`] is blocking (`ureq`), [`IndegoAsyncClient`] runs on tokio
//! (`reqwest`). Both share the request engine, session handling and the merged
//! [`MowerData`] model.

pub mod models {
    pub mod indego;
    pub mod lookup;
}

pub mod async_client;
pub mod client;
pub mod command;
pub mod config;
pub mod engine;
pub mod env_file;
pub mod error;
pub mod session;
pub mod state;
pub mod transport;
pub mod utils;
pub mod services {
    pub mod watch;
}

pub use async_client::IndegoAsyncClient;
pub use client::IndegoClient;
pub use command::MowerCommand;
pub use config::ClientConfig;
pub use engine::{Payload, RetryPolicy};
pub use error::{IndegoError, Result, UsageError};
pub use session::{Credentials, Session};
pub use state::{MowerData, Resource};
