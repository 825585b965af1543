mod client;
mod error;
mod transport;
mod types;

pub use client::{SubscriptionHandle, WaapiClient, WaapiConfig};
pub use error::WaapiError;
pub use types::{WaapiResponse, WireError};
