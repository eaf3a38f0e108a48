//! Bridges a BLE central API to a helper process that owns the real radio.
//!
//! Every operation on the proxies in [`shim`] is turned into a [`shim::codec::Message`]
//! and sent over a [`shim::transport::Transport`]. Events coming back from the helper
//! are the only thing that ever changes proxy state.

pub mod api;
pub mod error;
pub mod shim;
pub mod uuid;

pub use error::{Error, Result};
