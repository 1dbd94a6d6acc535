#![deny(clippy::await_holding_refcell_ref)]

#[macro_use]
pub mod common;

pub mod auth;
pub mod master;
pub mod resources;
pub mod transfer;

#[cfg(test)]
pub(crate) mod tests;

pub use crate::common::ids::{AgentId, FrameworkId, OfferId, TaskId};
pub use crate::common::wrapped::WrappedRcRefCell;
pub use crate::common::{Map, Set};

pub type Error = crate::common::error::CorralError;
pub type Result<T> = std::result::Result<T, Error>;

pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;
