//! The reading session: one open volume, its position, and the inputs that
//! move it.
//!
//! A [`ReadingSession`] is driven from a single control flow. Decoding runs
//! on tokio's blocking pool and bookmark writes are handed to the store's
//! writer task, so navigation never waits on I/O.

pub mod error;
mod input;
mod session;

pub use crate::input::{InputMapping, Key, MouseButton, NavAction, RawInput};
pub use crate::session::{
    DEFAULT_AUTO_ADVANCE, MAX_AUTO_ADVANCE, MIN_AUTO_ADVANCE, Position, ReadingSession, SessionSettings, SessionState,
    ViewState, check_interval,
};
