//! Length-prefixed binary RPC framing.
//!
//! This crate provides the transport plumbing both subsystems assume:
//! - A frame codec (4-byte big-endian length + bincode body)
//! - A generic client [`Connection`] pairing one request frame with one
//!   response frame
//! - A generic [`serve`] loop that dispatches each accepted connection
//!   onto its own task and drives a [`Service`] implementation

pub mod client;
pub mod codec;
pub mod server;

pub use client::Connection;
pub use codec::{read_frame, write_frame, MAX_FRAME_LEN};
pub use server::{serve, Service};
