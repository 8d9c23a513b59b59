//! Protocol module for building command frames and decoding status frames.
//!
//! This module contains the implementations for:
//! - Command frame encoding and checksum verification
//! - Status notification decoding
//!
//! Nothing in here performs I/O.

pub mod frame;
pub mod status;

pub use frame::{CommandFrame, Opcode, SequenceTag};
pub use status::{HeaderVariant, RunningMode, RunningStep, StatusSnapshot};
