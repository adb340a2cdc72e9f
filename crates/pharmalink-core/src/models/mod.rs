//! Domain models for SOS dispatch.

mod notification;
mod pharmacy;
mod sos;

pub use notification::*;
pub use pharmacy::*;
pub use sos::*;
