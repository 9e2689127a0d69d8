//! dmlink-core: wire format, function codes, camera geometry and configuration.
//! Every other dmlink crate depends on this one. Nothing here touches a socket.

pub mod config;
pub mod function;
pub mod geometry;
pub mod wire;

pub use function::{code_for, FunctionCode};
pub use geometry::{CameraGeometry, ProcessingMode};
pub use wire::{Message, MessageShape, WireLayout};
