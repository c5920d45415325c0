//! Transport concerns: BLE framing and session-layer encryption.

pub mod ble;
pub mod encryption;

pub use ble::{BleCentral, MessageAssembler};
pub use encryption::SessionCipher;
