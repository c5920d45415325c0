//! ISO/IEC 18013-5 mdoc proximity presentation, holder side.
//!
//! This crate implements the QR-initiated flow in which a reader publishes
//! an `mdoc://` engagement and the wallet connects back over BLE:
//!
//! * [definitions] holds the CBOR data model: engagements, requests,
//!   issuer-signed documents, COSE keys, and session structures.
//! * [transport] frames messages for BLE GATT and encrypts them with the
//!   AES-GCM counter-IV scheme.
//! * [presentation] orchestrates a full session from scanned QR code to
//!   decrypted reader request.
//!
//! Platform BLE stacks plug in through [transport::BleCentral]; everything
//! above that trait is pure and testable in memory.

pub mod cbor;
pub mod definitions;
pub mod presentation;
pub mod transport;
