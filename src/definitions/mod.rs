//! The data structures of ISO/IEC 18013-5, and the conversions between them
//! and their CBOR wire form.

pub mod cose_key;
pub mod device_request;
pub mod element;
pub mod engagement;
pub mod helpers;
pub mod issuer_signed;
pub mod session;
pub mod types;

pub use cose_key::CoseKey;
pub use device_request::{DataElement, DeviceRequest, DocRequest, ItemsRequest};
pub use element::Element;
pub use engagement::{DeviceEngagement, EngagementUri, ReaderEngagement};
pub use issuer_signed::{IssuerSigned, IssuerSignedItem};
pub use session::{SessionKey, SessionTranscript};
pub use types::{DigestId, DocType, ElementIdentifier, NameSpace};
