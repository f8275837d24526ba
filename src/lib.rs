#![doc = include_str!("../README.md")]
#![cfg(not(doctest))]

mod decode;
mod encode;
mod envelope;
pub(crate) mod util;

pub mod cert;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod geo;
pub mod message;
pub mod pki;
pub mod store;
pub mod time;
pub mod trust;
pub mod types;

pub use decode::{Decode, DecodeError, Decoded};
pub use encode::{Encode, EncodeError, Encoder};
pub use types::*;

pub use cert::{AidSsp, CertState, CertificateBuilder, Digest};
pub use config::{AppProfile, Config, EngineFlags, FieldFlags, ItsAid, PayloadType};
pub use crypto::{CryptoEngine, CryptoRegistry, Curve};
pub use engine::{DataType, Engine, Event, EventHandler};
pub use error::{error_message, Error, ErrorKind, Result};
pub use geo::{Location, Region, RegionCheck};
pub use message::{EncryptionInfo, MessageInfo, Recipient, SignInfo, SignerType};
pub use pki::{PkiRequest, RequestKind, RequestParams, StationIdentity};

/// ITS application identifiers (PSID) used by the engine
pub mod aid {
    use crate::config::ItsAid;

    pub const CAM: ItsAid = 36;
    pub const DENM: ItsAid = 37;
    pub const SPATEM: ItsAid = 137;
    pub const MAPEM: ItsAid = 138;
    pub const IVIM: ItsAid = 139;
    pub const TLC: ItsAid = 140;
    pub const GN_MGMT: ItsAid = 141;
    /// Certificate revocation list
    pub const CRL: ItsAid = 622;
    /// Secure certificate request service
    pub const CRT_REQ: ItsAid = 623;
    /// Certificate trust list
    pub const CTL: ItsAid = 624;
    /// Matches any application
    pub const ANY: ItsAid = u64::MAX;
}
