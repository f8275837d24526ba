//! Engine configuration and per application profiles.

#[cfg(feature = "serde")]
use serde::Deserialize;

use crate::{aid, Result};

pub type ItsAid = u64;

macro_rules! flags {
    ($name:ident: $($flag:ident = $value:expr),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        #[cfg_attr(feature = "serde", derive(Deserialize), serde(transparent))]
        pub struct $name(pub u32);

        impl $name {
            $(pub const $flag: Self = Self($value);)*

            #[must_use]
            pub fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl core::ops::BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

flags!(EngineFlags:
    P2P_REQ_AT = 0x01,
    REQ_AA = 0x02,
    SEND_AT = 0x04,
    SEND_AA = 0x08,
    SEND_OWN_AA = 0x10,
    SEND_AA_WITH_DIGEST = 0x20,
    CANCEL_AA_REQUEST = 0x40,
    ALLOW_CERT_DUPLICATIONS = 0x80,
);

flags!(FieldFlags:
    GEN_TIME = 0x01,
    GEN_LOCATION = 0x02,
    P2P_CERT_REQUEST = 0x04,
    P2P_CERT = 0x08,
    P2P_CRL_REQUEST = 0x10,
    P2P_CTL_REQUEST = 0x20,
);

impl FieldFlags {
    pub const CAM_DEFAULT: Self = Self(0x3D);
    pub const DEFAULT: Self = Self(0x03);
}

/// Content type of a secured message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum PayloadType {
    /// take the type from the application profile
    #[default]
    Auto = 0,
    Unsecured = 1,
    Signed = 2,
    Encrypted = 4,
    External = 8,
    /// signature over the hash of a payload transmitted elsewhere
    SignedExternal = 10,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct AppProfile {
    pub aid: ItsAid,
    /// SSP requested when selecting the signing certificate
    pub ssp: Vec<u8>,
    /// bits set here are value bits that must match, other SSP bits are permission flags
    pub ssp_mask: Vec<u8>,
    pub payload_type: PayloadType,
    pub fields: FieldFlags,
    /// -1: never send the certificate, 0: always, N: at most every N milliseconds
    pub cert_period_ms: i64,
    /// 0 disables the automatic pseudonym change
    pub cert_change_period_s: u32,
}

impl Default for AppProfile {
    fn default() -> Self {
        Self {
            aid: aid::ANY,
            ssp: vec![],
            ssp_mask: vec![],
            payload_type: PayloadType::Signed,
            fields: FieldFlags::DEFAULT,
            cert_period_ms: 0,
            cert_change_period_s: 0,
        }
    }
}

impl AppProfile {
    fn signed(aid: ItsAid) -> Self {
        Self {
            aid,
            ..Default::default()
        }
    }
}

/// names of the crypto engines used for each operation
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct CryptoConfig {
    pub hash: String,
    pub sign: String,
    pub verify: String,
    pub encrypt: String,
    pub decrypt: String,
    pub random: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        let openssl = String::from("openssl");
        Self {
            hash: openssl.clone(),
            sign: openssl.clone(),
            verify: openssl.clone(),
            encrypt: openssl.clone(),
            decrypt: openssl.clone(),
            random: openssl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct PoolSizes {
    pub ca: usize,
    pub at: usize,
    pub others: usize,
}

impl Default for PoolSizes {
    fn default() -> Self {
        Self {
            ca: 256,
            at: 2048,
            others: 512,
        }
    }
}

/// Engine wide options, durations are given in seconds
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default))]
pub struct Config {
    pub version: u8,
    pub flags: EngineFlags,
    pub app_profiles: Vec<AppProfile>,
    pub crypto: CryptoConfig,
    /// unused certificates received from peers are dropped after this time
    pub max_received_lifetime: u32,
    pub pool_max_size: PoolSizes,
    /// 0 disables purging
    pub purge_period: u32,
    pub crl_check_period: u32,
    pub ctl_check_period: u32,
    /// identical trust information requests are suppressed within this time
    pub request_storage_duration: u32,
    /// pre-shared keys are dropped after this time without use, 0 disables PSK
    pub psk_storage_duration: u32,
    pub ctl_series_id: [u8; 8],
    pub ctl_quorum: u32,
    /// emit `StoreData` events for received trust information
    pub store_trust_information: bool,
    /// tolerated clock skew for the generation time of received messages
    pub future_tolerance: u32,
    pub max_chain_depth: usize,
    /// keep suppressed AA certificate answers across pseudonym changes
    pub keep_cancelled_aa_requests: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 3,
            flags: EngineFlags(0x6F),
            app_profiles: vec![
                AppProfile {
                    aid: aid::CAM,
                    fields: FieldFlags::CAM_DEFAULT,
                    cert_period_ms: 990,
                    cert_change_period_s: 300,
                    ..Default::default()
                },
                AppProfile::signed(aid::DENM),
                AppProfile::signed(aid::TLC),
                AppProfile::signed(aid::SPATEM),
                AppProfile::signed(aid::MAPEM),
                AppProfile::signed(aid::IVIM),
                AppProfile::signed(aid::ANY),
            ],
            crypto: CryptoConfig::default(),
            max_received_lifetime: 2,
            pool_max_size: PoolSizes::default(),
            purge_period: 2,
            crl_check_period: 24 * 3600,
            ctl_check_period: 24 * 3600,
            request_storage_duration: 3600,
            psk_storage_duration: 3600,
            ctl_series_id: [0; 8],
            ctl_quorum: 2,
            store_trust_information: false,
            future_tolerance: 10,
            max_chain_depth: 8,
            keep_cancelled_aa_requests: false,
        }
    }
}

impl Config {
    /// Profile of the given application, falls back to the `ANY` profile
    #[must_use]
    pub fn find_profile(&self, aid: ItsAid) -> Option<&AppProfile> {
        self.app_profiles
            .iter()
            .find(|p| p.aid == aid)
            .or_else(|| self.app_profiles.iter().find(|p| p.aid == aid::ANY))
    }

    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| crate::Error::Decode(format!("Invalid configuration: {e}")))
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.version != 3 {
            return Err(crate::Error::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provides_defaults() {
        let config = Config::default();
        assert!(config.flags.contains(EngineFlags::CANCEL_AA_REQUEST));
        assert!(!config.flags.contains(EngineFlags::SEND_OWN_AA));
        let cam = config.find_profile(aid::CAM).unwrap();
        assert_eq!(990, cam.cert_period_ms);
        assert!(cam.fields.contains(FieldFlags::P2P_CERT_REQUEST | FieldFlags::GEN_TIME));
        assert!(!cam.fields.contains(FieldFlags::GEN_LOCATION));
        assert_eq!(aid::ANY, config.find_profile(1234).unwrap().aid);
        assert_eq!(256, config.pool_max_size.ca);
    }

    #[cfg(feature = "json")]
    #[test]
    fn loads_partial_json() {
        let config = Config::from_json(
            r#"{
                "flags": 7,
                "purge_period": 0,
                "app_profiles": [{ "aid": 36, "payload_type": "unsecured", "cert_period_ms": -1 }]
            }"#,
        )
        .unwrap();
        assert_eq!(EngineFlags(7), config.flags);
        assert_eq!(0, config.purge_period);
        assert_eq!(24 * 3600, config.crl_check_period);
        let cam = config.find_profile(aid::CAM).unwrap();
        assert_eq!(PayloadType::Unsecured, cam.payload_type);
        assert_eq!(-1, cam.cert_period_ms);
        assert_eq!(FieldFlags::DEFAULT, cam.fields);
        assert!(config.find_profile(aid::DENM).is_none());
        assert!(Config::from_json("{ \"version\": \"x\" }").is_err());
    }
}
