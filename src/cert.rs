//! Owned certificates.
//!
//! A [`Certificate`] keeps its exact encoding next to the fields the trust
//! engine works with. Issuers are referenced by [`Digest`] and resolved
//! through the certificate store.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        OnceLock,
    },
};

use bytes::Bytes;
use tracing::trace;

use crate::{
    aid,
    crypto::{signing_hash, CryptoEngine, Curve, EcSignature, PrivateKey, PublicKey},
    geo::{Location, Region, RegionCheck},
    time,
    types::{
        self, BasePublicEncryptionKey, BitmapSsp, BitmapSspRange, CertificateBase,
        CertificateId, CertificateType, Duration, EndEntityType, GeographicRegion, HashAlgorithm,
        HashedId3, HashedId8, Hostname, IssuerIdentifier, Psid, PsidGroupPermissions, PsidSsp,
        PsidSspRange, PublicEncryptionKey, SequenceOfOctetString, SequenceOfPsidGroupPermissions,
        SequenceOfPsidSsp, SequenceOfPsidSspRange, ServiceSpecificPermissions, SubjectAssurance,
        SubjectPermissions, SymmAlgorithm, ToBeSignedCertificate, Uint16, Uint32, Uint8,
        ValidityPeriod, VerificationKeyIndicator,
    },
    util, Decode, Encode, Error, Result,
};

pub const MAX_PERMISSIONS: usize = 16;

/// HashedId8 of a certificate or a pre-shared key
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Digest(pub [u8; 8]);

impl Digest {
    /// low-order 8 bytes of a hash value
    #[must_use]
    pub fn from_hash(hash: &[u8]) -> Self {
        Self(util::low_order_bytes::<8>(hash))
    }

    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// HashedId3 of the same certificate
    #[must_use]
    pub fn hashed_id3(&self) -> [u8; 3] {
        [self.0[5], self.0[6], self.0[7]]
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 8]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&util::to_hex(&self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Certificate state bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CertState(pub u32);

impl CertState {
    pub const LOADED: Self = Self(1);
    pub const INVALID: Self = Self(2);
    pub const TRUSTED: Self = Self(4);
    /// local identity with private keys
    pub const LOCAL: Self = Self(8);
    pub const REVOKED: Self = Self(16);

    #[must_use]
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CertState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Application permission of a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AidSsp {
    pub aid: u64,
    pub ssp: Option<Vec<u8>>,
}

impl AidSsp {
    #[must_use]
    pub fn new(aid: u64, ssp: &[u8]) -> Self {
        Self {
            aid,
            ssp: (!ssp.is_empty()).then(|| ssp.to_vec()),
        }
    }
}

/// SSPs a CA may grant in issued certificates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SspRange {
    All,
    Opaque(Vec<Vec<u8>>),
    /// bits set in `mask` must equal `value`
    Bitmap { value: Vec<u8>, mask: Vec<u8> },
}

impl SspRange {
    fn permits(&self, ssp: Option<&[u8]>) -> bool {
        let Some(ssp) = ssp else {
            return true;
        };
        match self {
            SspRange::All => true,
            SspRange::Opaque(list) => list.iter().any(|o| o == ssp),
            SspRange::Bitmap { value, mask } => {
                ssp.len() == value.len()
                    && ssp
                        .iter()
                        .zip(value)
                        .zip(mask)
                        .all(|((s, v), m)| (s ^ v) & m == 0)
            }
        }
    }

    fn covers(&self, other: &SspRange) -> bool {
        matches!(self, SspRange::All) || self == other
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsidRange {
    pub aid: u64,
    pub range: SspRange,
}

/// One group of `certIssuePermissions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePermission {
    /// `None` for all applications
    pub subjects: Option<Vec<PsidRange>>,
    pub min_chain_length: u64,
    pub chain_length_range: u64,
    pub ee_type: u8,
}

impl IssuePermission {
    fn permits(&self, permission: &AidSsp) -> bool {
        match &self.subjects {
            None => true,
            Some(subjects) => subjects
                .iter()
                .any(|s| s.aid == permission.aid && s.range.permits(permission.ssp.as_deref())),
        }
    }

    fn covers(&self, other: &IssuePermission) -> bool {
        match (&self.subjects, &other.subjects) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => theirs
                .iter()
                .all(|t| mine.iter().any(|m| m.aid == t.aid && m.range.covers(&t.range))),
        }
    }
}

impl From<&PsidGroupPermissions<'_>> for IssuePermission {
    fn from(value: &PsidGroupPermissions) -> Self {
        let subjects = match &value.subject_permissions {
            SubjectPermissions::All(()) => None,
            SubjectPermissions::Explicit(ranges) => Some(
                ranges
                    .0
                    .iter()
                    .map(|r| PsidRange {
                        aid: r.psid.0,
                        range: match &r.ssp_range {
                            None | Some(types::SspRange::All(())) => SspRange::All,
                            Some(types::SspRange::Opaque(list)) => {
                                SspRange::Opaque(list.0.iter().map(|o| o.to_vec()).collect())
                            }
                            Some(types::SspRange::BitmapSspRange(b)) => SspRange::Bitmap {
                                value: b.ssp_value.to_vec(),
                                mask: b.ssp_bitmask.to_vec(),
                            },
                        },
                    })
                    .collect(),
            ),
        };
        Self {
            subjects,
            min_chain_length: value.min_chain_length,
            chain_length_range: value.chain_length_range,
            ee_type: value.ee_type.0,
        }
    }
}

/// `true` if a certificate SSP grants the requested SSP
///
/// Byte 0 is the SSP version and must be equal. Bits set in `mask` are value
/// bits that must match exactly, the other bits are permission flags the
/// certificate has to grant.
#[must_use]
pub fn ssp_covers(certificate: Option<&[u8]>, request: &[u8], mask: &[u8]) -> bool {
    if request.is_empty() {
        return true;
    }
    let Some(certificate) = certificate else {
        return false;
    };
    if certificate.first() != request.first() {
        return false;
    }
    request.iter().enumerate().skip(1).all(|(i, r)| {
        let c = certificate.get(i).copied().unwrap_or(0);
        let m = mask.get(i).copied().unwrap_or(0);
        (r ^ c) & m == 0 && r & !m & !c == 0
    })
}

/// Explicit IEEE 1609.2 certificate
pub struct Certificate {
    data: Bytes,
    tbs: Bytes,
    digest: Digest,
    issuer: Option<Digest>,
    /// algorithm named by the issuer identifier
    hash_algorithm: HashAlgorithm,
    name: String,
    start: u32,
    end: u32,
    region: Region,
    inherited_region: OnceLock<Region>,
    assurance: Option<u8>,
    crl_series: u16,
    craca_id: [u8; 3],
    app_permissions: Vec<AidSsp>,
    issue_permissions: Vec<IssuePermission>,
    verification_key: PublicKey,
    encryption_key: Option<PublicKey>,
    signature: EcSignature,
    verification_private: Option<PrivateKey>,
    encryption_private: Option<PrivateKey>,
    state: AtomicU32,
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("digest", &self.digest)
            .field("name", &self.name)
            .field("issuer", &self.issuer)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn hash_algorithm_of(issuer: &IssuerIdentifier) -> HashAlgorithm {
    match issuer {
        IssuerIdentifier::RsSelf(algorithm) => *algorithm,
        IssuerIdentifier::Sha256AndDigest(_) => HashAlgorithm::Sha256,
        IssuerIdentifier::Sha384AndDigest(_) => HashAlgorithm::Sha384,
    }
}

impl Certificate {
    /// Decodes a certificate without validating it
    ///
    /// Bytes following the certificate are ignored.
    pub fn from_bytes(engine: &dyn CryptoEngine, data: impl Into<Bytes>) -> Result<Self> {
        let bytes: Bytes = data.into();
        let decoded = types::Certificate::decode(bytes.as_ref())?;
        let certificate = decoded.decoded;
        let data = bytes.slice(..decoded.bytes_consumed);

        if certificate.version.0 != 3 {
            return Err(Error::UnsupportedVersion(certificate.version.0));
        }
        let tbs = &certificate.to_be_signed;
        let (CertificateType::Explicit, VerificationKeyIndicator::VerificationKey(key)) =
            (certificate.r_type, &tbs.verify_key_indicator)
        else {
            return Err(Error::UnsupportedAlgorithm(
                "Implicit certificates are not supported!".into(),
            ));
        };
        let signature = certificate
            .signature
            .as_ref()
            .ok_or_else(|| Error::InvalidCertificateFormat("Signature is missing!".into()))?;

        let hash_algorithm = hash_algorithm_of(&certificate.issuer);
        let digest = Digest::from_hash(&engine.hash(hash_algorithm, certificate.raw));
        let issuer = match &certificate.issuer {
            IssuerIdentifier::RsSelf(_) => None,
            IssuerIdentifier::Sha256AndDigest(id) | IssuerIdentifier::Sha384AndDigest(id) => Some(
                Digest::from_slice(id.0).ok_or_else(|| {
                    Error::InvalidCertificateFormat("Issuer digest must have 8 bytes!".into())
                })?,
            ),
        };

        let app_permissions: Vec<AidSsp> = tbs
            .app_permissions
            .as_ref()
            .map(|p| {
                p.0.iter()
                    .map(|p| AidSsp {
                        aid: p.psid.0,
                        ssp: p.ssp.as_ref().map(|ssp| match ssp {
                            ServiceSpecificPermissions::Opaque(o) => o.to_vec(),
                            ServiceSpecificPermissions::BitmapSsp(b) => b.0.to_vec(),
                        }),
                    })
                    .collect()
            })
            .unwrap_or_default();
        if app_permissions.len() > MAX_PERMISSIONS {
            return Err(Error::TooManyPermissions(app_permissions.len()));
        }

        let encryption_key = tbs
            .encryption_key
            .as_ref()
            .map(|k| match &k.public_key {
                BasePublicEncryptionKey::EciesNistP256(p) => {
                    PublicKey::from_p256_point(engine, Curve::NistP256, p)
                }
                BasePublicEncryptionKey::EciesBrainpoolP256r1(p) => {
                    PublicKey::from_p256_point(engine, Curve::BrainpoolP256r1, p)
                }
            })
            .transpose()?;

        let name = match &tbs.id {
            CertificateId::Name(Hostname(name)) => name.clone(),
            _ => digest.to_string(),
        };
        let start = tbs.validity_period.start.0;

        let certificate = Self {
            tbs: data.slice_ref(tbs.raw),
            digest,
            issuer,
            hash_algorithm,
            name,
            start,
            end: time::add_duration(start, &tbs.validity_period.duration),
            region: tbs.region.as_ref().map(Region::from).unwrap_or_default(),
            inherited_region: OnceLock::new(),
            assurance: tbs.assurance_level.as_ref().and_then(|a| a.0.first().copied()),
            crl_series: tbs.crl_series.0,
            craca_id: util::low_order_bytes::<3>(tbs.craca_id.0),
            app_permissions,
            issue_permissions: tbs
                .cert_issue_permissions
                .as_ref()
                .map(|p| p.0.iter().map(IssuePermission::from).collect())
                .unwrap_or_default(),
            verification_key: PublicKey::from_verification_key(engine, key)?,
            encryption_key,
            signature: EcSignature::from_wire(signature)?,
            verification_private: None,
            encryption_private: None,
            state: AtomicU32::new(CertState::LOADED.0),
            data,
        };
        trace!(digest = %certificate.digest, name = %certificate.name, "loaded certificate");
        Ok(certificate)
    }

    /// Attaches the private keys of a local identity
    ///
    /// The keys must match the public keys of the certificate.
    pub fn with_private_keys(
        mut self,
        engine: &dyn CryptoEngine,
        verification: Option<&[u8]>,
        encryption: Option<&[u8]>,
    ) -> Result<Self> {
        if let Some(d) = verification {
            let pair = engine.import_private_key(self.verification_key.curve, d)?;
            if pair.public != self.verification_key {
                return Err(Error::KeySizeMismatch);
            }
            self.verification_private = Some(pair.private);
        }
        if let Some(d) = encryption {
            let public = self.encryption_key.as_ref().ok_or(Error::UnknownRecipient)?;
            let pair = engine.import_private_key(public.curve, d)?;
            if &pair.public != public {
                return Err(Error::KeySizeMismatch);
            }
            self.encryption_private = Some(pair.private);
        }
        if self.verification_private.is_some() {
            self.state.fetch_or(CertState::LOCAL.0, Ordering::SeqCst);
        }
        Ok(self)
    }

    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// encoding of `toBeSigned`
    #[must_use]
    pub fn tbs(&self) -> &[u8] {
        &self.tbs
    }

    #[must_use]
    pub fn digest(&self) -> Digest {
        self.digest
    }

    #[must_use]
    pub fn hashed_id3(&self) -> [u8; 3] {
        self.digest.hashed_id3()
    }

    #[must_use]
    pub fn issuer(&self) -> Option<Digest> {
        self.issuer
    }

    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.issuer.is_none()
    }

    #[must_use]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }

    #[must_use]
    pub fn assurance(&self) -> Option<u8> {
        self.assurance
    }

    #[must_use]
    pub fn crl_series(&self) -> u16 {
        self.crl_series
    }

    #[must_use]
    pub fn craca_id(&self) -> [u8; 3] {
        self.craca_id
    }

    #[must_use]
    pub fn app_permissions(&self) -> &[AidSsp] {
        &self.app_permissions
    }

    #[must_use]
    pub fn issue_permissions(&self) -> &[IssuePermission] {
        &self.issue_permissions
    }

    #[must_use]
    pub fn permission(&self, aid: u64) -> Option<&AidSsp> {
        self.app_permissions.iter().find(|p| p.aid == aid)
    }

    #[must_use]
    pub fn verification_key(&self) -> &PublicKey {
        &self.verification_key
    }

    #[must_use]
    pub fn encryption_key(&self) -> Option<&PublicKey> {
        self.encryption_key.as_ref()
    }

    #[must_use]
    pub fn verification_private_key(&self) -> Option<&PrivateKey> {
        self.verification_private.as_ref()
    }

    #[must_use]
    pub fn encryption_private_key(&self) -> Option<&PrivateKey> {
        self.encryption_private.as_ref()
    }

    /// Validity region, inherited from the issuer when the certificate has none
    #[must_use]
    pub fn region(&self) -> &Region {
        if self.region.is_none() {
            self.inherited_region.get().unwrap_or(&self.region)
        } else {
            &self.region
        }
    }

    pub(crate) fn inherit_region(&self, issuer_region: &Region) {
        if self.region.is_none() && !issuer_region.is_none() {
            let _ = self.inherited_region.set(issuer_region.clone());
        }
    }

    #[must_use]
    pub fn state(&self) -> CertState {
        CertState(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, flags: CertState) {
        self.state.fetch_or(flags.0, Ordering::SeqCst);
    }

    /// Clears state flags, `REVOKED` stays set
    pub(crate) fn clear_state(&self, flags: CertState) {
        self.state
            .fetch_and(!(flags.0 & !CertState::REVOKED.0), Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_trusted(&self) -> bool {
        let state = self.state();
        state.contains(CertState::TRUSTED)
            && !state.contains(CertState::REVOKED)
            && !state.contains(CertState::INVALID)
    }

    /// CA certificate: self-signed or allowed to issue certificates
    #[must_use]
    pub fn is_ca(&self) -> bool {
        self.is_self_signed() || !self.issue_permissions.is_empty()
    }

    /// Authorization ticket: an end entity with permissions for other
    /// applications than the PKI services
    #[must_use]
    pub fn is_at(&self) -> bool {
        !self.is_ca()
            && self
                .app_permissions
                .iter()
                .any(|p| !matches!(p.aid, aid::CRT_REQ | aid::CRL | aid::CTL))
    }

    pub fn check_time(&self, time32: u32) -> Result<()> {
        if time32 < self.start {
            Err(Error::NotYetValid)
        } else if time32 >= self.end {
            Err(Error::Expired)
        } else {
            Ok(())
        }
    }

    /// Checks state, validity period, region and permissions for signing
    /// or receiving a message of `aid`
    ///
    /// `aid::ANY` skips the permission check.
    pub fn check_valid_for(
        &self,
        aid: u64,
        ssp: &[u8],
        ssp_mask: &[u8],
        position: Option<&Location>,
        time64: u64,
        geo: &dyn RegionCheck,
    ) -> Result<()> {
        let state = self.state();
        if state.contains(CertState::REVOKED) {
            return Err(Error::Revoked(self.digest));
        }
        if state.contains(CertState::INVALID) {
            return Err(Error::InvalidCertificate(self.digest));
        }
        self.check_time(time::time32_from_64(time64))?;
        if let Some(position) = position.filter(|p| p.is_available()) {
            if !geo.contains(self.region(), position) {
                return Err(Error::OutOfRegion);
            }
        }
        if aid != aid::ANY {
            let permission = self.permission(aid).ok_or(Error::NoPermission)?;
            if !ssp_covers(permission.ssp.as_deref(), ssp, ssp_mask) {
                return Err(Error::SspMismatch);
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid_for(
        &self,
        aid: u64,
        ssp: &[u8],
        ssp_mask: &[u8],
        position: Option<&Location>,
        time64: u64,
        geo: &dyn RegionCheck,
    ) -> bool {
        self.check_valid_for(aid, ssp, ssp_mask, position, time64, geo)
            .is_ok()
    }

    /// Verifies the certificate signature with the issuer key, or the own key
    /// for self-signed certificates
    pub fn verify_signature(&self, engine: &dyn CryptoEngine, issuer: Option<&Certificate>) -> Result<()> {
        let (key, signer) = match issuer {
            Some(issuer) => (&issuer.verification_key, issuer.data.as_ref()),
            None => (&self.verification_key, &[][..]),
        };
        let hash = signing_hash(engine, self.hash_algorithm, &self.tbs, signer);
        if engine.verify(key, &hash, &self.signature)? {
            Ok(())
        } else {
            Err(Error::SignatureMismatch)
        }
    }

    /// Checks that the issuer was allowed to issue this certificate
    pub fn check_issued_by(&self, issuer: &Certificate, geo: &dyn RegionCheck) -> Result<()> {
        if self.start < issuer.start || self.end > issuer.end {
            return Err(Error::InconsistentIssuer(
                "Validity period exceeds the issuer validity period".into(),
            ));
        }
        if !self.region.is_none() && !geo.covers(issuer.region(), &self.region) {
            return Err(Error::InconsistentIssuer(
                "Region exceeds the issuer region".into(),
            ));
        }
        for permission in &self.app_permissions {
            let permitted = if issuer.issue_permissions.is_empty() {
                issuer.permission(permission.aid).is_some()
            } else {
                issuer.issue_permissions.iter().any(|g| g.permits(permission))
            };
            if !permitted {
                return Err(Error::InconsistentIssuer(format!(
                    "Issuer may not grant permissions for application {}",
                    permission.aid
                )));
            }
        }
        for group in &self.issue_permissions {
            if !issuer.issue_permissions.iter().any(|g| g.covers(group)) {
                return Err(Error::InconsistentIssuer(
                    "Issue permissions exceed the issuer permissions".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Creates explicit certificates
///
/// ```
/// # use v2x_security::{cert::CertificateBuilder, crypto::{CryptoEngine, Curve, OpensslEngine}};
/// let engine = OpensslEngine::new();
/// let key = engine.generate_key(Curve::NistP256).unwrap();
/// let root = CertificateBuilder::new(key.public.clone())
///     .name("root")
///     .issue_all()
///     .self_sign(&engine, &key.private)
///     .unwrap();
/// assert_eq!(0x80, root[0]);
/// ```
#[derive(Debug, Clone)]
pub struct CertificateBuilder {
    name: Option<String>,
    start: u32,
    duration: Duration,
    region: Option<GeographicRegion>,
    assurance: Option<u8>,
    crl_series: u16,
    app_permissions: Vec<AidSsp>,
    issue_permissions: Vec<IssuePermission>,
    verification_key: PublicKey,
    encryption_key: Option<PublicKey>,
}

impl CertificateBuilder {
    /// Certificate valid for one year from now
    #[must_use]
    pub fn new(verification_key: PublicKey) -> Self {
        Self {
            name: None,
            start: time::now32(),
            duration: Duration::Years(Uint16(1)),
            region: None,
            assurance: None,
            crl_series: 0,
            app_permissions: vec![],
            issue_permissions: vec![],
            verification_key,
            encryption_key: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    #[must_use]
    pub fn validity(mut self, start: u32, duration: Duration) -> Self {
        self.start = start;
        self.duration = duration;
        self
    }

    #[must_use]
    pub fn region(mut self, region: GeographicRegion) -> Self {
        self.region = Some(region);
        self
    }

    #[must_use]
    pub fn assurance(mut self, level: u8) -> Self {
        self.assurance = Some(level);
        self
    }

    #[must_use]
    pub fn crl_series(mut self, series: u16) -> Self {
        self.crl_series = series;
        self
    }

    #[must_use]
    pub fn app_permission(mut self, aid: u64, ssp: &[u8]) -> Self {
        self.app_permissions.push(AidSsp::new(aid, ssp));
        self
    }

    /// permission to issue certificates for every application
    #[must_use]
    pub fn issue_all(mut self) -> Self {
        self.issue_permissions.push(IssuePermission {
            subjects: None,
            min_chain_length: 1,
            chain_length_range: 0,
            ee_type: EndEntityType::APP.0,
        });
        self
    }

    /// permission to issue certificates for `aid` within `range`
    #[must_use]
    pub fn issue(mut self, aid: u64, range: SspRange) -> Self {
        let subject = PsidRange { aid, range };
        match self
            .issue_permissions
            .iter_mut()
            .find_map(|g| g.subjects.as_mut())
        {
            Some(subjects) => subjects.push(subject),
            None => self.issue_permissions.push(IssuePermission {
                subjects: Some(vec![subject]),
                min_chain_length: 1,
                chain_length_range: 0,
                ee_type: EndEntityType::APP.0,
            }),
        }
        self
    }

    #[must_use]
    pub fn encryption_key(mut self, key: PublicKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Encodes a self-signed root certificate
    pub fn self_sign(&self, engine: &dyn CryptoEngine, key: &PrivateKey) -> Result<Vec<u8>> {
        let algorithm = key.curve.hash_algorithm();
        self.encode(engine, IssuerIdentifier::RsSelf(algorithm), algorithm, &[], key)
    }

    /// Encodes a certificate signed by `issuer`
    pub fn sign(
        &self,
        engine: &dyn CryptoEngine,
        issuer: &Certificate,
        key: &PrivateKey,
    ) -> Result<Vec<u8>> {
        let digest = issuer.digest();
        let id = HashedId8(&digest.0);
        let algorithm = issuer.hash_algorithm();
        let identifier = match algorithm {
            HashAlgorithm::Sha256 => IssuerIdentifier::Sha256AndDigest(id),
            HashAlgorithm::Sha384 => IssuerIdentifier::Sha384AndDigest(id),
        };
        self.encode(engine, identifier, algorithm, issuer.data(), key)
    }

    fn encode(
        &self,
        engine: &dyn CryptoEngine,
        issuer: IssuerIdentifier,
        algorithm: HashAlgorithm,
        signer: &[u8],
        key: &PrivateKey,
    ) -> Result<Vec<u8>> {
        if self.app_permissions.len() > MAX_PERMISSIONS {
            return Err(Error::TooManyPermissions(self.app_permissions.len()));
        }
        let assurance = self.assurance.map(|a| [a]);
        let app_permissions: Vec<PsidSsp> = self
            .app_permissions
            .iter()
            .map(|p| PsidSsp {
                psid: Psid(p.aid),
                ssp: p
                    .ssp
                    .as_deref()
                    .map(|ssp| ServiceSpecificPermissions::BitmapSsp(BitmapSsp(ssp))),
            })
            .collect();
        let issue_permissions: Vec<PsidGroupPermissions> = self
            .issue_permissions
            .iter()
            .map(|g| PsidGroupPermissions {
                subject_permissions: match &g.subjects {
                    None => SubjectPermissions::All(()),
                    Some(subjects) => SubjectPermissions::Explicit(SequenceOfPsidSspRange(
                        subjects
                            .iter()
                            .map(|s| PsidSspRange {
                                psid: Psid(s.aid),
                                ssp_range: Some(match &s.range {
                                    SspRange::All => types::SspRange::All(()),
                                    SspRange::Opaque(list) => types::SspRange::Opaque(
                                        SequenceOfOctetString(
                                            list.iter().map(Vec::as_slice).collect(),
                                        ),
                                    ),
                                    SspRange::Bitmap { value, mask } => {
                                        types::SspRange::BitmapSspRange(BitmapSspRange {
                                            ssp_value: value,
                                            ssp_bitmask: mask,
                                        })
                                    }
                                }),
                            })
                            .collect(),
                    )),
                },
                min_chain_length: g.min_chain_length,
                chain_length_range: g.chain_length_range,
                ee_type: EndEntityType(g.ee_type),
            })
            .collect();
        let encryption_key = self
            .encryption_key
            .as_ref()
            .map(|k| {
                Ok::<_, Error>(PublicEncryptionKey {
                    supported_symm_alg: SymmAlgorithm::Aes128Ccm,
                    public_key: match k.curve {
                        Curve::NistP256 => BasePublicEncryptionKey::EciesNistP256(k.to_p256_point()?),
                        Curve::BrainpoolP256r1 => {
                            BasePublicEncryptionKey::EciesBrainpoolP256r1(k.to_p256_point()?)
                        }
                        curve => {
                            return Err(Error::UnsupportedAlgorithm(format!(
                                "{curve:?} can not be used for encryption"
                            )))
                        }
                    },
                })
            })
            .transpose()?;

        let to_be_signed = ToBeSignedCertificate {
            id: match &self.name {
                Some(name) => CertificateId::Name(Hostname(name.clone())),
                None => CertificateId::None(()),
            },
            craca_id: HashedId3(&[0; 3]),
            crl_series: Uint16(self.crl_series),
            validity_period: ValidityPeriod {
                start: Uint32(self.start),
                duration: self.duration,
            },
            region: self.region.clone(),
            assurance_level: assurance.as_ref().map(|a| SubjectAssurance(a)),
            app_permissions: (!app_permissions.is_empty()).then_some(SequenceOfPsidSsp(app_permissions)),
            cert_issue_permissions: (!issue_permissions.is_empty())
                .then_some(SequenceOfPsidGroupPermissions(issue_permissions)),
            cert_request_permissions: None,
            can_request_rollover: false,
            encryption_key,
            verify_key_indicator: VerificationKeyIndicator::VerificationKey(
                self.verification_key.to_verification_key()?,
            ),
            raw: &[],
        };
        let tbs = to_be_signed.encode_to_vec()?;
        let signature = engine.sign(key, &signing_hash(engine, algorithm, &tbs, signer))?;
        let certificate = CertificateBase {
            version: Uint8(3),
            r_type: CertificateType::Explicit,
            issuer,
            to_be_signed,
            signature: Some(signature.to_wire()),
            raw: &[],
        };
        Ok(certificate.encode_to_vec()?)
    }
}

/// Generated PKI shared by the tests of the higher layers
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::crypto::{KeyPair, OpensslEngine};

    pub(crate) const CAM_SSP: [u8; 3] = [0x01, 0xFF, 0xFC];
    pub(crate) const DENM_SSP: [u8; 4] = [0x01, 0xFF, 0xFF, 0xFF];
    /// CTL signing for EA, AA and DC entries
    pub(crate) const ROOT_CTL_SSP: [u8; 2] = [0x01, 0x38];

    pub(crate) struct Identity {
        pub(crate) data: Vec<u8>,
        pub(crate) key: KeyPair,
        pub(crate) encryption: KeyPair,
    }

    pub(crate) struct Pki {
        pub(crate) engine: OpensslEngine,
        pub(crate) root: Identity,
        pub(crate) aa: Identity,
    }

    impl Pki {
        pub(crate) fn new(curve: Curve) -> Self {
            let engine = OpensslEngine::new();
            let start = time::now32() - 3600;
            let root_key = engine.generate_key(curve).unwrap();
            let root_encryption = engine.generate_key(Curve::NistP256).unwrap();
            let root = CertificateBuilder::new(root_key.public.clone())
                .name("root")
                .validity(start, Duration::Years(Uint16(10)))
                .app_permission(aid::CRL, &[0x01])
                .app_permission(aid::CTL, &ROOT_CTL_SSP)
                .issue_all()
                .encryption_key(root_encryption.public.clone())
                .self_sign(&engine, &root_key.private)
                .unwrap();
            let root_cert = Certificate::from_bytes(&engine, root.clone()).unwrap();

            let aa_key = engine.generate_key(curve).unwrap();
            let aa_encryption = engine.generate_key(Curve::NistP256).unwrap();
            let aa = CertificateBuilder::new(aa_key.public.clone())
                .name("aa")
                .validity(start, Duration::Years(Uint16(5)))
                .app_permission(aid::CRT_REQ, &[0x01, 0x32, 0x00])
                .issue(
                    aid::CAM,
                    SspRange::Bitmap {
                        value: vec![0x01, 0, 0],
                        mask: vec![0xFF, 0, 0],
                    },
                )
                .issue(aid::DENM, SspRange::All)
                .encryption_key(aa_encryption.public.clone())
                .sign(&engine, &root_cert, &root_key.private)
                .unwrap();

            Self {
                engine,
                root: Identity {
                    data: root,
                    key: root_key,
                    encryption: root_encryption,
                },
                aa: Identity {
                    data: aa,
                    key: aa_key,
                    encryption: aa_encryption,
                },
            }
        }

        pub(crate) fn aa_certificate(&self) -> Certificate {
            Certificate::from_bytes(&self.engine, self.aa.data.clone()).unwrap()
        }

        /// authorization ticket for CAM and DENM issued by the AA
        pub(crate) fn at(&self, name: &str) -> Identity {
            self.at_with(|b| b.name(name))
        }

        /// authorization ticket valid for 24 hours, CAM and DENM permissions
        /// unless `configure` sets others
        pub(crate) fn at_with(
            &self,
            configure: impl FnOnce(CertificateBuilder) -> CertificateBuilder,
        ) -> Identity {
            let key = self
                .engine
                .generate_key(self.aa.key.public.curve)
                .unwrap();
            let encryption = self.engine.generate_key(Curve::NistP256).unwrap();
            let mut builder = configure(
                CertificateBuilder::new(key.public.clone())
                    .validity(time::now32() - 60, Duration::Hours(Uint16(24))),
            );
            if builder.app_permissions.is_empty() {
                builder = builder
                    .app_permission(aid::CAM, &CAM_SSP)
                    .app_permission(aid::DENM, &DENM_SSP);
            }
            let data = builder
                .encryption_key(encryption.public.clone())
                .sign(&self.engine, &self.aa_certificate(), &self.aa.key.private)
                .unwrap();
            Identity {
                data,
                key,
                encryption,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{fixtures::*, *};
    use crate::{
        crypto::{hash, OpensslEngine},
        geo::DefaultRegionCheck,
        types::{CircularRegion, NinetyDegreeInt, OneEightyDegreeInt, TwoDLocation},
    };

    fn load(engine: &OpensslEngine, data: &[u8]) -> Certificate {
        Certificate::from_bytes(engine, data.to_vec()).unwrap()
    }

    #[test]
    fn loads_generated_chain() {
        let pki = Pki::new(Curve::NistP256);
        let root = load(&pki.engine, &pki.root.data);
        let aa = load(&pki.engine, &pki.aa.data);
        let at = pki.at("at");
        let at = load(&pki.engine, &at.data);

        assert!(root.is_self_signed());
        assert!(root.is_ca() && !root.is_at());
        assert!(aa.is_ca() && !aa.is_at());
        assert!(at.is_at() && !at.is_ca());
        assert_eq!("aa", aa.name());
        assert_eq!(Some(root.digest()), aa.issuer());
        assert_eq!(Some(aa.digest()), at.issuer());
        assert_eq!(
            Digest::from_hash(&hash(HashAlgorithm::Sha256, &pki.root.data)),
            root.digest()
        );
        assert_eq!(root.digest().0[5..], root.hashed_id3());
        assert_eq!(CertState::LOADED, at.state());

        root.verify_signature(&pki.engine, None).unwrap();
        aa.verify_signature(&pki.engine, Some(&root)).unwrap();
        at.verify_signature(&pki.engine, Some(&aa)).unwrap();
        assert_eq!(
            Err(Error::SignatureMismatch),
            at.verify_signature(&pki.engine, Some(&root))
        );
        aa.check_issued_by(&root, &DefaultRegionCheck).unwrap();
        at.check_issued_by(&aa, &DefaultRegionCheck).unwrap();
    }

    #[test]
    fn signs_certificates_on_384_bit_curves() {
        let pki = Pki::new(Curve::BrainpoolP384r1);
        let root = load(&pki.engine, &pki.root.data);
        let aa = load(&pki.engine, &pki.aa.data);
        assert_eq!(HashAlgorithm::Sha384, root.hash_algorithm());
        assert_eq!(HashAlgorithm::Sha384, aa.hash_algorithm());
        aa.verify_signature(&pki.engine, Some(&root)).unwrap();
        let at = load(&pki.engine, &pki.at("at").data);
        at.verify_signature(&pki.engine, Some(&aa)).unwrap();
    }

    #[test]
    fn checks_the_validity_window() {
        let engine = OpensslEngine::new();
        let key = engine.generate_key(Curve::NistP256).unwrap();
        let t0 = 600_000_000;
        let data = CertificateBuilder::new(key.public.clone())
            .validity(t0, Duration::Hours(Uint16(1)))
            .app_permission(aid::CAM, &CAM_SSP)
            .self_sign(&engine, &key.private)
            .unwrap();
        let certificate = load(&engine, &data);
        let t1 = t0 + 3600;
        assert_eq!(t1, certificate.end());
        let valid_at = |t: u32| {
            certificate.check_valid_for(
                aid::CAM,
                &[],
                &[],
                None,
                time::time64_from_32(t),
                &DefaultRegionCheck,
            )
        };
        assert_eq!(Ok(()), valid_at(t0));
        assert_eq!(Ok(()), valid_at(t1 - 1));
        assert_eq!(Err(Error::Expired), valid_at(t1));
        assert_eq!(Err(Error::NotYetValid), valid_at(t0 - 1));
    }

    #[test]
    fn matches_ssp_flags_and_values() {
        // byte 1: upper nibble value bits, lower nibble permission flags
        let mask = [0x00, 0xF0];
        let certificate = Some(&[0x01, 0x35][..]);
        assert!(ssp_covers(certificate, &[], &[]));
        assert!(ssp_covers(certificate, &[0x01, 0x35], &mask));
        assert!(ssp_covers(certificate, &[0x01, 0x31], &mask));
        assert!(ssp_covers(certificate, &[0x01, 0x30], &mask));
        assert!(!ssp_covers(certificate, &[0x01, 0x32], &mask));
        assert!(!ssp_covers(certificate, &[0x01, 0x25], &mask));
        assert!(!ssp_covers(certificate, &[0x02, 0x35], &mask));
        assert!(!ssp_covers(certificate, &[0x01, 0x35, 0x01], &[]));
        assert!(!ssp_covers(None, &[0x01], &[]));
    }

    #[test]
    fn checks_permissions_and_region() {
        let engine = OpensslEngine::new();
        let key = engine.generate_key(Curve::NistP256).unwrap();
        let berlin = TwoDLocation {
            latitude: NinetyDegreeInt(525_200_000),
            longitude: OneEightyDegreeInt(134_050_000),
        };
        let data = CertificateBuilder::new(key.public.clone())
            .region(GeographicRegion::CircularRegion(CircularRegion {
                center: berlin,
                radius: Uint16(10_000),
            }))
            .app_permission(aid::CAM, &CAM_SSP)
            .app_permission(aid::TLC, &[])
            .self_sign(&engine, &key.private)
            .unwrap();
        let certificate = load(&engine, &data);
        let now = time::now64();
        let check = |aid, ssp: &[u8], position: Option<&Location>| {
            certificate.check_valid_for(aid, ssp, &[], position, now, &DefaultRegionCheck)
        };
        assert_eq!(Ok(()), check(aid::CAM, &[0x01, 0x80], None));
        assert_eq!(Ok(()), check(aid::TLC, &[], None));
        assert_eq!(Err(Error::SspMismatch), check(aid::TLC, &[0x01], None));
        assert_eq!(Err(Error::NoPermission), check(aid::DENM, &[], None));
        assert_eq!(Ok(()), check(aid::ANY, &[], None));
        assert_eq!(
            Ok(()),
            check(aid::CAM, &[], Some(&Location::new(525_300_000, 134_050_000)))
        );
        assert_eq!(
            Err(Error::OutOfRegion),
            check(aid::CAM, &[], Some(&Location::new(535_300_000, 134_050_000)))
        );
        assert_eq!(
            Ok(()),
            check(aid::CAM, &[], Some(&Location::new(900_000_001, 1_800_000_001)))
        );

        certificate.set_state(CertState::REVOKED | CertState::TRUSTED);
        certificate.clear_state(CertState::REVOKED | CertState::TRUSTED);
        assert_eq!(CertState::LOADED | CertState::REVOKED, certificate.state());
        assert_eq!(
            Err(Error::Revoked(certificate.digest())),
            check(aid::CAM, &[], None)
        );
    }

    #[test]
    fn rejects_inconsistent_issuance() {
        let pki = Pki::new(Curve::NistP256);
        let aa = pki.aa_certificate();
        let tlc = pki.at_with(|b| b.app_permission(aid::TLC, &[]));
        let tlc = load(&pki.engine, &tlc.data);
        assert!(matches!(
            tlc.check_issued_by(&aa, &DefaultRegionCheck),
            Err(Error::InconsistentIssuer(_))
        ));
        let cam = pki.at_with(|b| b.app_permission(aid::CAM, &[0x02, 0xFF, 0xFC]));
        let cam = load(&pki.engine, &cam.data);
        assert!(cam.check_issued_by(&aa, &DefaultRegionCheck).is_err());
    }

    #[test]
    fn enforces_the_permission_limit() {
        let engine = OpensslEngine::new();
        let key = engine.generate_key(Curve::NistP256).unwrap();
        let builder = (0..17).fold(CertificateBuilder::new(key.public.clone()), |b, aid| {
            b.app_permission(aid, &[])
        });
        assert_eq!(
            Err(Error::TooManyPermissions(17)),
            builder.self_sign(&engine, &key.private)
        );
    }

    #[test]
    fn rejects_other_versions() {
        let pki = Pki::new(Curve::NistP256);
        let mut data = pki.root.data.clone();
        assert_eq!(3, data[1]);
        data[1] = 2;
        assert_eq!(
            Some(Error::UnsupportedVersion(2)),
            Certificate::from_bytes(&pki.engine, data).err()
        );
    }

    #[test]
    fn attaches_matching_private_keys() {
        let pki = Pki::new(Curve::NistP256);
        let at = pki.at("at");
        let certificate = load(&pki.engine, &at.data)
            .with_private_keys(&pki.engine, Some(&at.key.private.d), Some(&at.encryption.private.d))
            .unwrap();
        assert!(certificate.state().contains(CertState::LOCAL));
        assert!(certificate.encryption_private_key().is_some());
        assert_eq!(
            Some(Error::KeySizeMismatch),
            load(&pki.engine, &at.data)
                .with_private_keys(&pki.engine, Some(&at.encryption.private.d), None)
                .err()
        );
    }
}
