//! Wire structures of IEEE 1609.2, ETSI TS 103 097 and ETSI TS 102 941.
//!
//! All types borrow from the buffer they were decoded from (`'input`).
//! Structures that are the input of a signature keep the exact encoding they
//! were decoded from in a `raw` field, so signatures can be verified without
//! re-encoding. Locally constructed values leave `raw` empty; the encoder never
//! reads it.

#[cfg(feature = "serde")]
use serde::Serialize;

//**************************************************************************
//                              Basic types
//**************************************************************************

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Uint8(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Uint16(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Uint32(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Uint64(pub u64);

/// number of (TAI) seconds since 00:00:00 UTC, 1 January, 2004
pub type Time32 = Uint32;

/// number of (TAI) microseconds since 00:00:00 UTC, 1 January, 2004
pub type Time64 = Uint64;

pub type CrlSeries = Uint16;
pub type IValue = Uint16;
pub type UnCountryId = Uint16;
pub type Elevation = Uint16;

/// represents the PSID defined in IEEE Std 1609.12 (ITS-AID in ETSI terms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Psid(pub u64);

/// contains the truncated hash of another data structure
///
/// The `HashedId3` for a given data structure is calculated by calculating the
/// hash of the encoded data structure and taking the low-order three bytes of
/// the hash output.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HashedId3<'input>(pub &'input [u8]);

/// contains the truncated hash of another data structure
///
/// The `HashedId8` for a given data structure is calculated by calculating the
/// hash of the encoded data structure and taking the low-order eight bytes of
/// the hash output. The low-order eight bytes are the last eight bytes of the
/// hash when represented in network byte order.
///
/// Example: Consider the SHA-256 hash of the empty string:
/// SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
///
/// The `HashedId8` derived from this hash corresponds to the following:
/// `HashedId8` = a495991b7852b855.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HashedId8<'input>(pub &'input [u8]);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HashedId32<'input>(pub &'input [u8]);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HashedId48<'input>(pub &'input [u8]);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Opaque<'input>(pub &'input [u8]);

/// SSP as a bitmap, 0 to 31 octets
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BitmapSsp<'input>(pub &'input [u8]);

/// assurance level and confidence of a certificate subject, one octet
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SubjectAssurance<'input>(pub &'input [u8]);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Hostname(pub String);

/// IA5String used by TS 102 941 for access points and distribution centres
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Url(pub String);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfUint8(pub Vec<Uint8>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfUint16(pub Vec<Uint16>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfHashedId3<'input>(pub Vec<HashedId3<'input>>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfHashedId8<'input>(pub Vec<HashedId8<'input>>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfOctetString<'input>(pub Vec<&'input [u8]>);

//**************************************************************************
//                              Algorithms
//**************************************************************************

/// identifies a hash algorithm
///
/// The value sha256, indicates SHA-256. The value sha384 indicates SHA-384.
///
/// Note: Critical information fields: This is a critical information field as
/// defined in 5.2.6. An implementation that does not recognize the enumerated
/// value of this type in a signed SPDU when verifying a signed SPDU shall
/// indicate that the signed SPDU is invalid.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum HashAlgorithm {
    Sha256 = 0,
    Sha384 = 1,
}

impl TryFrom<i128> for HashAlgorithm {
    type Error = ();

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(HashAlgorithm::Sha256),
            1 => Ok(HashAlgorithm::Sha384),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SymmAlgorithm {
    Aes128Ccm = 0,
}

impl TryFrom<i128> for SymmAlgorithm {
    type Error = ();

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SymmAlgorithm::Aes128Ccm),
            _ => Err(()),
        }
    }
}

/// Indicates whether a certificate is explicit or implicit.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CertificateType {
    Explicit = 0,
    Implicit = 1,
}

impl TryFrom<i128> for CertificateType {
    type Error = ();

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CertificateType::Explicit),
            1 => Ok(CertificateType::Implicit),
            _ => Err(()),
        }
    }
}

//**************************************************************************
//                         Curve points and keys
//**************************************************************************

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EccP256CurvePointUncompressedP256<'input> {
    pub x: &'input [u8],
    pub y: &'input [u8],
}

/// specifies a point on an elliptic curve in Weierstrass form defined over a 256-bit prime number
///
/// The curve is determined by the context the point is used in. The fill
/// choice is only used in the `r` value of a signature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EccP256CurvePoint<'input> {
    XOnly(&'input [u8]),
    Fill(()),
    CompressedY0(&'input [u8]),
    CompressedY1(&'input [u8]),
    UncompressedP256(EccP256CurvePointUncompressedP256<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EccP384CurvePointUncompressedP384<'input> {
    pub x: &'input [u8],
    pub y: &'input [u8],
}

/// specifies a point on an elliptic curve in Weierstrass form defined over a 384-bit prime number
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EccP384CurvePoint<'input> {
    XOnly(&'input [u8]),
    Fill(()),
    CompressedY0(&'input [u8]),
    CompressedY1(&'input [u8]),
    UncompressedP384(EccP384CurvePointUncompressedP384<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EcdsaP256Signature<'input> {
    pub r_sig: EccP256CurvePoint<'input>,
    pub s_sig: &'input [u8],
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EcdsaP384Signature<'input> {
    pub r_sig: EccP384CurvePoint<'input>,
    pub s_sig: &'input [u8],
}

/// represents a signature for a supported public key algorithm
///
/// Note: Canonicalization: This data structure is subject to canonicalization
/// for the relevant operations specified in 6.1.2. The canonicalization
/// applies to instances of this data structure of type `EcdsaP256Signature`
/// and `EcdsaP384Signature`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Signature<'input> {
    EcdsaNistP256Signature(EcdsaP256Signature<'input>),
    EcdsaBrainpoolP256r1Signature(EcdsaP256Signature<'input>),
    EcdsaBrainpoolP384r1Signature(EcdsaP384Signature<'input>),
    EcdsaNistP384Signature(EcdsaP384Signature<'input>),
}

/// represents a public key and states with what algorithm the public key is to be used
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum PublicVerificationKey<'input> {
    EcdsaNistP256(EccP256CurvePoint<'input>),
    EcdsaBrainpoolP256r1(EccP256CurvePoint<'input>),
    EcdsaBrainpoolP384r1(EccP384CurvePoint<'input>),
    EcdsaNistP384(EccP384CurvePoint<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum BasePublicEncryptionKey<'input> {
    EciesNistP256(EccP256CurvePoint<'input>),
    EciesBrainpoolP256r1(EccP256CurvePoint<'input>),
}

/// specifies a public encryption key and the associated symmetric algorithm
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PublicEncryptionKey<'input> {
    pub supported_symm_alg: SymmAlgorithm,
    pub public_key: BasePublicEncryptionKey<'input>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SymmetricEncryptionKey<'input> {
    Aes128Ccm(&'input [u8]),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EncryptionKey<'input> {
    Public(PublicEncryptionKey<'input>),
    Symmetric(SymmetricEncryptionKey<'input>),
}

/// contains the verification key or the reconstruction value of a certificate
///
/// Only explicit certificates (`VerificationKey`) are processed, the
/// reconstruction value of implicit certificates is decoded but not used.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum VerificationKeyIndicator<'input> {
    VerificationKey(PublicVerificationKey<'input>),
    ReconstructionValue(EccP256CurvePoint<'input>),
}

//**************************************************************************
//                         Time and location
//**************************************************************************

/// represents the duration of the validity period of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Duration {
    Microseconds(Uint16),
    Milliseconds(Uint16),
    Seconds(Uint16),
    Minutes(Uint16),
    Hours(Uint16),
    SixtyHours(Uint16),
    Years(Uint16),
}

/// gives the validity period of a certificate
///
/// The start of the validity period is given by start and the end is given by start + duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ValidityPeriod {
    pub start: Time32,
    pub duration: Duration,
}

/// latitude in 1/10th microdegrees, 900000001 means unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct NinetyDegreeInt(pub i32);

/// longitude in 1/10th microdegrees, 1800000001 means unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct OneEightyDegreeInt(pub i32);

pub type Latitude = NinetyDegreeInt;
pub type Longitude = OneEightyDegreeInt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TwoDLocation {
    pub latitude: Latitude,
    pub longitude: Longitude,
}

/// location on or near the surface of the Earth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ThreeDLocation {
    pub latitude: Latitude,
    pub longitude: Longitude,
    pub elevation: Elevation,
}

/// circle with its centre at `center` and its radius given in metres
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CircularRegion {
    pub center: TwoDLocation,
    pub radius: Uint16,
}

/// rectangular region formed by taking two points and connecting them with latitude and longitude lines
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RectangularRegion {
    pub north_west: TwoDLocation,
    pub south_east: TwoDLocation,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfRectangularRegion(pub Vec<RectangularRegion>);

/// region defined by at least three points connected in order, the last one connected to the first
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PolygonalRegion(pub Vec<TwoDLocation>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CountryAndRegions {
    pub country_only: UnCountryId,
    pub regions: SequenceOfUint8,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RegionAndSubregions {
    pub region: Uint8,
    pub subregions: SequenceOfUint16,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfRegionAndSubregions(pub Vec<RegionAndSubregions>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CountryAndSubregions {
    pub country_only: UnCountryId,
    pub region_and_subregions: SequenceOfRegionAndSubregions,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum IdentifiedRegion {
    CountryOnly(UnCountryId),
    CountryAndRegions(CountryAndRegions),
    CountryAndSubregions(CountryAndSubregions),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfIdentifiedRegion(pub Vec<IdentifiedRegion>);

/// represents a geographic region of a specified form
///
/// Note: Critical information fields: If present, this is a critical
/// information field as defined in 5.2.6. An implementation that does not
/// recognize the indicated CHOICE when verifying a signed SPDU shall indicate
/// that the signed SPDU is invalid.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum GeographicRegion {
    CircularRegion(CircularRegion),
    RectangularRegion(SequenceOfRectangularRegion),
    PolygonalRegion(PolygonalRegion),
    IdentifiedRegion(SequenceOfIdentifiedRegion),
}

//**************************************************************************
//                              PSID / ITS-AID
//**************************************************************************

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ServiceSpecificPermissions<'input> {
    Opaque(&'input [u8]),
    BitmapSsp(BitmapSsp<'input>),
}

/// permissions that the certificate holder has with respect to a single application area
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PsidSsp<'input> {
    pub psid: Psid,
    pub ssp: Option<ServiceSpecificPermissions<'input>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfPsidSsp<'input>(pub Vec<PsidSsp<'input>>);

/// bitmap SSP range: bits set in `ssp_bitmask` must equal `ssp_value`, other bits are free
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BitmapSspRange<'input> {
    pub ssp_value: &'input [u8],
    pub ssp_bitmask: &'input [u8],
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SspRange<'input> {
    Opaque(SequenceOfOctetString<'input>),
    All(()),
    BitmapSspRange(BitmapSspRange<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PsidSspRange<'input> {
    pub psid: Psid,
    pub ssp_range: Option<SspRange<'input>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfPsidSspRange<'input>(pub Vec<PsidSspRange<'input>>);

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SubjectPermissions<'input> {
    Explicit(SequenceOfPsidSspRange<'input>),
    All(()),
}

/// fixed size bit string of 8 bits: app (0x80) and enrol (0x40)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EndEntityType(pub u8);

impl EndEntityType {
    pub const APP: Self = Self(0x80);
    pub const ENROL: Self = Self(0x40);
}

impl Default for EndEntityType {
    fn default() -> Self {
        Self::APP
    }
}

/// states the permissions that a certificate holder has with respect to issuing and requesting certificates
///
/// `min_chain_length` and `chain_length_range` are DEFAULT fields (1 and 0);
/// they are only transmitted when they differ from their default.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PsidGroupPermissions<'input> {
    pub subject_permissions: SubjectPermissions<'input>,
    pub min_chain_length: u64,
    pub chain_length_range: u64,
    pub ee_type: EndEntityType,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfPsidGroupPermissions<'input>(pub Vec<PsidGroupPermissions<'input>>);

//**************************************************************************
//                Certificates and other Security Management
//**************************************************************************

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GroupLinkageValue<'input> {
    pub j_value: &'input [u8],
    pub value: &'input [u8],
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct LinkageData<'input> {
    pub i_cert: IValue,
    pub linkage_value: &'input [u8],
    pub group_linkage_value: Option<GroupLinkageValue<'input>>,
}

/// contains information that is used to identify the certificate holder if necessary
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CertificateId<'input> {
    LinkageData(LinkageData<'input>),
    Name(Hostname),
    BinaryId(&'input [u8]),
    None(()),
}

/// identifies the issuer of a certificate
///
/// `RsSelf` marks a self-signed certificate and carries the hash algorithm
/// used for the self-signature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum IssuerIdentifier<'input> {
    Sha256AndDigest(HashedId8<'input>),
    RsSelf(HashAlgorithm),
    Sha384AndDigest(HashedId8<'input>),
}

/// The fields in the `ToBeSignedCertificate` structure have the following meaning:
///
/// For both implicit and explicit certificates, when the certificate is
/// hashed to create or recover the public key (in the case of an implicit
/// certificate) or to generate or verify the signature (in the case of an
/// explicit certificate), the hash is Hash (Data input) || Hash (Signer
/// identifier input), where:
///   - Data input is the COER encoding of toBeSigned, canonicalized as described above.
///   - Signer identifier input depends on the verification type, which in turn depends on the choice indicated by issuer.
///     If the choice indicated by issuer is self, the verification type is self-signed and the signer identifier input is the empty string.
///     If the choice indicated by issuer is not self, the verification type is certificate and the signer identifier input is the COER encoding of the canonicalization per 6.4.3 of the certificate indicated by issuer.
///
/// Certificate extensions (flags, app/issue/request extensions) are skipped
/// when decoding; they are still covered by `raw`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ToBeSignedCertificate<'input> {
    pub id: CertificateId<'input>,
    pub craca_id: HashedId3<'input>,
    pub crl_series: CrlSeries,
    pub validity_period: ValidityPeriod,
    pub region: Option<GeographicRegion>,
    pub assurance_level: Option<SubjectAssurance<'input>>,
    pub app_permissions: Option<SequenceOfPsidSsp<'input>>,
    pub cert_issue_permissions: Option<SequenceOfPsidGroupPermissions<'input>>,
    pub cert_request_permissions: Option<SequenceOfPsidGroupPermissions<'input>>,
    pub can_request_rollover: bool,
    pub encryption_key: Option<PublicEncryptionKey<'input>>,
    pub verify_key_indicator: VerificationKeyIndicator<'input>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: &'input [u8],
}

/// Base certificate data
///
/// Note: Whole-certificate hash: If the entirety of a certificate is hashed
/// to calculate a `HashedId3` or `HashedId8`, the algorithm used for this
/// purpose is known as the whole-certificate hash.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CertificateBase<'input> {
    /// contains the version of the certificate format. In this version of the data structures, this field is set to 3
    pub version: Uint8,
    pub r_type: CertificateType,
    pub issuer: IssuerIdentifier<'input>,
    pub to_be_signed: ToBeSignedCertificate<'input>,
    /// signature calculated by the signer identified in the issuer field, over the hash of toBeSigned
    pub signature: Option<Signature<'input>>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: &'input [u8],
}

pub type Certificate<'input> = CertificateBase<'input>;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfCertificate<'input>(pub Vec<Certificate<'input>>);

//**************************************************************************
//                              Secured data
//**************************************************************************

/// contains other data types in this clause
///
/// The encoding of this structure is the outer container of every secured
/// message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Ieee1609Dot2Data<'input> {
    pub protocol_version: Uint8,
    pub content: Ieee1609Dot2Content<'input>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum Ieee1609Dot2Content<'input> {
    UnsecuredData(Opaque<'input>),
    SignedData(Box<SignedData<'input>>),
    EncryptedData(EncryptedData<'input>),
    SignedCertificateRequest(Opaque<'input>),
    SignedX509CertificateRequest(Opaque<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SignedData<'input> {
    pub hash_id: HashAlgorithm,
    pub tbs_data: ToBeSignedData<'input>,
    pub signer: SignerIdentifier<'input>,
    pub signature: Signature<'input>,
}

/// contains the data that is hashed as input to the signature
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ToBeSignedData<'input> {
    pub payload: SignedDataPayload<'input>,
    pub header_info: HeaderInfo<'input>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: &'input [u8],
}

/// contains the data to be hashed when generating or verifying a signature
///
/// At least one of `data` and `ext_data_hash` shall be present.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SignedDataPayload<'input> {
    pub data: Option<Box<Ieee1609Dot2Data<'input>>>,
    pub ext_data_hash: Option<HashedData<'input>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum HashedData<'input> {
    Sha256HashedData(HashedId32<'input>),
    Sha384HashedData(HashedId48<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct MissingCrlIdentifier<'input> {
    pub craca_id: HashedId3<'input>,
    pub crl_series: CrlSeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PduFunctionalType(pub u8);

/// contains information that is used to establish validity by the criteria of 5.2
///
/// Contributed header extensions are skipped when decoding.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct HeaderInfo<'input> {
    pub psid: Psid,
    pub generation_time: Option<Time64>,
    pub expiry_time: Option<Time64>,
    pub generation_location: Option<ThreeDLocation>,
    /// asks peers to send the certificate with the given `HashedId3`
    pub p2pcd_learning_request: Option<HashedId3<'input>>,
    pub missing_crl_identifier: Option<MissingCrlIdentifier<'input>>,
    pub encryption_key: Option<EncryptionKey<'input>>,
    pub inline_p2pcd_request: Option<SequenceOfHashedId3<'input>>,
    /// a certificate sent in answer to a P2P certificate request
    pub requested_certificate: Option<Certificate<'input>>,
    pub pdu_functional_type: Option<PduFunctionalType>,
}

impl HeaderInfo<'_> {
    pub fn new(psid: Psid) -> Self {
        Self {
            psid,
            generation_time: None,
            expiry_time: None,
            generation_location: None,
            p2pcd_learning_request: None,
            missing_crl_identifier: None,
            encryption_key: None,
            inline_p2pcd_request: None,
            requested_certificate: None,
            pdu_functional_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SignerIdentifier<'input> {
    Digest(HashedId8<'input>),
    Certificate(SequenceOfCertificate<'input>),
    RsSelf(()),
}

//**************************************************************************
//                              Encrypted data
//**************************************************************************

/// encrypted data together with the encrypted data encryption key for each recipient
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EncryptedData<'input> {
    pub recipients: SequenceOfRecipientInfo<'input>,
    pub ciphertext: SymmetricCiphertext<'input>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SequenceOfRecipientInfo<'input>(pub Vec<RecipientInfo<'input>>);

/// transfers the data encryption key to an individual recipient of an `EncryptedData`
///
/// `PskRecipInfo` carries the `HashedId8` of a pre-shared symmetric key, the
/// data is then encrypted directly with that key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum RecipientInfo<'input> {
    PskRecipInfo(HashedId8<'input>),
    SymmRecipInfo(SymmRecipientInfo<'input>),
    CertRecipInfo(PKRecipientInfo<'input>),
    SignedDataRecipInfo(PKRecipientInfo<'input>),
    RekRecipInfo(PKRecipientInfo<'input>),
}

impl<'input> RecipientInfo<'input> {
    pub fn recipient_id(&self) -> &HashedId8<'input> {
        match self {
            RecipientInfo::PskRecipInfo(id) => id,
            RecipientInfo::SymmRecipInfo(info) => &info.recipient_id,
            RecipientInfo::CertRecipInfo(info)
            | RecipientInfo::SignedDataRecipInfo(info)
            | RecipientInfo::RekRecipInfo(info) => &info.recipient_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SymmRecipientInfo<'input> {
    pub recipient_id: HashedId8<'input>,
    pub enc_key: SymmetricCiphertext<'input>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PKRecipientInfo<'input> {
    pub recipient_id: HashedId8<'input>,
    pub enc_key: EncryptedDataEncryptionKey<'input>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EncryptedDataEncryptionKey<'input> {
    EciesNistP256(EciesP256EncryptedKey<'input>),
    EciesBrainpoolP256r1(EciesP256EncryptedKey<'input>),
}

/// ECIES encrypted AES key: ephemeral public key `v`, wrapped key `c` and tag `t`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EciesP256EncryptedKey<'input> {
    pub v: EccP256CurvePoint<'input>,
    pub c: &'input [u8],
    pub t: &'input [u8],
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum SymmetricCiphertext<'input> {
    Aes128ccm(One28BitCcmCiphertext<'input>),
}

/// AES-CCM ciphertext: 12 byte nonce, ciphertext followed by the 16 byte tag
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct One28BitCcmCiphertext<'input> {
    pub nonce: &'input [u8],
    pub ccm_ciphertext: Opaque<'input>,
}

//**************************************************************************
//                    ETSI TS 102 941 trust and security management
//**************************************************************************

/// outer structure of every TS 102 941 management message
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EtsiTs102941Data<'input> {
    pub version: Uint8,
    pub content: EtsiTs102941DataContent<'input>,
}

/// Only the choices a security entity of an ITS station consumes or
/// produces are supported; other alternatives fail to decode.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EtsiTs102941DataContent<'input> {
    /// `InnerEcRequestSignedForPop`: a signed `InnerEcRequest`
    EnrolmentRequest(Ieee1609Dot2Data<'input>),
    EnrolmentResponse(InnerEcResponse<'input>),
    AuthorizationRequest(InnerAtRequest<'input>),
    AuthorizationResponse(InnerAtResponse<'input>),
    CertificateRevocationList(ToBeSignedCrl<'input>),
    CertificateTrustListTlm(CtlFormat<'input>),
    CertificateTrustListRca(CtlFormat<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ToBeSignedCrl<'input> {
    pub version: Uint8,
    pub this_update: Time32,
    pub next_update: Time32,
    pub entries: SequenceOfHashedId8<'input>,
}

/// common format of the TLM and RCA certificate trust lists
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CtlFormat<'input> {
    pub version: Uint8,
    pub next_update: Time32,
    pub is_full_ctl: bool,
    pub ctl_sequence: Uint8,
    pub ctl_commands: Vec<CtlCommand<'input>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CtlCommand<'input> {
    Add(CtlEntry<'input>),
    Delete(CtlDelete<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CtlEntry<'input> {
    Rca(RootCaEntry<'input>),
    Ea(EaEntry<'input>),
    Aa(AaEntry<'input>),
    Dc(DcEntry<'input>),
    Tlm(TlmEntry<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct RootCaEntry<'input> {
    pub self_signed_root_ca: Certificate<'input>,
    pub successor_to: Option<Certificate<'input>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct EaEntry<'input> {
    pub ea_certificate: Certificate<'input>,
    pub aa_access_point: Url,
    pub its_access_point: Option<Url>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct AaEntry<'input> {
    pub aa_certificate: Certificate<'input>,
    pub access_point: Url,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DcEntry<'input> {
    pub url: Url,
    pub cert: SequenceOfHashedId8<'input>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct TlmEntry<'input> {
    pub self_signed_tlm_certificate: Certificate<'input>,
    pub successor_to: Option<Certificate<'input>>,
    pub access_point: Url,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum CtlDelete<'input> {
    Cert(HashedId8<'input>),
    Dc(Url),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PublicKeys<'input> {
    pub verification_key: PublicVerificationKey<'input>,
    pub encryption_key: Option<PublicEncryptionKey<'input>>,
}

/// subject attributes requested for an enrolment or authorization ticket
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct CertificateSubjectAttributes<'input> {
    pub id: Option<CertificateId<'input>>,
    pub validity_period: Option<ValidityPeriod>,
    pub region: Option<GeographicRegion>,
    pub assurance_level: Option<SubjectAssurance<'input>>,
    pub app_permissions: Option<SequenceOfPsidSsp<'input>>,
    pub cert_issue_permissions: Option<SequenceOfPsidGroupPermissions<'input>>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct InnerEcRequest<'input> {
    pub its_id: &'input [u8],
    pub certificate_format: Uint8,
    pub public_keys: PublicKeys<'input>,
    pub requested_subject_attributes: CertificateSubjectAttributes<'input>,
}

/// response code of enrolment and authorization responses, `0` is ok
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ResponseCode(pub u8);

impl ResponseCode {
    pub const OK: Self = Self(0);
}

impl TryFrom<i128> for ResponseCode {
    type Error = ();

    fn try_from(value: i128) -> Result<Self, Self::Error> {
        u8::try_from(value).map(ResponseCode).map_err(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct InnerEcResponse<'input> {
    pub request_hash: &'input [u8],
    pub response_code: ResponseCode,
    pub certificate: Option<Certificate<'input>>,
}

pub type InnerAtResponse<'input> = InnerEcResponse<'input>;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SharedAtRequest<'input> {
    pub ea_id: HashedId8<'input>,
    pub key_tag: &'input [u8],
    pub certificate_format: Uint8,
    pub requested_subject_attributes: CertificateSubjectAttributes<'input>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub raw: &'input [u8],
}

/// proof of possession of the enrolment credential inside an AT request
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum EcSignature<'input> {
    Encrypted(Ieee1609Dot2Data<'input>),
    Signed(Ieee1609Dot2Data<'input>),
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct InnerAtRequest<'input> {
    pub public_keys: PublicKeys<'input>,
    pub hmac_key: &'input [u8],
    pub shared_at_request: SharedAtRequest<'input>,
    pub ec_signature: EcSignature<'input>,
}
