use bitvec::prelude::*;
use num_traits::ToBytes;

use crate::{types::*, util};

#[cfg(feature = "json")]
use serde::Serialize;

#[derive(Debug)]
pub enum EncodeError {
    Unsupported(String),
    Common(String),
    #[cfg(feature = "json")]
    Json(String),
}

impl EncodeError {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unsupported(message) | Self::Common(message) => message,
            #[cfg(feature = "json")]
            Self::Json(message) => message,
        }
    }
}

#[derive(Debug, Default)]
pub struct Encoder {
    bits: BitVec<u8, Msb0>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: bitvec![u8, Msb0;],
        }
    }
}

impl From<Encoder> for Vec<u8> {
    fn from(val: Encoder) -> Self {
        val.bits.into_vec()
    }
}

impl From<Encoder> for bytes::Bytes {
    fn from(val: Encoder) -> Self {
        <Encoder as Into<Vec<u8>>>::into(val).into()
    }
}

/// Encoder trait for the COER structures of IEEE 1609.2, ETSI TS 103 097 and
/// ETSI TS 102 941.
///
/// The `raw` fields of decoded structures are ignored, values are always
/// encoded from their fields.
pub trait Encode {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError>;

    fn encode_to_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = Encoder::new();
        self.encode(&mut encoder)?;
        Ok(encoder.into())
    }

    #[cfg(feature = "json")]
    fn encode_to_json(&self) -> Result<String, EncodeError>
    where
        Self: Sized + Serialize,
    {
        serde_json::to_string(self)
            .map_err(|e| EncodeError::Json(format!("Error encoding JSON: {e:?}")))
    }
}

// =====================================================
// ETSI TS 103 097/ IEEE 1609.2 COER primitives
// =====================================================

#[allow(clippy::unnecessary_wraps)]
fn encode_oer_length(length: usize, output: &mut Encoder) -> Result<(), EncodeError> {
    match length {
        len if len < 128 => {
            #[allow(clippy::cast_possible_truncation)]
            output.bits.extend_from_raw_slice(&[len as u8]);
            Ok(())
        }
        len => {
            let raw = len.to_be_bytes();
            let mut length_bytes = raw.as_ref();
            while length_bytes.len() > 1 && length_bytes[0] == 0 {
                length_bytes = &length_bytes[1..];
            }
            #[allow(clippy::cast_possible_truncation)]
            output
                .bits
                .extend_from_raw_slice(&[(length_bytes.len() + 128) as u8]);
            output.bits.extend_from_raw_slice(length_bytes);
            Ok(())
        }
    }
}

fn encode_oer_integer<I: num::Integer + ToBytes>(
    min: Option<i128>,
    max: Option<i128>,
    value: &I,
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    match (min, max) {
        (Some(_), Some(_)) => {
            output
                .bits
                .extend_from_raw_slice(value.to_be_bytes().as_ref());
            Ok(())
        }
        (Some(min), _) if min >= 0 => {
            let raw = value.to_be_bytes();
            let mut bytes = raw.as_ref();
            while bytes.len() > 1 && bytes[0] == 0 {
                bytes = &bytes[1..];
            }
            encode_oer_length(bytes.len(), output)?;
            output.bits.extend_from_raw_slice(bytes);
            Ok(())
        }
        _ => Err(EncodeError::Unsupported(
            "Unconstrained signed integers are unsupported!".into(),
        )),
    }
}

fn encode_oer_enumerated(value: u8, output: &mut Encoder) -> Result<(), EncodeError> {
    if value > 127 {
        return Err(EncodeError::Unsupported(
            "Enumerated values larger than 127 are unsupported!".into(),
        ));
    }
    encode_oer_integer(Some(0), Some(255), &value, output)
}

fn encode_oer_bool(value: bool, output: &mut Encoder) -> Result<(), EncodeError> {
    encode_oer_integer(Some(0), Some(255), &if value { 0xFFu8 } else { 0 }, output)
}

fn encode_oer_octetstring(
    min: Option<usize>,
    max: Option<usize>,
    value: &[u8],
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    if max.is_some_and(|max| value.len() > max) || min.is_some_and(|min| value.len() < min) {
        return Err(EncodeError::Common(format!(
            "Octet string length {} violates size constraint!",
            value.len()
        )));
    }
    match (min, max) {
        (Some(min), Some(max)) if min == max => {
            output.bits.extend_from_raw_slice(value);
            Ok(())
        }
        _ => {
            encode_oer_length(value.len(), output)?;
            output.bits.extend_from_raw_slice(value);
            Ok(())
        }
    }
}

// ASN.1 OER "extension addition presence bitmap"
fn encode_oer_varlength_bitstring(value: &[bool], output: &mut Encoder) -> Result<(), EncodeError> {
    encode_oer_length(util::bitstring_buffer_size(value.len()) + 1, output)?;

    let unused_bits = util::bitstring_padding_bits(value.len());

    #[allow(clippy::cast_possible_truncation)]
    encode_oer_integer(Some(0), Some(8), &(unused_bits as u8), output)?;

    for bit in value {
        output.bits.push(*bit);
    }

    // add padding bits
    for _ in 0..unused_bits {
        output.bits.push(false);
    }

    Ok(())
}

/// Build ASN.1 SEQUENCE preamble
///
/// Extension bit is optional
#[allow(clippy::unnecessary_wraps)]
fn encode_extension_and_optional_bitmap(
    extension: Option<bool>,
    bitmap: &[bool],
    output: &mut Encoder,
) -> Result<(), EncodeError> {
    if let Some(is_extended) = extension {
        output.bits.push(is_extended);
    }

    for bit in bitmap {
        output.bits.push(*bit);
    }

    // determine required padding bits
    let padding_bits = util::bitstring_padding_bits(output.bits.len());

    for _ in 0..padding_bits {
        output.bits.push(false);
    }

    Ok(())
}

fn encode_oer_tag(tag: u8, output: &mut Encoder) -> Result<(), EncodeError> {
    match tag {
        t if t < 63 => encode_oer_integer(Some(0), Some(255), &(t + 128), output),
        _ => Err(EncodeError::Unsupported(
            "Tag larger than 62 are unsupported!".into(),
        )),
    }
}

fn encode_oer_open_type<T: Encode>(value: &T, output: &mut Encoder) -> Result<(), EncodeError> {
    let bytes = value.encode_to_vec()?;
    encode_oer_octetstring(Some(0), None, &bytes, output)
}

fn encode_oer_sequence_of<T: Encode>(items: &[T], output: &mut Encoder) -> Result<(), EncodeError> {
    encode_oer_integer(Some(0), None, &items.len(), output)?;
    for item in items {
        item.encode(output)?;
    }
    Ok(())
}

fn encode_optional<T: Encode>(value: Option<&T>, output: &mut Encoder) -> Result<(), EncodeError> {
    value.map_or(Ok(()), |inner| inner.encode(output))
}

macro_rules! encode_int {
    ($typ:ty, $min:expr, $max:expr) => {
        impl Encode for $typ {
            fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
                encode_oer_integer($min, $max, &self.0, output)
            }
        }
    };
}

encode_int!(Latitude, Some(-900_000_000), Some(900_000_001));
encode_int!(Longitude, Some(-1_799_999_999), Some(1_800_000_001));
encode_int!(PduFunctionalType, Some(0), Some(255));
encode_int!(Uint8, Some(0), Some(255));
encode_int!(Uint16, Some(0), Some(65535));
encode_int!(Uint32, Some(0), Some(4_294_967_295));
encode_int!(Uint64, Some(0), Some(18_446_744_073_709_551_615));
encode_int!(Psid, Some(0), None);
encode_int!(ResponseCode, Some(0), Some(255));

macro_rules! encode_octets {
    ($typ:ty, $min:expr, $max:expr) => {
        impl Encode for $typ {
            fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
                encode_oer_octetstring($min, $max, self.0, output)
            }
        }
    };
}

encode_octets!(HashedId3<'_>, Some(3), Some(3));
encode_octets!(HashedId8<'_>, Some(8), Some(8));
encode_octets!(HashedId32<'_>, Some(32), Some(32));
encode_octets!(HashedId48<'_>, Some(48), Some(48));
encode_octets!(SubjectAssurance<'_>, Some(1), Some(1));
encode_octets!(BitmapSsp<'_>, Some(0), Some(31));
encode_octets!(Opaque<'_>, Some(0), None);

macro_rules! encode_sequence_of {
    ($typ:ty) => {
        impl Encode for $typ {
            fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
                encode_oer_sequence_of(&self.0, output)
            }
        }
    };
}

encode_sequence_of!(SequenceOfUint8);
encode_sequence_of!(SequenceOfUint16);
encode_sequence_of!(SequenceOfHashedId3<'_>);
encode_sequence_of!(SequenceOfHashedId8<'_>);
encode_sequence_of!(SequenceOfRectangularRegion);
encode_sequence_of!(SequenceOfIdentifiedRegion);
encode_sequence_of!(SequenceOfRegionAndSubregions);
encode_sequence_of!(SequenceOfPsidSsp<'_>);
encode_sequence_of!(SequenceOfPsidSspRange<'_>);
encode_sequence_of!(SequenceOfRecipientInfo<'_>);
encode_sequence_of!(SequenceOfCertificate<'_>);
encode_sequence_of!(SequenceOfPsidGroupPermissions<'_>);
encode_sequence_of!(PolygonalRegion);

impl Encode for SequenceOfOctetString<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_integer(Some(0), None, &self.0.len(), output)?;
        for item in &self.0 {
            encode_oer_octetstring(Some(0), None, item, output)?;
        }
        Ok(())
    }
}

impl Encode for Hostname {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_octetstring(Some(0), Some(255), self.0.as_bytes(), output)
    }
}

impl Encode for Url {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        if !self.0.is_ascii() {
            return Err(EncodeError::Common(
                "IA5String contains non-ASCII characters!".into(),
            ));
        }
        encode_oer_octetstring(Some(0), None, self.0.as_bytes(), output)
    }
}

impl Encode for HashAlgorithm {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_enumerated(*self as u8, output)
    }
}

impl Encode for SymmAlgorithm {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_enumerated(*self as u8, output)
    }
}

impl Encode for CertificateType {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_enumerated(*self as u8, output)
    }
}

// =====================================================
// Time, location and regions
// =====================================================

impl Encode for Duration {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        let (tag, value) = match self {
            Duration::Microseconds(v) => (0, v),
            Duration::Milliseconds(v) => (1, v),
            Duration::Seconds(v) => (2, v),
            Duration::Minutes(v) => (3, v),
            Duration::Hours(v) => (4, v),
            Duration::SixtyHours(v) => (5, v),
            Duration::Years(v) => (6, v),
        };
        encode_oer_tag(tag, output)?;
        value.encode(output)
    }
}

impl Encode for ValidityPeriod {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.start.encode(output)?;
        self.duration.encode(output)
    }
}

impl Encode for TwoDLocation {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.latitude.encode(output)?;
        self.longitude.encode(output)
    }
}

impl Encode for ThreeDLocation {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.latitude.encode(output)?;
        self.longitude.encode(output)?;
        self.elevation.encode(output)
    }
}

impl Encode for CircularRegion {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.center.encode(output)?;
        self.radius.encode(output)
    }
}

impl Encode for RectangularRegion {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.north_west.encode(output)?;
        self.south_east.encode(output)
    }
}

impl Encode for CountryAndRegions {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.country_only.encode(output)?;
        self.regions.encode(output)
    }
}

impl Encode for RegionAndSubregions {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.region.encode(output)?;
        self.subregions.encode(output)
    }
}

impl Encode for CountryAndSubregions {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.country_only.encode(output)?;
        self.region_and_subregions.encode(output)
    }
}

impl Encode for IdentifiedRegion {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            IdentifiedRegion::CountryOnly(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            IdentifiedRegion::CountryAndRegions(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            IdentifiedRegion::CountryAndSubregions(inner) => {
                encode_oer_tag(2, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for GeographicRegion {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            GeographicRegion::CircularRegion(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            GeographicRegion::RectangularRegion(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            GeographicRegion::PolygonalRegion(inner) => {
                encode_oer_tag(2, output)?;
                inner.encode(output)
            }
            GeographicRegion::IdentifiedRegion(inner) => {
                encode_oer_tag(3, output)?;
                inner.encode(output)
            }
        }
    }
}

// =====================================================
// Curve points, keys and signatures
// =====================================================

macro_rules! encode_curve_point {
    ($typ:ident, $variant:ident, $size:expr) => {
        impl Encode for $typ<'_> {
            fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
                match self {
                    $typ::XOnly(inner) => {
                        encode_oer_tag(0, output)?;
                        encode_oer_octetstring(Some($size), Some($size), inner, output)
                    }
                    $typ::Fill(()) => encode_oer_tag(1, output),
                    $typ::CompressedY0(inner) => {
                        encode_oer_tag(2, output)?;
                        encode_oer_octetstring(Some($size), Some($size), inner, output)
                    }
                    $typ::CompressedY1(inner) => {
                        encode_oer_tag(3, output)?;
                        encode_oer_octetstring(Some($size), Some($size), inner, output)
                    }
                    $typ::$variant(inner) => {
                        encode_oer_tag(4, output)?;
                        encode_oer_octetstring(Some($size), Some($size), inner.x, output)?;
                        encode_oer_octetstring(Some($size), Some($size), inner.y, output)
                    }
                }
            }
        }
    };
}

encode_curve_point!(EccP256CurvePoint, UncompressedP256, 32);
encode_curve_point!(EccP384CurvePoint, UncompressedP384, 48);

impl Encode for EcdsaP256Signature<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.r_sig.encode(output)?;
        encode_oer_octetstring(Some(32), Some(32), self.s_sig, output)
    }
}

impl Encode for EcdsaP384Signature<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.r_sig.encode(output)?;
        encode_oer_octetstring(Some(48), Some(48), self.s_sig, output)
    }
}

impl Encode for Signature<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            Signature::EcdsaNistP256Signature(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            Signature::EcdsaBrainpoolP256r1Signature(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            Signature::EcdsaBrainpoolP384r1Signature(inner) => {
                encode_oer_tag(2, output)?;
                encode_oer_open_type(inner, output)
            }
            Signature::EcdsaNistP384Signature(inner) => {
                encode_oer_tag(3, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for PublicVerificationKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            PublicVerificationKey::EcdsaNistP256(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            PublicVerificationKey::EcdsaBrainpoolP256r1(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            PublicVerificationKey::EcdsaBrainpoolP384r1(inner) => {
                encode_oer_tag(2, output)?;
                encode_oer_open_type(inner, output)
            }
            PublicVerificationKey::EcdsaNistP384(inner) => {
                encode_oer_tag(3, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for BasePublicEncryptionKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            BasePublicEncryptionKey::EciesNistP256(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            BasePublicEncryptionKey::EciesBrainpoolP256r1(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for PublicEncryptionKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.supported_symm_alg.encode(output)?;
        self.public_key.encode(output)
    }
}

impl Encode for SymmetricEncryptionKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            SymmetricEncryptionKey::Aes128Ccm(inner) => {
                encode_oer_tag(0, output)?;
                encode_oer_octetstring(Some(16), Some(16), inner, output)
            }
        }
    }
}

impl Encode for EncryptionKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            EncryptionKey::Public(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            EncryptionKey::Symmetric(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for VerificationKeyIndicator<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            VerificationKeyIndicator::VerificationKey(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            VerificationKeyIndicator::ReconstructionValue(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

// =====================================================
// Permissions
// =====================================================

impl Encode for ServiceSpecificPermissions<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            ServiceSpecificPermissions::Opaque(inner) => {
                encode_oer_tag(0, output)?;
                encode_oer_octetstring(Some(0), None, inner, output)
            }
            ServiceSpecificPermissions::BitmapSsp(inner) => {
                encode_oer_tag(1, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for PsidSsp<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(None, &[self.ssp.is_some()], output)?;
        self.psid.encode(output)?;
        encode_optional(self.ssp.as_ref(), output)
    }
}

impl Encode for BitmapSspRange<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_octetstring(Some(1), Some(32), self.ssp_value, output)?;
        encode_oer_octetstring(Some(1), Some(32), self.ssp_bitmask, output)
    }
}

impl Encode for SspRange<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            SspRange::Opaque(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            SspRange::All(()) => encode_oer_tag(1, output),
            SspRange::BitmapSspRange(inner) => {
                encode_oer_tag(2, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for PsidSspRange<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(None, &[self.ssp_range.is_some()], output)?;
        self.psid.encode(output)?;
        encode_optional(self.ssp_range.as_ref(), output)
    }
}

impl Encode for SubjectPermissions<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            SubjectPermissions::Explicit(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            SubjectPermissions::All(()) => encode_oer_tag(1, output),
        }
    }
}

impl Encode for EndEntityType {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        output.bits.extend_from_raw_slice(&[self.0]);
        Ok(())
    }
}

impl Encode for PsidGroupPermissions<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        // DEFAULT values are omitted
        let bitmap = [
            self.min_chain_length != 1,
            self.chain_length_range != 0,
            self.ee_type != EndEntityType::APP,
        ];
        encode_extension_and_optional_bitmap(None, &bitmap, output)?;

        self.subject_permissions.encode(output)?;
        if bitmap[0] {
            encode_oer_integer(Some(0), None, &self.min_chain_length, output)?;
        }
        if bitmap[1] {
            encode_oer_integer(Some(0), None, &self.chain_length_range, output)?;
        }
        if bitmap[2] {
            self.ee_type.encode(output)?;
        }
        Ok(())
    }
}

// =====================================================
// Certificates
// =====================================================

impl Encode for GroupLinkageValue<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_oer_octetstring(Some(4), Some(4), self.j_value, output)?;
        encode_oer_octetstring(Some(9), Some(9), self.value, output)
    }
}

impl Encode for LinkageData<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(
            None,
            &[self.group_linkage_value.is_some()],
            output,
        )?;
        self.i_cert.encode(output)?;
        encode_oer_octetstring(Some(9), Some(9), self.linkage_value, output)?;
        encode_optional(self.group_linkage_value.as_ref(), output)
    }
}

impl Encode for CertificateId<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            CertificateId::LinkageData(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            CertificateId::Name(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            CertificateId::BinaryId(inner) => {
                encode_oer_tag(2, output)?;
                encode_oer_octetstring(Some(1), Some(64), inner, output)
            }
            CertificateId::None(()) => encode_oer_tag(3, output),
        }
    }
}

impl Encode for IssuerIdentifier<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            IssuerIdentifier::Sha256AndDigest(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            IssuerIdentifier::RsSelf(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            IssuerIdentifier::Sha384AndDigest(inner) => {
                encode_oer_tag(2, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for ToBeSignedCertificate<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        let bitmap = [
            self.region.is_some(),
            self.assurance_level.is_some(),
            self.app_permissions.is_some(),
            self.cert_issue_permissions.is_some(),
            self.cert_request_permissions.is_some(),
            self.can_request_rollover,
            self.encryption_key.is_some(),
        ];
        encode_extension_and_optional_bitmap(Some(false), &bitmap, output)?;

        self.id.encode(output)?;
        self.craca_id.encode(output)?;
        self.crl_series.encode(output)?;
        self.validity_period.encode(output)?;
        encode_optional(self.region.as_ref(), output)?;
        encode_optional(self.assurance_level.as_ref(), output)?;
        encode_optional(self.app_permissions.as_ref(), output)?;
        encode_optional(self.cert_issue_permissions.as_ref(), output)?;
        encode_optional(self.cert_request_permissions.as_ref(), output)?;
        encode_optional(self.encryption_key.as_ref(), output)?;
        self.verify_key_indicator.encode(output)
    }
}

impl Encode for CertificateBase<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(None, &[self.signature.is_some()], output)?;

        self.version.encode(output)?;
        self.r_type.encode(output)?;
        self.issuer.encode(output)?;
        self.to_be_signed.encode(output)?;
        encode_optional(self.signature.as_ref(), output)
    }
}

// =====================================================
// Secured data
// =====================================================

impl Encode for HashedData<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            HashedData::Sha256HashedData(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            HashedData::Sha384HashedData(inner) => {
                encode_oer_tag(1, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for Ieee1609Dot2Data<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.protocol_version.encode(output)?;
        self.content.encode(output)
    }
}

impl Encode for Ieee1609Dot2Content<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            Ieee1609Dot2Content::UnsecuredData(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            Ieee1609Dot2Content::SignedData(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            Ieee1609Dot2Content::EncryptedData(inner) => {
                encode_oer_tag(2, output)?;
                inner.encode(output)
            }
            Ieee1609Dot2Content::SignedCertificateRequest(inner) => {
                encode_oer_tag(3, output)?;
                inner.encode(output)
            }
            Ieee1609Dot2Content::SignedX509CertificateRequest(inner) => {
                encode_oer_tag(4, output)?;
                encode_oer_open_type(inner, output)
            }
        }
    }
}

impl Encode for SignedData<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.hash_id.encode(output)?;
        self.tbs_data.encode(output)?;
        self.signer.encode(output)?;
        self.signature.encode(output)
    }
}

impl Encode for ToBeSignedData<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.payload.encode(output)?;
        self.header_info.encode(output)
    }
}

impl Encode for SignedDataPayload<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        if self.data.is_none() && self.ext_data_hash.is_none() {
            return Err(EncodeError::Common(
                "Signed data payload needs data or a hash!".into(),
            ));
        }
        let bitmap = [self.data.is_some(), self.ext_data_hash.is_some()];
        encode_extension_and_optional_bitmap(Some(false), &bitmap, output)?;

        encode_optional(self.data.as_deref(), output)?;
        encode_optional(self.ext_data_hash.as_ref(), output)
    }
}

impl Encode for MissingCrlIdentifier<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[], output)?;
        self.craca_id.encode(output)?;
        self.crl_series.encode(output)
    }
}

impl Encode for HeaderInfo<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        let ext_bitmap = [
            self.inline_p2pcd_request.is_some(),
            self.requested_certificate.is_some(),
            self.pdu_functional_type.is_some(),
            false,
        ];
        let is_extended = ext_bitmap.iter().any(|bit| *bit);
        let bitmap = [
            self.generation_time.is_some(),
            self.expiry_time.is_some(),
            self.generation_location.is_some(),
            self.p2pcd_learning_request.is_some(),
            self.missing_crl_identifier.is_some(),
            self.encryption_key.is_some(),
        ];
        encode_extension_and_optional_bitmap(Some(is_extended), &bitmap, output)?;

        self.psid.encode(output)?;
        encode_optional(self.generation_time.as_ref(), output)?;
        encode_optional(self.expiry_time.as_ref(), output)?;
        encode_optional(self.generation_location.as_ref(), output)?;
        encode_optional(self.p2pcd_learning_request.as_ref(), output)?;
        encode_optional(self.missing_crl_identifier.as_ref(), output)?;
        encode_optional(self.encryption_key.as_ref(), output)?;
        if !is_extended {
            return Ok(());
        }

        encode_oer_varlength_bitstring(&ext_bitmap, output)?;
        self.inline_p2pcd_request
            .as_ref()
            .map_or(Ok(()), |inner| encode_oer_open_type(inner, output))?;
        self.requested_certificate
            .as_ref()
            .map_or(Ok(()), |inner| encode_oer_open_type(inner, output))?;
        self.pdu_functional_type
            .as_ref()
            .map_or(Ok(()), |inner| encode_oer_open_type(inner, output))
    }
}

impl Encode for SignerIdentifier<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            SignerIdentifier::Digest(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            SignerIdentifier::Certificate(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            SignerIdentifier::RsSelf(()) => encode_oer_tag(2, output),
        }
    }
}

// =====================================================
// Encrypted data
// =====================================================

impl Encode for EncryptedData<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.recipients.encode(output)?;
        self.ciphertext.encode(output)
    }
}

impl Encode for RecipientInfo<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            RecipientInfo::PskRecipInfo(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            RecipientInfo::SymmRecipInfo(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            RecipientInfo::CertRecipInfo(inner) => {
                encode_oer_tag(2, output)?;
                inner.encode(output)
            }
            RecipientInfo::SignedDataRecipInfo(inner) => {
                encode_oer_tag(3, output)?;
                inner.encode(output)
            }
            RecipientInfo::RekRecipInfo(inner) => {
                encode_oer_tag(4, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for SymmRecipientInfo<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.recipient_id.encode(output)?;
        self.enc_key.encode(output)
    }
}

impl Encode for PKRecipientInfo<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.recipient_id.encode(output)?;
        self.enc_key.encode(output)
    }
}

impl Encode for EncryptedDataEncryptionKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            EncryptedDataEncryptionKey::EciesNistP256(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            EncryptedDataEncryptionKey::EciesBrainpoolP256r1(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for EciesP256EncryptedKey<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.v.encode(output)?;
        encode_oer_octetstring(Some(16), Some(16), self.c, output)?;
        encode_oer_octetstring(Some(16), Some(16), self.t, output)
    }
}

impl Encode for SymmetricCiphertext<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            SymmetricCiphertext::Aes128ccm(inner) => {
                encode_oer_tag(0, output)?;
                encode_oer_octetstring(Some(12), Some(12), inner.nonce, output)?;
                inner.ccm_ciphertext.encode(output)
            }
        }
    }
}

// =====================================================
// ETSI TS 102 941
// =====================================================

impl Encode for EtsiTs102941Data<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        self.version.encode(output)?;
        self.content.encode(output)
    }
}

impl Encode for EtsiTs102941DataContent<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            EtsiTs102941DataContent::EnrolmentRequest(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            EtsiTs102941DataContent::EnrolmentResponse(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
            EtsiTs102941DataContent::AuthorizationRequest(inner) => {
                encode_oer_tag(2, output)?;
                inner.encode(output)
            }
            EtsiTs102941DataContent::AuthorizationResponse(inner) => {
                encode_oer_tag(3, output)?;
                inner.encode(output)
            }
            EtsiTs102941DataContent::CertificateRevocationList(inner) => {
                encode_oer_tag(4, output)?;
                inner.encode(output)
            }
            EtsiTs102941DataContent::CertificateTrustListTlm(inner) => {
                encode_oer_tag(5, output)?;
                inner.encode(output)
            }
            EtsiTs102941DataContent::CertificateTrustListRca(inner) => {
                encode_oer_tag(6, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for ToBeSignedCrl<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[], output)?;
        self.version.encode(output)?;
        self.this_update.encode(output)?;
        self.next_update.encode(output)?;
        self.entries.encode(output)
    }
}

impl Encode for CtlFormat<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[], output)?;
        self.version.encode(output)?;
        self.next_update.encode(output)?;
        encode_oer_bool(self.is_full_ctl, output)?;
        self.ctl_sequence.encode(output)?;
        encode_oer_sequence_of(&self.ctl_commands, output)
    }
}

impl Encode for CtlCommand<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            CtlCommand::Add(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            CtlCommand::Delete(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for CtlEntry<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            CtlEntry::Rca(inner) => {
                encode_oer_tag(0, output)?;
                encode_extension_and_optional_bitmap(None, &[inner.successor_to.is_some()], output)?;
                inner.self_signed_root_ca.encode(output)?;
                encode_optional(inner.successor_to.as_ref(), output)
            }
            CtlEntry::Ea(inner) => {
                encode_oer_tag(1, output)?;
                encode_extension_and_optional_bitmap(
                    None,
                    &[inner.its_access_point.is_some()],
                    output,
                )?;
                inner.ea_certificate.encode(output)?;
                inner.aa_access_point.encode(output)?;
                encode_optional(inner.its_access_point.as_ref(), output)
            }
            CtlEntry::Aa(inner) => {
                encode_oer_tag(2, output)?;
                inner.aa_certificate.encode(output)?;
                inner.access_point.encode(output)
            }
            CtlEntry::Dc(inner) => {
                encode_oer_tag(3, output)?;
                inner.url.encode(output)?;
                inner.cert.encode(output)
            }
            CtlEntry::Tlm(inner) => {
                encode_oer_tag(4, output)?;
                encode_extension_and_optional_bitmap(None, &[inner.successor_to.is_some()], output)?;
                inner.self_signed_tlm_certificate.encode(output)?;
                encode_optional(inner.successor_to.as_ref(), output)?;
                inner.access_point.encode(output)
            }
        }
    }
}

impl Encode for CtlDelete<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            CtlDelete::Cert(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            CtlDelete::Dc(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for PublicKeys<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(None, &[self.encryption_key.is_some()], output)?;
        self.verification_key.encode(output)?;
        encode_optional(self.encryption_key.as_ref(), output)
    }
}

impl Encode for CertificateSubjectAttributes<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        let bitmap = [
            self.id.is_some(),
            self.validity_period.is_some(),
            self.region.is_some(),
            self.assurance_level.is_some(),
            self.app_permissions.is_some(),
            self.cert_issue_permissions.is_some(),
        ];
        encode_extension_and_optional_bitmap(Some(false), &bitmap, output)?;
        encode_optional(self.id.as_ref(), output)?;
        encode_optional(self.validity_period.as_ref(), output)?;
        encode_optional(self.region.as_ref(), output)?;
        encode_optional(self.assurance_level.as_ref(), output)?;
        encode_optional(self.app_permissions.as_ref(), output)?;
        encode_optional(self.cert_issue_permissions.as_ref(), output)
    }
}

impl Encode for InnerEcRequest<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[], output)?;
        encode_oer_octetstring(Some(0), None, self.its_id, output)?;
        self.certificate_format.encode(output)?;
        self.public_keys.encode(output)?;
        self.requested_subject_attributes.encode(output)
    }
}

impl Encode for InnerEcResponse<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[self.certificate.is_some()], output)?;
        encode_oer_octetstring(Some(16), Some(16), self.request_hash, output)?;
        encode_oer_enumerated(self.response_code.0, output)?;
        encode_optional(self.certificate.as_ref(), output)
    }
}

impl Encode for SharedAtRequest<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[], output)?;
        self.ea_id.encode(output)?;
        encode_oer_octetstring(Some(16), Some(16), self.key_tag, output)?;
        self.certificate_format.encode(output)?;
        self.requested_subject_attributes.encode(output)
    }
}

impl Encode for EcSignature<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        match self {
            EcSignature::Encrypted(inner) => {
                encode_oer_tag(0, output)?;
                inner.encode(output)
            }
            EcSignature::Signed(inner) => {
                encode_oer_tag(1, output)?;
                inner.encode(output)
            }
        }
    }
}

impl Encode for InnerAtRequest<'_> {
    fn encode(&self, output: &mut Encoder) -> Result<(), EncodeError> {
        encode_extension_and_optional_bitmap(Some(false), &[], output)?;
        self.public_keys.encode(output)?;
        encode_oer_octetstring(Some(32), Some(32), self.hmac_key, output)?;
        self.shared_at_request.encode(output)?;
        self.ec_signature.encode(output)
    }
}
