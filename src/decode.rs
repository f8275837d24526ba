use core::fmt::Debug;

use nom::{
    bytes::streaming::take,
    combinator::{into, map, map_res},
    error::{ErrorKind, FromExternalError, ParseError},
    Needed,
};
use num::{FromPrimitive, Integer};

use crate::{types::*, util};

/// Returns the value of a decoding attempt
#[derive(Debug, PartialEq)]
pub struct Decoded<T: Debug + PartialEq> {
    /// indicates the number of bytes that were consumed by the decoder
    pub bytes_consumed: usize,
    /// the decoded return value
    pub decoded: T,
}

pub trait Decode<'s>: Sized + Debug + PartialEq {
    /// Decoder trait for the top-level COER structures of IEEE 1609.2,
    /// ETSI TS 103 097 and ETSI TS 102 941.
    /// Takes binary data as input and borrows from it.
    /// The `Decode` trait is implemented for:
    ///  - `Ieee1609Dot2Data` (secured message container)
    ///  - `Certificate`
    ///  - `ToBeSignedData`
    ///  - `EtsiTs102941Data`
    ///  - `InnerEcRequest`
    ///  - `SymmetricEncryptionKey`
    /// ### Usage
    /// ```rust
    /// # use v2x_security::*;
    /// let data: &'static [u8] = &[0x03, 0x80, 0x03, 0x01, 0x02, 0x03];
    /// let result = Ieee1609Dot2Data::decode(data).unwrap();
    /// assert_eq!(
    ///   result,
    ///   Decoded {
    ///     bytes_consumed: 6,
    ///     decoded: Ieee1609Dot2Data {
    ///         protocol_version: Uint8(3),
    ///         content: Ieee1609Dot2Content::UnsecuredData(Opaque(&[1, 2, 3])),
    ///     }
    ///   }
    /// );
    /// ```
    fn decode<'input: 's, I: Into<&'input [u8]>>(
        input: I,
    ) -> Result<Decoded<Self>, DecodeError<&'input [u8]>>;
}

macro_rules! decode {
    ($typ:ty) => {
        impl<'s> Decode<'s> for $typ {
            fn decode<'input: 's, I: Into<&'input [u8]>>(
                input: I,
            ) -> Result<Decoded<Self>, DecodeError<&'input [u8]>> {
                let input = input.into();
                let (remaining, decoded) = <$typ>::decode_bytewise(input)?;
                Ok(Decoded {
                    bytes_consumed: input.len() - remaining.len(),
                    decoded,
                })
            }
        }
    };
}

decode!(Ieee1609Dot2Data<'s>);
decode!(Certificate<'s>);
decode!(ToBeSignedData<'s>);
decode!(EtsiTs102941Data<'s>);
decode!(InnerEcRequest<'s>);
decode!(SymmetricEncryptionKey<'s>);

#[derive(Debug, PartialEq)]
pub enum DecodeError<I> {
    IntegerError(String),
    EnumError(String),
    StringError(String),
    ArrayError(String),
    ParserError(String),
    Nom(I, ErrorKind),
    #[cfg(feature = "json")]
    Json(String),
}

impl<I> DecodeError<I> {
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::IntegerError(message)
            | Self::EnumError(message)
            | Self::StringError(message)
            | Self::ArrayError(message)
            | Self::ParserError(message) => message.clone(),
            Self::Nom(_, kind) => format!("Parser error: {kind:?}"),
            #[cfg(feature = "json")]
            Self::Json(message) => message.clone(),
        }
    }
}

impl<T> From<nom::Err<DecodeError<T>>> for DecodeError<T> {
    fn from(value: nom::Err<DecodeError<T>>) -> Self {
        match value {
            nom::Err::Incomplete(Needed::Size(n)) => DecodeError::ParserError(format!(
                "Unexpected end of input: Needs at least other {n} bytes!"
            )),
            nom::Err::Incomplete(_) => DecodeError::ParserError("Unexpected end of input!".into()),
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
        }
    }
}

impl<I> ParseError<I> for DecodeError<I> {
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        DecodeError::Nom(input, kind)
    }

    fn append(_: I, _: ErrorKind, other: Self) -> Self {
        other
    }
}

impl<I, E> FromExternalError<I, E> for DecodeError<I> {
    fn from_external_error(input: I, kind: ErrorKind, _: E) -> Self {
        DecodeError::Nom(input, kind)
    }
}

pub type IResult<I, T> = nom::IResult<I, T, DecodeError<I>>;

pub(crate) trait InternalDecode<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized;
}

// =====================================================
// ETSI TS 103 097/ IEEE 1609.2 COER primitives
// =====================================================

struct Slice<'i>(&'i [u8]);

impl<'i> From<&'i [u8]> for Slice<'i> {
    fn from(value: &'i [u8]) -> Self {
        Self(value)
    }
}

impl<'i, const SIZE: usize> TryInto<[u8; SIZE]> for Slice<'i> {
    type Error = nom::Err<DecodeError<&'i [u8]>>;

    fn try_into(self) -> Result<[u8; SIZE], Self::Error> {
        if self.0.len() > SIZE {
            return Err(nom::Err::Error(DecodeError::IntegerError(
                "Length exceeds supported integer range!".into(),
            )));
        }
        let mut padded = [0u8; SIZE];
        padded[SIZE - self.0.len()..].copy_from_slice(self.0);
        Ok(padded)
    }
}

fn decode_bytewise_length(input: &[u8]) -> IResult<&[u8], usize> {
    let (input, byte) = take(1usize)(input)?;
    match byte[0] {
        len if len < 128 => Ok((input, len.into())),
        len => {
            let (input, bytes): (&[u8], Slice) =
                into(take::<u8, &[u8], DecodeError<&[u8]>>(len & 0b0111_1111))(input)?;
            let length = bytes.try_into().map(usize::from_be_bytes)?;
            Ok((input, length))
        }
    }
}

macro_rules! int {
    ($typ:ty, $count:expr, $from:path) => {
        map_res(take($count), |bytes: &[u8]| {
            Slice::from(bytes)
                .try_into()
                .map(<$typ>::from_be_bytes)
                .map_err(|e| format!("Failed to read integer: {e:?}"))
                .and_then(|int| $from(int).ok_or("Failed to fit value into integer type!".into()))
                .map_err(|e| nom::Err::Error(DecodeError::<&[u8]>::IntegerError(e)))
        })
    };
}

fn decode_bytewise_integer<I: Integer + FromPrimitive>(
    min: Option<i128>,
    max: Option<i128>,
    input: &[u8],
) -> IResult<&[u8], I> {
    match (min, max) {
        (Some(min), Some(max)) if min >= 0 && max <= 255 => int!(u8, 1usize, I::from_u8)(input),
        (Some(min), Some(max)) if min >= 0 && max <= 65535 => {
            int!(u16, 2usize, I::from_u16)(input)
        }
        (Some(min), Some(max)) if min >= 0 && max <= 4_294_967_295 => {
            int!(u32, 4usize, I::from_u32)(input)
        }
        (Some(min), Some(max)) if min >= 0 && max <= 18_446_744_073_709_551_615 => {
            int!(u64, 8usize, I::from_u64)(input)
        }
        (Some(min), _) if min >= 0 => {
            let (input, length) = decode_bytewise_length(input)?;
            int!(u128, length, I::from_u128)(input)
        }
        (Some(min), Some(max)) if min >= -128 && max <= 127 => int!(i8, 1usize, I::from_i8)(input),
        (Some(min), Some(max)) if min >= -32768 && max <= 32767 => {
            int!(i16, 2usize, I::from_i16)(input)
        }
        (Some(min), Some(max)) if min >= -2_147_483_648 && max <= 2_147_483_647 => {
            int!(i32, 4usize, I::from_i32)(input)
        }
        _ => {
            let (input, length) = decode_bytewise_length(input)?;
            int!(i128, length, I::from_i128)(input)
        }
    }
}

fn decode_bytewise_enumerated<E: TryFrom<i128>>(input: &[u8]) -> IResult<&[u8], E> {
    let (input, byte) = take(1usize)(input)?;
    match byte[0] {
        len if len < 128 => i128::from(len)
            .try_into()
            .map(|variant| (input, variant))
            .map_err(|_| nom::Err::Error(DecodeError::EnumError("Invalid enum index!".into()))),
        len => {
            let (input, bytes): (&[u8], Slice) =
                into(take::<u8, &[u8], DecodeError<&[u8]>>(len & 0b0111_1111))(input)?;
            let value = bytes.try_into().map(i128::from_be_bytes)?;
            value
                .try_into()
                .map(|variant| (input, variant))
                .map_err(|_| nom::Err::Error(DecodeError::EnumError("Invalid enum index!".into())))
        }
    }
}

fn decode_bytewise_bool(input: &[u8]) -> IResult<&[u8], bool> {
    map(take(1usize), |byte: &[u8]| byte[0] != 0)(input)
}

/// Extracts bits from ASN.1 buffer
///
/// First bit is the MSB of the first byte in ASN.1
fn bitslice_to_bitvec(buffer: &[u8], offset: usize, count: usize) -> Vec<bool> {
    (offset..(offset + count))
        .map(|i| {
            let byte_idx = Integer::div_floor(&i, &8);
            let bit_idx = (8 - (i % 8)) - 1;
            (buffer[byte_idx] >> bit_idx & 0x01) > 0
        })
        .collect()
}

/// Decodes ASN.1 SEQUENCE preamble
///
/// Note: Only execute, if there is either an extension bit or optional values present!
/// (Otherwise the sequence preamble will be omitted.)
fn decode_bytewise_sequence_preamble(
    has_extension: bool,
    presence_bits: usize,
    input: &[u8],
) -> IResult<&[u8], (bool, Vec<bool>)> {
    let offset = usize::from(has_extension);
    let (input, preamble) = take(util::bitstring_buffer_size(presence_bits + offset))(input)?;

    let extension = has_extension && (preamble[0] & 0b1000_0000) > 0;
    let bitmap = bitslice_to_bitvec(preamble, offset, presence_bits);

    Ok((input, (extension, bitmap)))
}

// ASN.1 OER "extension addition presence bitmap"
fn decode_bytewise_extension_bitmap(input: &[u8]) -> IResult<&[u8], Vec<bool>> {
    // length includes second (unused_bits) byte and subsequent bytes
    let (input, length) = decode_bytewise_length(input)?;
    if length == 0 {
        return Err(nom::Err::Error(DecodeError::ParserError(
            "Empty extension addition presence bitmap!".into(),
        )));
    }

    let (input, unused_bits) = decode_bytewise_integer::<usize>(Some(0), Some(8), input)?;
    if unused_bits > 7 {
        return Err(nom::Err::Error(DecodeError::ParserError(format!(
            "Extension addition presence bitmap contains invalid unused bits indication: {unused_bits}"
        ))));
    }

    let (input, bytes) = take(length - 1)(input)?;
    let mut bitstring = bitslice_to_bitvec(bytes, 0, bytes.len() * 8);
    bitstring.truncate(bitstring.len().saturating_sub(unused_bits));

    Ok((input, bitstring))
}

/// Consumes the open types of extension additions that are not decoded
fn skip_extensions<'input>(bits: &[bool], mut input: &'input [u8]) -> IResult<&'input [u8], ()> {
    for bit in bits {
        if *bit {
            input = decode_bytewise_octetstring(Some(0), None, input)?.0;
        }
    }
    Ok((input, ()))
}

fn decode_bytewise_octetstring(
    min: Option<usize>,
    max: Option<usize>,
    input: &[u8],
) -> IResult<&[u8], &[u8]> {
    match (min, max) {
        (Some(min), Some(max)) if min == max => take::<usize, &[u8], DecodeError<&[u8]>>(max)(input),
        _ => {
            let (input, length) = decode_bytewise_length(input)?;
            if max.is_some_and(|max| length > max) || min.is_some_and(|min| length < min) {
                return Err(nom::Err::Error(DecodeError::ArrayError(format!(
                    "Octet string length {length} violates size constraint!"
                ))));
            }
            take::<usize, &[u8], DecodeError<&[u8]>>(length)(input)
        }
    }
}

fn decode_bytewise_string(input: &[u8]) -> IResult<&[u8], String> {
    let (input, bytes) = decode_bytewise_octetstring(Some(0), None, input)?;
    let string = String::from_utf8(bytes.to_vec()).map_err(|_| {
        nom::Err::Error(DecodeError::StringError(
            "Unable to decode UTF8 bytes!".into(),
        ))
    })?;
    Ok((input, string))
}

fn decode_bytewise_tag(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, byte) = take(1usize)(input)?;
    match byte[0] & 0b0011_1111 {
        tag if tag < 63 => Ok((input, tag.into())),
        _ => Err(nom::Err::Error(DecodeError::EnumError(
            "Tags larger than 62 are unsupported!".into(),
        ))),
    }
}

fn decode_bytewise_open_type<'input, T, F>(
    decoder: F,
    input: &'input [u8],
) -> IResult<&'input [u8], T>
where
    F: Fn(&'input [u8]) -> IResult<&'input [u8], T>,
{
    let (input, length) = decode_bytewise_length(input)?;
    let (input, content) = take(length)(input)?;
    let (_, decoded) = decoder(content)?;
    Ok((input, decoded))
}

fn invalid_choice<'input, T>() -> IResult<&'input [u8], T> {
    Err(nom::Err::Error(DecodeError::EnumError(
        "Invalid choice index!".into(),
    )))
}

macro_rules! optional {
    ($present:expr, $decoder:expr, $input:expr) => {
        if $present {
            map($decoder, Some)($input)?
        } else {
            ($input, None)
        }
    };
}

macro_rules! uint {
    ($typ:ty, $max:expr) => {
        impl<'s> InternalDecode<'s> for $typ {
            fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
            where
                Self: Sized,
            {
                let (input, inner) = decode_bytewise_integer(Some(0), $max, input)?;
                Ok((input, Self(inner)))
            }
        }
    };
}

uint!(Uint8, Some(255));
uint!(PduFunctionalType, Some(255));
uint!(Uint16, Some(65535));
uint!(Uint32, Some(4_294_967_295));
uint!(Uint64, Some(18_446_744_073_709_551_615));
uint!(Psid, None);

macro_rules! octets {
    ($typ:ty, $min:expr, $max:expr) => {
        impl<'s> InternalDecode<'s> for $typ {
            fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
            where
                Self: Sized,
            {
                let (input, inner) = decode_bytewise_octetstring($min, $max, input)?;
                Ok((input, Self(inner)))
            }
        }
    };
}

octets!(HashedId3<'s>, Some(3), Some(3));
octets!(HashedId8<'s>, Some(8), Some(8));
octets!(HashedId32<'s>, Some(32), Some(32));
octets!(HashedId48<'s>, Some(48), Some(48));
octets!(Opaque<'s>, Some(0), None);
octets!(BitmapSsp<'s>, Some(0), Some(31));
octets!(SubjectAssurance<'s>, Some(1), Some(1));

macro_rules! enumerated {
    ($typ:ty) => {
        impl<'s> InternalDecode<'s> for $typ {
            fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
            where
                Self: Sized,
            {
                decode_bytewise_enumerated(input)
            }
        }
    };
}

enumerated!(HashAlgorithm);
enumerated!(SymmAlgorithm);
enumerated!(CertificateType);
enumerated!(ResponseCode);

macro_rules! sequence_of {
    ($typ:ty, $inner:ty) => {
        impl<'s> InternalDecode<'s> for $typ {
            fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
            where
                Self: Sized,
            {
                let mut sequence_of = vec![];
                let (mut input, count) = decode_bytewise_integer::<usize>(Some(0), None, input)?;
                for _ in 0..count {
                    let (rem, item) = <$inner>::decode_bytewise(input)?;
                    input = rem;
                    sequence_of.push(item);
                }
                Ok((input, Self(sequence_of)))
            }
        }
    };
}

sequence_of!(SequenceOfUint8, Uint8);
sequence_of!(SequenceOfUint16, Uint16);
sequence_of!(SequenceOfHashedId3<'s>, HashedId3);
sequence_of!(SequenceOfHashedId8<'s>, HashedId8);
sequence_of!(SequenceOfRectangularRegion, RectangularRegion);
sequence_of!(SequenceOfIdentifiedRegion, IdentifiedRegion);
sequence_of!(SequenceOfRegionAndSubregions, RegionAndSubregions);
sequence_of!(SequenceOfPsidSsp<'s>, PsidSsp);
sequence_of!(SequenceOfPsidSspRange<'s>, PsidSspRange);
sequence_of!(SequenceOfRecipientInfo<'s>, RecipientInfo);
sequence_of!(SequenceOfCertificate<'s>, Certificate);
sequence_of!(SequenceOfPsidGroupPermissions<'s>, PsidGroupPermissions);
sequence_of!(PolygonalRegion, TwoDLocation);

impl<'s> InternalDecode<'s> for SequenceOfOctetString<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let mut sequence_of = vec![];
        let (mut input, count) = decode_bytewise_integer::<usize>(Some(0), None, input)?;
        for _ in 0..count {
            let (rem, item) = decode_bytewise_octetstring(Some(0), None, input)?;
            input = rem;
            sequence_of.push(item);
        }
        Ok((input, Self(sequence_of)))
    }
}

impl<'s> InternalDecode<'s> for Hostname {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, hostname) = decode_bytewise_string(input)?;
        Ok((input, Self(hostname)))
    }
}

impl<'s> InternalDecode<'s> for Url {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, url) = decode_bytewise_string(input)?;
        if !url.is_ascii() {
            return Err(nom::Err::Error(DecodeError::StringError(
                "IA5String contains non-ASCII characters!".into(),
            )));
        }
        Ok((input, Self(url)))
    }
}

// =====================================================
// Time, location and regions
// =====================================================

impl<'s> InternalDecode<'s> for Duration {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        let (input, inner) = Uint16::decode_bytewise(input)?;
        match tag {
            0 => Ok((input, Duration::Microseconds(inner))),
            1 => Ok((input, Duration::Milliseconds(inner))),
            2 => Ok((input, Duration::Seconds(inner))),
            3 => Ok((input, Duration::Minutes(inner))),
            4 => Ok((input, Duration::Hours(inner))),
            5 => Ok((input, Duration::SixtyHours(inner))),
            6 => Ok((input, Duration::Years(inner))),
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for ValidityPeriod {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, start) = Time32::decode_bytewise(input)?;
        let (input, duration) = Duration::decode_bytewise(input)?;
        Ok((input, Self { start, duration }))
    }
}

impl<'s> InternalDecode<'s> for NinetyDegreeInt {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, int) = decode_bytewise_integer(Some(-900_000_000), Some(900_000_001), input)?;
        Ok((input, Self(int)))
    }
}

impl<'s> InternalDecode<'s> for OneEightyDegreeInt {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, int) =
            decode_bytewise_integer(Some(-1_799_999_999), Some(1_800_000_001), input)?;
        Ok((input, Self(int)))
    }
}

impl<'s> InternalDecode<'s> for TwoDLocation {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, latitude) = Latitude::decode_bytewise(input)?;
        let (input, longitude) = Longitude::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                latitude,
                longitude,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for ThreeDLocation {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, latitude) = Latitude::decode_bytewise(input)?;
        let (input, longitude) = Longitude::decode_bytewise(input)?;
        let (input, elevation) = Elevation::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                latitude,
                longitude,
                elevation,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CircularRegion {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, center) = TwoDLocation::decode_bytewise(input)?;
        let (input, radius) = Uint16::decode_bytewise(input)?;
        Ok((input, Self { center, radius }))
    }
}

impl<'s> InternalDecode<'s> for RectangularRegion {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, north_west) = TwoDLocation::decode_bytewise(input)?;
        let (input, south_east) = TwoDLocation::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                north_west,
                south_east,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CountryAndRegions {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, country_only) = UnCountryId::decode_bytewise(input)?;
        let (input, regions) = SequenceOfUint8::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                country_only,
                regions,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for RegionAndSubregions {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, region) = Uint8::decode_bytewise(input)?;
        let (input, subregions) = SequenceOfUint16::decode_bytewise(input)?;
        Ok((input, Self { region, subregions }))
    }
}

impl<'s> InternalDecode<'s> for CountryAndSubregions {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, country_only) = UnCountryId::decode_bytewise(input)?;
        let (input, region_and_subregions) = SequenceOfRegionAndSubregions::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                country_only,
                region_and_subregions,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for IdentifiedRegion {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, region) = UnCountryId::decode_bytewise(input)?;
                Ok((input, IdentifiedRegion::CountryOnly(region)))
            }
            1 => {
                let (input, region) = CountryAndRegions::decode_bytewise(input)?;
                Ok((input, IdentifiedRegion::CountryAndRegions(region)))
            }
            2 => {
                let (input, region) = CountryAndSubregions::decode_bytewise(input)?;
                Ok((input, IdentifiedRegion::CountryAndSubregions(region)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for GeographicRegion {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, region) = CircularRegion::decode_bytewise(input)?;
                Ok((input, GeographicRegion::CircularRegion(region)))
            }
            1 => {
                let (input, region) = SequenceOfRectangularRegion::decode_bytewise(input)?;
                Ok((input, GeographicRegion::RectangularRegion(region)))
            }
            2 => {
                let (input, region) = PolygonalRegion::decode_bytewise(input)?;
                if region.0.len() < 3 {
                    return Err(nom::Err::Error(DecodeError::ArrayError(
                        "Polygonal region needs at least three points!".into(),
                    )));
                }
                Ok((input, GeographicRegion::PolygonalRegion(region)))
            }
            3 => {
                let (input, region) = SequenceOfIdentifiedRegion::decode_bytewise(input)?;
                Ok((input, GeographicRegion::IdentifiedRegion(region)))
            }
            _ => invalid_choice(),
        }
    }
}

// =====================================================
// Curve points, keys and signatures
// =====================================================

macro_rules! curve_point {
    ($typ:ident, $uncompressed:ident, $variant:ident, $size:expr) => {
        impl<'s> InternalDecode<'s> for $uncompressed<'s> {
            fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
            where
                Self: Sized,
            {
                let (input, x) = decode_bytewise_octetstring(Some($size), Some($size), input)?;
                let (input, y) = decode_bytewise_octetstring(Some($size), Some($size), input)?;
                Ok((input, Self { x, y }))
            }
        }

        impl<'s> InternalDecode<'s> for $typ<'s> {
            fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
            where
                Self: Sized,
            {
                let (input, tag) = decode_bytewise_tag(input)?;
                match tag {
                    0 => {
                        let (input, bytes) =
                            decode_bytewise_octetstring(Some($size), Some($size), input)?;
                        Ok((input, $typ::XOnly(bytes)))
                    }
                    1 => Ok((input, $typ::Fill(()))),
                    2 => {
                        let (input, bytes) =
                            decode_bytewise_octetstring(Some($size), Some($size), input)?;
                        Ok((input, $typ::CompressedY0(bytes)))
                    }
                    3 => {
                        let (input, bytes) =
                            decode_bytewise_octetstring(Some($size), Some($size), input)?;
                        Ok((input, $typ::CompressedY1(bytes)))
                    }
                    4 => {
                        let (input, inner) = $uncompressed::decode_bytewise(input)?;
                        Ok((input, $typ::$variant(inner)))
                    }
                    _ => invalid_choice(),
                }
            }
        }
    };
}

curve_point!(
    EccP256CurvePoint,
    EccP256CurvePointUncompressedP256,
    UncompressedP256,
    32
);
curve_point!(
    EccP384CurvePoint,
    EccP384CurvePointUncompressedP384,
    UncompressedP384,
    48
);

impl<'s> InternalDecode<'s> for EcdsaP256Signature<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, r_sig) = EccP256CurvePoint::decode_bytewise(input)?;
        let (input, s_sig) = decode_bytewise_octetstring(Some(32), Some(32), input)?;
        Ok((input, Self { r_sig, s_sig }))
    }
}

impl<'s> InternalDecode<'s> for EcdsaP384Signature<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, r_sig) = EccP384CurvePoint::decode_bytewise(input)?;
        let (input, s_sig) = decode_bytewise_octetstring(Some(48), Some(48), input)?;
        Ok((input, Self { r_sig, s_sig }))
    }
}

impl<'s> InternalDecode<'s> for Signature<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, sig) = EcdsaP256Signature::decode_bytewise(input)?;
                Ok((input, Signature::EcdsaNistP256Signature(sig)))
            }
            1 => {
                let (input, sig) = EcdsaP256Signature::decode_bytewise(input)?;
                Ok((input, Signature::EcdsaBrainpoolP256r1Signature(sig)))
            }
            2 => {
                let (input, sig) =
                    decode_bytewise_open_type(EcdsaP384Signature::decode_bytewise, input)?;
                Ok((input, Signature::EcdsaBrainpoolP384r1Signature(sig)))
            }
            3 => {
                let (input, sig) =
                    decode_bytewise_open_type(EcdsaP384Signature::decode_bytewise, input)?;
                Ok((input, Signature::EcdsaNistP384Signature(sig)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for PublicVerificationKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, point) = EccP256CurvePoint::decode_bytewise(input)?;
                Ok((input, PublicVerificationKey::EcdsaNistP256(point)))
            }
            1 => {
                let (input, point) = EccP256CurvePoint::decode_bytewise(input)?;
                Ok((input, PublicVerificationKey::EcdsaBrainpoolP256r1(point)))
            }
            2 => {
                let (input, point) =
                    decode_bytewise_open_type(EccP384CurvePoint::decode_bytewise, input)?;
                Ok((input, PublicVerificationKey::EcdsaBrainpoolP384r1(point)))
            }
            3 => {
                let (input, point) =
                    decode_bytewise_open_type(EccP384CurvePoint::decode_bytewise, input)?;
                Ok((input, PublicVerificationKey::EcdsaNistP384(point)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for BasePublicEncryptionKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, pt) = EccP256CurvePoint::decode_bytewise(input)?;
                Ok((input, BasePublicEncryptionKey::EciesNistP256(pt)))
            }
            1 => {
                let (input, pt) = EccP256CurvePoint::decode_bytewise(input)?;
                Ok((input, BasePublicEncryptionKey::EciesBrainpoolP256r1(pt)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for PublicEncryptionKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, supported_symm_alg) = SymmAlgorithm::decode_bytewise(input)?;
        let (input, public_key) = BasePublicEncryptionKey::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                supported_symm_alg,
                public_key,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for SymmetricEncryptionKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, aes) = decode_bytewise_octetstring(Some(16), Some(16), input)?;
                Ok((input, SymmetricEncryptionKey::Aes128Ccm(aes)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for EncryptionKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, public) = PublicEncryptionKey::decode_bytewise(input)?;
                Ok((input, EncryptionKey::Public(public)))
            }
            1 => {
                let (input, symm) = SymmetricEncryptionKey::decode_bytewise(input)?;
                Ok((input, EncryptionKey::Symmetric(symm)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for VerificationKeyIndicator<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, key) = PublicVerificationKey::decode_bytewise(input)?;
                Ok((input, VerificationKeyIndicator::VerificationKey(key)))
            }
            1 => {
                let (input, val) = EccP256CurvePoint::decode_bytewise(input)?;
                Ok((input, VerificationKeyIndicator::ReconstructionValue(val)))
            }
            _ => invalid_choice(),
        }
    }
}

// =====================================================
// Permissions
// =====================================================

impl<'s> InternalDecode<'s> for ServiceSpecificPermissions<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, opaque) = decode_bytewise_octetstring(Some(0), None, input)?;
                Ok((input, ServiceSpecificPermissions::Opaque(opaque)))
            }
            1 => {
                let (input, bitmap_ssp) =
                    decode_bytewise_open_type(BitmapSsp::decode_bytewise, input)?;
                Ok((input, ServiceSpecificPermissions::BitmapSsp(bitmap_ssp)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for PsidSsp<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;

        let (input, psid) = Psid::decode_bytewise(input)?;
        let (input, ssp) = optional!(bitmap[0], ServiceSpecificPermissions::decode_bytewise, input);
        Ok((input, Self { psid, ssp }))
    }
}

impl<'s> InternalDecode<'s> for BitmapSspRange<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, ssp_value) = decode_bytewise_octetstring(Some(1), Some(32), input)?;
        let (input, ssp_bitmask) = decode_bytewise_octetstring(Some(1), Some(32), input)?;
        Ok((
            input,
            Self {
                ssp_value,
                ssp_bitmask,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for SspRange<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, opaque) = SequenceOfOctetString::decode_bytewise(input)?;
                Ok((input, SspRange::Opaque(opaque)))
            }
            1 => Ok((input, SspRange::All(()))),
            2 => {
                let (input, range) =
                    decode_bytewise_open_type(BitmapSspRange::decode_bytewise, input)?;
                Ok((input, SspRange::BitmapSspRange(range)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for PsidSspRange<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;

        let (input, psid) = Psid::decode_bytewise(input)?;
        let (input, ssp_range) = optional!(bitmap[0], SspRange::decode_bytewise, input);
        Ok((input, Self { psid, ssp_range }))
    }
}

impl<'s> InternalDecode<'s> for SubjectPermissions<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, exp) = SequenceOfPsidSspRange::decode_bytewise(input)?;
                Ok((input, SubjectPermissions::Explicit(exp)))
            }
            1 => Ok((input, SubjectPermissions::All(()))),
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for PsidGroupPermissions<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 3, input)?;

        let (input, subject_permissions) = SubjectPermissions::decode_bytewise(input)?;
        let (input, min_chain_length) = if bitmap[0] {
            decode_bytewise_integer(Some(0), None, input)?
        } else {
            (input, 1)
        };
        let (input, chain_length_range) = if bitmap[1] {
            decode_bytewise_integer(Some(0), None, input)?
        } else {
            (input, 0)
        };
        let (input, ee_type) = if bitmap[2] {
            map(take(1usize), |byte: &[u8]| EndEntityType(byte[0]))(input)?
        } else {
            (input, EndEntityType::default())
        };
        Ok((
            input,
            Self {
                subject_permissions,
                min_chain_length,
                chain_length_range,
                ee_type,
            },
        ))
    }
}

// =====================================================
// Certificates
// =====================================================

impl<'s> InternalDecode<'s> for GroupLinkageValue<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, j_value) = decode_bytewise_octetstring(Some(4), Some(4), input)?;
        let (input, value) = decode_bytewise_octetstring(Some(9), Some(9), input)?;
        Ok((input, Self { j_value, value }))
    }
}

impl<'s> InternalDecode<'s> for LinkageData<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;

        let (input, i_cert) = IValue::decode_bytewise(input)?;
        let (input, linkage_value) = decode_bytewise_octetstring(Some(9), Some(9), input)?;
        let (input, group_linkage_value) =
            optional!(bitmap[0], GroupLinkageValue::decode_bytewise, input);
        Ok((
            input,
            Self {
                i_cert,
                linkage_value,
                group_linkage_value,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CertificateId<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, id) = LinkageData::decode_bytewise(input)?;
                Ok((input, CertificateId::LinkageData(id)))
            }
            1 => {
                let (input, id) = Hostname::decode_bytewise(input)?;
                Ok((input, CertificateId::Name(id)))
            }
            2 => {
                let (input, id) = decode_bytewise_octetstring(Some(1), Some(64), input)?;
                Ok((input, CertificateId::BinaryId(id)))
            }
            3 => Ok((input, CertificateId::None(()))),
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for IssuerIdentifier<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, id) = HashedId8::decode_bytewise(input)?;
                Ok((input, IssuerIdentifier::Sha256AndDigest(id)))
            }
            1 => {
                let (input, id) = HashAlgorithm::decode_bytewise(input)?;
                Ok((input, IssuerIdentifier::RsSelf(id)))
            }
            2 => {
                let (input, id) = decode_bytewise_open_type(HashedId8::decode_bytewise, input)?;
                Ok((input, IssuerIdentifier::Sha384AndDigest(id)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for ToBeSignedCertificate<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input_before, length_before) = (input, input.len());

        let (input, (extended, bitmap)) = decode_bytewise_sequence_preamble(true, 7, input)?;

        let (input, id) = CertificateId::decode_bytewise(input)?;
        let (input, craca_id) = HashedId3::decode_bytewise(input)?;
        let (input, crl_series) = CrlSeries::decode_bytewise(input)?;
        let (input, validity_period) = ValidityPeriod::decode_bytewise(input)?;
        let (input, region) = optional!(bitmap[0], GeographicRegion::decode_bytewise, input);
        let (input, assurance_level) =
            optional!(bitmap[1], SubjectAssurance::decode_bytewise, input);
        let (input, app_permissions) =
            optional!(bitmap[2], SequenceOfPsidSsp::decode_bytewise, input);
        let (input, cert_issue_permissions) = optional!(
            bitmap[3],
            SequenceOfPsidGroupPermissions::decode_bytewise,
            input
        );
        let (input, cert_request_permissions) = optional!(
            bitmap[4],
            SequenceOfPsidGroupPermissions::decode_bytewise,
            input
        );
        let can_request_rollover = bitmap[5];
        let (input, encryption_key) =
            optional!(bitmap[6], PublicEncryptionKey::decode_bytewise, input);
        let (input, verify_key_indicator) = VerificationKeyIndicator::decode_bytewise(input)?;
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                id,
                craca_id,
                crl_series,
                validity_period,
                region,
                assurance_level,
                app_permissions,
                cert_issue_permissions,
                cert_request_permissions,
                can_request_rollover,
                encryption_key,
                verify_key_indicator,
                raw: &input_before[..length_before - input.len()],
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CertificateBase<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input_before, length_before) = (input, input.len());

        let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;

        let (input, version) = Uint8::decode_bytewise(input)?;
        let (input, r_type) = CertificateType::decode_bytewise(input)?;
        let (input, issuer) = IssuerIdentifier::decode_bytewise(input)?;
        let (input, to_be_signed) = ToBeSignedCertificate::decode_bytewise(input)?;
        let (input, signature) = optional!(bitmap[0], Signature::decode_bytewise, input);
        Ok((
            input,
            Self {
                version,
                r_type,
                issuer,
                to_be_signed,
                signature,
                raw: &input_before[..length_before - input.len()],
            },
        ))
    }
}

// =====================================================
// Secured data
// =====================================================

impl<'s> InternalDecode<'s> for HashedData<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, hash) = HashedId32::decode_bytewise(input)?;
                Ok((input, HashedData::Sha256HashedData(hash)))
            }
            1 => {
                let (input, hash) = decode_bytewise_open_type(HashedId48::decode_bytewise, input)?;
                Ok((input, HashedData::Sha384HashedData(hash)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for Ieee1609Dot2Data<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, protocol_version) = Uint8::decode_bytewise(input)?;
        let (input, content) = Ieee1609Dot2Content::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                protocol_version,
                content,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for Ieee1609Dot2Content<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, content) = Opaque::decode_bytewise(input)?;
                Ok((input, Ieee1609Dot2Content::UnsecuredData(content)))
            }
            1 => {
                let (input, content) = SignedData::decode_bytewise(input)?;
                Ok((input, Ieee1609Dot2Content::SignedData(Box::new(content))))
            }
            2 => {
                let (input, content) = EncryptedData::decode_bytewise(input)?;
                Ok((input, Ieee1609Dot2Content::EncryptedData(content)))
            }
            3 => {
                let (input, content) = Opaque::decode_bytewise(input)?;
                Ok((
                    input,
                    Ieee1609Dot2Content::SignedCertificateRequest(content),
                ))
            }
            4 => {
                let (input, content) = decode_bytewise_open_type(Opaque::decode_bytewise, input)?;
                Ok((
                    input,
                    Ieee1609Dot2Content::SignedX509CertificateRequest(content),
                ))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for SignedData<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, hash_id) = HashAlgorithm::decode_bytewise(input)?;
        let (input, tbs_data) = ToBeSignedData::decode_bytewise(input)?;
        let (input, signer) = SignerIdentifier::decode_bytewise(input)?;
        let (input, signature) = Signature::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                hash_id,
                tbs_data,
                signer,
                signature,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for ToBeSignedData<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input_before, length_before) = (input, input.len());
        let (input, payload) = SignedDataPayload::decode_bytewise(input)?;
        let (input, header_info) = HeaderInfo::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                payload,
                header_info,
                raw: &input_before[..length_before - input.len()],
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for SignedDataPayload<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, bitmap)) = decode_bytewise_sequence_preamble(true, 2, input)?;

        let (input, data) = optional!(bitmap[0], Ieee1609Dot2Data::decode_bytewise, input);
        let (input, ext_data_hash) = optional!(bitmap[1], HashedData::decode_bytewise, input);
        let (input, ()) = if extended {
            // omitted (NULL) is the only extension, nothing to keep
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        if data.is_none() && ext_data_hash.is_none() {
            return Err(nom::Err::Error(DecodeError::ParserError(
                "Signed data payload contains neither data nor a hash!".into(),
            )));
        }
        Ok((
            input,
            Self {
                data: data.map(Box::new),
                ext_data_hash,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for MissingCrlIdentifier<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, _)) = decode_bytewise_sequence_preamble(true, 0, input)?;

        let (input, craca_id) = HashedId3::decode_bytewise(input)?;
        let (input, crl_series) = CrlSeries::decode_bytewise(input)?;
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };

        Ok((
            input,
            Self {
                craca_id,
                crl_series,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for HeaderInfo<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, bitmap)) = decode_bytewise_sequence_preamble(true, 6, input)?;

        let (input, psid) = Psid::decode_bytewise(input)?;
        let (input, generation_time) = optional!(bitmap[0], Time64::decode_bytewise, input);
        let (input, expiry_time) = optional!(bitmap[1], Time64::decode_bytewise, input);
        let (input, generation_location) =
            optional!(bitmap[2], ThreeDLocation::decode_bytewise, input);
        let (input, p2pcd_learning_request) =
            optional!(bitmap[3], HashedId3::decode_bytewise, input);
        let (input, missing_crl_identifier) =
            optional!(bitmap[4], MissingCrlIdentifier::decode_bytewise, input);
        let (input, encryption_key) = optional!(bitmap[5], EncryptionKey::decode_bytewise, input);
        let mut header = Self {
            psid,
            generation_time,
            expiry_time,
            generation_location,
            p2pcd_learning_request,
            missing_crl_identifier,
            encryption_key,
            inline_p2pcd_request: None,
            requested_certificate: None,
            pdu_functional_type: None,
        };
        if !extended {
            return Ok((input, header));
        }

        let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
        let is_set = |idx: usize| ext_bitmap.get(idx).is_some_and(|bit| *bit);
        let (input, inline_p2pcd_request) = if is_set(0) {
            map(
                |i: &'input [u8]| decode_bytewise_open_type(SequenceOfHashedId3::decode_bytewise, i),
                Some,
            )(input)?
        } else {
            (input, None)
        };
        let (input, requested_certificate) = if is_set(1) {
            map(
                |i: &'input [u8]| decode_bytewise_open_type(Certificate::decode_bytewise, i),
                Some,
            )(input)?
        } else {
            (input, None)
        };
        let (input, pdu_functional_type) = if is_set(2) {
            map(
                |i: &'input [u8]| decode_bytewise_open_type(PduFunctionalType::decode_bytewise, i),
                Some,
            )(input)?
        } else {
            (input, None)
        };
        // contributed extensions and unknown additions
        let (input, ()) = skip_extensions(ext_bitmap.get(3..).unwrap_or_default(), input)?;

        header.inline_p2pcd_request = inline_p2pcd_request;
        header.requested_certificate = requested_certificate;
        header.pdu_functional_type = pdu_functional_type;
        Ok((input, header))
    }
}

impl<'s> InternalDecode<'s> for SignerIdentifier<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, id) = HashedId8::decode_bytewise(input)?;
                Ok((input, SignerIdentifier::Digest(id)))
            }
            1 => {
                let (input, certs) = SequenceOfCertificate::decode_bytewise(input)?;
                if certs.0.is_empty() {
                    return Err(nom::Err::Error(DecodeError::ArrayError(
                        "Signer certificate sequence is empty!".into(),
                    )));
                }
                Ok((input, SignerIdentifier::Certificate(certs)))
            }
            2 => Ok((input, SignerIdentifier::RsSelf(()))),
            _ => invalid_choice(),
        }
    }
}

// =====================================================
// Encrypted data
// =====================================================

impl<'s> InternalDecode<'s> for EncryptedData<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, recipients) = SequenceOfRecipientInfo::decode_bytewise(input)?;
        let (input, ciphertext) = SymmetricCiphertext::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                recipients,
                ciphertext,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for RecipientInfo<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, info) = HashedId8::decode_bytewise(input)?;
                Ok((input, RecipientInfo::PskRecipInfo(info)))
            }
            1 => {
                let (input, info) = SymmRecipientInfo::decode_bytewise(input)?;
                Ok((input, RecipientInfo::SymmRecipInfo(info)))
            }
            2 => {
                let (input, info) = PKRecipientInfo::decode_bytewise(input)?;
                Ok((input, RecipientInfo::CertRecipInfo(info)))
            }
            3 => {
                let (input, info) = PKRecipientInfo::decode_bytewise(input)?;
                Ok((input, RecipientInfo::SignedDataRecipInfo(info)))
            }
            4 => {
                let (input, info) = PKRecipientInfo::decode_bytewise(input)?;
                Ok((input, RecipientInfo::RekRecipInfo(info)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for SymmRecipientInfo<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, recipient_id) = HashedId8::decode_bytewise(input)?;
        let (input, enc_key) = SymmetricCiphertext::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                recipient_id,
                enc_key,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for PKRecipientInfo<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, recipient_id) = HashedId8::decode_bytewise(input)?;
        let (input, enc_key) = EncryptedDataEncryptionKey::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                recipient_id,
                enc_key,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for EciesP256EncryptedKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, v) = EccP256CurvePoint::decode_bytewise(input)?;
        let (input, c) = decode_bytewise_octetstring(Some(16), Some(16), input)?;
        let (input, t) = decode_bytewise_octetstring(Some(16), Some(16), input)?;
        Ok((input, Self { v, c, t }))
    }
}

impl<'s> InternalDecode<'s> for EncryptedDataEncryptionKey<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, key) = EciesP256EncryptedKey::decode_bytewise(input)?;
                Ok((input, EncryptedDataEncryptionKey::EciesNistP256(key)))
            }
            1 => {
                let (input, key) = EciesP256EncryptedKey::decode_bytewise(input)?;
                Ok((input, EncryptedDataEncryptionKey::EciesBrainpoolP256r1(key)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for One28BitCcmCiphertext<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, nonce) = decode_bytewise_octetstring(Some(12), Some(12), input)?;
        let (input, ccm_ciphertext) = Opaque::decode_bytewise(input)?;
        Ok((
            input,
            Self {
                nonce,
                ccm_ciphertext,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for SymmetricCiphertext<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, cipher) = One28BitCcmCiphertext::decode_bytewise(input)?;
                Ok((input, SymmetricCiphertext::Aes128ccm(cipher)))
            }
            _ => invalid_choice(),
        }
    }
}

// =====================================================
// ETSI TS 102 941
// =====================================================

impl<'s> InternalDecode<'s> for EtsiTs102941Data<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, version) = Uint8::decode_bytewise(input)?;
        let (input, content) = EtsiTs102941DataContent::decode_bytewise(input)?;
        Ok((input, Self { version, content }))
    }
}

impl<'s> InternalDecode<'s> for EtsiTs102941DataContent<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, request) = Ieee1609Dot2Data::decode_bytewise(input)?;
                Ok((input, EtsiTs102941DataContent::EnrolmentRequest(request)))
            }
            1 => {
                let (input, response) = InnerEcResponse::decode_bytewise(input)?;
                Ok((input, EtsiTs102941DataContent::EnrolmentResponse(response)))
            }
            2 => {
                let (input, request) = InnerAtRequest::decode_bytewise(input)?;
                Ok((input, EtsiTs102941DataContent::AuthorizationRequest(request)))
            }
            3 => {
                let (input, response) = InnerAtResponse::decode_bytewise(input)?;
                Ok((
                    input,
                    EtsiTs102941DataContent::AuthorizationResponse(response),
                ))
            }
            4 => {
                let (input, crl) = ToBeSignedCrl::decode_bytewise(input)?;
                Ok((
                    input,
                    EtsiTs102941DataContent::CertificateRevocationList(crl),
                ))
            }
            5 => {
                let (input, ctl) = CtlFormat::decode_bytewise(input)?;
                Ok((input, EtsiTs102941DataContent::CertificateTrustListTlm(ctl)))
            }
            6 => {
                let (input, ctl) = CtlFormat::decode_bytewise(input)?;
                Ok((input, EtsiTs102941DataContent::CertificateTrustListRca(ctl)))
            }
            _ => Err(nom::Err::Error(DecodeError::EnumError(
                "Unsupported TS 102 941 data content!".into(),
            ))),
        }
    }
}

impl<'s> InternalDecode<'s> for ToBeSignedCrl<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, _)) = decode_bytewise_sequence_preamble(true, 0, input)?;

        let (input, version) = Uint8::decode_bytewise(input)?;
        let (input, this_update) = Time32::decode_bytewise(input)?;
        let (input, next_update) = Time32::decode_bytewise(input)?;
        let (input, entries) = SequenceOfHashedId8::decode_bytewise(input)?;
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                version,
                this_update,
                next_update,
                entries,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CtlFormat<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, _)) = decode_bytewise_sequence_preamble(true, 0, input)?;

        let (input, version) = Uint8::decode_bytewise(input)?;
        let (input, next_update) = Time32::decode_bytewise(input)?;
        let (input, is_full_ctl) = decode_bytewise_bool(input)?;
        let (input, ctl_sequence) = Uint8::decode_bytewise(input)?;
        let (mut input, count) = decode_bytewise_integer::<usize>(Some(0), None, input)?;
        let mut ctl_commands = vec![];
        for _ in 0..count {
            let (rem, command) = CtlCommand::decode_bytewise(input)?;
            input = rem;
            ctl_commands.push(command);
        }
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                version,
                next_update,
                is_full_ctl,
                ctl_sequence,
                ctl_commands,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CtlCommand<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, entry) = CtlEntry::decode_bytewise(input)?;
                Ok((input, CtlCommand::Add(entry)))
            }
            1 => {
                let (input, delete) = CtlDelete::decode_bytewise(input)?;
                Ok((input, CtlCommand::Delete(delete)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for CtlEntry<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;
                let (input, self_signed_root_ca) = Certificate::decode_bytewise(input)?;
                let (input, successor_to) =
                    optional!(bitmap[0], Certificate::decode_bytewise, input);
                Ok((
                    input,
                    CtlEntry::Rca(RootCaEntry {
                        self_signed_root_ca,
                        successor_to,
                    }),
                ))
            }
            1 => {
                let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;
                let (input, ea_certificate) = Certificate::decode_bytewise(input)?;
                let (input, aa_access_point) = Url::decode_bytewise(input)?;
                let (input, its_access_point) = optional!(bitmap[0], Url::decode_bytewise, input);
                Ok((
                    input,
                    CtlEntry::Ea(EaEntry {
                        ea_certificate,
                        aa_access_point,
                        its_access_point,
                    }),
                ))
            }
            2 => {
                let (input, aa_certificate) = Certificate::decode_bytewise(input)?;
                let (input, access_point) = Url::decode_bytewise(input)?;
                Ok((
                    input,
                    CtlEntry::Aa(AaEntry {
                        aa_certificate,
                        access_point,
                    }),
                ))
            }
            3 => {
                let (input, url) = Url::decode_bytewise(input)?;
                let (input, cert) = SequenceOfHashedId8::decode_bytewise(input)?;
                Ok((input, CtlEntry::Dc(DcEntry { url, cert })))
            }
            4 => {
                let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;
                let (input, self_signed_tlm_certificate) = Certificate::decode_bytewise(input)?;
                let (input, successor_to) =
                    optional!(bitmap[0], Certificate::decode_bytewise, input);
                let (input, access_point) = Url::decode_bytewise(input)?;
                Ok((
                    input,
                    CtlEntry::Tlm(TlmEntry {
                        self_signed_tlm_certificate,
                        successor_to,
                        access_point,
                    }),
                ))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for CtlDelete<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, digest) = HashedId8::decode_bytewise(input)?;
                Ok((input, CtlDelete::Cert(digest)))
            }
            1 => {
                let (input, url) = Url::decode_bytewise(input)?;
                Ok((input, CtlDelete::Dc(url)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for PublicKeys<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (_, bitmap)) = decode_bytewise_sequence_preamble(false, 1, input)?;
        let (input, verification_key) = PublicVerificationKey::decode_bytewise(input)?;
        let (input, encryption_key) =
            optional!(bitmap[0], PublicEncryptionKey::decode_bytewise, input);
        Ok((
            input,
            Self {
                verification_key,
                encryption_key,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for CertificateSubjectAttributes<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, bitmap)) = decode_bytewise_sequence_preamble(true, 6, input)?;

        let (input, id) = optional!(bitmap[0], CertificateId::decode_bytewise, input);
        let (input, validity_period) = optional!(bitmap[1], ValidityPeriod::decode_bytewise, input);
        let (input, region) = optional!(bitmap[2], GeographicRegion::decode_bytewise, input);
        let (input, assurance_level) =
            optional!(bitmap[3], SubjectAssurance::decode_bytewise, input);
        let (input, app_permissions) =
            optional!(bitmap[4], SequenceOfPsidSsp::decode_bytewise, input);
        let (input, cert_issue_permissions) = optional!(
            bitmap[5],
            SequenceOfPsidGroupPermissions::decode_bytewise,
            input
        );
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                id,
                validity_period,
                region,
                assurance_level,
                app_permissions,
                cert_issue_permissions,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for InnerEcRequest<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, _)) = decode_bytewise_sequence_preamble(true, 0, input)?;

        let (input, its_id) = decode_bytewise_octetstring(Some(0), None, input)?;
        let (input, certificate_format) = Uint8::decode_bytewise(input)?;
        let (input, public_keys) = PublicKeys::decode_bytewise(input)?;
        let (input, requested_subject_attributes) =
            CertificateSubjectAttributes::decode_bytewise(input)?;
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                its_id,
                certificate_format,
                public_keys,
                requested_subject_attributes,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for InnerEcResponse<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, bitmap)) = decode_bytewise_sequence_preamble(true, 1, input)?;

        let (input, request_hash) = decode_bytewise_octetstring(Some(16), Some(16), input)?;
        let (input, response_code) = ResponseCode::decode_bytewise(input)?;
        let (input, certificate) = optional!(bitmap[0], Certificate::decode_bytewise, input);
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                request_hash,
                response_code,
                certificate,
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for SharedAtRequest<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input_before, length_before) = (input, input.len());
        let (input, (extended, _)) = decode_bytewise_sequence_preamble(true, 0, input)?;

        let (input, ea_id) = HashedId8::decode_bytewise(input)?;
        let (input, key_tag) = decode_bytewise_octetstring(Some(16), Some(16), input)?;
        let (input, certificate_format) = Uint8::decode_bytewise(input)?;
        let (input, requested_subject_attributes) =
            CertificateSubjectAttributes::decode_bytewise(input)?;
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                ea_id,
                key_tag,
                certificate_format,
                requested_subject_attributes,
                raw: &input_before[..length_before - input.len()],
            },
        ))
    }
}

impl<'s> InternalDecode<'s> for EcSignature<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, tag) = decode_bytewise_tag(input)?;
        match tag {
            0 => {
                let (input, data) = Ieee1609Dot2Data::decode_bytewise(input)?;
                Ok((input, EcSignature::Encrypted(data)))
            }
            1 => {
                let (input, data) = Ieee1609Dot2Data::decode_bytewise(input)?;
                Ok((input, EcSignature::Signed(data)))
            }
            _ => invalid_choice(),
        }
    }
}

impl<'s> InternalDecode<'s> for InnerAtRequest<'s> {
    fn decode_bytewise<'input: 's>(input: &'input [u8]) -> IResult<&'input [u8], Self>
    where
        Self: Sized,
    {
        let (input, (extended, _)) = decode_bytewise_sequence_preamble(true, 0, input)?;

        let (input, public_keys) = PublicKeys::decode_bytewise(input)?;
        let (input, hmac_key) = decode_bytewise_octetstring(Some(32), Some(32), input)?;
        let (input, shared_at_request) = SharedAtRequest::decode_bytewise(input)?;
        let (input, ec_signature) = EcSignature::decode_bytewise(input)?;
        let (input, ()) = if extended {
            let (input, ext_bitmap) = decode_bytewise_extension_bitmap(input)?;
            skip_extensions(&ext_bitmap, input)?
        } else {
            (input, ())
        };
        Ok((
            input,
            Self {
                public_keys,
                hmac_key,
                shared_at_request,
                ec_signature,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNED_CAM: &[u8] = &[
        0x03, 0x81, 0x00, 0x40, 0x03, 0x80, 0x78, 0x20, 0x50, 0x02, 0x80, 0x00, 0x54, 0x01, 0x00,
        0x14, 0x00, 0xca, 0x83, 0x1a, 0x3f, 0x3d, 0x39, 0x70, 0xfc, 0x82, 0x80, 0x1f, 0xeb, 0x32,
        0x0c, 0x05, 0xec, 0x3a, 0xfd, 0x80, 0x04, 0x0b, 0x90, 0x00, 0x00, 0x00, 0x00, 0x07, 0xd1,
        0x00, 0x00, 0x02, 0x02, 0x1a, 0x3f, 0x3d, 0x39, 0x82, 0x80, 0x40, 0x5a, 0xb2, 0x03, 0x61,
        0x8e, 0x26, 0xc1, 0x9f, 0xa0, 0xb4, 0x0b, 0x40, 0x00, 0x34, 0x8c, 0x8e, 0x48, 0xb9, 0x1f,
        0xa0, 0x00, 0x91, 0x82, 0xe8, 0x92, 0x7f, 0x33, 0xff, 0x01, 0xff, 0xfa, 0x00, 0x28, 0x33,
        0x00, 0x00, 0x4b, 0xff, 0x6a, 0xff, 0x15, 0x2e, 0x40, 0x0c, 0x89, 0xdf, 0xa4, 0x48, 0x24,
        0x7e, 0x23, 0xd3, 0xc8, 0x1f, 0x02, 0x4a, 0xbe, 0xa5, 0xe8, 0xcf, 0x09, 0x69, 0xf8, 0x0d,
        0xed, 0xf4, 0x24, 0x4c, 0x90, 0x33, 0x3f, 0x40, 0x01, 0x24, 0x00, 0x02, 0x30, 0x51, 0x5a,
        0x60, 0xed, 0xfa, 0x81, 0x01, 0x01, 0x80, 0x03, 0x00, 0x80, 0x5d, 0x5d, 0xcb, 0xee, 0xfb,
        0xe7, 0xd2, 0x2d, 0x30, 0x83, 0x00, 0x00, 0x00, 0x00, 0x00, 0x24, 0x81, 0xd9, 0x85, 0x86,
        0x00, 0x01, 0xe0, 0x01, 0x07, 0x80, 0x01, 0x24, 0x81, 0x04, 0x03, 0x01, 0xff, 0xfc, 0x80,
        0x01, 0x25, 0x81, 0x05, 0x04, 0x01, 0xff, 0xff, 0xff, 0x80, 0x01, 0x8c, 0x81, 0x05, 0x04,
        0x02, 0xff, 0xff, 0xe0, 0x00, 0x01, 0x8d, 0x80, 0x02, 0x02, 0x7e, 0x81, 0x02, 0x01, 0x01,
        0x80, 0x02, 0x02, 0x7f, 0x81, 0x02, 0x01, 0x01, 0x00, 0x02, 0x03, 0xff, 0x80, 0x80, 0x82,
        0x13, 0x43, 0x08, 0xc4, 0x32, 0x4d, 0x5f, 0x47, 0xfc, 0xbe, 0x66, 0x5f, 0xb5, 0x5b, 0x40,
        0x98, 0xb3, 0x8b, 0x9c, 0xaa, 0x48, 0x4b, 0xd4, 0x47, 0x4c, 0x6c, 0x52, 0x16, 0x00, 0xa7,
        0x50, 0x8c, 0x81, 0x80, 0x3d, 0x9a, 0x96, 0x8a, 0xc1, 0x19, 0x6e, 0x46, 0xea, 0x98, 0x22,
        0x6c, 0x55, 0x20, 0x81, 0xa7, 0x7c, 0xdf, 0xbe, 0xd5, 0x8c, 0x76, 0x9a, 0xf2, 0x8c, 0x9f,
        0xf9, 0x06, 0xe9, 0x26, 0xd9, 0x22, 0x40, 0x5f, 0x18, 0x9a, 0x1c, 0x6a, 0x03, 0x19, 0x89,
        0x68, 0x96, 0x0a, 0x93, 0x32, 0x50, 0x06, 0xaf, 0xfb, 0x84, 0x40, 0x4c, 0x93, 0x16, 0x80,
        0x69, 0x8f, 0xff, 0x27, 0xc8, 0xf3, 0x12, 0x7e, 0x80, 0x83, 0xfc, 0xbf, 0x3a, 0x5b, 0xf9,
        0x8c, 0x14, 0x06, 0x3f, 0xc3, 0x71, 0xff, 0xe0, 0xa7, 0x59, 0xc1, 0x58, 0x92, 0x13, 0x5d,
        0x6a, 0xbb, 0x47, 0x1b, 0xa2, 0x4e, 0xce, 0x6f, 0x00, 0xd3, 0x92, 0xfb, 0xd9, 0x43, 0xc5,
        0x65, 0x5d, 0xae, 0x46, 0x97, 0x1b, 0x3b, 0x09, 0x39, 0x59, 0x71, 0x15, 0x84, 0x10, 0x5b,
        0x22, 0x30, 0x78, 0x3d, 0x91, 0x72, 0x00, 0xfb, 0x3e, 0x9d, 0xdb, 0x44, 0x0b, 0x1c,
    ];

    #[test]
    fn decodes_length_determinants() {
        assert_eq!(5, decode_bytewise_length(&[0x05]).unwrap().1);
        assert_eq!(0x0100, decode_bytewise_length(&[0x82, 0x01, 0x00]).unwrap().1);
        assert!(decode_bytewise_length(&[0x82, 0x01]).is_err());
    }

    #[test]
    fn decodes_oer_extension_bitmap() {
        let (_, decoded) = decode_bytewise_extension_bitmap(&[2, 6, 0x42]).unwrap();
        assert_eq!(vec![false, true], decoded);

        let (_, decoded) = decode_bytewise_extension_bitmap(&[3, 6, 0x80, 0x40]).unwrap();
        assert_eq!(
            vec![true, false, false, false, false, false, false, false, false, true],
            decoded
        );

        assert!(decode_bytewise_extension_bitmap(&[2, 9, 0x42]).is_err());
    }

    #[test]
    fn decodes_sequence_preamble_with_extension_bit() {
        // ext, 7 optional fields: fits into one byte
        let (rem, (ext, bitmap)) =
            decode_bytewise_sequence_preamble(true, 7, &[0b1011_0000, 0xAA]).unwrap();
        assert!(ext);
        assert_eq!(
            vec![false, true, true, false, false, false, false],
            bitmap
        );
        assert_eq!(&[0xAA], rem);

        // ext + 8 optional fields need two bytes
        let (rem, (ext, bitmap)) =
            decode_bytewise_sequence_preamble(true, 8, &[0b0000_0000, 0b1000_0000]).unwrap();
        assert!(!ext);
        assert!(bitmap[7]);
        assert!(rem.is_empty());
    }

    #[test]
    fn rejects_unknown_choice() {
        assert!(Ieee1609Dot2Data::decode(&[0x03u8, 0x85, 0x00][..]).is_err());
        assert!(SymmetricEncryptionKey::decode(&[0x81u8][..]).is_err());
    }

    #[test]
    #[allow(clippy::too_many_lines)]
    fn decodes_secure_header() {
        let Decoded {
            bytes_consumed,
            decoded,
        } = Ieee1609Dot2Data::decode(SIGNED_CAM).unwrap();
        assert_eq!(SIGNED_CAM.len(), bytes_consumed);
        assert_eq!(Uint8(3), decoded.protocol_version);

        let Ieee1609Dot2Content::SignedData(signed) = decoded.content else {
            panic!("expected signed data");
        };
        assert_eq!(HashAlgorithm::Sha256, signed.hash_id);
        assert_eq!(&SIGNED_CAM[3..138], signed.tbs_data.raw);

        let header = &signed.tbs_data.header_info;
        assert_eq!(Psid(36), header.psid);
        assert_eq!(Some(Uint64(616_075_920_207_354)), header.generation_time);
        assert_eq!(None, header.generation_location);
        assert_eq!(None, header.requested_certificate);

        let payload = signed.tbs_data.payload.data.as_ref().unwrap();
        let Ieee1609Dot2Content::UnsecuredData(Opaque(cam)) = payload.content else {
            panic!("expected unsecured payload");
        };
        assert_eq!(120, cam.len());
        assert_eq!(&[0x20, 0x50, 0x02], &cam[..3]);

        let SignerIdentifier::Certificate(certs) = &signed.signer else {
            panic!("expected signer certificate");
        };
        assert_eq!(1, certs.0.len());
        let cert = &certs.0[0];
        assert_eq!(Uint8(3), cert.version);
        assert_eq!(CertificateType::Explicit, cert.r_type);
        assert_eq!(
            IssuerIdentifier::Sha256AndDigest(HashedId8(&[93, 93, 203, 238, 251, 231, 210, 45])),
            cert.issuer
        );
        assert_eq!(&SIGNED_CAM[141..323], cert.raw);
        assert_eq!(&cert.raw[12..cert.raw.len() - 66], cert.to_be_signed.raw);

        let tbs = &cert.to_be_signed;
        assert_eq!(CertificateId::None(()), tbs.id);
        assert_eq!(
            ValidityPeriod {
                start: Uint32(612_489_605),
                duration: Duration::Years(Uint16(1))
            },
            tbs.validity_period
        );
        assert_eq!(Some(SubjectAssurance(&[224])), tbs.assurance_level);
        let permissions = tbs.app_permissions.as_ref().unwrap();
        assert_eq!(
            vec![36, 37, 140, 141, 638, 639, 1023],
            permissions.0.iter().map(|p| p.psid.0).collect::<Vec<_>>()
        );
        assert_eq!(
            Some(ServiceSpecificPermissions::BitmapSsp(BitmapSsp(&[
                1, 255, 252
            ]))),
            permissions.0[0].ssp
        );
        assert_eq!(None, permissions.0[3].ssp);
        assert!(matches!(
            tbs.verify_key_indicator,
            VerificationKeyIndicator::VerificationKey(PublicVerificationKey::EcdsaNistP256(
                EccP256CurvePoint::CompressedY0(_)
            ))
        ));
        assert!(matches!(
            cert.signature,
            Some(Signature::EcdsaBrainpoolP256r1Signature(EcdsaP256Signature {
                r_sig: EccP256CurvePoint::XOnly(_),
                ..
            }))
        ));
        assert!(matches!(
            signed.signature,
            Signature::EcdsaNistP256Signature(EcdsaP256Signature {
                r_sig: EccP256CurvePoint::CompressedY1(_),
                ..
            })
        ));
    }

    #[test]
    fn decodes_truncated_input_as_error() {
        let result = Ieee1609Dot2Data::decode(&SIGNED_CAM[..100]);
        assert!(matches!(result, Err(DecodeError::ParserError(_))));
    }
}
