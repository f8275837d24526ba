//! Secured message envelopes.
//!
//! Outgoing messages go through [`Engine::prepare_message`], the application
//! writes the payload, and [`Engine::finalize_message`] builds the unsecured,
//! signed or encrypted `Ieee1609Dot2Data`. Incoming messages are parsed with
//! [`Engine::parse_message`] and then checked with
//! [`Engine::validate_signed_message`] or opened with
//! [`Engine::decrypt_message`].

use std::{ops::Range, sync::Arc};

use tracing::{debug, trace, warn};

use crate::{
    aid,
    cert::{Certificate, Digest},
    config::{AppProfile, EngineFlags, FieldFlags, ItsAid, PayloadType},
    crypto::{
        ecies_unwrap, ecies_wrap, signing_hash, CryptoEngine, Curve, EcSignature, EciesKey,
        PrivateKey, PublicKey, AES_128_KEY_SIZE, CCM_NONCE_SIZE,
    },
    engine::{pre_shared_key_digest, Engine, Event, Task},
    geo::Location,
    message::{MessageInfo, Recipient, SignerType},
    time,
    types::{
        EciesP256EncryptedKey, EncryptedData, EncryptedDataEncryptionKey,
        HashAlgorithm, HashedData, HashedId3, HashedId32, HashedId8, HeaderInfo,
        Ieee1609Dot2Content, Ieee1609Dot2Data, NinetyDegreeInt, One28BitCcmCiphertext,
        OneEightyDegreeInt, Opaque, PKRecipientInfo, Psid, RecipientInfo, SequenceOfCertificate,
        SequenceOfHashedId3, SequenceOfRecipientInfo, SignedData, SignedDataPayload,
        SignerIdentifier, SymmetricCiphertext, ThreeDLocation, ToBeSignedData, Uint16, Uint64,
        Uint8,
    },
    Decode, Encode, Error, Result,
};

pub const PROTOCOL_VERSION: u8 = 3;
pub const MAX_RECIPIENTS: usize = 8;
const MAX_P2P_REQUESTS: usize = 8;

const UNSECURED_OVERHEAD: usize = 6;
/// framing, header fields and signature of a signed message without the
/// signer certificate
const SIGNED_OVERHEAD: usize = 160;
/// framing, nonce and tag of an encrypted message without recipients
const ENCRYPTED_OVERHEAD: usize = 40;

/// position of `inner` in `outer`, `inner` must be a subslice of `outer`
fn range_of(outer: &[u8], inner: &[u8]) -> Range<usize> {
    let start = inner.as_ptr() as usize - outer.as_ptr() as usize;
    start..start + inner.len()
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SignerRef {
    Digest(Digest),
    /// range of the signer certificate in the message
    Certificate(Range<usize>),
    SelfSigned,
}

/// Owned view of a decoded signed message
#[derive(Debug, Clone)]
pub(crate) struct SignedParts {
    pub(crate) tbs: Range<usize>,
    pub(crate) aid: ItsAid,
    pub(crate) generation_time: Option<u64>,
    pub(crate) expiry_time: Option<u64>,
    pub(crate) position: Option<Location>,
    pub(crate) signer: SignerRef,
    pub(crate) signature: EcSignature,
    pub(crate) hash_algorithm: HashAlgorithm,
    pub(crate) p2p_requests: Vec<[u8; 3]>,
    pub(crate) requested_certificate: Option<Range<usize>>,
    pub(crate) external_hash: Option<Vec<u8>>,
    /// range of the payload, empty for external payloads
    pub(crate) payload: Range<usize>,
}

impl SignedParts {
    pub(crate) fn extract(buffer: &[u8]) -> Result<Self> {
        let data = Ieee1609Dot2Data::decode(buffer)?.decoded;
        if data.protocol_version.0 != PROTOCOL_VERSION {
            return Err(Error::UnsupportedVersion(data.protocol_version.0));
        }
        let Ieee1609Dot2Content::SignedData(signed) = data.content else {
            return Err(Error::UnsupportedPayloadType);
        };
        let tbs = &signed.tbs_data;
        let header = &tbs.header_info;
        let payload = match (&tbs.payload.data, &tbs.payload.ext_data_hash) {
            (Some(inner), _) => match &inner.content {
                Ieee1609Dot2Content::UnsecuredData(Opaque(payload)) => range_of(buffer, payload),
                _ => return Err(Error::UnsupportedPayloadType),
            },
            (None, Some(_)) => 0..0,
            (None, None) => return Err(Error::UnsupportedPayloadType),
        };
        let external_hash = match &tbs.payload.ext_data_hash {
            Some(HashedData::Sha256HashedData(HashedId32(hash))) => Some(hash.to_vec()),
            Some(HashedData::Sha384HashedData(_)) => {
                return Err(Error::UnsupportedAlgorithm(
                    "External payloads must be hashed with SHA-256".into(),
                ))
            }
            None => None,
        };
        let signer = match &signed.signer {
            SignerIdentifier::Digest(HashedId8(digest)) => SignerRef::Digest(
                Digest::from_slice(digest).ok_or(Error::Decode("Invalid signer digest".into()))?,
            ),
            SignerIdentifier::Certificate(SequenceOfCertificate(certificates)) => {
                let certificate = certificates.first().ok_or(Error::Decode(
                    "Signer certificate sequence is empty".into(),
                ))?;
                SignerRef::Certificate(range_of(buffer, certificate.raw))
            }
            SignerIdentifier::RsSelf(()) => SignerRef::SelfSigned,
        };
        let mut p2p_requests: Vec<[u8; 3]> = header
            .p2pcd_learning_request
            .iter()
            .chain(header.inline_p2pcd_request.iter().flat_map(|r| r.0.iter()))
            .filter_map(|HashedId3(id)| <[u8; 3]>::try_from(*id).ok())
            .collect();
        p2p_requests.dedup();
        Ok(Self {
            tbs: range_of(buffer, tbs.raw),
            aid: header.psid.0,
            generation_time: header.generation_time.map(|t| t.0),
            expiry_time: header.expiry_time.map(|t| t.0),
            position: header.generation_location.as_ref().map(Location::from),
            signer,
            signature: EcSignature::from_wire(&signed.signature)?,
            hash_algorithm: signed.hash_id,
            p2p_requests,
            requested_certificate: header
                .requested_certificate
                .as_ref()
                .map(|c| range_of(buffer, c.raw)),
            external_hash,
            payload,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) enum RecipientKey {
    PreShared,
    Ecies(EciesKey),
}

/// Owned view of a decoded encrypted message
#[derive(Debug, Clone)]
pub(crate) struct EncryptedParts {
    pub(crate) recipients: Vec<(Digest, RecipientKey)>,
    pub(crate) nonce: Vec<u8>,
    pub(crate) ciphertext: Range<usize>,
}

impl EncryptedParts {
    pub(crate) fn extract(engine: &dyn CryptoEngine, buffer: &[u8]) -> Result<Self> {
        let data = Ieee1609Dot2Data::decode(buffer)?.decoded;
        if data.protocol_version.0 != PROTOCOL_VERSION {
            return Err(Error::UnsupportedVersion(data.protocol_version.0));
        }
        let Ieee1609Dot2Content::EncryptedData(encrypted) = data.content else {
            return Err(Error::UnsupportedPayloadType);
        };
        let mut recipients = Vec::with_capacity(encrypted.recipients.0.len());
        for recipient in &encrypted.recipients.0 {
            let id = Digest::from_slice(recipient.recipient_id().0)
                .ok_or(Error::Decode("Invalid recipient id".into()))?;
            let key = match recipient {
                RecipientInfo::PskRecipInfo(_) => RecipientKey::PreShared,
                RecipientInfo::CertRecipInfo(info) => {
                    let (curve, wrapped) = match &info.enc_key {
                        EncryptedDataEncryptionKey::EciesNistP256(key) => (Curve::NistP256, key),
                        EncryptedDataEncryptionKey::EciesBrainpoolP256r1(key) => {
                            (Curve::BrainpoolP256r1, key)
                        }
                    };
                    RecipientKey::Ecies(EciesKey {
                        v: PublicKey::from_p256_point(engine, curve, &wrapped.v)?,
                        c: wrapped.c.to_vec(),
                        t: wrapped.t.to_vec(),
                    })
                }
                // symmetric key reuse and signed-data/REK recipients are not supported
                _ => {
                    trace!(recipient = %id, "skipping unsupported recipient");
                    continue;
                }
            };
            recipients.push((id, key));
        }
        let SymmetricCiphertext::Aes128ccm(One28BitCcmCiphertext {
            nonce,
            ccm_ciphertext: Opaque(ciphertext),
        }) = &encrypted.ciphertext;
        if nonce.len() != CCM_NONCE_SIZE {
            return Err(Error::Decode("AES-CCM nonce must have 12 bytes".into()));
        }
        Ok(Self {
            recipients,
            nonce: nonce.to_vec(),
            ciphertext: range_of(buffer, ciphertext),
        })
    }
}

/// Signing key and signer identification of an outgoing message
enum Signer {
    Certificate {
        certificate: Arc<Certificate>,
        full: bool,
    },
    SelfSigned(PrivateKey),
}

fn to_three_d_location(location: &Location) -> ThreeDLocation {
    ThreeDLocation {
        latitude: NinetyDegreeInt(location.latitude),
        longitude: OneEightyDegreeInt(location.longitude),
        elevation: Uint16(location.elevation),
    }
}

impl Engine {
    fn payload_type_of(&self, message: &MessageInfo) -> PayloadType {
        match message.payload_type {
            PayloadType::Auto => message
                .sign_info()
                .and_then(|info| self.config.find_profile(info.aid))
                .map_or(PayloadType::Signed, |p| p.payload_type),
            other => other,
        }
    }

    /// Reserves the payload area of an outgoing message
    ///
    /// Returns the number of bytes reserved for the security envelope. The
    /// payload may use the rest of the maximum message size.
    pub fn prepare_message(&mut self, message: &mut MessageInfo) -> Result<usize> {
        let result = self.prepare(message);
        message.record(result)
    }

    fn prepare(&mut self, message: &mut MessageInfo) -> Result<usize> {
        let payload_type = self.payload_type_of(message);
        message.payload_type = payload_type;
        let overhead = match payload_type {
            PayloadType::Unsecured => UNSECURED_OVERHEAD,
            PayloadType::Signed | PayloadType::SignedExternal => self.signed_overhead(message)?,
            PayloadType::Encrypted => ENCRYPTED_OVERHEAD,
            PayloadType::Auto | PayloadType::External => return Err(Error::UnsupportedPayloadType),
        };
        let available = message.max_size();
        let capacity = available
            .checked_sub(overhead)
            .ok_or(Error::BufferTooSmall {
                required: overhead,
                available,
            })?;
        message.reserve_payload(capacity);
        Ok(overhead)
    }

    /// Selects the signing certificate for the envelope size estimate
    fn signed_overhead(&mut self, message: &mut MessageInfo) -> Result<usize> {
        let position = message.position;
        let time64 = match message.generation_time {
            0 => time::now64(),
            t => t,
        };
        let info = message.sign_info_mut();
        if info.signer_type == SignerType::SelfSigned {
            return Ok(SIGNED_OVERHEAD);
        }
        if info.certificate.is_none() {
            let (aid, ssp, mask) = (info.aid, info.ssp.clone(), info.ssp_mask.clone());
            self.check_change_period(aid, time::time32_from_64(time64));
            let certificate =
                self.signing_certificate(aid, &ssp, &mask, position.as_ref(), time64)?;
            message.sign_info_mut().certificate = Some(certificate);
        }
        let certificate_size = message
            .sign_info()
            .and_then(|i| i.certificate.as_ref())
            .map_or(0, |c| c.data().len());
        Ok(SIGNED_OVERHEAD + certificate_size)
    }

    /// Builds the envelope around the written payload
    ///
    /// Returns the size of the finished message.
    pub fn finalize_message(&mut self, message: &mut MessageInfo) -> Result<usize> {
        let result = match message.payload_type {
            PayloadType::Unsecured => self.finalize_unsecured(message),
            PayloadType::Signed | PayloadType::SignedExternal => self.finalize_signed(message),
            PayloadType::Encrypted => self.finalize_encrypted(message),
            PayloadType::Auto | PayloadType::External => Err(Error::UnsupportedPayloadType),
        };
        message.record(result)
    }

    pub fn finalize_message_async(&mut self, message: MessageInfo) {
        self.enqueue(Task::Finalize(message));
    }

    fn finalize_unsecured(&mut self, message: &mut MessageInfo) -> Result<usize> {
        let payload = message.payload().to_vec();
        let data = Ieee1609Dot2Data {
            protocol_version: Uint8(PROTOCOL_VERSION),
            content: Ieee1609Dot2Content::UnsecuredData(Opaque(&payload)),
        }
        .encode_to_vec()?;
        let payload = data.len() - payload.len()..data.len();
        message.set_message(data, payload)
    }

    fn resolve_signer(
        &mut self,
        message: &MessageInfo,
        profile: &AppProfile,
        force_certificate: bool,
    ) -> Result<Signer> {
        let info = message.sign_info().ok_or(Error::UnsupportedPayloadType)?;
        if info.signer_type == SignerType::SelfSigned {
            let key = info.private_key.clone().ok_or(Error::MissingPrivateKey)?;
            return Ok(Signer::SelfSigned(key));
        }
        let certificate = match &info.certificate {
            Some(certificate) => certificate.clone(),
            None => self.signing_certificate(
                info.aid,
                &info.ssp,
                &info.ssp_mask,
                message.position.as_ref(),
                message.generation_time,
            )?,
        };
        if certificate.verification_private_key().is_none() {
            return Err(Error::MissingPrivateKey);
        }
        let now = message.generation_time;
        let pseudonym = self.pseudonyms.entry(info.aid).or_default();
        let full = match info.signer_type {
            SignerType::Certificate => true,
            SignerType::Digest => false,
            _ if force_certificate || self.p2p.send_own_certificate => true,
            _ => match profile.cert_period_ms {
                period if period < 0 => false,
                0 => true,
                period => pseudonym.certificate_sent_at.map_or(true, |sent| {
                    now.saturating_sub(sent) >= period.unsigned_abs() * 1000
                }),
            },
        };
        if full {
            pseudonym.certificate_sent_at = Some(now);
            if pseudonym
                .current
                .as_ref()
                .is_some_and(|c| c.digest() == certificate.digest())
            {
                self.p2p.send_own_certificate = false;
            }
        }
        Ok(Signer::Certificate { certificate, full })
    }

    /// P2P fields of the header: own requests and one requested certificate
    fn p2p_header_fields(&mut self, fields: FieldFlags) -> (Vec<[u8; 3]>, Option<Arc<Certificate>>) {
        let flags = self.config.flags;
        let requests = if fields.contains(FieldFlags::P2P_CERT_REQUEST)
            && (flags.contains(EngineFlags::P2P_REQ_AT) || flags.contains(EngineFlags::REQ_AA))
        {
            self.p2p
                .requested
                .keys()
                .take(MAX_P2P_REQUESTS)
                .copied()
                .collect()
        } else {
            Vec::new()
        };
        let mut answer = None;
        if fields.contains(FieldFlags::P2P_CERT) {
            while let Some(id) = self.p2p.to_send.pop_first() {
                if self.p2p.cancelled.contains(&id) {
                    continue;
                }
                if let Some(certificate) = self.store.find_by_hashed_id3(id) {
                    debug!(digest = %certificate.digest(), "answering certificate request");
                    answer = Some(certificate);
                    break;
                }
            }
        }
        (requests, answer)
    }

    fn finalize_signed(&mut self, message: &mut MessageInfo) -> Result<usize> {
        if message.generation_time == 0 {
            message.generation_time = time::now64();
        }
        let aid = message.sign_info().map_or(aid::ANY, |i| i.aid);
        let profile = self.config.find_profile(aid).cloned().unwrap_or_default();
        let (requests, answer) = self.p2p_header_fields(profile.fields);
        let force_certificate =
            answer.is_some() && !self.config.flags.contains(EngineFlags::SEND_AA_WITH_DIGEST);
        let signer = self.resolve_signer(message, &profile, force_certificate)?;

        let mut header = HeaderInfo::new(Psid(aid));
        if profile.fields.contains(FieldFlags::GEN_TIME) {
            header.generation_time = Some(Uint64(message.generation_time));
        }
        header.expiry_time = message.expiry_time.map(Uint64);
        if profile.fields.contains(FieldFlags::GEN_LOCATION) {
            header.generation_location = message
                .position
                .filter(Location::is_available)
                .as_ref()
                .map(to_three_d_location);
        }
        if !requests.is_empty() {
            header.inline_p2pcd_request = Some(SequenceOfHashedId3(
                requests.iter().map(|id| HashedId3(&id[..])).collect(),
            ));
        }
        let answer_data = answer.as_ref().map(|c| c.data().clone());
        if let Some(data) = &answer_data {
            header.requested_certificate =
                Some(crate::types::Certificate::decode(&data[..])?.decoded);
        }

        let payload = message.payload().to_vec();
        let external = message.payload_type == PayloadType::SignedExternal;
        let external_hash = external.then(|| self.crypto.hash.hash(HashAlgorithm::Sha256, &payload));
        let inner = Ieee1609Dot2Data {
            protocol_version: Uint8(PROTOCOL_VERSION),
            content: Ieee1609Dot2Content::UnsecuredData(Opaque(&payload)),
        };
        let tbs = ToBeSignedData {
            payload: match &external_hash {
                Some(hash) => SignedDataPayload {
                    data: None,
                    ext_data_hash: Some(HashedData::Sha256HashedData(HashedId32(hash))),
                },
                None => SignedDataPayload {
                    data: Some(Box::new(inner)),
                    ext_data_hash: None,
                },
            },
            header_info: header,
            raw: &[],
        };
        let tbs_bytes = tbs.encode_to_vec()?;

        let (key, signer_data, digest) = match &signer {
            Signer::Certificate { certificate, .. } => (
                certificate
                    .verification_private_key()
                    .ok_or(Error::MissingPrivateKey)?,
                &certificate.data()[..],
                certificate.digest(),
            ),
            Signer::SelfSigned(key) => (key, &[][..], Digest::default()),
        };
        let hash_algorithm = key.curve.hash_algorithm();
        let hash = signing_hash(
            self.crypto.hash.as_ref(),
            hash_algorithm,
            &tbs_bytes,
            signer_data,
        );
        let signature = self.crypto.sign.sign(key, &hash)?;

        let signer_id = match &signer {
            Signer::Certificate { full: true, .. } => SignerIdentifier::Certificate(
                SequenceOfCertificate(vec![crate::types::Certificate::decode(signer_data)?.decoded]),
            ),
            Signer::Certificate { full: false, .. } => SignerIdentifier::Digest(HashedId8(&digest.0)),
            Signer::SelfSigned(_) => SignerIdentifier::RsSelf(()),
        };
        let data = Ieee1609Dot2Data {
            protocol_version: Uint8(PROTOCOL_VERSION),
            content: Ieee1609Dot2Content::SignedData(Box::new(SignedData {
                hash_id: hash_algorithm,
                tbs_data: tbs,
                signer: signer_id,
                signature: signature.to_wire(),
            })),
        }
        .encode_to_vec()?;
        let parts = SignedParts::extract(&data)?;

        let info = message.sign_info_mut();
        match signer {
            Signer::Certificate { certificate, full } => {
                info.signer_type = if full {
                    SignerType::Certificate
                } else {
                    SignerType::Digest
                };
                info.digest = Some(certificate.digest());
                info.certificate = Some(certificate);
            }
            Signer::SelfSigned(_) => info.signer_type = SignerType::SelfSigned,
        }
        info.external_hash = external_hash;
        trace!(aid, size = data.len(), "signed message");
        message.set_message(data, parts.payload)
    }

    fn add_recipient(message: &mut MessageInfo, recipient: Recipient) -> Result<()> {
        let info = message.encryption_info_mut();
        let count = info.recipients.len();
        let has_psk = info
            .recipients
            .iter()
            .any(|r| matches!(r, Recipient::PreSharedKey(_)));
        let is_psk = matches!(recipient, Recipient::PreSharedKey(_));
        if count >= MAX_RECIPIENTS || has_psk || (is_psk && count > 0) {
            return Err(Error::TooManyRecipients(count + 1));
        }
        info.recipients.push(recipient);
        Ok(())
    }

    /// Adds a known certificate with an encryption key as recipient
    pub fn add_certificate_recipient(
        &mut self,
        message: &mut MessageInfo,
        digest: &Digest,
    ) -> Result<()> {
        let result = self
            .store
            .find(digest)
            .ok_or(Error::CertificateUnavailable(*digest))
            .and_then(|certificate| {
                if certificate.encryption_key().is_none() {
                    return Err(Error::UnknownRecipient);
                }
                certificate.check_valid_for(
                    aid::ANY,
                    &[],
                    &[],
                    None,
                    time::now64(),
                    self.geo.as_ref(),
                )?;
                Self::add_recipient(message, Recipient::Certificate(certificate))
            });
        message.record(result)
    }

    /// Encrypts a message with a pre-shared key, given directly or by the
    /// digest of an installed key
    ///
    /// A pre-shared key must be the only recipient of a message.
    pub fn add_psk_recipient(
        &mut self,
        message: &mut MessageInfo,
        key: Option<&[u8]>,
        digest: Option<Digest>,
    ) -> Result<Digest> {
        let result = self.psk_recipient(message, key, digest);
        message.record(result)
    }

    fn psk_recipient(
        &mut self,
        message: &mut MessageInfo,
        key: Option<&[u8]>,
        digest: Option<Digest>,
    ) -> Result<Digest> {
        let (key, digest) = match (key, digest) {
            (Some(key), expected) => {
                if key.len() != AES_128_KEY_SIZE {
                    return Err(Error::KeySizeMismatch);
                }
                let digest = pre_shared_key_digest(self.crypto.hash.as_ref(), key)?;
                if expected.is_some_and(|e| e != digest) {
                    return Err(Error::UnknownRecipient);
                }
                (key.to_vec(), digest)
            }
            (None, Some(digest)) => (
                self.pre_shared_key(&digest).ok_or(Error::UnknownRecipient)?,
                digest,
            ),
            (None, None) => return Err(Error::UnknownRecipient),
        };
        Self::add_recipient(message, Recipient::PreSharedKey(digest))?;
        message.encryption_info_mut().key = Some(key);
        Ok(digest)
    }

    fn finalize_encrypted(&mut self, message: &mut MessageInfo) -> Result<usize> {
        let info = message
            .encryption_info()
            .cloned()
            .ok_or(Error::UnsupportedPayloadType)?;
        if info.recipients.is_empty() {
            return Err(Error::UnknownRecipient);
        }
        let key = match info.key {
            Some(key) if key.len() == AES_128_KEY_SIZE => key,
            Some(_) => return Err(Error::KeySizeMismatch),
            None => {
                let mut key = vec![0; AES_128_KEY_SIZE];
                self.crypto.random.random(&mut key)?;
                key
            }
        };
        let mut nonce = [0u8; CCM_NONCE_SIZE];
        self.crypto.random.random(&mut nonce)?;
        let ciphertext = self
            .crypto
            .encrypt
            .encrypt_ccm(&key, &nonce, message.payload())?;

        let wrapped = info
            .recipients
            .iter()
            .map(|recipient| match recipient {
                Recipient::PreSharedKey(digest) => Ok((*digest, None)),
                Recipient::Certificate(certificate) => {
                    let public = certificate
                        .encryption_key()
                        .ok_or(Error::UnknownRecipient)?;
                    let p1 = self
                        .crypto
                        .hash
                        .hash(HashAlgorithm::Sha256, certificate.data());
                    let ecies = ecies_wrap(self.crypto.encrypt.as_ref(), public, &key, &p1, None)?;
                    Ok((certificate.digest(), Some(ecies)))
                }
            })
            .collect::<Result<Vec<(Digest, Option<EciesKey>)>>>()?;
        let recipients = wrapped
            .iter()
            .map(|(digest, ecies)| {
                Ok(match ecies {
                    None => RecipientInfo::PskRecipInfo(HashedId8(&digest.0)),
                    Some(ecies) => {
                        let key = EciesP256EncryptedKey {
                            v: ecies.v.to_p256_point()?,
                            c: &ecies.c,
                            t: &ecies.t,
                        };
                        RecipientInfo::CertRecipInfo(PKRecipientInfo {
                            recipient_id: HashedId8(&digest.0),
                            enc_key: match ecies.v.curve {
                                Curve::BrainpoolP256r1 => {
                                    EncryptedDataEncryptionKey::EciesBrainpoolP256r1(key)
                                }
                                _ => EncryptedDataEncryptionKey::EciesNistP256(key),
                            },
                        })
                    }
                })
            })
            .collect::<Result<Vec<RecipientInfo<'_>>>>()?;
        let data = Ieee1609Dot2Data {
            protocol_version: Uint8(PROTOCOL_VERSION),
            content: Ieee1609Dot2Content::EncryptedData(EncryptedData {
                recipients: SequenceOfRecipientInfo(recipients),
                ciphertext: SymmetricCiphertext::Aes128ccm(One28BitCcmCiphertext {
                    nonce: &nonce,
                    ccm_ciphertext: Opaque(&ciphertext),
                }),
            }),
        }
        .encode_to_vec()?;
        let payload = data.len() - ciphertext.len()..data.len();
        message.encryption_info_mut().key = Some(key);
        trace!(recipients = wrapped.len(), size = data.len(), "encrypted message");
        message.set_message(data, payload)
    }

    /// Reads the envelope of a received message without cryptographic checks
    pub fn parse_message(&mut self, message: &mut MessageInfo) -> Result<PayloadType> {
        let result = self.parse(message);
        message.record(result)
    }

    fn parse(&mut self, message: &mut MessageInfo) -> Result<PayloadType> {
        let payload_type = {
            let data = Ieee1609Dot2Data::decode(message.message())?.decoded;
            if data.protocol_version.0 != PROTOCOL_VERSION {
                return Err(Error::UnsupportedVersion(data.protocol_version.0));
            }
            match data.content {
                Ieee1609Dot2Content::UnsecuredData(_) => PayloadType::Unsecured,
                Ieee1609Dot2Content::SignedData(_) => PayloadType::Signed,
                Ieee1609Dot2Content::EncryptedData(_) => PayloadType::Encrypted,
                _ => return Err(Error::UnsupportedPayloadType),
            }
        };
        match payload_type {
            PayloadType::Unsecured => self.parse_unsecured(message),
            PayloadType::Encrypted => self.parse_encrypted(message).map(|_| ()),
            _ => self.parse_signed(message).map(|_| ()),
        }?;
        Ok(message.payload_type)
    }

    pub fn parse_unsecured_message(&mut self, message: &mut MessageInfo) -> Result<()> {
        let result = self.parse_unsecured(message);
        message.record(result)
    }

    fn parse_unsecured(&mut self, message: &mut MessageInfo) -> Result<()> {
        let payload = {
            let buffer = message.message();
            let data = Ieee1609Dot2Data::decode(buffer)?.decoded;
            if data.protocol_version.0 != PROTOCOL_VERSION {
                return Err(Error::UnsupportedVersion(data.protocol_version.0));
            }
            let Ieee1609Dot2Content::UnsecuredData(Opaque(payload)) = data.content else {
                return Err(Error::UnsupportedPayloadType);
            };
            range_of(buffer, payload)
        };
        message.set_payload_range(payload);
        message.payload_type = PayloadType::Unsecured;
        Ok(())
    }

    pub fn parse_signed_message(&mut self, message: &mut MessageInfo) -> Result<()> {
        let result = self.parse_signed(message).map(|_| ());
        message.record(result)
    }

    fn parse_signed(&mut self, message: &mut MessageInfo) -> Result<SignedParts> {
        let parts = SignedParts::extract(message.message())?;
        message.set_payload_range(parts.payload.clone());
        message.payload_type = if parts.external_hash.is_some() {
            PayloadType::SignedExternal
        } else {
            PayloadType::Signed
        };
        message.generation_time = parts.generation_time.unwrap_or(0);
        message.expiry_time = parts.expiry_time;
        message.position = parts.position;
        let public_key = message.sign_info().and_then(|i| i.public_key.clone());
        let info = message.sign_info_mut();
        *info = Default::default();
        info.aid = parts.aid;
        info.public_key = public_key;
        info.external_hash = parts.external_hash.clone();
        match &parts.signer {
            SignerRef::Digest(digest) => {
                info.signer_type = SignerType::Digest;
                info.digest = Some(*digest);
            }
            SignerRef::Certificate(_) => info.signer_type = SignerType::Certificate,
            SignerRef::SelfSigned => info.signer_type = SignerType::SelfSigned,
        }
        Ok(parts)
    }

    pub fn parse_encrypted_message(&mut self, message: &mut MessageInfo) -> Result<()> {
        let result = self.parse_encrypted(message).map(|_| ());
        message.record(result)
    }

    fn parse_encrypted(&mut self, message: &mut MessageInfo) -> Result<EncryptedParts> {
        let parts = EncryptedParts::extract(self.crypto.decrypt.as_ref(), message.message())?;
        let recipients = parts
            .recipients
            .iter()
            .filter_map(|(digest, key)| match key {
                RecipientKey::PreShared => Some(Recipient::PreSharedKey(*digest)),
                RecipientKey::Ecies(_) => self.store.find(digest).map(Recipient::Certificate),
            })
            .collect();
        message.set_payload_range(parts.ciphertext.clone());
        message.payload_type = PayloadType::Encrypted;
        let info = message.encryption_info_mut();
        info.recipients = recipients;
        info.recipient = None;
        Ok(parts)
    }

    /// Verifies the signature and the signer of a received signed message
    ///
    /// The signer certificate is resolved from the message or the store. An
    /// unknown signer is requested from peers and reported with a
    /// `CertificateRequest` event.
    pub fn validate_signed_message(&mut self, message: &mut MessageInfo) -> Result<()> {
        let result = self.validate_signed(message);
        if let Err(e) = &result {
            debug!(error = %e, "signed message rejected");
        }
        message.record(result)
    }

    pub fn validate_signed_message_async(&mut self, message: MessageInfo) {
        self.enqueue(Task::Validate(message));
    }

    fn validate_signed(&mut self, message: &mut MessageInfo) -> Result<()> {
        let parts = self.parse_signed(message)?;
        if message.received_at == 0 {
            message.received_at = time::now64();
        }
        let received = message.received_at;
        if let Some(generation) = parts.generation_time {
            let tolerance = u64::from(self.config.future_tolerance) * 1_000_000;
            if generation > received.saturating_add(tolerance) {
                return Err(Error::FutureMessage);
            }
        }
        if parts.expiry_time.is_some_and(|expiry| expiry < received) {
            return Err(Error::MessageExpired);
        }

        // a requested certificate is verified by its own chain
        let requested = parts
            .requested_certificate
            .clone()
            .and_then(|range| self.receive_requested_certificate(message.message()[range].to_vec()));

        let time64 = parts.generation_time.unwrap_or(received);
        let (verification_key, signer_data, certificate) = match &parts.signer {
            SignerRef::SelfSigned => {
                let key = message
                    .sign_info()
                    .and_then(|i| i.public_key.clone())
                    .ok_or(Error::UnknownSigner(Digest::default()))?;
                (key, Vec::new(), None)
            }
            signer => {
                let certificate = self.signer_certificate(message, signer)?;
                if let Err(e) = self.store.validate_chain(
                    self.crypto.verify.as_ref(),
                    self.geo.as_ref(),
                    &certificate,
                ) {
                    if let Error::UnknownIssuer(issuer) = e {
                        self.request_certificate(issuer, EngineFlags::REQ_AA);
                    }
                    return Err(e);
                }
                certificate.check_valid_for(
                    parts.aid,
                    &[],
                    &[],
                    parts.position.as_ref(),
                    time64,
                    self.geo.as_ref(),
                )?;
                (
                    certificate.verification_key().clone(),
                    certificate.data().to_vec(),
                    Some(certificate),
                )
            }
        };

        let hash = signing_hash(
            self.crypto.hash.as_ref(),
            parts.hash_algorithm,
            &message.message()[parts.tbs.clone()],
            &signer_data,
        );
        if !self
            .crypto
            .verify
            .verify(&verification_key, &hash, &parts.signature)?
        {
            warn!(aid = parts.aid, "message signature mismatch");
            return Err(Error::SignatureMismatch);
        }

        self.answer_p2p_requests(&parts.p2p_requests);
        if let Some(id) = requested {
            self.cancel_p2p_answer(id);
        }

        let info = message.sign_info_mut();
        if let Some(certificate) = certificate {
            info.ssp = certificate
                .permission(parts.aid)
                .and_then(|p| p.ssp.clone())
                .unwrap_or_default();
            info.digest = Some(certificate.digest());
            info.certificate = Some(certificate);
        }
        info.public_key = Some(verification_key);
        trace!(aid = parts.aid, "validated signed message");
        Ok(())
    }

    fn signer_certificate(
        &mut self,
        message: &MessageInfo,
        signer: &SignerRef,
    ) -> Result<Arc<Certificate>> {
        match signer {
            SignerRef::Certificate(range) => {
                let data = message.message()[range.clone()].to_vec();
                let certificate = Certificate::from_bytes(self.crypto.verify.as_ref(), data)?;
                self.p2p.requested.remove(&certificate.hashed_id3());
                self.add_certificate(certificate)
            }
            SignerRef::Digest(digest) => match self.store.get(digest, time::now32()) {
                Some(certificate) => Ok(certificate),
                None => {
                    self.request_certificate(*digest, EngineFlags::P2P_REQ_AT);
                    Err(Error::UnknownSigner(*digest))
                }
            },
            SignerRef::SelfSigned => Err(Error::UnknownSigner(Digest::default())),
        }
    }

    /// Reports an unknown certificate and asks peers for it if `flag` allows
    fn request_certificate(&mut self, digest: Digest, flag: EngineFlags) {
        let id = digest.hashed_id3();
        if self.p2p.requested.contains_key(&id) {
            return;
        }
        if self.config.flags.contains(flag) {
            self.p2p.requested.insert(id, time::now32());
        }
        debug!(%digest, "unknown certificate");
        self.emit(&Event::CertificateRequest { digest });
    }

    /// Queues answers to the P2P certificate requests of a peer
    fn answer_p2p_requests(&mut self, requests: &[[u8; 3]]) {
        let flags = self.config.flags;
        for id in requests {
            let own = self
                .pseudonyms
                .values()
                .filter_map(|p| p.current.as_ref())
                .any(|c| c.hashed_id3() == *id);
            if own {
                if flags.contains(EngineFlags::SEND_AT) {
                    trace!("peer requested the own certificate");
                    self.p2p.send_own_certificate = true;
                }
                continue;
            }
            if !flags.contains(EngineFlags::SEND_AA) || self.p2p.cancelled.contains(id) {
                continue;
            }
            let Some(certificate) = self.store.find_by_hashed_id3(*id) else {
                continue;
            };
            if !certificate.is_ca() || certificate.is_self_signed() {
                continue;
            }
            if flags.contains(EngineFlags::SEND_OWN_AA) {
                let digest = certificate.digest();
                let issues_own = self
                    .pseudonyms
                    .values()
                    .filter_map(|p| p.current.as_ref())
                    .any(|c| c.issuer() == Some(digest));
                if !issues_own {
                    continue;
                }
            }
            self.p2p.to_send.insert(*id);
        }
    }

    /// Stores a certificate a peer sent on request
    ///
    /// Returns its HashedId3 if it is trusted.
    fn receive_requested_certificate(&mut self, data: Vec<u8>) -> Option<[u8; 3]> {
        let certificate = match Certificate::from_bytes(self.crypto.verify.as_ref(), data) {
            Ok(certificate) => certificate,
            Err(e) => {
                debug!(error = %e, "invalid requested certificate");
                return None;
            }
        };
        let certificate = match self.add_certificate(certificate) {
            Ok(certificate) => certificate,
            Err(e) => {
                debug!(error = %e, "requested certificate not stored");
                return None;
            }
        };
        if !certificate.is_trusted() {
            debug!(digest = %certificate.digest(), "requested certificate not trusted");
            return None;
        }
        let id = certificate.hashed_id3();
        self.p2p.requested.remove(&id);
        Some(id)
    }

    /// Drops the own pending answer to a request another station served
    fn cancel_p2p_answer(&mut self, id: [u8; 3]) {
        if self.config.flags.contains(EngineFlags::CANCEL_AA_REQUEST) && self.p2p.to_send.remove(&id)
        {
            trace!(id = %hex::encode_upper(id), "certificate answer cancelled");
            self.p2p.cancelled.insert(id);
        }
    }

    /// Decrypts a received encrypted message with a pre-shared key or the
    /// private encryption key of a local certificate
    pub fn decrypt_message(&mut self, message: &mut MessageInfo) -> Result<()> {
        let result = self.decrypt(message);
        message.record(result)
    }

    pub fn decrypt_message_async(&mut self, message: MessageInfo) {
        self.enqueue(Task::Decrypt(message));
    }

    fn decrypt(&mut self, message: &mut MessageInfo) -> Result<()> {
        let preset = message.encryption_info().and_then(|i| i.key.clone());
        let parts = self.parse_encrypted(message)?;
        let mut found = None;
        let mut failed = false;
        for (id, wrapped) in &parts.recipients {
            match wrapped {
                RecipientKey::PreShared => {
                    if let Some(key) = self.pre_shared_key(id) {
                        found = Some((key, *id));
                    } else if let Some(key) = &preset {
                        if key.len() == AES_128_KEY_SIZE
                            && pre_shared_key_digest(self.crypto.hash.as_ref(), key)? == *id
                        {
                            found = Some((key.clone(), *id));
                        }
                    }
                }
                RecipientKey::Ecies(ecies) => {
                    let Some(certificate) = self.store.find(id) else {
                        continue;
                    };
                    let Some(private) = certificate.encryption_private_key() else {
                        continue;
                    };
                    let p1 = self
                        .crypto
                        .hash
                        .hash(HashAlgorithm::Sha256, certificate.data());
                    match ecies_unwrap(self.crypto.decrypt.as_ref(), private, ecies, &p1) {
                        Ok(key) => found = Some((key, *id)),
                        Err(e) => {
                            debug!(recipient = %id, error = %e, "recipient key not unwrapped");
                            failed = true;
                        }
                    }
                }
            }
            if found.is_some() {
                break;
            }
        }
        let (key, recipient) = found.ok_or(if failed {
            Error::DecryptionFailed
        } else {
            Error::UnknownRecipient
        })?;
        let plain = self.crypto.decrypt.decrypt_ccm(
            &key,
            &parts.nonce,
            &message.message()[parts.ciphertext.clone()],
        )?;
        message.set_decrypted(plain);
        let info = message.encryption_info_mut();
        info.key = Some(key);
        info.recipient = Some(recipient);
        trace!(%recipient, "decrypted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cert::fixtures::{Pki, DENM_SSP},
        config::Config,
        crypto::OpensslEngine,
        engine::tests::{engine, install},
    };

    /// Flips a bit in the key tag of the `index`th recipient
    fn corrupt_recipient(data: &mut [u8], index: usize) {
        let parts = EncryptedParts::extract(&OpensslEngine::new(), data).unwrap();
        let RecipientKey::Ecies(ecies) = &parts.recipients[index].1 else {
            panic!("not a certificate recipient");
        };
        let at = data
            .windows(ecies.t.len())
            .position(|w| w == ecies.t.as_slice())
            .unwrap();
        data[at] ^= 0x01;
    }

    #[test]
    fn decrypts_with_any_own_recipient() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        let mut b = engine(&pki, "B");
        let (first, second) = (pki.at("first"), pki.at("second"));
        install(&mut b, &first);
        let second_digest = install(&mut b, &second).digest();

        let mut message = MessageInfo::encrypted(1024);
        a.prepare_message(&mut message).unwrap();
        for identity in [&first, &second] {
            let known = a.install_certificate(&identity.data, None, None).unwrap();
            a.add_certificate_recipient(&mut message, &known.digest()).unwrap();
        }
        message.write_payload(b"secret").unwrap();
        a.finalize_message(&mut message).unwrap();
        let mut data = message.into_message();

        corrupt_recipient(&mut data, 0);
        let mut received = MessageInfo::with_buffer(data.clone());
        b.decrypt_message(&mut received).unwrap();
        assert_eq!(b"secret", received.payload());
        assert_eq!(Some(second_digest), received.encryption_info().unwrap().recipient);

        corrupt_recipient(&mut data, 1);
        let mut received = MessageInfo::with_buffer(data);
        assert_eq!(Err(Error::DecryptionFailed), b.decrypt_message(&mut received));
    }

    #[test]
    fn frames_unsecured_payloads() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let mut message = MessageInfo::unsecured(64);
        assert_eq!(UNSECURED_OVERHEAD, engine.prepare_message(&mut message).unwrap());
        assert_eq!(64 - UNSECURED_OVERHEAD, message.payload().len());
        message.write_payload(&[1, 2, 3]).unwrap();
        assert_eq!(6, engine.finalize_message(&mut message).unwrap());
        assert_eq!(&[0x03, 0x80, 0x03, 0x01, 0x02, 0x03][..], message.message());
        assert_eq!(&[1u8, 2, 3][..], message.payload());

        let mut received = MessageInfo::with_buffer(message.into_message());
        assert_eq!(PayloadType::Unsecured, engine.parse_message(&mut received).unwrap());
        assert_eq!(&[1u8, 2, 3][..], received.payload());
        assert_eq!(
            Err(Error::UnsupportedPayloadType),
            engine.parse_signed_message(&mut received)
        );
    }

    #[test]
    fn rejects_small_buffers() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        install(&mut engine, &pki.at("at"));
        let mut message = MessageInfo::signed(aid::DENM, &DENM_SSP, 100);
        assert!(matches!(
            engine.prepare_message(&mut message),
            Err(Error::BufferTooSmall { available: 100, .. })
        ));
        assert!(message.status().is_some());

        let mut message = MessageInfo::unsecured(3);
        assert!(engine.prepare_message(&mut message).is_err());
    }

    #[test]
    fn signs_external_payloads() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        let at = install(&mut a, &pki.at("at"));
        let mut message = MessageInfo::signed(aid::DENM, &DENM_SSP, 1024);
        message.payload_type = PayloadType::SignedExternal;
        a.prepare_message(&mut message).unwrap();
        message.write_payload(b"stored elsewhere").unwrap();
        a.finalize_message(&mut message).unwrap();
        let hash = crate::crypto::hash(HashAlgorithm::Sha256, b"stored elsewhere");
        assert_eq!(Some(&hash), message.sign_info().unwrap().external_hash.as_ref());
        assert!(message.payload().is_empty());

        let mut b = engine(&pki, "B");
        b.install_certificate(&at.data()[..], None, None).unwrap();
        let mut received = MessageInfo::with_buffer(message.into_message());
        b.validate_signed_message(&mut received).unwrap();
        assert_eq!(PayloadType::SignedExternal, received.payload_type);
        assert_eq!(Some(&hash), received.sign_info().unwrap().external_hash.as_ref());
    }

    #[test]
    fn signs_with_self_signed_keys() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let key = OpensslEngine::new().generate_key(Curve::NistP256).unwrap();
        let mut message = MessageInfo::signed(aid::CRT_REQ, &[], 512);
        message.sign_info_mut().signer_type = SignerType::SelfSigned;
        message.sign_info_mut().private_key = Some(key.private.clone());
        engine.prepare_message(&mut message).unwrap();
        message.write_payload(b"proof").unwrap();
        engine.finalize_message(&mut message).unwrap();

        let data = message.into_message();
        let mut received = MessageInfo::with_buffer(data.clone());
        assert_eq!(
            Err(Error::UnknownSigner(Digest::default())),
            engine.validate_signed_message(&mut received)
        );
        let mut received = MessageInfo::with_buffer(data);
        received.sign_info_mut().public_key = Some(key.public);
        engine.validate_signed_message(&mut received).unwrap();
        assert_eq!(b"proof", received.payload());
        assert_eq!(SignerType::SelfSigned, received.sign_info().unwrap().signer_type);
    }

    #[test]
    fn detects_modified_messages() {
        let pki = Pki::new(Curve::BrainpoolP384r1);
        let mut a = engine(&pki, "A");
        install(&mut a, &pki.at("at"));
        let mut b = engine(&pki, "B");
        let mut message = MessageInfo::signed(aid::DENM, &DENM_SSP, 1024);
        a.prepare_message(&mut message).unwrap();
        message.write_payload(b"original").unwrap();
        a.finalize_message(&mut message).unwrap();
        let start = message.payload().as_ptr() as usize - message.message().as_ptr() as usize;

        let mut data = message.into_message();
        data[start] ^= 1;
        let mut received = MessageInfo::with_buffer(data);
        assert_eq!(
            Err(Error::SignatureMismatch),
            b.validate_signed_message(&mut received)
        );
    }

    #[test]
    fn checks_message_freshness() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        install(&mut a, &pki.at("at"));
        let mut b = engine(&pki, "B");
        let sign = |a: &mut Engine, generation: u64, expiry: Option<u64>| {
            let mut message = MessageInfo::signed(aid::DENM, &DENM_SSP, 1024);
            message.generation_time = generation;
            message.expiry_time = expiry;
            a.prepare_message(&mut message).unwrap();
            message.write_payload(b"x").unwrap();
            a.finalize_message(&mut message).unwrap();
            MessageInfo::with_buffer(message.into_message())
        };
        let now = time::now64();
        let mut future = sign(&mut a, now + 60_000_000, None);
        assert_eq!(Err(Error::FutureMessage), b.validate_signed_message(&mut future));
        let mut expired = sign(&mut a, now - 10_000_000, Some(now - 5_000_000));
        assert_eq!(Err(Error::MessageExpired), b.validate_signed_message(&mut expired));
        let mut fresh = sign(&mut a, now, Some(now + 5_000_000));
        b.validate_signed_message(&mut fresh).unwrap();
    }

    #[test]
    fn checks_signer_permissions() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        let at = install(&mut a, &pki.at("at"));
        let mut b = engine(&pki, "B");
        let mut message = MessageInfo::signed(aid::SPATEM, &[], 1024);
        message.sign_info_mut().certificate = Some(at);
        a.prepare_message(&mut message).unwrap();
        message.write_payload(b"x").unwrap();
        a.finalize_message(&mut message).unwrap();
        let mut received = MessageInfo::with_buffer(message.into_message());
        assert_eq!(Err(Error::NoPermission), b.validate_signed_message(&mut received));
    }

    #[test]
    fn sends_the_certificate_periodically() {
        let pki = Pki::new(Curve::NistP256);
        let mut config = Config::default();
        config.app_profiles[0].cert_period_ms = 60_000;
        let mut a = Engine::new(config, "A").unwrap();
        a.install_certificate(&pki.root.data, None, None).unwrap();
        a.install_certificate(&pki.aa.data, None, None).unwrap();
        install(&mut a, &pki.at("at"));
        let mut signer_types = Vec::new();
        for _ in 0..3 {
            let mut message = MessageInfo::signed(aid::CAM, &[], 1024);
            a.prepare_message(&mut message).unwrap();
            message.write_payload(b"cam").unwrap();
            a.finalize_message(&mut message).unwrap();
            signer_types.push(message.sign_info().unwrap().signer_type);
        }
        assert_eq!(
            vec![SignerType::Certificate, SignerType::Digest, SignerType::Digest],
            signer_types
        );
    }

    #[test]
    fn answers_p2p_certificate_requests() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        let at = install(&mut a, &pki.at("at"));
        // B trusts the root but does not know the AA
        let mut b = Engine::new(Config::default(), "B").unwrap();
        b.install_certificate(&pki.root.data, None, None).unwrap();
        let aa = pki.aa_certificate().digest();
        let cam = |engine: &mut Engine, message: &mut MessageInfo| {
            engine.prepare_message(message).unwrap();
            message.write_payload(b"cam").unwrap();
            engine.finalize_message(message).unwrap();
        };

        let mut message = MessageInfo::signed(aid::CAM, &[], 1024);
        cam(&mut a, &mut message);
        let mut received = MessageInfo::with_buffer(message.into_message());
        assert_eq!(
            Err(Error::UnknownIssuer(aa)),
            b.validate_signed_message(&mut received)
        );
        assert!(b.p2p.requested.contains_key(&aa.hashed_id3()));

        // B asks for the AA in its next CAM
        let b_key = OpensslEngine::new().generate_key(Curve::NistP256).unwrap();
        let mut request = MessageInfo::signed(aid::CAM, &[], 1024);
        request.sign_info_mut().signer_type = SignerType::SelfSigned;
        request.sign_info_mut().private_key = Some(b_key.private.clone());
        cam(&mut b, &mut request);
        let parts = SignedParts::extract(request.message()).unwrap();
        assert_eq!(vec![aa.hashed_id3()], parts.p2p_requests);

        // A ignores the request until the message verifies
        let request = request.into_message();
        let mut received = MessageInfo::with_buffer(request.clone());
        assert_eq!(
            Err(Error::UnknownSigner(Digest::default())),
            a.validate_signed_message(&mut received)
        );
        assert!(a.p2p.to_send.is_empty());

        let mut received = MessageInfo::with_buffer(request);
        received.sign_info_mut().public_key = Some(b_key.public.clone());
        a.validate_signed_message(&mut received).unwrap();
        assert!(a.p2p.to_send.contains(&aa.hashed_id3()));

        // A answers with the AA and keeps signing with its digest
        let mut message = MessageInfo::signed(aid::CAM, &[], 2048);
        cam(&mut a, &mut message);
        let parts = SignedParts::extract(message.message()).unwrap();
        assert!(parts.requested_certificate.is_some());
        assert_eq!(SignerRef::Digest(at.digest()), parts.signer);
        assert!(a.p2p.to_send.is_empty());

        let mut received = MessageInfo::with_buffer(message.into_message());
        b.validate_signed_message(&mut received).unwrap();
        assert_eq!(b"cam", received.payload());
        assert!(b.certificate(&aa).is_some_and(|c| c.is_trusted()));
        assert!(!b.p2p.requested.contains_key(&aa.hashed_id3()));
    }
}
