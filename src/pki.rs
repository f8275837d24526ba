//! TS 102941 PKI client: enrolment and authorization requests, their
//! responses and loading of trust information received from PKI servers.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    aid,
    cert::{AidSsp, Certificate, Digest},
    crypto::{CryptoEngine, Curve, KeyPair, PrivateKey, PublicKey},
    engine::{Engine, Event},
    message::{MessageInfo, SignerType},
    time,
    types::{
        self, BasePublicEncryptionKey, CertificateSubjectAttributes, EtsiTs102941Data,
        EtsiTs102941DataContent, HashAlgorithm, HashedId8, Ieee1609Dot2Data, InnerAtRequest,
        InnerEcRequest, Psid, PsidSsp, PublicEncryptionKey, PublicKeys, ResponseCode,
        SequenceOfPsidSsp, ServiceSpecificPermissions, SharedAtRequest, SymmAlgorithm, Uint8,
    },
    Decode, Encode, Error, PayloadType, Result,
};

pub const PKI_VERSION: u8 = 1;
/// explicit certificates
const CERTIFICATE_FORMAT: u8 = 1;
const REQUEST_HASH_SIZE: usize = 16;
const KEY_TAG_SIZE: usize = 16;
const HMAC_KEY_SIZE: usize = 32;
const MAX_REQUEST_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Enrolment,
    Authorization,
}

/// Canonical identity of the station, registered at the enrolment authority
#[derive(Debug, Clone)]
pub struct StationIdentity {
    pub its_id: Vec<u8>,
    pub canonical_key: PrivateKey,
}

/// Keys and permissions of a requested certificate
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub curve: Curve,
    /// request an encryption key as well
    pub encryption_key: bool,
    pub app_permissions: Vec<AidSsp>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            curve: Curve::NistP256,
            encryption_key: false,
            app_permissions: Vec::new(),
        }
    }
}

/// A request waiting for the response of its authority
///
/// Holds the generated private keys until the certificate is issued.
#[derive(Debug)]
pub struct PkiRequest {
    kind: RequestKind,
    authority: Digest,
    data: Vec<u8>,
    aes_key: Vec<u8>,
    request_hash: [u8; REQUEST_HASH_SIZE],
    verification: KeyPair,
    encryption: Option<KeyPair>,
}

impl PkiRequest {
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// EA or AA the request is encrypted to
    #[must_use]
    pub fn authority(&self) -> Digest {
        self.authority
    }

    /// encrypted request to be sent to the authority
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn request_hash(&self) -> &[u8] {
        &self.request_hash
    }
}

enum RequestSigner {
    Key(PrivateKey),
    Certificate(Arc<Certificate>),
}

fn subject_attributes(permissions: &[AidSsp]) -> CertificateSubjectAttributes<'_> {
    CertificateSubjectAttributes {
        app_permissions: (!permissions.is_empty()).then(|| {
            SequenceOfPsidSsp(
                permissions
                    .iter()
                    .map(|p| PsidSsp {
                        psid: Psid(p.aid),
                        ssp: p.ssp.as_deref().map(ServiceSpecificPermissions::Opaque),
                    })
                    .collect(),
            )
        }),
        ..Default::default()
    }
}

fn encryption_key(key: &PublicKey) -> Result<PublicEncryptionKey<'_>> {
    let point = key.to_p256_point()?;
    Ok(PublicEncryptionKey {
        supported_symm_alg: SymmAlgorithm::Aes128Ccm,
        public_key: match key.curve {
            Curve::BrainpoolP256r1 => BasePublicEncryptionKey::EciesBrainpoolP256r1(point),
            _ => BasePublicEncryptionKey::EciesNistP256(point),
        },
    })
}

fn public_keys<'a>(
    verification: &'a KeyPair,
    encryption: Option<&'a KeyPair>,
) -> Result<PublicKeys<'a>> {
    Ok(PublicKeys {
        verification_key: verification.public.to_verification_key()?,
        encryption_key: encryption.map(|k| encryption_key(&k.public)).transpose()?,
    })
}

/// Key tag of an authorization request: the leftmost 16 bytes of the HMAC
/// over the encoded public keys
pub fn key_tag(engine: &dyn CryptoEngine, hmac_key: &[u8], keys: &PublicKeys) -> Result<Vec<u8>> {
    let mut data = keys.verification_key.encode_to_vec()?;
    if let Some(key) = &keys.encryption_key {
        data.extend(key.encode_to_vec()?);
    }
    let mut tag = engine.hmac(hmac_key, &data)?;
    tag.truncate(KEY_TAG_SIZE);
    Ok(tag)
}

impl Engine {
    /// Builds an enrolment request to the EA `authority`
    ///
    /// The request is signed with the canonical key of `station` around a
    /// proof of possession of the new verification key, and encrypted to the
    /// EA.
    pub fn prepare_ec_request(
        &mut self,
        station: &StationIdentity,
        authority: &Digest,
        params: &RequestParams,
    ) -> Result<PkiRequest> {
        let (verification, encryption) = self.generate_request_keys(params)?;
        let inner = InnerEcRequest {
            its_id: &station.its_id,
            certificate_format: Uint8(CERTIFICATE_FORMAT),
            public_keys: public_keys(&verification, encryption.as_ref())?,
            requested_subject_attributes: subject_attributes(&params.app_permissions),
        }
        .encode_to_vec()?;
        let pop = self.sign_request(&inner, RequestSigner::Key(verification.private.clone()), false)?;
        let data = EtsiTs102941Data {
            version: Uint8(PKI_VERSION),
            content: EtsiTs102941DataContent::EnrolmentRequest(
                Ieee1609Dot2Data::decode(&pop[..])?.decoded,
            ),
        }
        .encode_to_vec()?;
        let signed = self.sign_request(
            &data,
            RequestSigner::Key(station.canonical_key.clone()),
            false,
        )?;
        self.finish_request(RequestKind::Enrolment, *authority, &signed, verification, encryption)
    }

    /// Builds an authorization request to the AA `authority` with the local
    /// enrolment certificate `enrolment`
    ///
    /// The enrolment signature is encrypted to the EA when its certificate
    /// is known.
    pub fn prepare_at_request(
        &mut self,
        enrolment: &Digest,
        authority: &Digest,
        params: &RequestParams,
    ) -> Result<PkiRequest> {
        let ec = self
            .store
            .find(enrolment)
            .ok_or(Error::CertificateUnavailable(*enrolment))?;
        if ec.verification_private_key().is_none() {
            return Err(Error::MissingPrivateKey);
        }
        let ea = ec.issuer().ok_or(Error::UnknownIssuer(ec.digest()))?;
        let (verification, encryption) = self.generate_request_keys(params)?;
        let mut hmac_key = [0u8; HMAC_KEY_SIZE];
        self.crypto.random.random(&mut hmac_key)?;

        let keys = public_keys(&verification, encryption.as_ref())?;
        let tag = key_tag(self.crypto.hash.as_ref(), &hmac_key, &keys)?;
        let shared_at_request = SharedAtRequest {
            ea_id: HashedId8(&ea.0),
            key_tag: &tag,
            certificate_format: Uint8(CERTIFICATE_FORMAT),
            requested_subject_attributes: subject_attributes(&params.app_permissions),
            raw: &[],
        };
        let shared = shared_at_request.encode_to_vec()?;
        let signed_ec = self.sign_request(
            &shared,
            RequestSigner::Certificate(ec),
            true,
        )?;
        let encrypted_ec = match self.store.find(&ea) {
            Some(certificate) if certificate.encryption_key().is_some() => {
                Some(self.encrypt_request(&ea, &signed_ec)?.0)
            }
            _ => None,
        };
        let ec_signature = match &encrypted_ec {
            Some(encrypted) => {
                types::EcSignature::Encrypted(Ieee1609Dot2Data::decode(&encrypted[..])?.decoded)
            }
            None => types::EcSignature::Signed(Ieee1609Dot2Data::decode(&signed_ec[..])?.decoded),
        };
        let data = EtsiTs102941Data {
            version: Uint8(PKI_VERSION),
            content: EtsiTs102941DataContent::AuthorizationRequest(InnerAtRequest {
                public_keys: keys,
                hmac_key: &hmac_key,
                shared_at_request,
                ec_signature,
            }),
        }
        .encode_to_vec()?;
        let pop = self.sign_request(&data, RequestSigner::Key(verification.private.clone()), false)?;
        self.finish_request(RequestKind::Authorization, *authority, &pop, verification, encryption)
    }

    fn generate_request_keys(&self, params: &RequestParams) -> Result<(KeyPair, Option<KeyPair>)> {
        let verification = self.crypto.sign.generate_key(params.curve)?;
        let encryption = params
            .encryption_key
            .then(|| self.crypto.encrypt.generate_key(Curve::NistP256))
            .transpose()?;
        Ok((verification, encryption))
    }

    fn sign_request(&mut self, payload: &[u8], signer: RequestSigner, external: bool) -> Result<Vec<u8>> {
        let mut message = MessageInfo::signed(aid::CRT_REQ, &[], MAX_REQUEST_SIZE);
        if external {
            message.payload_type = PayloadType::SignedExternal;
        }
        let info = message.sign_info_mut();
        match signer {
            RequestSigner::Key(key) => {
                info.signer_type = SignerType::SelfSigned;
                info.private_key = Some(key);
            }
            RequestSigner::Certificate(certificate) => {
                info.signer_type = SignerType::Digest;
                info.certificate = Some(certificate);
            }
        }
        self.prepare_message(&mut message)?;
        message.write_payload(payload)?;
        self.finalize_message(&mut message)?;
        Ok(message.into_message())
    }

    /// Encrypts `payload` to `recipient`, returns the message and its AES key
    fn encrypt_request(&mut self, recipient: &Digest, payload: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let mut message = MessageInfo::encrypted(MAX_REQUEST_SIZE);
        self.prepare_message(&mut message)?;
        self.add_certificate_recipient(&mut message, recipient)?;
        message.write_payload(payload)?;
        self.finalize_message(&mut message)?;
        let key = message
            .encryption_info()
            .and_then(|info| info.key.clone())
            .ok_or(Error::UnknownRecipient)?;
        Ok((message.into_message(), key))
    }

    fn finish_request(
        &mut self,
        kind: RequestKind,
        authority: Digest,
        signed: &[u8],
        verification: KeyPair,
        encryption: Option<KeyPair>,
    ) -> Result<PkiRequest> {
        let (data, aes_key) = self.encrypt_request(&authority, signed)?;
        let hash = self.crypto.hash.hash(HashAlgorithm::Sha256, &data);
        let mut request_hash = [0; REQUEST_HASH_SIZE];
        request_hash.copy_from_slice(&hash[..REQUEST_HASH_SIZE]);
        info!(
            engine = %self.name(),
            ?kind,
            %authority,
            size = data.len(),
            "prepared PKI request"
        );
        Ok(PkiRequest {
            kind,
            authority,
            data,
            aes_key,
            request_hash,
            verification,
            encryption,
        })
    }

    /// Emits an `HttpPost` event with the request to the access point of its
    /// authority
    ///
    /// Returns false if no access point is known.
    pub fn post_request(&mut self, request: &PkiRequest) -> bool {
        let Some(url) = self.access_point(&request.authority).map(str::to_owned) else {
            debug!(authority = %request.authority, "no access point for PKI request");
            return false;
        };
        self.emit(&Event::HttpPost {
            url: &url,
            body: &request.data,
        })
    }

    /// Installs the enrolment certificate of the response to `request`
    pub fn process_ec_response(
        &mut self,
        request: &PkiRequest,
        response: &[u8],
    ) -> Result<Arc<Certificate>> {
        self.process_response(RequestKind::Enrolment, request, response)
    }

    /// Installs the authorization ticket of the response to `request`
    pub fn process_at_response(
        &mut self,
        request: &PkiRequest,
        response: &[u8],
    ) -> Result<Arc<Certificate>> {
        self.process_response(RequestKind::Authorization, request, response)
    }

    fn process_response(
        &mut self,
        kind: RequestKind,
        request: &PkiRequest,
        response: &[u8],
    ) -> Result<Arc<Certificate>> {
        let result = self.open_response(kind, request, response);
        match &result {
            Ok(certificate) => info!(
                engine = %self.name(),
                ?kind,
                digest = %certificate.digest(),
                "certificate issued"
            ),
            Err(e) => warn!(engine = %self.name(), ?kind, error = %e, "PKI response rejected"),
        }
        result
    }

    fn open_response(
        &mut self,
        kind: RequestKind,
        request: &PkiRequest,
        response: &[u8],
    ) -> Result<Arc<Certificate>> {
        if request.kind != kind {
            return Err(Error::PkiResponseMismatch);
        }
        let mut encrypted = MessageInfo::with_buffer(response.to_vec());
        encrypted.encryption_info_mut().key = Some(request.aes_key.clone());
        self.decrypt_message(&mut encrypted)?;
        let mut signed = encrypted.inner();
        self.validate_signed_message(&mut signed)?;
        if signed.sign_info().and_then(|info| info.digest) != Some(request.authority) {
            return Err(Error::PkiResponseMismatch);
        }

        let certificate = {
            let data = EtsiTs102941Data::decode(signed.payload())?.decoded;
            let response = match (kind, data.content) {
                (RequestKind::Enrolment, EtsiTs102941DataContent::EnrolmentResponse(response))
                | (
                    RequestKind::Authorization,
                    EtsiTs102941DataContent::AuthorizationResponse(response),
                ) => response,
                _ => return Err(Error::PkiResponseMismatch),
            };
            if response.request_hash != request.request_hash {
                return Err(Error::PkiResponseMismatch);
            }
            if response.response_code != ResponseCode::OK {
                return Err(Error::PkiResponseRejected(response.response_code.0));
            }
            response
                .certificate
                .ok_or(Error::PkiResponseMismatch)?
                .raw
                .to_vec()
        };
        self.install_certificate(
            &certificate,
            Some(&request.verification.private.d),
            request.encryption.as_ref().map(|k| k.private.d.as_slice()),
        )
    }

    /// Loads a certificate or a signed CRL or CTL received from a PKI server
    ///
    /// Certificates are stored but become trust anchors only by a CTL or
    /// [`Engine::install_certificate`].
    pub fn load_data(&mut self, data: &[u8]) -> Result<bool> {
        match data.first() {
            // sequence preamble of a certificate with signature
            Some(0x80) => {
                let certificate =
                    Certificate::from_bytes(self.crypto.verify.as_ref(), data.to_vec())?;
                let certificate = self.add_certificate(certificate)?;
                debug!(digest = %certificate.digest(), trusted = certificate.is_trusted(), "loaded certificate");
                Ok(true)
            }
            Some(_) => {
                let mut message = MessageInfo::with_buffer(data.to_vec());
                self.apply_trust_information(&mut message)
            }
            None => Err(Error::Decode("empty PKI data".into())),
        }
    }

    /// Requests the CTL of `root` from its distribution centres
    pub fn request_ctl(&mut self, root: &Digest) -> Result<usize> {
        self.request_list(root, aid::CTL, "getctl")
    }

    /// Requests the CRL of `root` from its distribution centres
    pub fn request_crl(&mut self, root: &Digest) -> Result<usize> {
        self.request_list(root, aid::CRL, "getcrl")
    }

    fn request_list(&mut self, root: &Digest, aid: u64, path: &str) -> Result<usize> {
        let certificate = self
            .store
            .find(root)
            .ok_or(Error::CertificateUnavailable(*root))?;
        if certificate.permission(aid).is_none() {
            return Err(Error::NoPermission);
        }
        let now = time::now32();
        let urls: Vec<String> = self
            .distribution_centres(root)
            .iter()
            .map(|dc| format!("{dc}/{path}/{root}"))
            .collect();
        if urls.is_empty() {
            debug!(%root, "no distribution centre known");
        }
        Ok(urls.iter().filter(|url| self.http_get(url, now)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cert::{
            fixtures::{Identity, Pki, CAM_SSP},
            CertState, CertificateBuilder, SspRange,
        },
        engine::tests::{engine, install, record, Seen},
        trust::tests::signed_by_root,
        types::{Duration, InnerEcResponse, SequenceOfHashedId8, ToBeSignedCrl, Uint16, Uint32},
    };

    const STATION_ID: [u8; 16] = [
        0xb1, 0xb8, 0xc6, 0xe0, 0xb7, 0x5d, 0xd6, 0xf6, 0x76, 0xd5, 0x77, 0x43, 0x6b, 0xb5, 0x41,
        0xde,
    ];

    struct Authority {
        engine: Engine,
        identity: Identity,
        certificate: Certificate,
    }

    impl Authority {
        fn digest(&self) -> Digest {
            self.certificate.digest()
        }
    }

    fn ea(pki: &Pki) -> Authority {
        let key = pki.engine.generate_key(Curve::NistP256).unwrap();
        let encryption = pki.engine.generate_key(Curve::NistP256).unwrap();
        let root = Certificate::from_bytes(&pki.engine, pki.root.data.clone()).unwrap();
        let data = CertificateBuilder::new(key.public.clone())
            .name("ea")
            .validity(time::now32() - 600, Duration::Years(Uint16(2)))
            .app_permission(aid::CRT_REQ, &[0x01, 0xC0])
            .issue(aid::CRT_REQ, SspRange::All)
            .encryption_key(encryption.public.clone())
            .sign(&pki.engine, &root, &pki.root.key.private)
            .unwrap();
        let identity = Identity {
            data,
            key,
            encryption,
        };
        let mut engine = engine(pki, "EA");
        install(&mut engine, &identity);
        Authority {
            certificate: Certificate::from_bytes(&pki.engine, identity.data.clone()).unwrap(),
            engine,
            identity,
        }
    }

    fn aa(pki: &Pki) -> Authority {
        let mut engine = engine(pki, "AA");
        install(&mut engine, &pki.aa);
        Authority {
            engine,
            identity: Identity {
                data: pki.aa.data.clone(),
                key: pki.aa.key.clone(),
                encryption: pki.aa.encryption.clone(),
            },
            certificate: pki.aa_certificate(),
        }
    }

    fn station(pki: &Pki) -> (StationIdentity, PublicKey) {
        let key = pki.engine.generate_key(Curve::NistP256).unwrap();
        (
            StationIdentity {
                its_id: STATION_ID.to_vec(),
                canonical_key: key.private,
            },
            key.public,
        )
    }

    /// request decrypted by the authority
    struct Opened {
        aes_key: Vec<u8>,
        request_hash: Vec<u8>,
        inner: MessageInfo,
    }

    fn open(authority: &mut Authority, request: &[u8]) -> Opened {
        let mut encrypted = MessageInfo::with_buffer(request.to_vec());
        authority.engine.decrypt_message(&mut encrypted).unwrap();
        Opened {
            aes_key: encrypted.encryption_info().unwrap().key.clone().unwrap(),
            request_hash: crate::crypto::hash(HashAlgorithm::Sha256, request)[..16].to_vec(),
            inner: encrypted.inner(),
        }
    }

    fn respond(authority: &mut Authority, aes_key: &[u8], data: &EtsiTs102941Data) -> Vec<u8> {
        let signer = authority.engine.certificate(&authority.digest()).unwrap();
        let mut signed = MessageInfo::signed(aid::CRT_REQ, &[], 8192);
        signed.sign_info_mut().certificate = Some(signer);
        authority.engine.prepare_message(&mut signed).unwrap();
        signed.write_payload(&data.encode_to_vec().unwrap()).unwrap();
        authority.engine.finalize_message(&mut signed).unwrap();

        let mut encrypted = MessageInfo::encrypted(8192);
        authority.engine.prepare_message(&mut encrypted).unwrap();
        authority
            .engine
            .add_psk_recipient(&mut encrypted, Some(aes_key), None)
            .unwrap();
        encrypted.write_payload(signed.message()).unwrap();
        authority.engine.finalize_message(&mut encrypted).unwrap();
        encrypted.into_message()
    }

    /// EA side: checks the enrolment request and issues the certificate
    fn enrol(ea: &mut Authority, canonical: &PublicKey, request: &[u8]) -> (Opened, Vec<u8>) {
        let mut opened = open(ea, request);
        opened.inner.sign_info_mut().public_key = Some(canonical.clone());
        ea.engine.validate_signed_message(&mut opened.inner).unwrap();
        let pop = {
            let data = EtsiTs102941Data::decode(opened.inner.payload()).unwrap().decoded;
            let EtsiTs102941DataContent::EnrolmentRequest(pop) = data.content else {
                panic!("not an enrolment request");
            };
            pop.encode_to_vec().unwrap()
        };
        let mut pop = MessageInfo::with_buffer(pop);
        ea.engine.parse_signed_message(&mut pop).unwrap();
        let crypto = crate::crypto::OpensslEngine::new();
        let (its_id, verification, encryption) = {
            let request = InnerEcRequest::decode(pop.payload()).unwrap().decoded;
            let encryption = request.public_keys.encryption_key.as_ref().map(|key| {
                let BasePublicEncryptionKey::EciesNistP256(point) = &key.public_key else {
                    panic!("unexpected encryption curve");
                };
                PublicKey::from_p256_point(&crypto, Curve::NistP256, point).unwrap()
            });
            (
                request.its_id.to_vec(),
                PublicKey::from_verification_key(&crypto, &request.public_keys.verification_key)
                    .unwrap(),
                encryption,
            )
        };
        assert_eq!(STATION_ID.to_vec(), its_id);
        pop.sign_info_mut().public_key = Some(verification.clone());
        ea.engine.validate_signed_message(&mut pop).unwrap();

        let mut builder = CertificateBuilder::new(verification)
            .name("ec")
            .validity(time::now32() - 60, Duration::Years(Uint16(1)))
            .app_permission(aid::CRT_REQ, &[0x01, 0xC0]);
        if let Some(key) = encryption {
            builder = builder.encryption_key(key);
        }
        let certificate = builder
            .sign(&crypto, &ea.certificate, &ea.identity.key.private)
            .unwrap();
        (opened, certificate)
    }

    fn ec_response(
        ea: &mut Authority,
        opened: &Opened,
        request_hash: &[u8],
        code: ResponseCode,
        certificate: &[u8],
    ) -> Vec<u8> {
        let data = EtsiTs102941Data {
            version: Uint8(PKI_VERSION),
            content: EtsiTs102941DataContent::EnrolmentResponse(InnerEcResponse {
                request_hash,
                response_code: code,
                certificate: Some(types::Certificate::decode(certificate).unwrap().decoded),
            }),
        };
        respond(ea, &opened.aes_key, &data)
    }

    #[test]
    fn enrols_and_authorizes() {
        let pki = Pki::new(Curve::NistP256);
        let mut ea = ea(&pki);
        let mut aa = aa(&pki);
        let (station, canonical) = station(&pki);
        let mut its = engine(&pki, "ITS");
        its.install_certificate(&ea.identity.data, None, None).unwrap();

        let request = its
            .prepare_ec_request(
                &station,
                &ea.digest(),
                &RequestParams {
                    encryption_key: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(RequestKind::Enrolment, request.kind());
        assert!(!its.post_request(&request));
        let (opened, certificate) = enrol(&mut ea, &canonical, request.data());
        assert_eq!(request.request_hash(), &opened.request_hash[..]);
        let response = ec_response(&mut ea, &opened, &opened.request_hash, ResponseCode::OK, &certificate);
        let ec = its.process_ec_response(&request, &response).unwrap();
        assert!(ec.is_trusted());
        assert!(ec.state().contains(CertState::LOCAL));
        assert_eq!(Some(ea.digest()), ec.issuer());

        let request = its
            .prepare_at_request(
                &ec.digest(),
                &aa.digest(),
                &RequestParams {
                    app_permissions: vec![AidSsp::new(aid::CAM, &CAM_SSP)],
                    ..Default::default()
                },
            )
            .unwrap();
        let mut opened = open(&mut aa, request.data());
        aa.engine.parse_signed_message(&mut opened.inner).unwrap();
        let (verification, tag_matches, ec_encrypted, ea_id) = {
            let data = EtsiTs102941Data::decode(opened.inner.payload()).unwrap().decoded;
            let EtsiTs102941DataContent::AuthorizationRequest(request) = data.content else {
                panic!("not an authorization request");
            };
            let tag = key_tag(&pki.engine, request.hmac_key, &request.public_keys).unwrap();
            (
                PublicKey::from_verification_key(&pki.engine, &request.public_keys.verification_key)
                    .unwrap(),
                tag == request.shared_at_request.key_tag,
                matches!(request.ec_signature, types::EcSignature::Encrypted(_)),
                request.shared_at_request.ea_id.0.to_vec(),
            )
        };
        assert!(tag_matches);
        assert!(ec_encrypted);
        assert_eq!(ea.digest().0.to_vec(), ea_id);
        opened.inner.sign_info_mut().public_key = Some(verification.clone());
        aa.engine.validate_signed_message(&mut opened.inner).unwrap();

        let ticket = CertificateBuilder::new(verification)
            .validity(time::now32() - 60, Duration::Hours(Uint16(24)))
            .app_permission(aid::CAM, &CAM_SSP)
            .sign(&pki.engine, &aa.certificate, &aa.identity.key.private)
            .unwrap();
        let response = respond(
            &mut aa,
            &opened.aes_key,
            &EtsiTs102941Data {
                version: Uint8(PKI_VERSION),
                content: EtsiTs102941DataContent::AuthorizationResponse(InnerEcResponse {
                    request_hash: &opened.request_hash,
                    response_code: ResponseCode::OK,
                    certificate: Some(types::Certificate::decode(&ticket[..]).unwrap().decoded),
                }),
            },
        );
        assert_eq!(
            Err(Error::PkiResponseMismatch),
            its.process_ec_response(&request, &response).map(|_| ())
        );
        let at = its.process_at_response(&request, &response).unwrap();
        assert!(at.is_trusted());

        let mut message = MessageInfo::signed(aid::CAM, &CAM_SSP, 1024);
        its.prepare_message(&mut message).unwrap();
        message.write_payload(b"cam").unwrap();
        its.finalize_message(&mut message).unwrap();
        assert_eq!(
            Some(at.digest()),
            message.sign_info().and_then(|i| i.certificate.as_ref()).map(|c| c.digest())
        );
        let mut peer = engine(&pki, "peer");
        let mut received = MessageInfo::with_buffer(message.into_message());
        peer.validate_signed_message(&mut received).unwrap();
        assert_eq!(b"cam", received.payload());
    }

    #[test]
    fn rejects_mismatching_responses() {
        let pki = Pki::new(Curve::NistP256);
        let mut ea = ea(&pki);
        let (station, canonical) = station(&pki);
        let mut its = engine(&pki, "ITS");
        its.install_certificate(&ea.identity.data, None, None).unwrap();
        let params = RequestParams::default();

        let request = its.prepare_ec_request(&station, &ea.digest(), &params).unwrap();
        let (opened, certificate) = enrol(&mut ea, &canonical, request.data());
        let rejected = ec_response(&mut ea, &opened, &opened.request_hash, ResponseCode(3), &certificate);
        assert_eq!(
            Err(Error::PkiResponseRejected(3)),
            its.process_ec_response(&request, &rejected).map(|_| ())
        );
        let other_hash = ec_response(&mut ea, &opened, &[0xAB; 16], ResponseCode::OK, &certificate);
        assert_eq!(
            Err(Error::PkiResponseMismatch),
            its.process_ec_response(&request, &other_hash).map(|_| ())
        );

        // encrypted with the key of another request
        let other = its.prepare_ec_request(&station, &ea.digest(), &params).unwrap();
        let (opened, certificate) = enrol(&mut ea, &canonical, other.data());
        let response = ec_response(&mut ea, &opened, &opened.request_hash, ResponseCode::OK, &certificate);
        assert_eq!(
            Err(Error::UnknownRecipient),
            its.process_ec_response(&request, &response).map(|_| ())
        );
        assert!(its.process_ec_response(&other, &response).is_ok());

        // unknown enrolment certificate
        let unknown = Certificate::from_bytes(&pki.engine, certificate).unwrap().digest();
        let mut stranger = engine(&pki, "stranger");
        assert_eq!(
            Err(Error::CertificateUnavailable(unknown)),
            stranger
                .prepare_at_request(&unknown, &pki.aa_certificate().digest(), &params)
                .map(|_| ())
        );
    }

    #[test]
    fn loads_pki_data() {
        let pki = Pki::new(Curve::NistP256);
        let mut its = Engine::new(crate::Config::default(), "ITS").unwrap();
        its.install_certificate(&pki.root.data, None, None).unwrap();
        let root = Certificate::from_bytes(&pki.engine, pki.root.data.clone())
            .unwrap()
            .digest();
        let aa = pki.aa_certificate().digest();

        assert_eq!(Ok(true), its.load_data(&pki.aa.data));
        assert!(its.certificate(&aa).is_some_and(|c| c.is_trusted()));
        assert!(its.load_data(&[]).is_err());

        let crl = EtsiTs102941Data {
            version: Uint8(PKI_VERSION),
            content: EtsiTs102941DataContent::CertificateRevocationList(ToBeSignedCrl {
                version: Uint8(1),
                this_update: Uint32(time::now32()),
                next_update: Uint32(time::now32() + 3600),
                entries: SequenceOfHashedId8(vec![HashedId8(&aa.0)]),
            }),
        };
        let message = signed_by_root(&pki, aid::CRL, &[0x01], &crl);
        assert_eq!(0x03, message[0]);
        assert_eq!(Ok(true), its.load_data(&message));
        assert!(its.certificate(&aa).is_some_and(|c| !c.is_trusted()));

        let seen = record(&mut its, false);
        assert_eq!(Ok(0), its.request_crl(&root));
        assert_eq!(Err(Error::NoPermission), its.request_ctl(&aa));
        assert_eq!(
            Err(Error::CertificateUnavailable(Digest([1; 8]))),
            its.request_ctl(&Digest([1; 8]))
        );
        assert!(!seen.lock().unwrap().iter().any(|s| matches!(s, Seen::HttpGet(_))));
    }
}
