//! The security engine: certificates, pseudonyms, pre-shared keys, events and
//! the queue of deferred operations.
//!
//! Envelope, trust list and PKI operations are implemented on [`Engine`] in
//! their own modules.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    fmt,
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::{
    aid,
    cert::{CertState, Certificate, Digest},
    config::{Config, ItsAid},
    crypto::{CryptoEngine, CryptoRegistry, AES_128_KEY_SIZE},
    geo::{DefaultRegionCheck, Location, RegionCheck},
    message::MessageInfo,
    store::{CertStore, PoolId},
    time,
    trust::TrustState,
    types::{HashAlgorithm, SymmetricEncryptionKey},
    Encode, Error, Result,
};

/// Kind of data in a [`Event::StoreData`] event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Certificate,
    Ctl,
    Crl,
}

/// Notifications of the engine
///
/// The return value of the handler is only evaluated for `ChangeId`, where
/// `false` vetoes the pseudonym change.
#[derive(Debug)]
pub enum Event<'a> {
    /// the pseudonym of `aid` is about to change
    ChangeId {
        aid: ItsAid,
        current: Option<&'a Certificate>,
        next: &'a Certificate,
    },
    IdChanged {
        aid: ItsAid,
        certificate: &'a Certificate,
    },
    /// completion of a deferred operation, the outcome is in the message status
    Signed(&'a MessageInfo),
    Validated(&'a MessageInfo),
    Encrypted(&'a MessageInfo),
    Decrypted(&'a MessageInfo),
    CertStatus {
        digest: Digest,
        from: CertState,
        to: CertState,
    },
    /// a message was signed by an unknown certificate
    CertificateRequest { digest: Digest },
    HttpGet { url: &'a str },
    HttpPost { url: &'a str, body: &'a [u8] },
    /// received trust information to be persisted by the application
    StoreData {
        id: Digest,
        data_type: DataType,
        data: &'a [u8],
    },
}

pub trait EventHandler: Send {
    fn on_event(&mut self, engine: &str, event: &Event<'_>) -> bool;
}

impl<F> EventHandler for F
where
    F: FnMut(&str, &Event<'_>) -> bool + Send,
{
    fn on_event(&mut self, engine: &str, event: &Event<'_>) -> bool {
        self(engine, event)
    }
}

/// Crypto engines by operation
#[derive(Debug, Clone)]
pub(crate) struct Crypto {
    pub(crate) hash: Arc<dyn CryptoEngine>,
    pub(crate) sign: Arc<dyn CryptoEngine>,
    pub(crate) verify: Arc<dyn CryptoEngine>,
    pub(crate) encrypt: Arc<dyn CryptoEngine>,
    pub(crate) decrypt: Arc<dyn CryptoEngine>,
    pub(crate) random: Arc<dyn CryptoEngine>,
}

/// Pseudonym state of one application
#[derive(Debug, Default)]
pub(crate) struct Pseudonym {
    pub(crate) current: Option<Arc<Certificate>>,
    /// Time32 of the selection of `current`
    selected_at: u32,
    locked: bool,
    /// announced successor applied on unlock
    pending: Option<Arc<Certificate>>,
    /// Time64 the certificate was last sent in full
    pub(crate) certificate_sent_at: Option<u64>,
}

/// Peer to peer certificate distribution state, by HashedId3
#[derive(Debug, Default)]
pub(crate) struct P2pState {
    /// unknown certificates to ask peers for, with the Time32 of the request
    pub(crate) requested: BTreeMap<[u8; 3], u32>,
    /// certificates peers asked for that this station answers
    pub(crate) to_send: BTreeSet<[u8; 3]>,
    /// answers suppressed because another station already sent the certificate
    pub(crate) cancelled: BTreeSet<[u8; 3]>,
    /// a peer asked for the own authorization ticket
    pub(crate) send_own_certificate: bool,
}

#[derive(Debug)]
pub(crate) struct PreSharedKey {
    pub(crate) key: Vec<u8>,
    pub(crate) used_at: u32,
}

/// Operation waiting for [`Engine::proceed_async`]
#[derive(Debug)]
pub(crate) enum Task {
    Finalize(MessageInfo),
    Validate(MessageInfo),
    Decrypt(MessageInfo),
}

/// HashedId8 of a pre-shared AES key
pub fn pre_shared_key_digest(engine: &dyn CryptoEngine, key: &[u8]) -> Result<Digest> {
    let encoded = SymmetricEncryptionKey::Aes128Ccm(key).encode_to_vec()?;
    Ok(Digest::from_hash(&engine.hash(HashAlgorithm::Sha256, &encoded)))
}

/// V2X security processor instance
///
/// An engine is driven by one owning thread. Deferred operations are queued
/// and executed by [`Engine::proceed_async`].
pub struct Engine {
    name: String,
    pub(crate) config: Config,
    pub(crate) crypto: Crypto,
    pub(crate) store: CertStore,
    pub(crate) trust: TrustState,
    pub(crate) geo: Box<dyn RegionCheck>,
    pub(crate) pseudonyms: BTreeMap<ItsAid, Pseudonym>,
    pub(crate) psk: BTreeMap<Digest, PreSharedKey>,
    pub(crate) p2p: P2pState,
    /// pseudonym changes of all applications are locked
    locked_any: bool,
    queue: VecDeque<Task>,
    handler: Option<Box<dyn EventHandler>>,
    last_purge: u32,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("queued", &self.queue.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine with the crypto engines registered by default
    pub fn new(config: Config, name: &str) -> Result<Self> {
        Self::with_registry(config, name, &CryptoRegistry::default())
    }

    pub fn with_registry(config: Config, name: &str, registry: &CryptoRegistry) -> Result<Self> {
        config.check()?;
        let crypto = Crypto {
            hash: registry.create(&config.crypto.hash)?,
            sign: registry.create(&config.crypto.sign)?,
            verify: registry.create(&config.crypto.verify)?,
            encrypt: registry.create(&config.crypto.encrypt)?,
            decrypt: registry.create(&config.crypto.decrypt)?,
            random: registry.create(&config.crypto.random)?,
        };
        info!(engine = name, crypto = crypto.sign.name(), "created security engine");
        Ok(Self {
            name: name.to_owned(),
            store: Self::new_store(&config),
            config,
            crypto,
            trust: TrustState::default(),
            geo: Box::new(DefaultRegionCheck),
            pseudonyms: BTreeMap::new(),
            psk: BTreeMap::new(),
            p2p: P2pState::default(),
            locked_any: false,
            queue: VecDeque::new(),
            handler: None,
            last_purge: 0,
        })
    }

    fn new_store(config: &Config) -> CertStore {
        CertStore::new(
            &config.pool_max_size,
            config
                .flags
                .contains(crate::config::EngineFlags::ALLOW_CERT_DUPLICATIONS),
            config.max_chain_depth,
        )
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &CertStore {
        &self.store
    }

    pub fn set_event_handler(&mut self, handler: impl EventHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    pub fn set_region_check(&mut self, geo: Box<dyn RegionCheck>) {
        self.geo = geo;
    }

    /// Calls the event handler, `true` without one
    pub(crate) fn emit(&mut self, event: &Event<'_>) -> bool {
        match self.handler.as_mut() {
            Some(handler) => handler.on_event(&self.name, event),
            None => true,
        }
    }

    /// Drops all certificates, keys and pending state
    pub fn clean(&mut self) {
        self.store = Self::new_store(&self.config);
        self.trust = TrustState::default();
        self.pseudonyms.clear();
        self.psk.clear();
        self.p2p = P2pState::default();
        self.locked_any = false;
        self.queue.clear();
        info!(engine = %self.name, "cleaned security engine");
    }

    #[must_use]
    pub fn certificate(&self, digest: &Digest) -> Option<Arc<Certificate>> {
        self.store.find(digest)
    }

    /// Installs a certificate
    ///
    /// Local identities come with their private keys, self-signed
    /// certificates become trust anchors.
    pub fn install_certificate(
        &mut self,
        data: &[u8],
        verification_key: Option<&[u8]>,
        encryption_key: Option<&[u8]>,
    ) -> Result<Arc<Certificate>> {
        let engine = self.crypto.verify.clone();
        let mut certificate = Certificate::from_bytes(engine.as_ref(), data.to_vec())?;
        if verification_key.is_some() || encryption_key.is_some() {
            certificate =
                certificate.with_private_keys(engine.as_ref(), verification_key, encryption_key)?;
            // replace a copy received before without keys
            let digest = certificate.digest();
            if self
                .store
                .find(&digest)
                .is_some_and(|c| c.verification_private_key().is_none())
            {
                self.store.del(&digest);
            }
        }
        if certificate.is_self_signed() {
            self.store.add_trust_anchor(certificate.digest());
        }
        let certificate = self.add_certificate(certificate)?;
        info!(
            engine = %self.name,
            digest = %certificate.digest(),
            name = certificate.name(),
            state = certificate.state().0,
            "installed certificate"
        );
        Ok(certificate)
    }

    /// Stores a certificate and validates it together with the certificates
    /// waiting for it
    pub(crate) fn add_certificate(&mut self, certificate: Certificate) -> Result<Arc<Certificate>> {
        if self.trust.is_revoked(&certificate.digest()) {
            certificate.set_state(CertState::REVOKED);
        }
        let certificate = self.store.add(certificate, time::now32())?;
        if self.revoked_by_crl(&certificate) {
            certificate.set_state(CertState::REVOKED);
        }
        if let Some(issuer) =
            self.store
                .relink_certificate(self.crypto.verify.as_ref(), self.geo.as_ref(), &certificate)
        {
            debug!(digest = %certificate.digest(), %issuer, "issuer is not known yet");
        }
        self.trust.observe(&certificate);
        Ok(certificate)
    }

    /// Relinks all pools, returns the issuers that are still unknown
    pub fn relink_certificates(&mut self) -> Vec<Digest> {
        let mut missing: Vec<Digest> = PoolId::ALL
            .iter()
            .flat_map(|pool| {
                self.store
                    .relink(self.crypto.verify.as_ref(), self.geo.as_ref(), *pool)
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Best local certificate for signing messages of `aid` with `ssp`
    ///
    /// Candidates are trusted local identities valid at `time64` and
    /// `position`. The one with the latest start wins, then the lowest digest.
    pub fn select_ee_certificate(
        &self,
        aid: ItsAid,
        ssp: &[u8],
        ssp_mask: &[u8],
        position: Option<&Location>,
        time64: u64,
    ) -> Result<Arc<Certificate>> {
        self.eligible(aid, ssp, ssp_mask, position, time64, None)
            .ok_or(Error::NoEligibleCertificate)
    }

    fn eligible(
        &self,
        aid: ItsAid,
        ssp: &[u8],
        ssp_mask: &[u8],
        position: Option<&Location>,
        time64: u64,
        except: Option<Digest>,
    ) -> Option<Arc<Certificate>> {
        self.store
            .pool(PoolId::At)
            .iter()
            .filter(|c| {
                Some(c.digest()) != except
                    && c.verification_private_key().is_some()
                    && c.is_trusted()
                    && c.is_valid_for(aid, ssp, ssp_mask, position, time64, self.geo.as_ref())
            })
            .max_by(|a, b| {
                a.start()
                    .cmp(&b.start())
                    .then_with(|| b.digest().cmp(&a.digest()))
            })
            .cloned()
    }

    /// Pseudonym currently used for `aid`, selected on first use
    pub fn current_certificate(&mut self, aid: ItsAid) -> Option<Arc<Certificate>> {
        self.signing_certificate(aid, &[], &[], None, time::now64()).ok()
    }

    /// Current pseudonym if it grants `ssp`, otherwise a newly selected one
    pub(crate) fn signing_certificate(
        &mut self,
        aid: ItsAid,
        ssp: &[u8],
        ssp_mask: &[u8],
        position: Option<&Location>,
        time64: u64,
    ) -> Result<Arc<Certificate>> {
        let current = self.pseudonyms.get(&aid).and_then(|p| p.current.clone());
        if let Some(current) = current {
            if current.is_valid_for(aid, ssp, ssp_mask, position, time64, self.geo.as_ref()) {
                return Ok(current);
            }
        }
        let selected = self.select_ee_certificate(aid, ssp, ssp_mask, position, time64)?;
        debug!(aid, digest = %selected.digest(), "selected pseudonym");
        let pseudonym = self.pseudonyms.entry(aid).or_default();
        pseudonym.current = Some(selected.clone());
        pseudonym.selected_at = time::time32_from_64(time64);
        pseudonym.certificate_sent_at = None;
        Ok(selected)
    }

    /// Uses the local certificate `digest` as pseudonym of `aid`
    pub fn select(&mut self, aid: ItsAid, digest: &Digest) -> Result<Arc<Certificate>> {
        let certificate = self
            .store
            .find(digest)
            .filter(|c| c.verification_private_key().is_some())
            .ok_or(Error::NoEligibleCertificate)?;
        if !self.swap_pseudonym(aid, certificate.clone()) {
            return Err(Error::NoEligibleCertificate);
        }
        Ok(certificate)
    }

    fn aids(&self, aid: ItsAid) -> Vec<ItsAid> {
        if aid == aid::ANY && !self.pseudonyms.is_empty() {
            self.pseudonyms.keys().copied().collect()
        } else {
            vec![aid]
        }
    }

    /// Requests a pseudonym change for `aid`, or for every application with
    /// `aid::ANY`
    ///
    /// Returns `false` if no other certificate is eligible or the change was
    /// vetoed. A locked application announces the change with `ChangeId` now
    /// and reports `IdChanged` once it is unlocked.
    pub fn change_id(&mut self, aid: ItsAid) -> bool {
        self.aids(aid)
            .into_iter()
            .fold(false, |changed, aid| self.change_single(aid) || changed)
    }

    fn is_locked(&self, aid: ItsAid) -> bool {
        self.locked_any || self.pseudonyms.get(&aid).is_some_and(|p| p.locked)
    }

    fn change_single(&mut self, aid: ItsAid) -> bool {
        if !self.is_locked(aid) {
            return self.apply_change(aid);
        }
        if self.pseudonyms.get(&aid).is_some_and(|p| p.pending.is_some()) {
            return true;
        }
        let Some(next) = self.successor(aid) else {
            debug!(aid, "no alternative pseudonym");
            return false;
        };
        if !self.announce(aid, &next) {
            return false;
        }
        debug!(aid, digest = %next.digest(), "pseudonym change deferred");
        self.pseudonyms.entry(aid).or_default().pending = Some(next);
        true
    }

    /// Eligible certificate other than the current pseudonym of `aid`
    fn successor(&self, aid: ItsAid) -> Option<Arc<Certificate>> {
        let current = self
            .pseudonyms
            .get(&aid)
            .and_then(|p| p.current.as_ref().map(|c| c.digest()));
        self.eligible(aid, &[], &[], None, time::now64(), current)
    }

    fn apply_change(&mut self, aid: ItsAid) -> bool {
        let Some(next) = self.successor(aid) else {
            debug!(aid, "no alternative pseudonym");
            return false;
        };
        self.swap_pseudonym(aid, next)
    }

    /// Emits `ChangeId`, `false` if the handler vetoed
    fn announce(&mut self, aid: ItsAid, next: &Arc<Certificate>) -> bool {
        let current = self.pseudonyms.get(&aid).and_then(|p| p.current.clone());
        let accepted = self.emit(&Event::ChangeId {
            aid,
            current: current.as_deref(),
            next,
        });
        if !accepted {
            info!(aid, "pseudonym change vetoed");
        }
        accepted
    }

    fn swap_pseudonym(&mut self, aid: ItsAid, next: Arc<Certificate>) -> bool {
        if !self.announce(aid, &next) {
            return false;
        }
        self.commit_pseudonym(aid, next);
        true
    }

    fn commit_pseudonym(&mut self, aid: ItsAid, next: Arc<Certificate>) {
        let pseudonym = self.pseudonyms.entry(aid).or_default();
        pseudonym.current = Some(next.clone());
        pseudonym.selected_at = time::now32();
        pseudonym.pending = None;
        pseudonym.certificate_sent_at = None;
        if !self.config.keep_cancelled_aa_requests {
            self.p2p.cancelled.clear();
        }
        info!(aid, digest = %next.digest(), "pseudonym changed");
        self.emit(&Event::IdChanged {
            aid,
            certificate: &next,
        });
    }

    /// Applies the change announced while `aid` was locked
    fn apply_pending(&mut self, aid: ItsAid) -> bool {
        let Some(next) = self.pseudonyms.get_mut(&aid).and_then(|p| p.pending.take()) else {
            return true;
        };
        let usable = next.is_trusted()
            && next.is_valid_for(aid, &[], &[], None, time::now64(), self.geo.as_ref());
        if usable {
            self.commit_pseudonym(aid, next);
            true
        } else {
            self.apply_change(aid)
        }
    }

    /// Locks or unlocks pseudonym changes, unlocking applies a deferred change
    ///
    /// `aid::ANY` locks the changes of all applications, including those
    /// without a pseudonym yet.
    pub fn lock_id_change(&mut self, aid: ItsAid, lock: bool) -> bool {
        if aid == aid::ANY {
            self.locked_any = lock;
        } else {
            self.pseudonyms.entry(aid).or_default().locked = lock;
        }
        if lock || self.locked_any {
            return true;
        }
        let pending: Vec<ItsAid> = self
            .pseudonyms
            .iter()
            .filter(|(id, p)| p.pending.is_some() && !p.locked && (aid == aid::ANY || **id == aid))
            .map(|(id, _)| *id)
            .collect();
        pending
            .into_iter()
            .fold(true, |ok, aid| self.apply_pending(aid) && ok)
    }

    /// Changes the pseudonym once the change period of the profile elapsed
    pub(crate) fn check_change_period(&mut self, aid: ItsAid, now32: u32) {
        let period = self
            .config
            .find_profile(aid)
            .map_or(0, |p| p.cert_change_period_s);
        let due = self.pseudonyms.get(&aid).is_some_and(|p| {
            period > 0 && p.current.is_some() && now32 >= p.selected_at.saturating_add(period)
        });
        if due {
            debug!(aid, "pseudonym change period elapsed");
            if !self.change_single(aid) {
                // keep the pseudonym and retry after another period
                if let Some(p) = self.pseudonyms.get_mut(&aid) {
                    p.selected_at = now32;
                }
            }
        }
    }

    /// Installs a pre-shared AES-128 key, returns its digest
    pub fn install_pre_shared_key(&mut self, key: &[u8]) -> Result<Digest> {
        if self.config.psk_storage_duration == 0 {
            return Err(Error::UnsupportedAlgorithm(
                "Pre-shared keys are disabled".into(),
            ));
        }
        if key.len() != AES_128_KEY_SIZE {
            return Err(Error::KeySizeMismatch);
        }
        let digest = pre_shared_key_digest(self.crypto.hash.as_ref(), key)?;
        self.psk.insert(
            digest,
            PreSharedKey {
                key: key.to_vec(),
                used_at: time::now32(),
            },
        );
        debug!(%digest, "installed pre-shared key");
        Ok(digest)
    }

    pub(crate) fn pre_shared_key(&mut self, digest: &Digest) -> Option<Vec<u8>> {
        self.psk.get_mut(digest).map(|psk| {
            psk.used_at = time::now32();
            psk.key.clone()
        })
    }

    pub(crate) fn enqueue(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    /// Executes the queued operations in submission order
    ///
    /// Every completion is reported with its event and the processed messages
    /// are returned. The status of each message holds the error of a failed
    /// operation.
    pub fn proceed_async(&mut self) -> Vec<MessageInfo> {
        let mut done = Vec::with_capacity(self.queue.len());
        while let Some(task) = self.queue.pop_front() {
            let message = match task {
                Task::Finalize(mut message) => {
                    let _ = self.finalize_message(&mut message);
                    if message.encryption_info().is_some() {
                        self.emit(&Event::Encrypted(&message));
                    } else {
                        self.emit(&Event::Signed(&message));
                    }
                    message
                }
                Task::Validate(mut message) => {
                    let _ = self.validate_signed_message(&mut message);
                    self.emit(&Event::Validated(&message));
                    message
                }
                Task::Decrypt(mut message) => {
                    let _ = self.decrypt_message(&mut message);
                    self.emit(&Event::Decrypted(&message));
                    message
                }
            };
            done.push(message);
        }
        done
    }

    /// Periodic housekeeping, runs at most once per purge period
    ///
    /// Drops expired certificates, authorization tickets of peers unused for
    /// `max_received_lifetime`, unused pre-shared keys and stale requests.
    /// Returns the number of removed certificates.
    pub fn purge(&mut self, now32: u32) -> usize {
        let period = self.config.purge_period;
        if period == 0 || now32 < self.last_purge.saturating_add(period) {
            return 0;
        }
        self.last_purge = now32;
        let removed = self.store.purge(now32, self.config.max_received_lifetime);
        for digest in &removed {
            self.trust.forget(digest);
        }
        let psk_lifetime = self.config.psk_storage_duration;
        self.psk
            .retain(|_, psk| now32.saturating_sub(psk.used_at) <= psk_lifetime);
        let request_lifetime = self.config.request_storage_duration;
        self.p2p
            .requested
            .retain(|_, at| now32.saturating_sub(*at) <= request_lifetime);
        self.trust.expire_requests(now32, request_lifetime);
        if !removed.is_empty() {
            debug!(engine = %self.name, count = removed.len(), "purged certificates");
        }
        removed.len()
    }

    /// Sets `REVOKED` on a certificate without revalidating its dependents
    pub fn revoke_certificate_id(&mut self, digest: &Digest) -> bool {
        self.trust.revoke(*digest);
        match self.store.find(digest) {
            Some(certificate) => {
                certificate.set_state(CertState::REVOKED);
                warn!(%digest, "certificate revoked");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        cert::fixtures::{Identity, Pki, CAM_SSP, DENM_SSP},
        crypto::Curve,
        message::SignerType,
        PayloadType,
    };

    /// engine trusting the root and knowing the AA of `pki`
    pub(crate) fn engine(pki: &Pki, name: &str) -> Engine {
        let mut engine = Engine::new(Config::default(), name).unwrap();
        engine.install_certificate(&pki.root.data, None, None).unwrap();
        engine.install_certificate(&pki.aa.data, None, None).unwrap();
        engine
    }

    pub(crate) fn install(engine: &mut Engine, identity: &Identity) -> Arc<Certificate> {
        engine
            .install_certificate(
                &identity.data,
                Some(&identity.key.private.d),
                Some(&identity.encryption.private.d),
            )
            .unwrap()
    }

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Seen {
        ChangeId(Digest),
        IdChanged(Digest),
        CertificateRequest(Digest),
        Validated(bool),
        Signed(bool),
        CertStatus(Digest, CertState),
        HttpGet(String),
        HttpPost(String),
        StoreData(DataType),
    }

    /// records the events of `engine`
    pub(crate) fn record(engine: &mut Engine, veto: bool) -> Arc<Mutex<Vec<Seen>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let events = seen.clone();
        engine.set_event_handler(move |_: &str, event: &Event<'_>| {
            let entry = match event {
                Event::ChangeId { next, .. } => Seen::ChangeId(next.digest()),
                Event::IdChanged { certificate, .. } => Seen::IdChanged(certificate.digest()),
                Event::CertificateRequest { digest } => Seen::CertificateRequest(*digest),
                Event::Validated(m) => Seen::Validated(m.status().is_none()),
                Event::Signed(m) => Seen::Signed(m.status().is_none()),
                Event::CertStatus { digest, to, .. } => Seen::CertStatus(*digest, *to),
                Event::HttpGet { url } => Seen::HttpGet(url.to_string()),
                Event::HttpPost { url, .. } => Seen::HttpPost(url.to_string()),
                Event::StoreData { data_type, .. } => Seen::StoreData(*data_type),
                _ => return true,
            };
            let is_change = matches!(entry, Seen::ChangeId(_));
            events.lock().unwrap().push(entry);
            !(veto && is_change)
        });
        seen
    }

    fn sign(engine: &mut Engine, payload: &[u8]) -> Vec<u8> {
        let mut message = MessageInfo::signed(aid::CAM, &CAM_SSP, 1024);
        engine.prepare_message(&mut message).unwrap();
        message.write_payload(payload).unwrap();
        engine.finalize_message(&mut message).unwrap();
        message.into_message()
    }

    #[test]
    fn signs_and_validates_between_engines() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        let at = install(&mut a, &pki.at("at"));
        assert!(at.is_trusted());
        let mut b = engine(&pki, "B");
        b.install_certificate(&pki.at("other").data, None, None).unwrap();

        let mut message = MessageInfo::signed(aid::DENM, &DENM_SSP, 1024);
        message.position = Some(Location::new(524_800_000, 134_000_000));
        message.generation_time = time::now64();
        a.prepare_message(&mut message).unwrap();
        message.write_payload(b"1234567890").unwrap();
        a.finalize_message(&mut message).unwrap();
        assert_eq!(
            Some(at.digest()),
            message.sign_info().and_then(|i| i.certificate.as_ref()).map(|c| c.digest())
        );
        assert_eq!(SignerType::Certificate, message.sign_info().unwrap().signer_type);

        let mut received = MessageInfo::with_buffer(message.into_message());
        b.parse_message(&mut received).unwrap();
        assert_eq!(PayloadType::Signed, received.payload_type);
        b.validate_signed_message(&mut received).unwrap();
        assert_eq!(b"1234567890", received.payload());
        let info = received.sign_info().unwrap();
        assert_eq!(aid::DENM, info.aid);
        assert_eq!(DENM_SSP.to_vec(), info.ssp);
        assert_eq!(at.digest(), info.certificate.as_ref().unwrap().digest());
        assert_eq!(Some(Location::new(524_800_000, 134_000_000)), received.position);
        assert!(b.certificate(&at.digest()).is_some());
    }

    #[test]
    fn requests_unknown_signers() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = Engine::new(
            Config {
                app_profiles: vec![crate::config::AppProfile {
                    aid: aid::CAM,
                    cert_period_ms: -1,
                    ..Default::default()
                }],
                ..Default::default()
            },
            "A",
        )
        .unwrap();
        a.install_certificate(&pki.root.data, None, None).unwrap();
        a.install_certificate(&pki.aa.data, None, None).unwrap();
        let at = install(&mut a, &pki.at("at"));
        let mut b = engine(&pki, "B");
        let seen = record(&mut b, false);

        let mut received = MessageInfo::with_buffer(sign(&mut a, b"hello"));
        b.parse_message(&mut received).unwrap();
        assert_eq!(Some(at.digest()), received.sign_info().unwrap().digest);
        let error = b.validate_signed_message(&mut received).unwrap_err();
        assert_eq!(Error::UnknownSigner(at.digest()), error);
        assert!(error.is_recoverable());
        assert_eq!(Some(&error), received.status());
        assert_eq!(
            vec![Seen::CertificateRequest(at.digest())],
            *seen.lock().unwrap()
        );
        assert!(b.p2p.requested.contains_key(&at.digest().hashed_id3()));
    }

    #[test]
    fn defers_pseudonym_change_while_locked() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let first = install(&mut engine, &pki.at("first"));
        let second = install(&mut engine, &pki.at("second"));
        let seen = record(&mut engine, false);

        let current = engine.current_certificate(aid::CAM).unwrap();
        let other = if current.digest() == first.digest() { &second } else { &first };
        assert!(engine.lock_id_change(aid::CAM, true));
        assert!(engine.change_id(aid::CAM));
        assert_eq!(
            current.digest(),
            engine.current_certificate(aid::CAM).unwrap().digest()
        );
        // announced now, applied on unlock
        assert_eq!(vec![Seen::ChangeId(other.digest())], *seen.lock().unwrap());
        assert!(engine.change_id(aid::CAM));
        assert_eq!(1, seen.lock().unwrap().len());

        assert!(engine.lock_id_change(aid::CAM, false));
        assert_eq!(
            other.digest(),
            engine.current_certificate(aid::CAM).unwrap().digest()
        );
        assert_eq!(
            vec![Seen::ChangeId(other.digest()), Seen::IdChanged(other.digest())],
            *seen.lock().unwrap()
        );
        assert!(engine.lock_id_change(aid::CAM, false));
        assert_eq!(2, seen.lock().unwrap().len());
    }

    #[test]
    fn locks_every_application_with_any() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let first = install(&mut engine, &pki.at("first"));
        let second = install(&mut engine, &pki.at("second"));
        let seen = record(&mut engine, false);

        let current = engine.current_certificate(aid::CAM).unwrap();
        let other = if current.digest() == first.digest() { &second } else { &first };
        assert!(engine.lock_id_change(aid::ANY, true));
        assert!(engine.change_id(aid::CAM));
        assert_eq!(
            current.digest(),
            engine.current_certificate(aid::CAM).unwrap().digest()
        );

        // the global lock outlives unlocking a single application
        assert!(engine.lock_id_change(aid::CAM, false));
        assert_eq!(
            current.digest(),
            engine.current_certificate(aid::CAM).unwrap().digest()
        );
        assert_eq!(vec![Seen::ChangeId(other.digest())], *seen.lock().unwrap());

        assert!(engine.lock_id_change(aid::ANY, false));
        assert_eq!(
            other.digest(),
            engine.current_certificate(aid::CAM).unwrap().digest()
        );
        assert_eq!(
            vec![Seen::ChangeId(other.digest()), Seen::IdChanged(other.digest())],
            *seen.lock().unwrap()
        );
    }

    #[test]
    fn keeps_the_pseudonym_without_alternative_or_on_veto() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let only = install(&mut engine, &pki.at("only"));
        let seen = record(&mut engine, true);
        assert_eq!(only.digest(), engine.current_certificate(aid::CAM).unwrap().digest());
        assert!(!engine.change_id(aid::CAM));
        assert!(seen.lock().unwrap().is_empty());

        let other = install(&mut engine, &pki.at("other"));
        assert!(!engine.change_id(aid::CAM));
        assert_eq!(only.digest(), engine.current_certificate(aid::CAM).unwrap().digest());
        assert_eq!(vec![Seen::ChangeId(other.digest())], *seen.lock().unwrap());
    }

    #[test]
    fn selects_the_latest_certificate() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let now = time::now32();
        let older = pki.at_with(|b| b.validity(now - 600, crate::types::Duration::Hours(crate::types::Uint16(2))));
        install(&mut engine, &older);
        let newer = install(&mut engine, &pki.at("newer"));
        let selected = engine
            .select_ee_certificate(aid::CAM, &CAM_SSP, &[], None, time::now64())
            .unwrap();
        assert_eq!(newer.digest(), selected.digest());
        assert_eq!(
            Some(Error::NoEligibleCertificate),
            engine
                .select_ee_certificate(aid::CRL, &[], &[], None, time::now64())
                .err()
        );
        let chosen = engine.select(aid::DENM, &newer.digest()).unwrap();
        assert_eq!(newer.digest(), chosen.digest());
    }

    #[test]
    fn encrypts_with_pre_shared_keys() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        let mut b = engine(&pki, "B");
        let key = [0x5A; 16];
        let digest = a.install_pre_shared_key(&key).unwrap();
        assert_eq!(digest, b.install_pre_shared_key(&key).unwrap());
        assert_eq!(Err(Error::KeySizeMismatch), a.install_pre_shared_key(&[0; 8]));

        let payload: Vec<u8> = (0..=255).collect();
        let mut message = MessageInfo::encrypted(1024);
        a.prepare_message(&mut message).unwrap();
        a.add_psk_recipient(&mut message, None, Some(digest)).unwrap();
        message.write_payload(&payload).unwrap();
        a.finalize_message(&mut message).unwrap();
        let encrypted = message.into_message();

        let mut received = MessageInfo::with_buffer(encrypted.clone());
        b.parse_message(&mut received).unwrap();
        assert_eq!(PayloadType::Encrypted, received.payload_type);
        b.decrypt_message(&mut received).unwrap();
        assert_eq!(payload, received.payload());
        assert_eq!(Some(digest), received.encryption_info().unwrap().recipient);

        let mut c = engine(&pki, "C");
        c.install_pre_shared_key(&[0xA5; 16]).unwrap();
        let mut received = MessageInfo::with_buffer(encrypted.clone());
        assert_eq!(Err(Error::UnknownRecipient), c.decrypt_message(&mut received));

        let mut tampered = encrypted;
        let last = tampered.len() - 1;
        tampered[last] ^= 0x80;
        let mut received = MessageInfo::with_buffer(tampered);
        let error = b.decrypt_message(&mut received).unwrap_err();
        assert_eq!(Error::DecryptionFailed, error);
        assert_eq!(crate::ErrorKind::Crypto, error.kind());
    }

    #[test]
    fn encrypts_to_certificates() {
        let pki = Pki::new(Curve::BrainpoolP256r1);
        let mut a = engine(&pki, "A");
        let mut b = engine(&pki, "B");
        let identity = pki.at("receiver");
        let receiver = install(&mut b, &identity);
        let known = a.install_certificate(&identity.data, None, None).unwrap();

        let mut message = MessageInfo::encrypted(1024);
        a.prepare_message(&mut message).unwrap();
        a.add_certificate_recipient(&mut message, &known.digest()).unwrap();
        assert_eq!(
            Err(Error::TooManyRecipients(2)),
            a.add_psk_recipient(&mut message, Some(&[1; 16]), None).map(|_| ())
        );
        message.write_payload(b"secret").unwrap();
        a.finalize_message(&mut message).unwrap();

        let mut received = MessageInfo::with_buffer(message.into_message());
        b.decrypt_message(&mut received).unwrap();
        assert_eq!(b"secret", received.payload());
        assert_eq!(Some(receiver.digest()), received.encryption_info().unwrap().recipient);
        assert_eq!(1, received.encryption_info().unwrap().recipients.len());
    }

    #[test]
    fn runs_deferred_operations_in_order() {
        let pki = Pki::new(Curve::NistP256);
        let mut a = engine(&pki, "A");
        install(&mut a, &pki.at("at"));
        let mut b = engine(&pki, "B");
        let seen = record(&mut a, false);
        let b_seen = record(&mut b, false);

        for payload in [b"first".as_slice(), b"second".as_slice()] {
            let mut message = MessageInfo::signed(aid::CAM, &CAM_SSP, 1024);
            a.prepare_message(&mut message).unwrap();
            message.write_payload(payload).unwrap();
            a.finalize_message_async(message);
        }
        assert!(seen.lock().unwrap().is_empty());
        let signed = a.proceed_async();
        assert_eq!(vec![Seen::Signed(true), Seen::Signed(true)], *seen.lock().unwrap());
        assert!(a.proceed_async().is_empty());

        for message in signed {
            let mut received = MessageInfo::with_buffer(message.into_message());
            b.parse_message(&mut received).unwrap();
            b.validate_signed_message_async(received);
        }
        let validated = b.proceed_async();
        assert_eq!(b"first", validated[0].payload());
        assert_eq!(b"second", validated[1].payload());
        assert_eq!(vec![Seen::Validated(true), Seen::Validated(true)], *b_seen.lock().unwrap());
    }

    #[test]
    fn purges_periodically() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let peer = engine.install_certificate(&pki.at("peer").data, None, None).unwrap().digest();
        let digest = engine.install_pre_shared_key(&[7; 16]).unwrap();
        let now = time::now32();

        assert_eq!(0, engine.purge(now));
        assert!(engine.certificate(&peer).is_some());
        assert_eq!(0, engine.purge(now + 1));
        assert_eq!(1, engine.purge(now + 3600 * 2));
        assert!(engine.certificate(&peer).is_none());
        assert!(engine.pre_shared_key(&digest).is_none());
        assert!(engine.current_certificate(aid::CAM).is_none());
    }

    #[test]
    fn rejects_unknown_crypto_engines() {
        let config = Config {
            crypto: crate::config::CryptoConfig {
                sign: "hsm".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            Some(Error::UnknownEngine("hsm".into())),
            Engine::new(config, "A").err()
        );
    }
}
