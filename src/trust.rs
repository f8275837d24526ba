//! Certificate trust lists (CTL), revocation lists (CRL) and revalidation of
//! the certificate store.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::{
    aid,
    cert::{CertState, Certificate, Digest},
    engine::{DataType, Engine, Event},
    message::MessageInfo,
    time,
    types::{
        CtlCommand, CtlDelete, CtlEntry, CtlFormat, EtsiTs102941Data, EtsiTs102941DataContent,
        HashedId8, ToBeSignedCrl,
    },
    Decode, Error, Result,
};

/// Bits of the second CTL SSP octet permitting the entry types
pub const CTL_SSP_TLM: u8 = 0x80;
pub const CTL_SSP_RCA: u8 = 0x40;
pub const CTL_SSP_EA: u8 = 0x20;
pub const CTL_SSP_AA: u8 = 0x10;
pub const CTL_SSP_DC: u8 = 0x08;

/// Trust list state of one root
#[derive(Debug, Default, Clone)]
struct RootTrust {
    crl_this_update: u32,
    crl_next_update: u32,
    crl_checked_at: u32,
    ctl_sequence: Option<u8>,
    ctl_next_update: u32,
    ctl_checked_at: u32,
    /// certificates revoked by the CRLs of this root
    crl_entries: BTreeSet<Digest>,
    /// authorities added by the CTLs of this root with the SSP bit listing them
    listed: BTreeMap<Digest, u8>,
    distribution_centres: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct TrustState {
    roots: BTreeMap<Digest, RootTrust>,
    revoked: BTreeSet<Digest>,
    access_points: BTreeMap<Digest, String>,
    /// outstanding HTTP requests by URL with their Time32
    requests: BTreeMap<String, u32>,
    /// effective state reported by the last revalidation
    last_states: BTreeMap<Digest, CertState>,
}

impl TrustState {
    pub(crate) fn is_revoked(&self, digest: &Digest) -> bool {
        self.revoked.contains(digest)
    }

    /// Returns false if `digest` was revoked before
    pub(crate) fn revoke(&mut self, digest: Digest) -> bool {
        self.revoked.insert(digest)
    }

    /// Drops the state of a removed certificate, revocations are kept
    pub(crate) fn forget(&mut self, digest: &Digest) {
        self.last_states.remove(digest);
    }

    pub(crate) fn observe(&mut self, certificate: &Certificate) {
        self.last_states
            .entry(certificate.digest())
            .or_insert_with(|| effective_state(certificate.state()));
    }

    pub(crate) fn expire_requests(&mut self, now32: u32, lifetime: u32) {
        self.requests
            .retain(|_, at| now32.saturating_sub(*at) <= lifetime);
    }
}

fn effective_state(state: CertState) -> CertState {
    CertState(state.0 & (CertState::TRUSTED.0 | CertState::INVALID.0 | CertState::REVOKED.0))
}

fn entry_ctl_bit(entry: &CtlEntry) -> u8 {
    match entry {
        CtlEntry::Tlm(_) => CTL_SSP_TLM,
        CtlEntry::Rca(_) => CTL_SSP_RCA,
        CtlEntry::Ea(_) => CTL_SSP_EA,
        CtlEntry::Aa(_) => CTL_SSP_AA,
        CtlEntry::Dc(_) => CTL_SSP_DC,
    }
}

impl Engine {
    /// Applies a signed CRL or CTL
    ///
    /// The message must validate and its signer must hold the CRL or CTL
    /// permission for every entry. Returns whether trust information changed.
    /// Certificates depending on removed or revoked authorities keep their
    /// state until [`Engine::revalidate_certificates`] runs.
    pub fn apply_trust_information(&mut self, message: &mut MessageInfo) -> Result<bool> {
        let result = self.apply_trust(message);
        if let Err(e) = &result {
            warn!(engine = %self.name(), error = %e, "trust information rejected");
        }
        message.record(result)
    }

    fn apply_trust(&mut self, message: &mut MessageInfo) -> Result<bool> {
        self.validate_signed_message(message)?;
        let info = message.sign_info().ok_or(Error::UnsupportedPayloadType)?;
        let signer = info
            .certificate
            .clone()
            .ok_or(Error::UntrustedTrustSigner)?;
        if !signer.is_trusted() {
            return Err(Error::UntrustedTrustSigner);
        }
        let (aid, ssp) = (info.aid, info.ssp.clone());
        let data = EtsiTs102941Data::decode(message.payload())?.decoded;
        let root = self.root_of(&signer);
        match (aid, &data.content) {
            (aid::CRL, EtsiTs102941DataContent::CertificateRevocationList(crl)) => {
                let changed = self.apply_crl(root, crl)?;
                self.store_trust_data(root, DataType::Crl, message.message());
                Ok(changed)
            }
            (
                aid::CTL,
                EtsiTs102941DataContent::CertificateTrustListRca(ctl)
                | EtsiTs102941DataContent::CertificateTrustListTlm(ctl),
            ) => {
                let changed = self.apply_ctl(root, &ssp, ctl)?;
                self.store_trust_data(root, DataType::Ctl, message.message());
                Ok(changed)
            }
            _ => Err(Error::UnauthorizedTrustSigner),
        }
    }

    /// Self-signed end of the chain of `certificate`
    pub(crate) fn root_of(&self, certificate: &Arc<Certificate>) -> Digest {
        let mut current = certificate.clone();
        for _ in 0..self.config.max_chain_depth {
            match current.issuer().and_then(|issuer| self.store.find(&issuer)) {
                Some(issuer) => current = issuer,
                None => break,
            }
        }
        current.digest()
    }

    fn apply_crl(&mut self, root: Digest, crl: &ToBeSignedCrl) -> Result<bool> {
        let state = self.trust.roots.entry(root).or_default();
        if crl.this_update.0 < state.crl_this_update {
            return Err(Error::StaleTrustList);
        }
        state.crl_this_update = crl.this_update.0;
        state.crl_next_update = crl.next_update.0;
        state.crl_checked_at = time::now32();

        let mut changed = false;
        for HashedId8(id) in &crl.entries.0 {
            let Some(digest) = Digest::from_slice(id) else {
                continue;
            };
            changed |= state.crl_entries.insert(digest);
        }
        let entries: Vec<Digest> = state.crl_entries.iter().copied().collect();
        for digest in entries {
            // only certificates issued under the CRL signing root
            let Some(certificate) = self.store.find(&digest) else {
                continue;
            };
            if self.root_of(&certificate) != root {
                debug!(%digest, %root, "CRL entry of another root ignored");
                continue;
            }
            if !certificate.state().contains(CertState::REVOKED) {
                certificate.set_state(CertState::REVOKED);
                changed = true;
            }
        }
        info!(
            engine = %self.name(),
            %root,
            entries = crl.entries.0.len(),
            next_update = crl.next_update.0,
            "applied CRL"
        );
        Ok(changed)
    }

    /// Whether a CRL of the root of `certificate` lists it
    pub(crate) fn revoked_by_crl(&self, certificate: &Arc<Certificate>) -> bool {
        let digest = certificate.digest();
        self.trust
            .roots
            .get(&self.root_of(certificate))
            .is_some_and(|state| state.crl_entries.contains(&digest))
    }

    /// SSP bit the CTL signer of `root` needs for `command`
    fn required_ctl_bit(&self, root: &Digest, command: &CtlCommand) -> Result<u8> {
        match command {
            CtlCommand::Add(entry) => Ok(entry_ctl_bit(entry)),
            CtlCommand::Delete(CtlDelete::Dc(_)) => Ok(CTL_SSP_DC),
            CtlCommand::Delete(CtlDelete::Cert(HashedId8(id))) => {
                let Some(digest) = Digest::from_slice(id) else {
                    return Ok(0);
                };
                let listed = self
                    .trust
                    .roots
                    .get(root)
                    .and_then(|state| state.listed.get(&digest).copied());
                match listed {
                    Some(bit) => Ok(bit),
                    // nothing to delete
                    None if self.store.find(&digest).is_none() => Ok(0),
                    None => {
                        warn!(%digest, %root, "CTL deletes a certificate it did not list");
                        Err(Error::UnauthorizedTrustSigner)
                    }
                }
            }
        }
    }

    fn apply_ctl(&mut self, root: Digest, ssp: &[u8], ctl: &CtlFormat) -> Result<bool> {
        let permitted = ssp.get(1).copied().unwrap_or(0);
        for command in &ctl.ctl_commands {
            if self.required_ctl_bit(&root, command)? & !permitted != 0 {
                return Err(Error::UnauthorizedTrustSigner);
            }
        }
        let previous = self.trust.roots.get(&root).and_then(|r| r.ctl_sequence);
        if let Some(previous) = previous {
            // sequence numbers wrap around
            let delta = ctl.ctl_sequence.0.wrapping_sub(previous) as i8;
            if delta == 0 {
                debug!(%root, sequence = previous, "CTL already applied");
                return Ok(false);
            }
            if delta < 0 || (!ctl.is_full_ctl && delta != 1) {
                return Err(Error::StaleTrustList);
            }
        }

        let mut changed = false;
        let mut listed = BTreeMap::new();
        for command in &ctl.ctl_commands {
            match command {
                CtlCommand::Add(CtlEntry::Rca(entry)) => {
                    let digest = self.add_authority(entry.self_signed_root_ca.raw, true)?;
                    listed.insert(digest, CTL_SSP_RCA);
                }
                CtlCommand::Add(CtlEntry::Tlm(entry)) => {
                    let digest = self.add_authority(entry.self_signed_tlm_certificate.raw, true)?;
                    listed.insert(digest, CTL_SSP_TLM);
                }
                CtlCommand::Add(CtlEntry::Ea(entry)) => {
                    let digest = self.add_authority(entry.ea_certificate.raw, false)?;
                    let url = entry.its_access_point.as_ref().unwrap_or(&entry.aa_access_point);
                    self.trust.access_points.insert(digest, url.0.clone());
                    listed.insert(digest, CTL_SSP_EA);
                }
                CtlCommand::Add(CtlEntry::Aa(entry)) => {
                    let digest = self.add_authority(entry.aa_certificate.raw, false)?;
                    self.trust
                        .access_points
                        .insert(digest, entry.access_point.0.clone());
                    listed.insert(digest, CTL_SSP_AA);
                }
                CtlCommand::Add(CtlEntry::Dc(entry)) => {
                    let url = entry.url.0.trim_end_matches('/').to_string();
                    let served: Vec<Digest> = match entry.cert.0.as_slice() {
                        [] => vec![root],
                        ids => ids.iter().filter_map(|id| Digest::from_slice(id.0)).collect(),
                    };
                    for digest in served {
                        let state = self.trust.roots.entry(digest).or_default();
                        changed |= state.distribution_centres.insert(url.clone());
                    }
                }
                CtlCommand::Delete(CtlDelete::Cert(HashedId8(id))) => {
                    let Some(digest) = Digest::from_slice(id) else {
                        continue;
                    };
                    let is_listed = self
                        .trust
                        .roots
                        .get(&root)
                        .is_some_and(|state| state.listed.contains_key(&digest));
                    if is_listed {
                        changed |= self.remove_authority(&digest);
                    }
                }
                CtlCommand::Delete(CtlDelete::Dc(url)) => {
                    let url = url.0.trim_end_matches('/');
                    if let Some(state) = self.trust.roots.get_mut(&root) {
                        changed |= state.distribution_centres.remove(url);
                    }
                }
            }
        }

        let state = self.trust.roots.entry(root).or_default();
        let dropped: Vec<Digest> = if ctl.is_full_ctl {
            state
                .listed
                .keys()
                .filter(|digest| !listed.contains_key(*digest))
                .copied()
                .collect()
        } else {
            Vec::new()
        };
        for (digest, bit) in listed {
            changed |= state.listed.insert(digest, bit) != Some(bit);
        }
        state.ctl_sequence = Some(ctl.ctl_sequence.0);
        state.ctl_next_update = ctl.next_update.0;
        state.ctl_checked_at = time::now32();
        for digest in dropped {
            changed |= self.remove_authority(&digest);
        }
        info!(
            engine = %self.name(),
            %root,
            sequence = ctl.ctl_sequence.0,
            full = ctl.is_full_ctl,
            commands = ctl.ctl_commands.len(),
            "applied CTL"
        );
        Ok(changed)
    }

    fn add_authority(&mut self, data: &[u8], anchor: bool) -> Result<Digest> {
        let certificate = Certificate::from_bytes(self.crypto.verify.as_ref(), data.to_vec())?;
        let digest = certificate.digest();
        if anchor {
            if !certificate.is_self_signed() {
                return Err(Error::InvalidCertificateFormat(
                    "Trust anchors must be self-signed".into(),
                ));
            }
            self.store.add_trust_anchor(digest);
        }
        let certificate = self.add_certificate(certificate)?;
        debug!(%digest, name = certificate.name(), trusted = certificate.is_trusted(), "authority listed");
        self.store_trust_data(digest, DataType::Certificate, data);
        Ok(digest)
    }

    fn remove_authority(&mut self, digest: &Digest) -> bool {
        for state in self.trust.roots.values_mut() {
            state.listed.remove(digest);
        }
        if self
            .store
            .find(digest)
            .is_some_and(|c| c.state().contains(CertState::LOCAL))
        {
            warn!(%digest, "local certificate kept");
            return false;
        }
        let anchor = self.store.remove_trust_anchor(digest);
        let removed = self.store.del(digest);
        self.trust.access_points.remove(digest);
        if anchor || removed {
            info!(%digest, "authority removed from trust list");
        }
        anchor || removed
    }

    fn store_trust_data(&mut self, id: Digest, data_type: DataType, data: &[u8]) {
        if self.config.store_trust_information {
            self.emit(&Event::StoreData {
                id,
                data_type,
                data,
            });
        }
    }

    /// Revalidates the chains of all stored certificates
    ///
    /// Reports every certificate whose effective state changed since it was
    /// last seen with a `CertStatus` event and returns their number.
    pub fn revalidate_certificates(&mut self) -> usize {
        let certificates: Vec<Arc<Certificate>> = self.store.certificates().cloned().collect();
        for certificate in &certificates {
            certificate.clear_state(CertState::TRUSTED);
            // issuers learned after the CRL
            if self.revoked_by_crl(certificate) {
                certificate.set_state(CertState::REVOKED);
            }
        }
        for certificate in &certificates {
            if certificate.is_trusted() {
                continue;
            }
            if let Err(e) = self.store.validate_chain(
                self.crypto.verify.as_ref(),
                self.geo.as_ref(),
                certificate,
            ) {
                debug!(digest = %certificate.digest(), error = %e, "certificate not trusted");
            }
        }

        let mut changed = 0;
        for certificate in &certificates {
            let digest = certificate.digest();
            let to = effective_state(certificate.state());
            let from = self
                .trust
                .last_states
                .insert(digest, to)
                .unwrap_or_default();
            if from != to {
                changed += 1;
                debug!(%digest, from = from.0, to = to.0, "certificate state changed");
                self.emit(&Event::CertStatus { digest, from, to });
            }
        }
        info!(engine = %self.name(), checked = certificates.len(), changed, "revalidated certificates");
        changed
    }

    /// Requests outdated CRLs and CTLs from the distribution centres
    ///
    /// A list is outdated after its next update time or its check period.
    /// `now32 == 0` requests every list. Returns the number of emitted
    /// `HttpGet` events, URLs requested within the request storage duration
    /// are skipped.
    pub fn request_trust_info(&mut self, now32: u32) -> usize {
        let force = now32 == 0;
        let now = if force { time::now32() } else { now32 };
        let (crl_period, ctl_period) = (self.config.crl_check_period, self.config.ctl_check_period);
        let mut urls = Vec::new();
        for (root, state) in &mut self.trust.roots {
            if !self.store.is_trust_anchor(root) {
                continue;
            }
            let crl_due = force
                || state.crl_next_update <= now
                || now.saturating_sub(state.crl_checked_at) >= crl_period;
            let ctl_due = force
                || state.ctl_next_update <= now
                || now.saturating_sub(state.ctl_checked_at) >= ctl_period;
            for dc in &state.distribution_centres {
                if crl_due {
                    urls.push(format!("{dc}/getcrl/{root}"));
                }
                if ctl_due {
                    urls.push(format!("{dc}/getctl/{root}"));
                }
            }
            if crl_due {
                state.crl_checked_at = now;
            }
            if ctl_due {
                state.ctl_checked_at = now;
            }
        }
        urls.into_iter()
            .filter(|url| self.http_get(url, now))
            .count()
    }

    /// Emits an `HttpGet` event unless `url` was requested recently
    pub(crate) fn http_get(&mut self, url: &str, now32: u32) -> bool {
        let lifetime = self.config.request_storage_duration;
        if self
            .trust
            .requests
            .get(url)
            .is_some_and(|at| now32.saturating_sub(*at) < lifetime)
        {
            debug!(url, "request already pending");
            return false;
        }
        self.trust.requests.insert(url.to_string(), now32);
        debug!(url, "requesting trust information");
        self.emit(&Event::HttpGet { url });
        true
    }

    /// Access point listed in a CTL for the EA or AA `digest`
    pub fn access_point(&self, digest: &Digest) -> Option<&str> {
        self.trust.access_points.get(digest).map(String::as_str)
    }

    /// Distribution centres serving the CRL and CTL of `root`
    pub fn distribution_centres(&self, root: &Digest) -> Vec<String> {
        self.trust
            .roots
            .get(root)
            .map(|state| state.distribution_centres.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Next update time of the last CRL of `root`
    pub fn crl_next_update(&self, root: &Digest) -> Option<u32> {
        self.trust
            .roots
            .get(root)
            .filter(|state| state.crl_this_update > 0)
            .map(|state| state.crl_next_update)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        cert::{
            fixtures::{Pki, CAM_SSP, ROOT_CTL_SSP},
            CertificateBuilder, SspRange,
        },
        config::Config,
        crypto::{CryptoEngine, Curve},
        engine::tests::{engine, install, record, Seen},
        types::{
            AaEntry, DcEntry, Duration, RootCaEntry, SequenceOfHashedId8, Uint16, Uint32, Uint8,
            Url,
        },
        Encode,
    };

    /// message signed by the root of `pki`
    pub(crate) fn signed_by_root(pki: &Pki, aid: u64, ssp: &[u8], data: &EtsiTs102941Data) -> Vec<u8> {
        let mut authority = Engine::new(Config::default(), "root").unwrap();
        let root = authority
            .install_certificate(
                &pki.root.data,
                Some(&pki.root.key.private.d),
                Some(&pki.root.encryption.private.d),
            )
            .unwrap();
        let mut message = MessageInfo::signed(aid, ssp, 16384);
        message.sign_info_mut().certificate = Some(root);
        authority.prepare_message(&mut message).unwrap();
        message.write_payload(&data.encode_to_vec().unwrap()).unwrap();
        authority.finalize_message(&mut message).unwrap();
        message.into_message()
    }

    fn crl(this_update: u32, revoked: &[Digest]) -> Vec<u8> {
        EtsiTs102941Data {
            version: Uint8(1),
            content: EtsiTs102941DataContent::CertificateRevocationList(ToBeSignedCrl {
                version: Uint8(1),
                this_update: Uint32(this_update),
                next_update: Uint32(this_update + 3600),
                entries: SequenceOfHashedId8(revoked.iter().map(|d| HashedId8(&d.0)).collect()),
            }),
        }
        .encode_to_vec()
        .unwrap()
    }

    fn apply(engine: &mut Engine, pki: &Pki, aid: u64, payload: &[u8]) -> Result<bool> {
        let data = EtsiTs102941Data::decode(payload).unwrap().decoded;
        let ssp: &[u8] = if aid == aid::CTL { &ROOT_CTL_SSP } else { &[0x01] };
        let mut message = MessageInfo::with_buffer(signed_by_root(pki, aid, ssp, &data));
        engine.apply_trust_information(&mut message)
    }

    fn rca_ctl(sequence: u8, full: bool, commands: Vec<CtlCommand<'_>>) -> Vec<u8> {
        EtsiTs102941Data {
            version: Uint8(1),
            content: EtsiTs102941DataContent::CertificateTrustListRca(CtlFormat {
                version: Uint8(1),
                next_update: Uint32(time::now32() + 86400),
                is_full_ctl: full,
                ctl_sequence: Uint8(sequence),
                ctl_commands: commands,
            }),
        }
        .encode_to_vec()
        .unwrap()
    }

    #[test]
    fn revokes_and_revalidates() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let at = install(&mut engine, &pki.at("c"));
        let seen = record(&mut engine, false);
        assert!(at.is_trusted());

        assert!(engine.revoke_certificate_id(&at.digest()));
        assert!(!engine.revoke_certificate_id(&Digest([7; 8])));
        assert_eq!(1, engine.revalidate_certificates());
        assert!(at.state().contains(CertState::REVOKED));
        assert!(!at.is_trusted());
        assert!(!at.is_valid_for(
            aid::CAM,
            &CAM_SSP,
            &[],
            None,
            time::now64(),
            engine.geo.as_ref()
        ));
        assert_eq!(
            vec![Seen::CertStatus(at.digest(), CertState::REVOKED)],
            *seen.lock().unwrap()
        );
        assert_eq!(0, engine.revalidate_certificates());
        assert!(engine.select_ee_certificate(aid::CAM, &[], &[], None, time::now64()).is_err());
    }

    #[test]
    fn revocation_of_an_authority_propagates() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "A");
        let at = install(&mut engine, &pki.at("c"));
        let aa = pki.aa_certificate().digest();
        engine.revoke_certificate_id(&aa);
        assert!(at.is_trusted());
        assert_eq!(2, engine.revalidate_certificates());
        assert!(!at.is_trusted());
        assert!(!at.state().contains(CertState::REVOKED));
        assert!(engine.certificate(&aa).is_some_and(|c| !c.is_trusted()));
    }

    #[test]
    fn applies_revocation_lists() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "B");
        let at = engine
            .install_certificate(&pki.at("peer").data, None, None)
            .unwrap();
        let root = Certificate::from_bytes(&pki.engine, pki.root.data.clone())
            .unwrap()
            .digest();
        let now = time::now32();

        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CRL, &crl(now, &[at.digest()])));
        assert!(at.state().contains(CertState::REVOKED));
        assert_eq!(Some(now + 3600), engine.crl_next_update(&root));
        assert_eq!(Ok(false), apply(&mut engine, &pki, aid::CRL, &crl(now, &[at.digest()])));
        assert_eq!(
            Err(Error::StaleTrustList),
            apply(&mut engine, &pki, aid::CRL, &crl(now - 10, &[]))
        );

        // certificates received after the CRL are revoked as well
        let late = pki.at("late");
        let late_digest = Certificate::from_bytes(&pki.engine, late.data.clone())
            .unwrap()
            .digest();
        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CRL, &crl(now + 1, &[late_digest])));
        let late = engine.install_certificate(&late.data, None, None).unwrap();
        assert!(late.state().contains(CertState::REVOKED));
    }

    #[test]
    fn rejects_unpermitted_trust_signers() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "B");
        let key = pki.engine.generate_key(Curve::NistP256).unwrap();
        let other_root = CertificateBuilder::new(key.public.clone())
            .name("other root")
            .validity(time::now32() - 60, Duration::Years(Uint16(1)))
            .issue_all()
            .self_sign(&pki.engine, &key.private)
            .unwrap();
        let ctl = EtsiTs102941Data {
            version: Uint8(1),
            content: EtsiTs102941DataContent::CertificateTrustListRca(CtlFormat {
                version: Uint8(1),
                next_update: Uint32(time::now32() + 3600),
                is_full_ctl: true,
                ctl_sequence: Uint8(1),
                ctl_commands: vec![CtlCommand::Add(CtlEntry::Rca(RootCaEntry {
                    self_signed_root_ca: crate::types::Certificate::decode(&other_root[..])
                        .unwrap()
                        .decoded,
                    successor_to: None,
                }))],
            }),
        }
        .encode_to_vec()
        .unwrap();
        assert_eq!(
            Err(Error::UnauthorizedTrustSigner),
            apply(&mut engine, &pki, aid::CTL, &ctl)
        );

        // a CRL in a CTL message
        assert_eq!(
            Err(Error::UnauthorizedTrustSigner),
            apply(&mut engine, &pki, aid::CTL, &crl(time::now32(), &[]))
        );
    }

    #[test]
    fn applies_trust_lists_and_requests_updates() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "B");
        let seen = record(&mut engine, false);
        let root_certificate = Certificate::from_bytes(&pki.engine, pki.root.data.clone()).unwrap();
        let root = root_certificate.digest();
        let key = pki.engine.generate_key(Curve::NistP256).unwrap();
        let aa2 = CertificateBuilder::new(key.public.clone())
            .name("aa2")
            .validity(time::now32() - 60, Duration::Years(Uint16(1)))
            .issue(aid::CAM, SspRange::All)
            .sign(&pki.engine, &root_certificate, &pki.root.key.private)
            .unwrap();
        let aa2_digest = Certificate::from_bytes(&pki.engine, aa2.clone()).unwrap().digest();
        let ctl = |sequence: u8, with_aa2: bool| {
            let mut commands = vec![CtlCommand::Add(CtlEntry::Dc(DcEntry {
                url: Url("http://dc.example/".into()),
                cert: SequenceOfHashedId8(vec![HashedId8(&root.0)]),
            }))];
            if with_aa2 {
                commands.push(CtlCommand::Add(CtlEntry::Aa(AaEntry {
                    aa_certificate: crate::types::Certificate::decode(&aa2[..]).unwrap().decoded,
                    access_point: Url("http://aa.example".into()),
                })));
            }
            EtsiTs102941Data {
                version: Uint8(1),
                content: EtsiTs102941DataContent::CertificateTrustListRca(CtlFormat {
                    version: Uint8(1),
                    next_update: Uint32(time::now32() + 86400),
                    is_full_ctl: true,
                    ctl_sequence: Uint8(sequence),
                    ctl_commands: commands,
                }),
            }
            .encode_to_vec()
            .unwrap()
        };

        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CTL, &ctl(1, true)));
        assert!(engine.certificate(&aa2_digest).is_some_and(|c| c.is_trusted()));
        assert_eq!(Some("http://aa.example"), engine.access_point(&aa2_digest));
        assert_eq!(vec!["http://dc.example".to_string()], engine.distribution_centres(&root));
        assert_eq!(Ok(false), apply(&mut engine, &pki, aid::CTL, &ctl(1, true)));

        assert_eq!(2, engine.request_trust_info(0));
        assert_eq!(0, engine.request_trust_info(0));
        let hex = root.to_string();
        assert!(seen
            .lock()
            .unwrap()
            .contains(&Seen::HttpGet(format!("http://dc.example/getcrl/{hex}"))));
        assert!(seen
            .lock()
            .unwrap()
            .contains(&Seen::HttpGet(format!("http://dc.example/getctl/{hex}"))));

        // the next full list drops the AA
        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CTL, &ctl(2, false)));
        assert!(engine.certificate(&aa2_digest).is_none());
        assert_eq!(None, engine.access_point(&aa2_digest));
        assert_eq!(
            Err(Error::StaleTrustList),
            apply(&mut engine, &pki, aid::CTL, &ctl(1, true))
        );
    }

    #[test]
    fn deletes_only_listed_authorities() {
        let pki = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "B");
        let own = install(&mut engine, &pki.at("own"));
        let root_certificate = Certificate::from_bytes(&pki.engine, pki.root.data.clone()).unwrap();
        let root = root_certificate.digest();
        let delete = |digest: &Digest| {
            let commands = vec![CtlCommand::Delete(CtlDelete::Cert(HashedId8(&digest.0)))];
            rca_ctl(1, false, commands)
        };

        // neither the own ticket nor the trust anchor were listed by a CTL
        assert_eq!(
            Err(Error::UnauthorizedTrustSigner),
            apply(&mut engine, &pki, aid::CTL, &delete(&own.digest()))
        );
        assert_eq!(
            Err(Error::UnauthorizedTrustSigner),
            apply(&mut engine, &pki, aid::CTL, &delete(&root))
        );
        assert!(engine.certificate(&own.digest()).is_some());
        assert!(engine.store().is_trust_anchor(&root));

        let key = pki.engine.generate_key(Curve::NistP256).unwrap();
        let aa2 = CertificateBuilder::new(key.public.clone())
            .name("aa2")
            .validity(time::now32() - 60, Duration::Years(Uint16(1)))
            .issue(aid::CAM, SspRange::All)
            .sign(&pki.engine, &root_certificate, &pki.root.key.private)
            .unwrap();
        let aa2_digest = Certificate::from_bytes(&pki.engine, aa2.clone()).unwrap().digest();
        let add = rca_ctl(
            1,
            true,
            vec![CtlCommand::Add(CtlEntry::Aa(AaEntry {
                aa_certificate: crate::types::Certificate::decode(&aa2[..]).unwrap().decoded,
                access_point: Url("http://aa.example".into()),
            }))],
        );
        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CTL, &add));

        // another root may not delete the AA listed by this one
        let other = Pki::new(Curve::NistP256);
        engine.install_certificate(&other.root.data, None, None).unwrap();
        let remove = rca_ctl(
            2,
            false,
            vec![CtlCommand::Delete(CtlDelete::Cert(HashedId8(&aa2_digest.0)))],
        );
        assert_eq!(
            Err(Error::UnauthorizedTrustSigner),
            apply(&mut engine, &other, aid::CTL, &remove)
        );
        assert!(engine.certificate(&aa2_digest).is_some());

        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CTL, &remove));
        assert!(engine.certificate(&aa2_digest).is_none());
        assert!(engine.certificate(&own.digest()).is_some());
    }

    #[test]
    fn revocation_lists_only_cover_their_root() {
        let pki = Pki::new(Curve::NistP256);
        let other = Pki::new(Curve::NistP256);
        let mut engine = engine(&pki, "B");
        engine.install_certificate(&other.root.data, None, None).unwrap();
        engine.install_certificate(&other.aa.data, None, None).unwrap();
        let foreign = engine
            .install_certificate(&other.at("peer").data, None, None)
            .unwrap();
        let own_chain = engine
            .install_certificate(&pki.at("peer").data, None, None)
            .unwrap();
        assert!(foreign.is_trusted());

        let revoked = [foreign.digest(), own_chain.digest()];
        assert_eq!(Ok(true), apply(&mut engine, &pki, aid::CRL, &crl(time::now32(), &revoked)));
        assert!(own_chain.state().contains(CertState::REVOKED));
        assert!(!foreign.state().contains(CertState::REVOKED));

        engine.revalidate_certificates();
        assert!(foreign.is_trusted());
        assert!(!own_chain.is_trusted());
    }

    #[test]
    fn emits_trust_data_for_storage() {
        let pki = Pki::new(Curve::NistP256);
        let mut config = Config::default();
        config.store_trust_information = true;
        let mut engine = Engine::new(config, "B").unwrap();
        engine.install_certificate(&pki.root.data, None, None).unwrap();
        let seen = record(&mut engine, false);
        assert_eq!(Ok(false), apply(&mut engine, &pki, aid::CRL, &crl(time::now32(), &[])));
        assert_eq!(vec![Seen::StoreData(DataType::Crl)], *seen.lock().unwrap());
    }
}
