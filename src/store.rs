//! Certificate pools and chain validation.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use tracing::{debug, trace, warn};

use crate::{
    cert::{CertState, Certificate, Digest},
    config::PoolSizes,
    crypto::CryptoEngine,
    geo::RegionCheck,
    Error, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PoolId {
    /// roots and other issuing CAs
    Ca,
    /// local identities and authorization tickets of peers
    At,
    /// enrolment credentials and other certificates
    Others,
}

impl PoolId {
    pub const ALL: [PoolId; 3] = [PoolId::Ca, PoolId::At, PoolId::Others];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PoolId::Ca => "CA",
            PoolId::At => "AT",
            PoolId::Others => "OTHERS",
        })
    }
}

#[derive(Debug)]
struct Entry {
    certificate: Arc<Certificate>,
    /// recency counter for LRU eviction
    last_used: u64,
    /// Time32 of the last use
    used_at: u32,
}

impl Entry {
    /// local identities and certificates in use elsewhere are kept
    fn is_evictable(&self) -> bool {
        !self.certificate.state().contains(CertState::LOCAL)
            && Arc::strong_count(&self.certificate) == 1
    }
}

/// Bounded certificate container indexed by digest
#[derive(Debug)]
pub struct CertificatePool {
    id: PoolId,
    entries: BTreeMap<Digest, Entry>,
    max_size: usize,
    tick: u64,
}

impl CertificatePool {
    #[must_use]
    pub fn new(id: PoolId, max_size: usize) -> Self {
        Self {
            id,
            entries: BTreeMap::new(),
            max_size,
            tick: 0,
        }
    }

    #[must_use]
    pub fn id(&self) -> PoolId {
        self.id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Certificate>> {
        self.entries.values().map(|e| &e.certificate)
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Inserts a certificate, returns the stored entry with the same digest if
    /// there is one
    ///
    /// A full pool evicts its least recently used evictable entry.
    pub fn add(&mut self, certificate: Arc<Certificate>, now: u32) -> Result<Arc<Certificate>> {
        let digest = certificate.digest();
        if let Some(existing) = self.entries.get(&digest) {
            return Ok(existing.certificate.clone());
        }
        if self.entries.len() >= self.max_size && !self.evict_lru() {
            warn!(pool = %self.id, "certificate pool is full");
            return Err(Error::PoolFull);
        }
        let last_used = self.next_tick();
        self.entries.insert(
            digest,
            Entry {
                certificate: certificate.clone(),
                last_used,
                used_at: now,
            },
        );
        trace!(pool = %self.id, %digest, "added certificate");
        Ok(certificate)
    }

    /// lookup without refreshing the recency
    #[must_use]
    pub fn find(&self, digest: &Digest) -> Option<Arc<Certificate>> {
        self.entries.get(digest).map(|e| e.certificate.clone())
    }

    /// lookup that marks the certificate as recently used
    pub fn get(&mut self, digest: &Digest, now: u32) -> Option<Arc<Certificate>> {
        let tick = self.next_tick();
        self.entries.get_mut(digest).map(|e| {
            e.last_used = tick;
            e.used_at = now;
            e.certificate.clone()
        })
    }

    pub fn del(&mut self, digest: &Digest) -> Option<Arc<Certificate>> {
        self.entries.remove(digest).map(|e| e.certificate)
    }

    pub fn clean(&mut self) {
        debug!(pool = %self.id, count = self.entries.len(), "cleaned certificate pool");
        self.entries.clear();
    }

    fn evict_lru(&mut self) -> bool {
        let Some(digest) = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_evictable())
            .min_by_key(|(_, e)| e.last_used)
            .map(|(d, _)| *d)
        else {
            return false;
        };
        self.entries.remove(&digest);
        debug!(pool = %self.id, %digest, "evicted least recently used certificate");
        true
    }

    /// Removes expired certificates and, if `max_lifetime` is given, the ones
    /// unused for longer than that
    pub fn purge(&mut self, now: u32, max_lifetime: Option<u32>) -> Vec<Digest> {
        let removed: Vec<Digest> = self
            .entries
            .iter()
            .filter(|(_, e)| {
                e.is_evictable()
                    && (e.certificate.end() <= now
                        || max_lifetime.is_some_and(|l| now.saturating_sub(e.used_at) > l))
            })
            .map(|(d, _)| *d)
            .collect();
        for digest in &removed {
            self.entries.remove(digest);
        }
        if !removed.is_empty() {
            debug!(pool = %self.id, count = removed.len(), "purged certificates");
        }
        removed
    }
}

/// The three certificate pools of an engine together with its trust anchors
#[derive(Debug)]
pub struct CertStore {
    pools: [CertificatePool; 3],
    anchors: BTreeSet<Digest>,
    allow_duplicates: bool,
    max_chain_depth: usize,
}

impl CertStore {
    #[must_use]
    pub fn new(sizes: &PoolSizes, allow_duplicates: bool, max_chain_depth: usize) -> Self {
        Self {
            pools: [
                CertificatePool::new(PoolId::Ca, sizes.ca),
                CertificatePool::new(PoolId::At, sizes.at),
                CertificatePool::new(PoolId::Others, sizes.others),
            ],
            anchors: BTreeSet::new(),
            allow_duplicates,
            max_chain_depth,
        }
    }

    #[must_use]
    pub fn pool(&self, id: PoolId) -> &CertificatePool {
        &self.pools[id.index()]
    }

    pub fn pool_mut(&mut self, id: PoolId) -> &mut CertificatePool {
        &mut self.pools[id.index()]
    }

    /// Pool a certificate belongs to
    #[must_use]
    pub fn select_pool(certificate: &Certificate) -> PoolId {
        if certificate.is_ca() {
            PoolId::Ca
        } else if certificate.is_at() || certificate.state().contains(CertState::LOCAL) {
            PoolId::At
        } else {
            PoolId::Others
        }
    }

    /// Adds a certificate to its pool
    ///
    /// Unless duplicates are allowed, a certificate already stored in any pool
    /// is returned instead.
    pub fn add(&mut self, certificate: Certificate, now: u32) -> Result<Arc<Certificate>> {
        let pool = Self::select_pool(&certificate);
        self.add_to(pool, certificate, now)
    }

    pub fn add_to(&mut self, pool: PoolId, certificate: Certificate, now: u32) -> Result<Arc<Certificate>> {
        if !self.allow_duplicates {
            if let Some(existing) = self.find(&certificate.digest()) {
                return Ok(existing);
            }
        }
        self.pool_mut(pool).add(Arc::new(certificate), now)
    }

    #[must_use]
    pub fn find(&self, digest: &Digest) -> Option<Arc<Certificate>> {
        self.pools.iter().find_map(|p| p.find(digest))
    }

    pub fn get(&mut self, digest: &Digest, now: u32) -> Option<Arc<Certificate>> {
        self.pools.iter_mut().find_map(|p| p.get(digest, now))
    }

    #[must_use]
    pub fn find_by_hashed_id3(&self, id: [u8; 3]) -> Option<Arc<Certificate>> {
        self.certificates()
            .find(|c| c.hashed_id3() == id)
            .cloned()
    }

    /// Removes a certificate from every pool
    pub fn del(&mut self, digest: &Digest) -> bool {
        self.pools
            .iter_mut()
            .fold(false, |removed, p| p.del(digest).is_some() || removed)
    }

    pub fn clean(&mut self, pool: PoolId) {
        self.pool_mut(pool).clean();
    }

    pub fn certificates(&self) -> impl Iterator<Item = &Arc<Certificate>> {
        self.pools.iter().flat_map(CertificatePool::iter)
    }

    pub fn add_trust_anchor(&mut self, digest: Digest) {
        self.anchors.insert(digest);
    }

    pub fn remove_trust_anchor(&mut self, digest: &Digest) -> bool {
        self.anchors.remove(digest)
    }

    #[must_use]
    pub fn is_trust_anchor(&self, digest: &Digest) -> bool {
        self.anchors.contains(digest)
    }

    pub fn trust_anchors(&self) -> impl Iterator<Item = &Digest> {
        self.anchors.iter()
    }

    /// Validates one link: the signature of `certificate` with its issuer key
    /// and the consistency with the issuer
    ///
    /// Sets `INVALID` on a failed check and `TRUSTED` if the issuer is trusted.
    /// Self-signed certificates are trusted only as trust anchors.
    pub fn validate(
        &self,
        engine: &dyn CryptoEngine,
        geo: &dyn RegionCheck,
        certificate: &Certificate,
    ) -> Result<()> {
        let digest = certificate.digest();
        let Some(issuer_digest) = certificate.issuer() else {
            if let Err(e) = certificate.verify_signature(engine, None) {
                certificate.set_state(CertState::INVALID);
                warn!(%digest, "invalid self-signature");
                return Err(e);
            }
            if !self.is_trust_anchor(&digest) {
                return Err(Error::UnknownRoot);
            }
            certificate.set_state(CertState::TRUSTED);
            return Ok(());
        };

        let issuer = self
            .find(&issuer_digest)
            .ok_or(Error::UnknownIssuer(issuer_digest))?;
        let checked = certificate
            .verify_signature(engine, Some(&issuer))
            .and_then(|()| {
                certificate.inherit_region(issuer.region());
                certificate.check_issued_by(&issuer, geo)
            });
        if let Err(e) = checked {
            certificate.set_state(CertState::INVALID);
            warn!(%digest, issuer = %issuer_digest, error = %e, "certificate validation failed");
            return Err(e);
        }
        if issuer.is_trusted() {
            certificate.set_state(CertState::TRUSTED);
        }
        Ok(())
    }

    /// Validates the chain of `certificate` up to a trust anchor
    ///
    /// Every link is checked for `REVOKED` and `INVALID`, signatures are
    /// verified only for links that are not yet trusted.
    pub fn validate_chain(
        &self,
        engine: &dyn CryptoEngine,
        geo: &dyn RegionCheck,
        certificate: &Arc<Certificate>,
    ) -> Result<()> {
        let mut visited = BTreeSet::new();
        let mut chain = Vec::new();
        let mut current = certificate.clone();
        loop {
            let digest = current.digest();
            let state = current.state();
            if state.contains(CertState::REVOKED) {
                return Err(Error::Revoked(digest));
            }
            if state.contains(CertState::INVALID) {
                return Err(Error::InvalidCertificate(digest));
            }
            if !visited.insert(digest) {
                return Err(Error::ChainCycle);
            }
            if visited.len() > self.max_chain_depth {
                return Err(Error::ChainTooLong);
            }
            let issuer = current.issuer();
            chain.push(current);
            match issuer {
                None => break,
                Some(issuer) => {
                    current = self.find(&issuer).ok_or(Error::UnknownIssuer(issuer))?;
                }
            }
        }
        // from the root downwards so each link sees a trusted issuer
        for link in chain.iter().rev() {
            if !link.is_trusted() {
                self.validate(engine, geo, link)?;
            }
        }
        Ok(())
    }

    /// Validates certificates waiting for `certificate` as issuer
    ///
    /// Returns the digest of the own issuer if it is still unknown.
    pub fn relink_certificate(
        &self,
        engine: &dyn CryptoEngine,
        geo: &dyn RegionCheck,
        certificate: &Arc<Certificate>,
    ) -> Option<Digest> {
        let missing = certificate
            .issuer()
            .filter(|issuer| self.find(issuer).is_none());
        if missing.is_none() && !certificate.is_trusted() {
            if let Err(e) = self.validate_chain(engine, geo, certificate) {
                debug!(digest = %certificate.digest(), error = %e, "certificate not trusted");
            }
        }

        let mut issuers = vec![certificate.digest()];
        let mut seen = BTreeSet::from([certificate.digest()]);
        while let Some(issuer) = issuers.pop() {
            let dependents: Vec<Arc<Certificate>> = self
                .certificates()
                .filter(|c| c.issuer() == Some(issuer) && seen.insert(c.digest()))
                .cloned()
                .collect();
            for dependent in dependents {
                if !dependent.is_trusted() {
                    if let Err(e) = self.validate_chain(engine, geo, &dependent) {
                        debug!(digest = %dependent.digest(), error = %e, "certificate not trusted");
                    }
                }
                issuers.push(dependent.digest());
            }
        }
        missing
    }

    /// Relinks every certificate of a pool, returns the unknown issuers
    pub fn relink(
        &self,
        engine: &dyn CryptoEngine,
        geo: &dyn RegionCheck,
        pool: PoolId,
    ) -> Vec<Digest> {
        let certificates: Vec<Arc<Certificate>> = self.pool(pool).iter().cloned().collect();
        let mut missing: Vec<Digest> = certificates
            .iter()
            .filter_map(|c| self.relink_certificate(engine, geo, c))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Drops expired certificates, and unused authorization tickets of peers
    /// after `max_received_lifetime` seconds
    pub fn purge(&mut self, now: u32, max_received_lifetime: u32) -> Vec<Digest> {
        PoolId::ALL
            .iter()
            .flat_map(|id| {
                let lifetime = (*id == PoolId::At).then_some(max_received_lifetime);
                self.pools[id.index()].purge(now, lifetime)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aid,
        cert::fixtures::Pki,
        crypto::Curve,
        geo::DefaultRegionCheck,
        time,
        types::{Duration, Uint16},
    };

    fn store() -> CertStore {
        CertStore::new(&PoolSizes::default(), false, 8)
    }

    fn load(pki: &Pki, data: &[u8]) -> Certificate {
        Certificate::from_bytes(&pki.engine, data.to_vec()).unwrap()
    }

    #[test]
    fn deduplicates_by_digest() {
        let pki = Pki::new(Curve::NistP256);
        let mut store = store();
        let now = time::now32();
        let first = store.add(load(&pki, &pki.root.data), now).unwrap();
        let second = store.add(load(&pki, &pki.root.data), now).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(1, store.pool(PoolId::Ca).len());

        let mut duplicates = CertStore::new(&PoolSizes::default(), true, 8);
        duplicates.add(load(&pki, &pki.root.data), now).unwrap();
        duplicates
            .add_to(PoolId::Others, load(&pki, &pki.root.data), now)
            .unwrap();
        assert_eq!(1, duplicates.pool(PoolId::Ca).len());
        assert_eq!(1, duplicates.pool(PoolId::Others).len());
    }

    #[test]
    fn selects_pools() {
        let pki = Pki::new(Curve::NistP256);
        let at = pki.at("at");
        let ec = pki.at_with(|b| b.app_permission(aid::CRT_REQ, &[0x01, 0xC0]));
        assert_eq!(PoolId::Ca, CertStore::select_pool(&load(&pki, &pki.root.data)));
        assert_eq!(PoolId::Ca, CertStore::select_pool(&load(&pki, &pki.aa.data)));
        assert_eq!(PoolId::At, CertStore::select_pool(&load(&pki, &at.data)));
        assert_eq!(PoolId::Others, CertStore::select_pool(&load(&pki, &ec.data)));
    }

    #[test]
    fn validates_chain_to_trust_anchor() {
        let pki = Pki::new(Curve::BrainpoolP256r1);
        let geo = DefaultRegionCheck;
        let mut store = store();
        let now = time::now32();
        let root = store.add(load(&pki, &pki.root.data), now).unwrap();
        let aa = store.add(load(&pki, &pki.aa.data), now).unwrap();
        let at = store.add(load(&pki, &pki.at("at").data), now).unwrap();

        assert_eq!(
            Err(Error::UnknownRoot),
            store.validate_chain(&pki.engine, &geo, &at)
        );
        assert!(!at.is_trusted());

        store.add_trust_anchor(root.digest());
        store.validate_chain(&pki.engine, &geo, &at).unwrap();
        assert!(root.is_trusted() && aa.is_trusted() && at.is_trusted());

        aa.set_state(CertState::REVOKED);
        assert_eq!(
            Err(Error::Revoked(aa.digest())),
            store.validate_chain(&pki.engine, &geo, &at)
        );
    }

    #[test]
    fn relinks_late_issuers() {
        let pki = Pki::new(Curve::NistP256);
        let geo = DefaultRegionCheck;
        let mut store = store();
        let now = time::now32();
        let root = store.add(load(&pki, &pki.root.data), now).unwrap();
        store.add_trust_anchor(root.digest());
        let at = store.add(load(&pki, &pki.at("at").data), now).unwrap();
        let aa = load(&pki, &pki.aa.data);
        let aa_digest = aa.digest();

        assert_eq!(
            Some(aa_digest),
            store.relink_certificate(&pki.engine, &geo, &at)
        );
        assert_eq!(vec![aa_digest], store.relink(&pki.engine, &geo, PoolId::At));
        assert_eq!(
            Err(Error::UnknownIssuer(aa_digest)),
            store.validate_chain(&pki.engine, &geo, &at)
        );

        let aa = store.add(aa, now).unwrap();
        assert_eq!(None, store.relink_certificate(&pki.engine, &geo, &aa));
        assert!(aa.is_trusted());
        assert!(at.is_trusted());
    }

    #[test]
    fn marks_forged_certificates_invalid() {
        let pki = Pki::new(Curve::NistP256);
        let geo = DefaultRegionCheck;
        let mut store = store();
        let now = time::now32();
        let root = store.add(load(&pki, &pki.root.data), now).unwrap();
        store.add_trust_anchor(root.digest());
        store.add(load(&pki, &pki.aa.data), now).unwrap();

        let mut data = pki.at("at").data;
        let last = data.len() - 1;
        data[last] ^= 0x01;
        let at = store.add(load(&pki, &data), now).unwrap();
        assert_eq!(
            Err(Error::SignatureMismatch),
            store.validate_chain(&pki.engine, &geo, &at)
        );
        assert!(at.state().contains(CertState::INVALID));
        assert_eq!(
            Err(Error::InvalidCertificate(at.digest())),
            store.validate_chain(&pki.engine, &geo, &at)
        );
    }

    #[test]
    fn bounds_the_chain_length() {
        let pki = Pki::new(Curve::NistP256);
        let geo = DefaultRegionCheck;
        let mut store = CertStore::new(&PoolSizes::default(), false, 2);
        let now = time::now32();
        let root = store.add(load(&pki, &pki.root.data), now).unwrap();
        store.add_trust_anchor(root.digest());
        let aa = store.add(load(&pki, &pki.aa.data), now).unwrap();
        let at = store.add(load(&pki, &pki.at("at").data), now).unwrap();
        store.validate_chain(&pki.engine, &geo, &aa).unwrap();
        assert_eq!(
            Err(Error::ChainTooLong),
            store.validate_chain(&pki.engine, &geo, &at)
        );
    }

    #[test]
    fn evicts_least_recently_used() {
        let pki = Pki::new(Curve::NistP256);
        let mut pool = CertificatePool::new(PoolId::At, 2);
        let now = time::now32();
        let a = load(&pki, &pki.at("a").data);
        let b = load(&pki, &pki.at("b").data);
        let c = load(&pki, &pki.at("c").data);
        let (a_digest, b_digest, c_digest) = (a.digest(), b.digest(), c.digest());

        pool.add(Arc::new(a), now).unwrap();
        pool.add(Arc::new(b), now).unwrap();
        assert!(pool.get(&a_digest, now).is_some());
        pool.add(Arc::new(c), now).unwrap();
        assert_eq!(2, pool.len());
        assert!(pool.find(&b_digest).is_none());
        assert!(pool.find(&a_digest).is_some());

        let _held_a = pool.find(&a_digest);
        let _held_c = pool.find(&c_digest);
        let d = load(&pki, &pki.at("d").data);
        assert_eq!(Some(Error::PoolFull), pool.add(Arc::new(d), now).err());
    }

    #[test]
    fn purges_expired_and_unused_certificates() {
        let pki = Pki::new(Curve::NistP256);
        let mut store = store();
        let now = time::now32();
        let expired = pki.at_with(|b| b.validity(now - 7200, Duration::Hours(Uint16(1))));
        let expired = store.add(load(&pki, &expired.data), now).unwrap().digest();
        let peer = store.add(load(&pki, &pki.at("peer").data), now).unwrap().digest();
        let local = pki.at("local");
        let local = load(&pki, &local.data)
            .with_private_keys(&pki.engine, Some(local.key.private.d.as_slice()), None)
            .unwrap();
        let local = store.add(local, now - 100).unwrap().digest();
        let aa = store.add(load(&pki, &pki.aa.data), now - 100).unwrap().digest();

        assert_eq!(vec![expired], store.purge(now, 2));
        assert!(store.find(&peer).is_some());

        let removed = store.purge(now + 10, 2);
        assert_eq!(vec![peer], removed);
        assert!(store.find(&local).is_some());
        assert!(store.find(&aa).is_some());
    }
}
