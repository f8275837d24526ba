//! Crypto engine abstraction.
//!
//! Engines are created by name through a [`CryptoRegistry`]. The ECIES key
//! wrap of IEEE 1609.2 (5.3.5) and KDF2 are built on top of the engine
//! primitives.

mod openssl_engine;

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use sha2::{Digest as _, Sha256, Sha384};

use crate::{
    types::{
        EccP256CurvePoint, EccP256CurvePointUncompressedP256, EccP384CurvePoint,
        EccP384CurvePointUncompressedP384, EcdsaP256Signature, EcdsaP384Signature, HashAlgorithm,
        PublicVerificationKey, Signature,
    },
    Error, Result,
};

pub use openssl_engine::OpensslEngine;

pub const AES_128_KEY_SIZE: usize = 16;
pub const CCM_NONCE_SIZE: usize = 12;
pub const CCM_TAG_SIZE: usize = 16;
const ECIES_MAC_KEY_SIZE: usize = 32;
const ECIES_TAG_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Curve {
    NistP256,
    BrainpoolP256r1,
    BrainpoolP384r1,
    NistP384,
}

impl Curve {
    /// size of a field element and of a private key in bytes
    #[must_use]
    pub fn key_size(&self) -> usize {
        match self {
            Curve::NistP256 | Curve::BrainpoolP256r1 => 32,
            Curve::NistP384 | Curve::BrainpoolP384r1 => 48,
        }
    }

    /// hash algorithm used with signatures on this curve
    #[must_use]
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            Curve::NistP256 | Curve::BrainpoolP256r1 => HashAlgorithm::Sha256,
            Curve::NistP384 | Curve::BrainpoolP384r1 => HashAlgorithm::Sha384,
        }
    }
}

/// Uncompressed public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub curve: Curve,
    pub x: Vec<u8>,
    pub y: Vec<u8>,
}

impl PublicKey {
    #[must_use]
    pub fn y_is_odd(&self) -> bool {
        self.y.last().is_some_and(|b| b & 1 == 1)
    }

    /// Compressed 256 bit curve point for the wire
    pub fn to_p256_point(&self) -> Result<EccP256CurvePoint<'_>> {
        if self.curve.key_size() != 32 {
            return Err(Error::KeySizeMismatch);
        }
        Ok(if self.y_is_odd() {
            EccP256CurvePoint::CompressedY1(&self.x)
        } else {
            EccP256CurvePoint::CompressedY0(&self.x)
        })
    }

    pub fn to_p384_point(&self) -> Result<EccP384CurvePoint<'_>> {
        if self.curve.key_size() != 48 {
            return Err(Error::KeySizeMismatch);
        }
        Ok(if self.y_is_odd() {
            EccP384CurvePoint::CompressedY1(&self.x)
        } else {
            EccP384CurvePoint::CompressedY0(&self.x)
        })
    }

    pub fn to_verification_key(&self) -> Result<PublicVerificationKey<'_>> {
        Ok(match self.curve {
            Curve::NistP256 => PublicVerificationKey::EcdsaNistP256(self.to_p256_point()?),
            Curve::BrainpoolP256r1 => {
                PublicVerificationKey::EcdsaBrainpoolP256r1(self.to_p256_point()?)
            }
            Curve::BrainpoolP384r1 => {
                PublicVerificationKey::EcdsaBrainpoolP384r1(self.to_p384_point()?)
            }
            Curve::NistP384 => PublicVerificationKey::EcdsaNistP384(self.to_p384_point()?),
        })
    }

    /// Reads a 256 bit curve point, decompressing it with `engine` if needed
    pub fn from_p256_point(
        engine: &dyn CryptoEngine,
        curve: Curve,
        point: &EccP256CurvePoint,
    ) -> Result<Self> {
        match point {
            EccP256CurvePoint::CompressedY0(x) => engine.decompress(curve, x, false),
            EccP256CurvePoint::CompressedY1(x) => engine.decompress(curve, x, true),
            EccP256CurvePoint::UncompressedP256(EccP256CurvePointUncompressedP256 { x, y }) => {
                Ok(Self {
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                })
            }
            EccP256CurvePoint::XOnly(_) | EccP256CurvePoint::Fill(()) => Err(
                Error::InvalidCertificateFormat("Public key must be a complete curve point!".into()),
            ),
        }
    }

    pub fn from_p384_point(
        engine: &dyn CryptoEngine,
        curve: Curve,
        point: &EccP384CurvePoint,
    ) -> Result<Self> {
        match point {
            EccP384CurvePoint::CompressedY0(x) => engine.decompress(curve, x, false),
            EccP384CurvePoint::CompressedY1(x) => engine.decompress(curve, x, true),
            EccP384CurvePoint::UncompressedP384(EccP384CurvePointUncompressedP384 { x, y }) => {
                Ok(Self {
                    curve,
                    x: x.to_vec(),
                    y: y.to_vec(),
                })
            }
            EccP384CurvePoint::XOnly(_) | EccP384CurvePoint::Fill(()) => Err(
                Error::InvalidCertificateFormat("Public key must be a complete curve point!".into()),
            ),
        }
    }

    pub fn from_verification_key(
        engine: &dyn CryptoEngine,
        key: &PublicVerificationKey,
    ) -> Result<Self> {
        match key {
            PublicVerificationKey::EcdsaNistP256(p) => {
                Self::from_p256_point(engine, Curve::NistP256, p)
            }
            PublicVerificationKey::EcdsaBrainpoolP256r1(p) => {
                Self::from_p256_point(engine, Curve::BrainpoolP256r1, p)
            }
            PublicVerificationKey::EcdsaBrainpoolP384r1(p) => {
                Self::from_p384_point(engine, Curve::BrainpoolP384r1, p)
            }
            PublicVerificationKey::EcdsaNistP384(p) => {
                Self::from_p384_point(engine, Curve::NistP384, p)
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    pub curve: Curve,
    pub d: Vec<u8>,
}

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("curve", &self.curve)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

/// ECDSA signature with the x-coordinate of R as `r`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcSignature {
    pub curve: Curve,
    pub r: Vec<u8>,
    pub s: Vec<u8>,
}

impl EcSignature {
    pub fn from_wire(signature: &Signature) -> Result<Self> {
        let p256_r = |r: &EccP256CurvePoint| match r {
            EccP256CurvePoint::XOnly(x)
            | EccP256CurvePoint::CompressedY0(x)
            | EccP256CurvePoint::CompressedY1(x) => Ok(x.to_vec()),
            EccP256CurvePoint::UncompressedP256(p) => Ok(p.x.to_vec()),
            EccP256CurvePoint::Fill(()) => Err(Error::UnsupportedAlgorithm(
                "R value of signature is not given!".into(),
            )),
        };
        let p384_r = |r: &EccP384CurvePoint| match r {
            EccP384CurvePoint::XOnly(x)
            | EccP384CurvePoint::CompressedY0(x)
            | EccP384CurvePoint::CompressedY1(x) => Ok(x.to_vec()),
            EccP384CurvePoint::UncompressedP384(p) => Ok(p.x.to_vec()),
            EccP384CurvePoint::Fill(()) => Err(Error::UnsupportedAlgorithm(
                "R value of signature is not given!".into(),
            )),
        };
        Ok(match signature {
            Signature::EcdsaNistP256Signature(EcdsaP256Signature { r_sig, s_sig }) => Self {
                curve: Curve::NistP256,
                r: p256_r(r_sig)?,
                s: s_sig.to_vec(),
            },
            Signature::EcdsaBrainpoolP256r1Signature(EcdsaP256Signature { r_sig, s_sig }) => Self {
                curve: Curve::BrainpoolP256r1,
                r: p256_r(r_sig)?,
                s: s_sig.to_vec(),
            },
            Signature::EcdsaBrainpoolP384r1Signature(EcdsaP384Signature { r_sig, s_sig }) => Self {
                curve: Curve::BrainpoolP384r1,
                r: p384_r(r_sig)?,
                s: s_sig.to_vec(),
            },
            Signature::EcdsaNistP384Signature(EcdsaP384Signature { r_sig, s_sig }) => Self {
                curve: Curve::NistP384,
                r: p384_r(r_sig)?,
                s: s_sig.to_vec(),
            },
        })
    }

    #[must_use]
    pub fn to_wire(&self) -> Signature<'_> {
        match self.curve {
            Curve::NistP256 => Signature::EcdsaNistP256Signature(EcdsaP256Signature {
                r_sig: EccP256CurvePoint::XOnly(&self.r),
                s_sig: &self.s,
            }),
            Curve::BrainpoolP256r1 => Signature::EcdsaBrainpoolP256r1Signature(EcdsaP256Signature {
                r_sig: EccP256CurvePoint::XOnly(&self.r),
                s_sig: &self.s,
            }),
            Curve::BrainpoolP384r1 => Signature::EcdsaBrainpoolP384r1Signature(EcdsaP384Signature {
                r_sig: EccP384CurvePoint::XOnly(&self.r),
                s_sig: &self.s,
            }),
            Curve::NistP384 => Signature::EcdsaNistP384Signature(EcdsaP384Signature {
                r_sig: EccP384CurvePoint::XOnly(&self.r),
                s_sig: &self.s,
            }),
        }
    }
}

#[must_use]
pub fn hash(algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
    }
}

/// Hash input of an IEEE 1609.2 signature: `H(H(tbs) || H(signer))`
///
/// `signer` is the encoding of the signer certificate, or empty for
/// self-signed data.
#[must_use]
pub fn signing_hash(
    engine: &dyn CryptoEngine,
    algorithm: HashAlgorithm,
    tbs: &[u8],
    signer: &[u8],
) -> Vec<u8> {
    let input = [engine.hash(algorithm, tbs), engine.hash(algorithm, signer)].concat();
    engine.hash(algorithm, &input)
}

/// Capability set of a crypto engine
///
/// Signatures are created and verified over an already computed digest.
pub trait CryptoEngine: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Vec<u8> {
        hash(algorithm, data)
    }

    fn generate_key(&self, curve: Curve) -> Result<KeyPair>;

    /// Builds the key pair of a private key, deriving the public key
    fn import_private_key(&self, curve: Curve, d: &[u8]) -> Result<KeyPair>;

    fn decompress(&self, curve: Curve, x: &[u8], y_odd: bool) -> Result<PublicKey>;

    fn sign(&self, key: &PrivateKey, digest: &[u8]) -> Result<EcSignature>;

    fn verify(&self, key: &PublicKey, digest: &[u8], signature: &EcSignature) -> Result<bool>;

    /// ECDH shared secret (x-coordinate)
    fn derive(&self, key: &PrivateKey, peer: &PublicKey) -> Result<Vec<u8>>;

    /// AES-128-CCM, returns the ciphertext followed by the 16 byte tag
    fn encrypt_ccm(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt_ccm(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// HMAC-SHA256
    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    fn random(&self, output: &mut [u8]) -> Result<()>;
}

pub type EngineFactory = fn() -> Result<Arc<dyn CryptoEngine>>;

/// Named crypto engine factories, "openssl" is always registered
#[derive(Debug, Clone)]
pub struct CryptoRegistry {
    factories: HashMap<String, EngineFactory>,
}

impl Default for CryptoRegistry {
    fn default() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("openssl", || Ok(Arc::new(OpensslEngine::new())));
        registry
    }
}

impl CryptoRegistry {
    pub fn register(&mut self, name: &str, factory: EngineFactory) {
        self.factories.insert(name.to_owned(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn CryptoEngine>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownEngine(name.to_owned()))?;
        factory()
    }
}

/// KDF2 with SHA-256 as used by IEEE 1609.2 ECIES
#[must_use]
pub fn kdf2(engine: &dyn CryptoEngine, secret: &[u8], parameter: &[u8], length: usize) -> Vec<u8> {
    let mut output = Vec::with_capacity(length + 32);
    let mut counter: u32 = 1;
    while output.len() < length {
        let input = [secret, &counter.to_be_bytes(), parameter].concat();
        output.extend(engine.hash(HashAlgorithm::Sha256, &input));
        counter += 1;
    }
    output.truncate(length);
    output
}

/// AES key encrypted with ECIES for one recipient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EciesKey {
    /// ephemeral public key
    pub v: PublicKey,
    pub c: Vec<u8>,
    pub t: Vec<u8>,
}

/// Encrypts `key` to `recipient`
///
/// `p1` is the hash of the recipient certificate, or of the empty string
/// for keys that are not bound to a certificate. `ephemeral` is generated
/// when not given.
pub fn ecies_wrap(
    engine: &dyn CryptoEngine,
    recipient: &PublicKey,
    key: &[u8],
    p1: &[u8],
    ephemeral: Option<KeyPair>,
) -> Result<EciesKey> {
    if key.len() != AES_128_KEY_SIZE {
        return Err(Error::KeySizeMismatch);
    }
    let ephemeral = match ephemeral {
        Some(pair) => pair,
        None => engine.generate_key(recipient.curve)?,
    };
    let shared = engine.derive(&ephemeral.private, recipient)?;
    let k = kdf2(engine, &shared, p1, AES_128_KEY_SIZE + ECIES_MAC_KEY_SIZE);
    let (k_enc, k_mac) = k.split_at(AES_128_KEY_SIZE);
    let c: Vec<u8> = key.iter().zip(k_enc).map(|(a, b)| a ^ b).collect();
    let mut t = engine.hmac(k_mac, &c)?;
    t.truncate(ECIES_TAG_SIZE);
    Ok(EciesKey {
        v: ephemeral.public,
        c,
        t,
    })
}

/// Recovers the AES key of an [`EciesKey`], fails on tag mismatch
pub fn ecies_unwrap(
    engine: &dyn CryptoEngine,
    private: &PrivateKey,
    encrypted: &EciesKey,
    p1: &[u8],
) -> Result<Vec<u8>> {
    if encrypted.c.len() != AES_128_KEY_SIZE || encrypted.t.len() != ECIES_TAG_SIZE {
        return Err(Error::KeySizeMismatch);
    }
    let shared = engine.derive(private, &encrypted.v)?;
    let k = kdf2(engine, &shared, p1, AES_128_KEY_SIZE + ECIES_MAC_KEY_SIZE);
    let (k_enc, k_mac) = k.split_at(AES_128_KEY_SIZE);
    let t = engine.hmac(k_mac, &encrypted.c)?;
    if t[..ECIES_TAG_SIZE] != encrypted.t[..] {
        return Err(Error::DecryptionFailed);
    }
    Ok(encrypted.c.iter().zip(k_enc).map(|(a, b)| a ^ b).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    // IEEE 1609.2 ECIES test vectors, NIST P-256
    const K: &str = "9169155B08B07674CBADF75FB46A7B0D";
    const P1: &str = "A6B7B52554B4203F7E3ACFDB3A3ED8674EE086CE5906A7CAC2F8A398306D3BE9";
    const R: &str = "060E41440A4E35154CA0EFCB52412145836AD032833E6BC781E533BF14851085";
    const R_X: &str = "8C5E20FE31935F6FA682A1F6D46E4468534FFEA1A698B14B0B12513EED8DEB11";
    const R_Y: &str = "1270FEC2427E6A154DFCAE3368584396C8251A04E2AE7D87B016FF65D22D6F9E";

    struct Vector {
        v: &'static str,
        v_x: &'static str,
        v_y: &'static str,
        c: &'static str,
        t: &'static str,
    }

    const VECTORS: [Vector; 2] = [
        Vector {
            v: "1384C31D6982D52BCA3BED8A7E60F52FECDAB44E5C0EA166815A8159E09FFB42",
            v_x: "F45A99137B1BB2C150D6D8CF7292CA07DA68C003DAA766A9AF7F67F5EE916828",
            v_y: "F6A25216F44CB64A96C229AE00B479857B3B81C1319FB2ADF0E8DB2681769729",
            c: "A6342013D623AD6C5F6882469673AE33",
            t: "80E1D85D30F1BAE4ECF1A534A89A0786",
        },
        Vector {
            v: "D418760F0CB2DCB856BC3C7217AD3AA36DB6742AE1DB655A3D28DF88CBBF84E1",
            v_x: "EE9CC7FBD9EDECEA41F7C8BD258E8D2E988E75BD069ADDCA1E5A38E534AC6818",
            v_y: "5AE3C8D9FE0B1FC7438F29417C240F8BF81C358EC1A4D0C6E98D8EDBCC714017",
            c: "DD530BE3BCD149E881E09F06E160F5A0",
            t: "06C1F0F5EAED453CAF78E01A3D16A001",
        },
    ];

    fn h(s: &str) -> Vec<u8> {
        hex::decode(s).unwrap()
    }

    #[test]
    fn wraps_keys_like_the_ieee_vectors() {
        let engine = OpensslEngine::new();
        for vector in VECTORS {
            let ephemeral = engine.import_private_key(Curve::NistP256, &h(R)).unwrap();
            assert_eq!(h(R_X), ephemeral.public.x);
            assert_eq!(h(R_Y), ephemeral.public.y);
            let recipient = PublicKey {
                curve: Curve::NistP256,
                x: h(vector.v_x),
                y: h(vector.v_y),
            };
            let wrapped = ecies_wrap(&engine, &recipient, &h(K), &h(P1), Some(ephemeral)).unwrap();
            assert_eq!(h(vector.c), wrapped.c);
            assert_eq!(h(vector.t), wrapped.t);

            let private = engine.import_private_key(Curve::NistP256, &h(vector.v)).unwrap();
            assert_eq!(recipient, private.public);
            assert_eq!(
                h(K),
                ecies_unwrap(&engine, &private.private, &wrapped, &h(P1)).unwrap()
            );
        }
    }

    #[test]
    fn rejects_modified_ecies_tag() {
        let engine = OpensslEngine::new();
        let recipient = engine.generate_key(Curve::BrainpoolP256r1).unwrap();
        let mut wrapped = ecies_wrap(&engine, &recipient.public, &[7; 16], &[], None).unwrap();
        assert_eq!(
            vec![7; 16],
            ecies_unwrap(&engine, &recipient.private, &wrapped, &[]).unwrap()
        );
        wrapped.t[0] ^= 1;
        assert_eq!(
            Err(Error::DecryptionFailed),
            ecies_unwrap(&engine, &recipient.private, &wrapped, &[])
        );
    }

    #[test]
    fn derives_kdf2_blocks() {
        let engine = OpensslEngine::new();
        let k = kdf2(&engine, b"secret", b"", 48);
        assert_eq!(48, k.len());
        assert_eq!(
            hash(HashAlgorithm::Sha256, b"secret\x00\x00\x00\x01"),
            k[..32].to_vec()
        );
        assert_eq!(
            hash(HashAlgorithm::Sha256, b"secret\x00\x00\x00\x02")[..16],
            k[32..]
        );
    }

    #[test]
    fn creates_engines_by_name() {
        let registry = CryptoRegistry::default();
        assert_eq!("openssl", registry.create("openssl").unwrap().name());
        assert_eq!(
            Some(Error::UnknownEngine("atlk".into())),
            registry.create("atlk").err()
        );
    }

    #[test]
    fn converts_signatures_to_the_wire_format() {
        let signature = EcSignature {
            curve: Curve::BrainpoolP256r1,
            r: vec![1; 32],
            s: vec![2; 32],
        };
        let wire = signature.to_wire();
        assert!(matches!(wire, Signature::EcdsaBrainpoolP256r1Signature(_)));
        assert_eq!(signature, EcSignature::from_wire(&wire).unwrap());
    }
}
