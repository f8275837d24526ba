use openssl::{
    bn::{BigNum, BigNumContext, BigNumRef},
    cipher::Cipher,
    cipher_ctx::CipherCtx,
    derive::Deriver,
    ec::{EcGroup, EcGroupRef, EcKey, EcPoint, EcPointRef},
    ecdsa::EcdsaSig,
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private, Public},
    sign::Signer,
};
use rand::{rngs::OsRng, RngCore};
use tracing::trace;

use super::{
    Curve, CryptoEngine, EcSignature, KeyPair, PrivateKey, PublicKey, AES_128_KEY_SIZE,
    CCM_NONCE_SIZE, CCM_TAG_SIZE,
};
use crate::{Error, Result};

/// Default crypto engine
///
/// NIST curves are handled by the RustCrypto `p256` and `p384` crates,
/// Brainpool curves, AES-CCM and HMAC by OpenSSL.
#[derive(Debug, Default)]
pub struct OpensslEngine;

impl OpensslEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

macro_rules! nist_curve {
    ($module:ident, $krate:ident) => {
        mod $module {
            use $krate::{
                ecdsa::{
                    signature::hazmat::{PrehashSigner, PrehashVerifier},
                    Signature, SigningKey, VerifyingKey,
                },
                elliptic_curve::{
                    point::DecompressPoint,
                    sec1::{FromEncodedPoint, ToEncodedPoint},
                    subtle::Choice,
                },
                AffinePoint, EncodedPoint, FieldBytes, PublicKey, SecretKey,
            };
            use rand::rngs::OsRng;

            use crate::{Error, Result};

            type Coordinates = (Vec<u8>, Vec<u8>);

            fn field_bytes(bytes: &[u8]) -> Result<FieldBytes> {
                if bytes.len() != FieldBytes::default().len() {
                    return Err(Error::KeySizeMismatch);
                }
                Ok(FieldBytes::clone_from_slice(bytes))
            }

            fn coordinates(point: &EncodedPoint) -> Result<Coordinates> {
                match (point.x(), point.y()) {
                    (Some(x), Some(y)) => Ok((x.to_vec(), y.to_vec())),
                    _ => Err(Error::Crypto("Point at infinity!".into())),
                }
            }

            fn public_key(x: &[u8], y: &[u8]) -> Result<PublicKey> {
                let point = EncodedPoint::from_affine_coordinates(&field_bytes(x)?, &field_bytes(y)?, false);
                Option::from(PublicKey::from_encoded_point(&point))
                    .ok_or_else(|| Error::Crypto("Point is not on the curve!".into()))
            }

            fn secret_key(d: &[u8]) -> Result<SecretKey> {
                SecretKey::from_slice(d).map_err(|_| Error::KeySizeMismatch)
            }

            pub(super) fn generate() -> Result<(Vec<u8>, Coordinates)> {
                let secret = SecretKey::random(&mut OsRng);
                let public = coordinates(&secret.public_key().to_encoded_point(false))?;
                Ok((secret.to_bytes().to_vec(), public))
            }

            pub(super) fn import(d: &[u8]) -> Result<Coordinates> {
                coordinates(&secret_key(d)?.public_key().to_encoded_point(false))
            }

            pub(super) fn decompress(x: &[u8], y_odd: bool) -> Result<Coordinates> {
                let point: AffinePoint = Option::from(AffinePoint::decompress(
                    &field_bytes(x)?,
                    Choice::from(u8::from(y_odd)),
                ))
                .ok_or_else(|| Error::Crypto("Point is not on the curve!".into()))?;
                coordinates(&point.to_encoded_point(false))
            }

            pub(super) fn sign(d: &[u8], digest: &[u8]) -> Result<Coordinates> {
                let key = SigningKey::from_slice(d).map_err(|_| Error::KeySizeMismatch)?;
                let signature: Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| Error::Crypto(e.to_string()))?;
                let (r, s) = signature.split_bytes();
                Ok((r.to_vec(), s.to_vec()))
            }

            pub(super) fn verify(x: &[u8], y: &[u8], digest: &[u8], r: &[u8], s: &[u8]) -> Result<bool> {
                let key = VerifyingKey::from(public_key(x, y)?);
                let Ok(signature) = Signature::from_scalars(field_bytes(r)?, field_bytes(s)?) else {
                    return Ok(false);
                };
                Ok(key.verify_prehash(digest, &signature).is_ok())
            }

            pub(super) fn derive(d: &[u8], x: &[u8], y: &[u8]) -> Result<Vec<u8>> {
                let secret = secret_key(d)?;
                let peer = public_key(x, y)?;
                let shared = $krate::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    };
}

nist_curve!(nist_p256, p256);
nist_curve!(nist_p384, p384);

fn brainpool_group(curve: Curve) -> Result<EcGroup> {
    let nid = match curve {
        Curve::BrainpoolP256r1 => Nid::BRAINPOOL_P256R1,
        Curve::BrainpoolP384r1 => Nid::BRAINPOOL_P384R1,
        _ => return Err(Error::UnsupportedAlgorithm(format!("{curve:?}"))),
    };
    Ok(EcGroup::from_curve_name(nid)?)
}

fn padded(n: &BigNumRef, size: usize) -> Result<Vec<u8>> {
    let size = i32::try_from(size).map_err(|_| Error::KeySizeMismatch)?;
    Ok(n.to_vec_padded(size)?)
}

fn brainpool_coordinates(curve: Curve, group: &EcGroupRef, point: &EcPointRef) -> Result<PublicKey> {
    let mut ctx = BigNumContext::new()?;
    let mut x = BigNum::new()?;
    let mut y = BigNum::new()?;
    point.affine_coordinates_gfp(group, &mut x, &mut y, &mut ctx)?;
    Ok(PublicKey {
        curve,
        x: padded(&x, curve.key_size())?,
        y: padded(&y, curve.key_size())?,
    })
}

fn brainpool_public(key: &PublicKey) -> Result<EcKey<Public>> {
    let group = brainpool_group(key.curve)?;
    let x = BigNum::from_slice(&key.x)?;
    let y = BigNum::from_slice(&key.y)?;
    Ok(EcKey::from_public_key_affine_coordinates(&group, &x, &y)?)
}

fn brainpool_private(key: &PrivateKey) -> Result<EcKey<Private>> {
    let group = brainpool_group(key.curve)?;
    let d = BigNum::from_slice(&key.d)?;
    let ctx = BigNumContext::new()?;
    let mut point = EcPoint::new(&group)?;
    point.mul_generator(&group, &d, &ctx)?;
    Ok(EcKey::from_private_components(&group, &d, &point)?)
}

fn check_size(curve: Curve, bytes: &[u8]) -> Result<()> {
    if bytes.len() == curve.key_size() {
        Ok(())
    } else {
        Err(Error::KeySizeMismatch)
    }
}

fn check_ccm(key: &[u8], nonce: &[u8]) -> Result<()> {
    if key.len() != AES_128_KEY_SIZE || nonce.len() != CCM_NONCE_SIZE {
        return Err(Error::KeySizeMismatch);
    }
    Ok(())
}

impl CryptoEngine for OpensslEngine {
    fn name(&self) -> &str {
        "openssl"
    }

    fn generate_key(&self, curve: Curve) -> Result<KeyPair> {
        let (d, (x, y)) = match curve {
            Curve::NistP256 => nist_p256::generate()?,
            Curve::NistP384 => nist_p384::generate()?,
            Curve::BrainpoolP256r1 | Curve::BrainpoolP384r1 => {
                let group = brainpool_group(curve)?;
                let key = EcKey::generate(&group)?;
                let public = brainpool_coordinates(curve, &group, key.public_key())?;
                (padded(key.private_key(), curve.key_size())?, (public.x, public.y))
            }
        };
        trace!(?curve, "generated key pair");
        Ok(KeyPair {
            private: PrivateKey { curve, d },
            public: PublicKey { curve, x, y },
        })
    }

    fn import_private_key(&self, curve: Curve, d: &[u8]) -> Result<KeyPair> {
        check_size(curve, d)?;
        let public = match curve {
            Curve::NistP256 => {
                let (x, y) = nist_p256::import(d)?;
                PublicKey { curve, x, y }
            }
            Curve::NistP384 => {
                let (x, y) = nist_p384::import(d)?;
                PublicKey { curve, x, y }
            }
            Curve::BrainpoolP256r1 | Curve::BrainpoolP384r1 => {
                let private = PrivateKey {
                    curve,
                    d: d.to_vec(),
                };
                let key = brainpool_private(&private)?;
                brainpool_coordinates(curve, key.group(), key.public_key())?
            }
        };
        Ok(KeyPair {
            private: PrivateKey {
                curve,
                d: d.to_vec(),
            },
            public,
        })
    }

    fn decompress(&self, curve: Curve, x: &[u8], y_odd: bool) -> Result<PublicKey> {
        check_size(curve, x)?;
        match curve {
            Curve::NistP256 => {
                let (x, y) = nist_p256::decompress(x, y_odd)?;
                Ok(PublicKey { curve, x, y })
            }
            Curve::NistP384 => {
                let (x, y) = nist_p384::decompress(x, y_odd)?;
                Ok(PublicKey { curve, x, y })
            }
            Curve::BrainpoolP256r1 | Curve::BrainpoolP384r1 => {
                let group = brainpool_group(curve)?;
                let mut ctx = BigNumContext::new()?;
                let prefix = if y_odd { 0x03 } else { 0x02 };
                let point = EcPoint::from_bytes(&group, &[&[prefix], x].concat(), &mut ctx)?;
                brainpool_coordinates(curve, &group, &point)
            }
        }
    }

    fn sign(&self, key: &PrivateKey, digest: &[u8]) -> Result<EcSignature> {
        let curve = key.curve;
        let (r, s) = match curve {
            Curve::NistP256 => nist_p256::sign(&key.d, digest)?,
            Curve::NistP384 => nist_p384::sign(&key.d, digest)?,
            Curve::BrainpoolP256r1 | Curve::BrainpoolP384r1 => {
                let private = brainpool_private(key)?;
                let signature = EcdsaSig::sign(digest, &private)?;
                (
                    padded(signature.r(), curve.key_size())?,
                    padded(signature.s(), curve.key_size())?,
                )
            }
        };
        Ok(EcSignature { curve, r, s })
    }

    fn verify(&self, key: &PublicKey, digest: &[u8], signature: &EcSignature) -> Result<bool> {
        if key.curve != signature.curve {
            return Ok(false);
        }
        match key.curve {
            Curve::NistP256 => nist_p256::verify(&key.x, &key.y, digest, &signature.r, &signature.s),
            Curve::NistP384 => nist_p384::verify(&key.x, &key.y, digest, &signature.r, &signature.s),
            Curve::BrainpoolP256r1 | Curve::BrainpoolP384r1 => {
                let sig = EcdsaSig::from_private_components(
                    BigNum::from_slice(&signature.r)?,
                    BigNum::from_slice(&signature.s)?,
                )?;
                let public = brainpool_public(key)?;
                Ok(sig.verify(digest, &public)?)
            }
        }
    }

    fn derive(&self, key: &PrivateKey, peer: &PublicKey) -> Result<Vec<u8>> {
        if key.curve != peer.curve {
            return Err(Error::KeySizeMismatch);
        }
        match key.curve {
            Curve::NistP256 => nist_p256::derive(&key.d, &peer.x, &peer.y),
            Curve::NistP384 => nist_p384::derive(&key.d, &peer.x, &peer.y),
            Curve::BrainpoolP256r1 | Curve::BrainpoolP384r1 => {
                let private = PKey::from_ec_key(brainpool_private(key)?)?;
                let public = PKey::from_ec_key(brainpool_public(peer)?)?;
                let mut deriver = Deriver::new(&private)?;
                deriver.set_peer(&public)?;
                Ok(deriver.derive_to_vec()?)
            }
        }
    }

    fn encrypt_ccm(&self, key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        check_ccm(key, nonce)?;
        // CCM lengths must be set before key and nonce
        let mut ctx = CipherCtx::new()?;
        ctx.encrypt_init(Some(Cipher::aes_128_ccm()), None, None)?;
        ctx.set_iv_length(CCM_NONCE_SIZE)?;
        ctx.set_tag_length(CCM_TAG_SIZE)?;
        ctx.encrypt_init(None, Some(key), Some(nonce))?;
        ctx.set_data_len(plaintext.len())?;
        let mut output = Vec::with_capacity(plaintext.len() + CCM_TAG_SIZE);
        ctx.cipher_update_vec(plaintext, &mut output)?;
        ctx.cipher_final_vec(&mut output)?;
        let mut tag = [0u8; CCM_TAG_SIZE];
        ctx.tag(&mut tag)?;
        output.extend_from_slice(&tag);
        Ok(output)
    }

    fn decrypt_ccm(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        check_ccm(key, nonce)?;
        if ciphertext.len() < CCM_TAG_SIZE {
            return Err(Error::DecryptionFailed);
        }
        let (data, tag) = ciphertext.split_at(ciphertext.len() - CCM_TAG_SIZE);
        let mut ctx = CipherCtx::new()?;
        ctx.decrypt_init(Some(Cipher::aes_128_ccm()), None, None)?;
        ctx.set_iv_length(CCM_NONCE_SIZE)?;
        ctx.set_tag(tag)?;
        ctx.decrypt_init(None, Some(key), Some(nonce))?;
        ctx.set_data_len(data.len())?;
        let mut output = Vec::with_capacity(data.len());
        // the tag is checked by the update call
        ctx.cipher_update_vec(data, &mut output)
            .map_err(|_| Error::DecryptionFailed)?;
        Ok(output)
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let key = PKey::hmac(key)?;
        let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
        signer.update(data)?;
        Ok(signer.sign_to_vec()?)
    }

    fn random(&self, output: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(output)
            .map_err(|e| Error::Crypto(e.to_string()))
    }
}

/// Compressed SEC1 encoding of a Brainpool point, used by the tests to cross-check decompression
#[cfg(test)]
fn brainpool_compressed(key: &PublicKey) -> Result<Vec<u8>> {
    let ec = brainpool_public(key)?;
    let mut ctx = BigNumContext::new()?;
    Ok(ec
        .public_key()
        .to_bytes(ec.group(), openssl::ec::PointConversionForm::COMPRESSED, &mut ctx)?)
}
