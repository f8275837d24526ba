//! Per message working state of the envelope operations.

use std::{mem, ops::Range, sync::Arc};

use crate::{
    cert::{Certificate, Digest},
    config::{ItsAid, PayloadType},
    crypto::{PrivateKey, PublicKey},
    geo::Location,
    time, Error, Result,
};

/// How the signer of a message is identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignerType {
    /// digest or certificate according to the application profile
    #[default]
    Auto,
    Digest,
    Certificate,
    /// signed with a key that is not bound to a certificate
    SelfSigned,
}

/// Signature related fields of a message
#[derive(Debug, Clone, Default)]
pub struct SignInfo {
    pub aid: ItsAid,
    /// outgoing: SSP of the content, used to select the certificate;
    /// incoming: SSP of the signer certificate
    pub ssp: Vec<u8>,
    pub ssp_mask: Vec<u8>,
    pub signer_type: SignerType,
    /// certificate that signed the message, selected automatically if empty
    pub certificate: Option<Arc<Certificate>>,
    /// digest the signer was referenced by
    pub digest: Option<Digest>,
    /// key of self-signed messages
    pub private_key: Option<PrivateKey>,
    pub public_key: Option<PublicKey>,
    /// SHA-256 of the external payload of `SignedExternal` messages
    pub external_hash: Option<Vec<u8>>,
}

impl SignInfo {
    #[must_use]
    pub fn new(aid: ItsAid, ssp: &[u8]) -> Self {
        Self {
            aid,
            ssp: ssp.to_vec(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Recipient {
    Certificate(Arc<Certificate>),
    /// pre-shared symmetric key by its digest
    PreSharedKey(Digest),
}

/// Encryption related fields of a message
#[derive(Debug, Clone, Default)]
pub struct EncryptionInfo {
    pub recipients: Vec<Recipient>,
    /// AES key of the message: given or generated when encrypting,
    /// recovered when decrypting
    pub key: Option<Vec<u8>>,
    /// recipient that matched when decrypting
    pub recipient: Option<Digest>,
}

#[derive(Debug, Clone, Default)]
pub enum SecurityInfo {
    #[default]
    None,
    Sign(SignInfo),
    Encryption(EncryptionInfo),
}

/// A message on its way through prepare/finalize or parse/validate/decrypt
///
/// The message buffer is owned by the `MessageInfo`, the payload is a range
/// inside of it, or inside the decrypted data after decryption.
#[derive(Debug)]
pub struct MessageInfo {
    buffer: Vec<u8>,
    max_size: usize,
    payload: Range<usize>,
    decrypted: Option<Vec<u8>>,
    pub payload_type: PayloadType,
    /// position of the sender
    pub position: Option<Location>,
    /// Time64 of the message generation, the current time is used if 0
    pub generation_time: u64,
    pub expiry_time: Option<u64>,
    /// Time64 the message was received, for the freshness checks
    pub received_at: u64,
    pub security: SecurityInfo,
    status: Option<Error>,
}

impl MessageInfo {
    /// Outgoing message, at most `max_size` bytes long
    #[must_use]
    pub fn new(payload_type: PayloadType, max_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_size,
            payload: 0..0,
            decrypted: None,
            payload_type,
            position: None,
            generation_time: 0,
            expiry_time: None,
            received_at: 0,
            security: SecurityInfo::None,
            status: None,
        }
    }

    #[must_use]
    pub fn unsecured(max_size: usize) -> Self {
        Self::new(PayloadType::Unsecured, max_size)
    }

    #[must_use]
    pub fn signed(aid: ItsAid, ssp: &[u8], max_size: usize) -> Self {
        let mut message = Self::new(PayloadType::Signed, max_size);
        message.security = SecurityInfo::Sign(SignInfo::new(aid, ssp));
        message
    }

    #[must_use]
    pub fn encrypted(max_size: usize) -> Self {
        let mut message = Self::new(PayloadType::Encrypted, max_size);
        message.security = SecurityInfo::Encryption(EncryptionInfo::default());
        message
    }

    /// Received message
    #[must_use]
    pub fn with_buffer(buffer: Vec<u8>) -> Self {
        let mut message = Self::new(PayloadType::Auto, buffer.len());
        message.payload = 0..buffer.len();
        message.buffer = buffer;
        message.received_at = time::now64();
        message
    }

    /// the encoded message
    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.buffer
    }

    #[must_use]
    pub fn into_message(self) -> Vec<u8> {
        self.buffer
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match &self.decrypted {
            Some(plain) => plain,
            None => &self.buffer[self.payload.clone()],
        }
    }

    /// payload area reserved by the prepare step
    pub fn payload_mut(&mut self) -> &mut [u8] {
        match &mut self.decrypted {
            Some(plain) => plain,
            None => &mut self.buffer[self.payload.clone()],
        }
    }

    /// Copies the payload of an outgoing message into the reserved area
    pub fn write_payload(&mut self, data: &[u8]) -> Result<()> {
        let available = self.buffer.len();
        if data.len() > available {
            return Err(Error::BufferTooSmall {
                required: data.len(),
                available,
            });
        }
        self.buffer.truncate(data.len());
        self.buffer.copy_from_slice(data);
        self.payload = 0..data.len();
        Ok(())
    }

    /// Shortens the reserved payload area to the written length
    pub fn set_payload_len(&mut self, len: usize) -> Result<()> {
        if len > self.buffer.len() {
            return Err(Error::BufferTooSmall {
                required: len,
                available: self.buffer.len(),
            });
        }
        self.buffer.truncate(len);
        self.payload = 0..len;
        Ok(())
    }

    pub(crate) fn reserve_payload(&mut self, capacity: usize) {
        self.decrypted = None;
        self.buffer = vec![0; capacity];
        self.payload = 0..capacity;
    }

    /// Replaces the buffer by an encoded message, `payload` is a range in `data`
    pub(crate) fn set_message(&mut self, data: Vec<u8>, payload: Range<usize>) -> Result<usize> {
        if data.len() > self.max_size {
            return Err(Error::BufferTooSmall {
                required: data.len(),
                available: self.max_size,
            });
        }
        let len = data.len();
        self.buffer = data;
        self.payload = payload;
        self.decrypted = None;
        Ok(len)
    }

    pub(crate) fn set_payload_range(&mut self, payload: Range<usize>) {
        self.payload = payload;
    }

    pub(crate) fn set_decrypted(&mut self, plain: Vec<u8>) {
        self.decrypted = Some(plain);
    }

    /// error of the last failed operation on this message
    #[must_use]
    pub fn status(&self) -> Option<&Error> {
        self.status.as_ref()
    }

    /// Records the outcome of an operation
    pub(crate) fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        self.status = result.as_ref().err().cloned();
        result
    }

    #[must_use]
    pub fn sign_info(&self) -> Option<&SignInfo> {
        match &self.security {
            SecurityInfo::Sign(info) => Some(info),
            _ => None,
        }
    }

    /// sign information, created when missing
    pub fn sign_info_mut(&mut self) -> &mut SignInfo {
        if !matches!(self.security, SecurityInfo::Sign(_)) {
            self.security = SecurityInfo::Sign(SignInfo::default());
        }
        match &mut self.security {
            SecurityInfo::Sign(info) => info,
            _ => unreachable!(),
        }
    }

    #[must_use]
    pub fn encryption_info(&self) -> Option<&EncryptionInfo> {
        match &self.security {
            SecurityInfo::Encryption(info) => Some(info),
            _ => None,
        }
    }

    /// encryption information, created when missing
    pub fn encryption_info_mut(&mut self) -> &mut EncryptionInfo {
        if !matches!(self.security, SecurityInfo::Encryption(_)) {
            self.security = SecurityInfo::Encryption(EncryptionInfo::default());
        }
        match &mut self.security {
            SecurityInfo::Encryption(info) => info,
            _ => unreachable!(),
        }
    }

    /// New received message from the payload, for nested envelopes
    #[must_use]
    pub fn inner(&self) -> MessageInfo {
        let mut inner = MessageInfo::with_buffer(self.payload().to_vec());
        inner.received_at = self.received_at;
        inner
    }

    /// Copy of this message with a new buffer of `max_size` bytes
    pub fn copy_with_buffer(&self, max_size: usize) -> Result<MessageInfo> {
        if self.buffer.len() > max_size {
            return Err(Error::BufferTooSmall {
                required: self.buffer.len(),
                available: max_size,
            });
        }
        Ok(MessageInfo {
            buffer: self.buffer.clone(),
            max_size,
            payload: self.payload.clone(),
            decrypted: self.decrypted.clone(),
            payload_type: self.payload_type,
            position: self.position,
            generation_time: self.generation_time,
            expiry_time: self.expiry_time,
            received_at: self.received_at,
            security: self.security.clone(),
            status: self.status.clone(),
        })
    }

    /// Exchanges the buffers and payloads of two messages
    pub fn swap_buffers(&mut self, other: &mut MessageInfo) {
        mem::swap(&mut self.buffer, &mut other.buffer);
        mem::swap(&mut self.max_size, &mut other.max_size);
        mem::swap(&mut self.payload, &mut other.payload);
        mem::swap(&mut self.decrypted, &mut other.decrypted);
    }
}
