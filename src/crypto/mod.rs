//! Per-session stream cipher adapter
//!
//! Implements the classic shadowsocks stream framing: each direction opens
//! with a random IV followed by ciphertext, and the keystream state carries
//! over from one frame to the next. Frames must therefore be processed
//! exactly once and in order.

mod kdf;
mod stream;

pub use kdf::evp_bytes_to_key;

use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use stream::{Direction, Keystream};
use thiserror::Error;

/// Cipher construction failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// The configured method name is not supported
    #[error("Unknown cipher method: {0}")]
    UnknownMethod(String),

    /// Key or IV length rejected by the underlying cipher
    #[error("Invalid key or IV length")]
    InvalidKeyLength,
}

/// Supported stream cipher methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CipherKind {
    /// RC4 keyed with `MD5(key || iv)`
    Rc4Md5,
    /// AES-128 in 128-bit CFB mode
    Aes128Cfb,
    /// AES-192 in 128-bit CFB mode
    Aes192Cfb,
    /// AES-256 in 128-bit CFB mode
    Aes256Cfb,
    /// AES-128 in big-endian CTR mode
    Aes128Ctr,
    /// AES-192 in big-endian CTR mode
    Aes192Ctr,
    /// AES-256 in big-endian CTR mode
    Aes256Ctr,
    /// ChaCha20 with a 96-bit nonce
    Chacha20Ietf,
}

impl CipherKind {
    /// Every supported method
    pub const ALL: [CipherKind; 8] = [
        CipherKind::Rc4Md5,
        CipherKind::Aes128Cfb,
        CipherKind::Aes192Cfb,
        CipherKind::Aes256Cfb,
        CipherKind::Aes128Ctr,
        CipherKind::Aes192Ctr,
        CipherKind::Aes256Ctr,
        CipherKind::Chacha20Ietf,
    ];

    /// Method name as written in configuration
    pub fn as_str(self) -> &'static str {
        match self {
            CipherKind::Rc4Md5 => "rc4-md5",
            CipherKind::Aes128Cfb => "aes-128-cfb",
            CipherKind::Aes192Cfb => "aes-192-cfb",
            CipherKind::Aes256Cfb => "aes-256-cfb",
            CipherKind::Aes128Ctr => "aes-128-ctr",
            CipherKind::Aes192Ctr => "aes-192-ctr",
            CipherKind::Aes256Ctr => "aes-256-ctr",
            CipherKind::Chacha20Ietf => "chacha20-ietf",
        }
    }

    /// Master key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            CipherKind::Rc4Md5 | CipherKind::Aes128Cfb | CipherKind::Aes128Ctr => 16,
            CipherKind::Aes192Cfb | CipherKind::Aes192Ctr => 24,
            CipherKind::Aes256Cfb | CipherKind::Aes256Ctr | CipherKind::Chacha20Ietf => 32,
        }
    }

    /// IV length in bytes, sent in the clear at the head of each direction
    pub fn iv_len(self) -> usize {
        match self {
            CipherKind::Chacha20Ietf => 12,
            _ => 16,
        }
    }
}

impl FromStr for CipherKind {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        CipherKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lower)
            .ok_or_else(|| CipherError::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for CipherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method plus derived master key, shared by every session of a relay
#[derive(Clone)]
pub struct MasterKey {
    kind: CipherKind,
    key: Arc<[u8]>,
}

impl MasterKey {
    /// Derive the master key for `method` from `password`
    pub fn new(method: &str, password: &str) -> Result<Self, CipherError> {
        let kind: CipherKind = method.parse()?;
        let key = evp_bytes_to_key(password.as_bytes(), kind.key_len());
        Ok(MasterKey {
            kind,
            key: key.into(),
        })
    }

    /// Method the key was derived for
    pub fn kind(&self) -> CipherKind {
        self.kind
    }

    /// Fresh adapter for one session
    pub fn cipher(&self) -> Cipher {
        Cipher {
            encryptor: Encryptor {
                kind: self.kind,
                key: Arc::clone(&self.key),
                stream: None,
            },
            decryptor: Decryptor {
                kind: self.kind,
                key: Arc::clone(&self.key),
                iv: Vec::new(),
                stream: None,
            },
        }
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Stateful per-session adapter holding one encrypting and one decrypting half
pub struct Cipher {
    encryptor: Encryptor,
    decryptor: Decryptor,
}

impl Cipher {
    /// Encrypt the next outbound frame
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.encryptor.encrypt(data)
    }

    /// Decrypt the next inbound frame
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.decryptor.decrypt(data)
    }

    /// Separate the halves so each relay direction owns its own state
    pub fn split(self) -> (Encryptor, Decryptor) {
        (self.encryptor, self.decryptor)
    }
}

/// Outbound half
pub struct Encryptor {
    kind: CipherKind,
    key: Arc<[u8]>,
    stream: Option<Box<dyn Keystream>>,
}

impl Encryptor {
    /// Encrypt one frame; the first call prepends a fresh random IV
    pub fn encrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        match self.stream.as_mut() {
            Some(stream) => {
                let mut out = data.to_vec();
                stream.apply(&mut out);
                Ok(out)
            }
            None => {
                let iv_len = self.kind.iv_len();
                let mut out = vec![0u8; iv_len + data.len()];
                rand::thread_rng().fill_bytes(&mut out[..iv_len]);

                let mut stream =
                    stream::build(self.kind, &self.key, &out[..iv_len], Direction::Encrypt)?;
                out[iv_len..].copy_from_slice(data);
                stream.apply(&mut out[iv_len..]);
                self.stream = Some(stream);
                Ok(out)
            }
        }
    }
}

/// Inbound half
pub struct Decryptor {
    kind: CipherKind,
    key: Arc<[u8]>,
    iv: Vec<u8>,
    stream: Option<Box<dyn Keystream>>,
}

impl Decryptor {
    /// Decrypt one frame
    ///
    /// Until the peer's IV has been fully received, its bytes are buffered
    /// and the output may be empty.
    pub fn decrypt(&mut self, data: &[u8]) -> Result<Vec<u8>, CipherError> {
        let mut data = data;

        if self.stream.is_none() {
            let iv_len = self.kind.iv_len();
            let take = (iv_len - self.iv.len()).min(data.len());
            self.iv.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.iv.len() < iv_len {
                return Ok(Vec::new());
            }
            self.stream = Some(stream::build(
                self.kind,
                &self.key,
                &self.iv,
                Direction::Decrypt,
            )?);
        }

        let mut out = data.to_vec();
        if let Some(stream) = self.stream.as_mut() {
            stream.apply(&mut out);
        }
        Ok(out)
    }
}
