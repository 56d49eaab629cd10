//! Password to key derivation

use md5::{Digest, Md5};

/// OpenSSL `EVP_BytesToKey` with MD5 and a single round, no salt
///
/// `D_i = MD5(D_{i-1} || password)`, concatenated and truncated to `key_len`.
pub fn evp_bytes_to_key(password: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }

    key.truncate(key_len);
    key
}

/// Per-session RC4 key: `MD5(key || iv)`
pub fn rc4_md5_key(key: &[u8], iv: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(iv);

    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize());
    out
}
