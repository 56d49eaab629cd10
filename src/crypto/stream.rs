//! Keystream implementations backing each cipher method

use super::kdf::rc4_md5_key;
use super::{CipherError, CipherKind};
use cfb_mode::{BufDecryptor, BufEncryptor};
use cipher::consts::U16;
use cipher::{BlockCipher, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use rc4::Rc4;

/// Stateful transform applied in place to consecutive chunks of one direction
pub trait Keystream: Send {
    fn apply(&mut self, data: &mut [u8]);
}

/// Direction the keystream is built for; only CFB cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Build the keystream for `kind` from the master key and session IV
pub fn build(
    kind: CipherKind,
    key: &[u8],
    iv: &[u8],
    direction: Direction,
) -> Result<Box<dyn Keystream>, CipherError> {
    match kind {
        CipherKind::Rc4Md5 => rc4_md5(key, iv),
        CipherKind::Aes128Cfb => cfb::<aes::Aes128>(key, iv, direction),
        CipherKind::Aes192Cfb => cfb::<aes::Aes192>(key, iv, direction),
        CipherKind::Aes256Cfb => cfb::<aes::Aes256>(key, iv, direction),
        CipherKind::Aes128Ctr => stream::<ctr::Ctr128BE<aes::Aes128>>(key, iv),
        CipherKind::Aes192Ctr => stream::<ctr::Ctr128BE<aes::Aes192>>(key, iv),
        CipherKind::Aes256Ctr => stream::<ctr::Ctr128BE<aes::Aes256>>(key, iv),
        CipherKind::Chacha20Ietf => stream::<chacha20::ChaCha20>(key, iv),
    }
}

struct Stream<C>(C);

impl<C: StreamCipher + Send> Keystream for Stream<C> {
    fn apply(&mut self, data: &mut [u8]) {
        self.0.apply_keystream(data);
    }
}

fn stream<C>(key: &[u8], iv: &[u8]) -> Result<Box<dyn Keystream>, CipherError>
where
    C: KeyIvInit + StreamCipher + Send + 'static,
{
    let cipher = C::new_from_slices(key, iv).map_err(|_| CipherError::InvalidKeyLength)?;
    Ok(Box::new(Stream(cipher)))
}

impl<C> Keystream for BufEncryptor<C>
where
    C: BlockEncryptMut + BlockCipher + Send,
{
    fn apply(&mut self, data: &mut [u8]) {
        self.encrypt(data);
    }
}

impl<C> Keystream for BufDecryptor<C>
where
    C: BlockEncryptMut + BlockCipher + Send,
{
    fn apply(&mut self, data: &mut [u8]) {
        self.decrypt(data);
    }
}

fn cfb<C>(key: &[u8], iv: &[u8], direction: Direction) -> Result<Box<dyn Keystream>, CipherError>
where
    C: BlockEncryptMut + BlockCipher + KeyInit + Send + 'static,
{
    match direction {
        Direction::Encrypt => {
            let enc = BufEncryptor::<C>::new_from_slices(key, iv)
                .map_err(|_| CipherError::InvalidKeyLength)?;
            Ok(Box::new(enc))
        }
        Direction::Decrypt => {
            let dec = BufDecryptor::<C>::new_from_slices(key, iv)
                .map_err(|_| CipherError::InvalidKeyLength)?;
            Ok(Box::new(dec))
        }
    }
}

/// RC4 keyed per session with `MD5(key || iv)`
fn rc4_md5(key: &[u8], iv: &[u8]) -> Result<Box<dyn Keystream>, CipherError> {
    let cipher = Rc4::<U16>::new_from_slice(&rc4_md5_key(key, iv))
        .map_err(|_| CipherError::InvalidKeyLength)?;
    Ok(Box::new(Stream(cipher)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher::consts::U3;

    #[test]
    fn test_rc4_known_vector() {
        let mut data = *b"Plaintext";
        Stream(Rc4::<U3>::new_from_slice(b"Key").unwrap()).apply(&mut data);
        assert_eq!(data, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn test_rc4_md5_chunked_equals_whole() {
        let key = [3u8; 16];
        let iv = [5u8; 16];

        let mut whole = *b"Attack at dawn";
        rc4_md5(&key, &iv).unwrap().apply(&mut whole);

        let mut chunked = *b"Attack at dawn";
        let mut rc4 = rc4_md5(&key, &iv).unwrap();
        let (a, b) = chunked.split_at_mut(5);
        rc4.apply(a);
        rc4.apply(b);

        assert_eq!(whole, chunked);
        assert_ne!(&whole, b"Attack at dawn");
    }

    #[test]
    fn test_rc4_md5_decrypts_with_same_iv() {
        let key = [1u8; 16];
        let iv = [2u8; 16];

        let mut data = *b"round trip";
        rc4_md5(&key, &iv).unwrap().apply(&mut data);
        build(CipherKind::Rc4Md5, &key, &iv, Direction::Decrypt)
            .unwrap()
            .apply(&mut data);
        assert_eq!(&data, b"round trip");
    }

    #[test]
    fn test_cfb_chunked_equals_whole() {
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let plain: Vec<u8> = (0..=200u8).collect();

        let mut whole = plain.clone();
        build(CipherKind::Aes128Cfb, &key, &iv, Direction::Encrypt)
            .unwrap()
            .apply(&mut whole);

        let mut enc = build(CipherKind::Aes128Cfb, &key, &iv, Direction::Encrypt).unwrap();
        let mut chunked = plain.clone();
        for chunk in chunked.chunks_mut(13) {
            enc.apply(chunk);
        }
        assert_eq!(whole, chunked);

        let mut dec = build(CipherKind::Aes128Cfb, &key, &iv, Direction::Decrypt).unwrap();
        for chunk in chunked.chunks_mut(7) {
            dec.apply(chunk);
        }
        assert_eq!(chunked, plain);
    }

    #[test]
    fn test_wrong_key_length_is_reported() {
        let result = build(CipherKind::Aes256Ctr, &[0u8; 5], &[0u8; 16], Direction::Encrypt);
        assert!(matches!(result, Err(CipherError::InvalidKeyLength)));
    }
}
