//! ChaCha20 keystream for disk-resident pages.
//!
//! RFC 8439 parameters: 256-bit key, 96-bit nonce, 32-bit block counter
//! starting at zero. Encryption and decryption are the same XOR. The nonce is
//! derived from the page's virtual base address, which is unique for the
//! lifetime of the process; the key is fresh per process, so the pair never
//! repeats across runs. A page is always re-encrypted from scratch on freeze
//! — the stream is never resumed or patched incrementally.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::GhostError;

/// Per-process encryption key. Lives only in memory and is zeroed on drop.
pub struct PageKey {
    key: [u8; 32],
}

impl PageKey {
    /// Fill a fresh key from the platform CSPRNG. A CSPRNG failure is a
    /// config error surfaced to the init caller, not a panic.
    pub fn generate() -> Result<Self, GhostError> {
        let mut key = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut key)
            .map_err(|e| GhostError::Config(format!("CSPRNG failure: {e}")))?;
        Ok(Self { key })
    }

    #[cfg(test)]
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// XOR `buf` with the keystream for the page at `page_addr`.
    pub fn apply(&self, page_addr: usize, buf: &mut [u8]) {
        let key = Key::from(self.key);
        let nonce = Nonce::from(page_nonce(page_addr));
        let mut cipher = ChaCha20::new(&key, &nonce);
        cipher.apply_keystream(buf);
    }
}

impl Drop for PageKey {
    fn drop(&mut self) {
        for b in self.key.iter_mut() {
            unsafe { std::ptr::write_volatile(b, 0) };
        }
    }
}

/// Nonce for a page: its virtual base address, little-endian, zero-extended
/// to 96 bits.
pub fn page_nonce(page_addr: usize) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&(page_addr as u64).to_le_bytes());
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_is_little_endian_zero_extended() {
        let nonce = page_nonce(0x0000_7f12_3456_7000);
        assert_eq!(
            nonce,
            [0x00, 0x70, 0x56, 0x34, 0x12, 0x7f, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_apply_twice_is_identity() {
        let key = PageKey::from_bytes([7u8; 32]);
        let original: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut buf = original.clone();

        key.apply(0x7000, &mut buf);
        assert_ne!(buf, original);
        key.apply(0x7000, &mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_distinct_pages_get_distinct_streams() {
        let key = PageKey::from_bytes([9u8; 32]);
        let mut a = vec![0u8; 64];
        let mut b = vec![0u8; 64];
        key.apply(0x1000, &mut a);
        key.apply(0x2000, &mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_keystream_masks_constant_plaintext() {
        let key = PageKey::generate().unwrap();
        let mut buf = vec![b'A'; 4096];
        key.apply(0x5000, &mut buf);

        let mut seen = [false; 256];
        for &b in &buf {
            seen[b as usize] = true;
        }
        let distinct = seen.iter().filter(|&&s| s).count();
        // 4096 bytes of keystream output should touch most byte values
        assert!(distinct > 200, "only {distinct} distinct bytes");
    }

    #[test]
    fn test_same_page_same_key_is_deterministic() {
        let key = PageKey::from_bytes([3u8; 32]);
        let mut a = vec![0x55u8; 128];
        let mut b = vec![0x55u8; 128];
        key.apply(0x9000, &mut a);
        key.apply(0x9000, &mut b);
        assert_eq!(a, b);
    }
}
