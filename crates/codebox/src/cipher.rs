//! Code transport obfuscation
//!
//! User code is XOR-ed with a fresh random key before it is embedded in a
//! bootstrap script, and the key travels separately on the command line. This
//! keeps plaintext out of files on disk; it is not encryption.

use rand::RngCore;

/// Key length used for every execution
pub const KEY_LEN: usize = 64;

/// Generate a random key of `len` bytes
pub fn generate_key(len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// XOR `data` with `key`, repeating the key as needed.
///
/// Applying this twice with the same key returns the input. An empty key
/// leaves the data unchanged.
pub fn xor(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}
