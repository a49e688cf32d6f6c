use reward_types::{Blake3Hash, Blake3Key};

pub fn blake3_hash(data: &[u8]) -> Blake3Hash {
    let hash = blake3::hash(data);
    Blake3Hash::from_bytes(*hash.as_bytes())
}

pub fn blake3_hash_domain(domain: &str, data: &[u8]) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new_derive_key(domain);
    hasher.update(data);
    Blake3Hash::from_bytes(*hasher.finalize().as_bytes())
}

pub fn blake3_derive_key(context: &str, seed: &[u8]) -> Blake3Key {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(seed);
    let output = hasher.finalize();
    Blake3Key::from_bytes(*output.as_bytes())
}

pub fn blake3_mac(key: &Blake3Key, data: &[u8]) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new_keyed(&key.0);
    hasher.update(data);
    Blake3Hash::from_bytes(*hasher.finalize().as_bytes())
}

pub fn blake3_mac_verify(key: &Blake3Key, data: &[u8], expected_mac: &Blake3Hash) -> bool {
    let computed = blake3_mac(key, data);
    crate::constant_time_eq(&computed.0, &expected_mac.0)
}

pub struct Blake3Hasher {
    inner: blake3::Hasher,
}

impl Blake3Hasher {
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn new_derive_key(context: &str) -> Self {
        Self {
            inner: blake3::Hasher::new_derive_key(context),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Blake3Hash {
        Blake3Hash::from_bytes(*self.inner.finalize().as_bytes())
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash() {
        let data = b"reward-daemon test data";
        let hash1 = blake3_hash(data);
        let hash2 = blake3_hash(data);
        assert_eq!(hash1, hash2);

        let different = blake3_hash(b"different data");
        assert_ne!(hash1, different);
    }

    #[test]
    fn test_blake3_domain_separation() {
        let data = b"same data";
        let hash1 = blake3_hash_domain("domain1", data);
        let hash2 = blake3_hash_domain("domain2", data);
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_blake3_mac() {
        let key = Blake3Key::from_bytes([0xab; 32]);
        let data = b"message to authenticate";

        let mac = blake3_mac(&key, data);
        assert!(blake3_mac_verify(&key, data, &mac));
        assert!(!blake3_mac_verify(&key, b"wrong data", &mac));

        let wrong_key = Blake3Key::from_bytes([0xcd; 32]);
        assert!(!blake3_mac_verify(&wrong_key, data, &mac));
    }

    #[test]
    fn test_incremental_hasher() {
        let data = b"hello world";
        let hash1 = blake3_hash(data);

        let mut hasher = Blake3Hasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        let hash2 = hasher.finalize();

        assert_eq!(hash1, hash2);
    }
}
