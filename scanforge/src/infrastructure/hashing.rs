// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Hashing (spec §4.3's content-addressing primitive)
//!
//! [`Blake3Hasher`] is the concrete, sync [`Hasher`] port implementation
//! used by the chunk pipeline. [`AsyncHasherAdapter`] wraps it the same
//! way the teacher's `AsyncChecksumAdapter` wraps its sync
//! `ChecksumService`: the domain port stays synchronous and portable,
//! infrastructure decides how to keep the async runtime unblocked.

use std::sync::Arc;

use scanforge_domain::error::CoreError;
use scanforge_domain::ports::Hasher;

/// BLAKE3 implementation of the domain's [`Hasher`] port.
#[derive(Debug, Default)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    pub fn new() -> Self {
        Self
    }
}

impl Hasher for Blake3Hasher {
    fn hash(&self, bytes: &[u8]) -> Result<String, CoreError> {
        Ok(blake3::hash(bytes).to_hex().to_string())
    }
}

/// Runs a sync [`Hasher`] on the blocking thread pool so hashing large
/// buffers never stalls the async runtime's reactor.
pub struct AsyncHasherAdapter<T: Hasher + 'static> {
    inner: Arc<T>,
}

impl<T: Hasher + 'static> AsyncHasherAdapter<T> {
    pub fn new(hasher: Arc<T>) -> Self {
        Self { inner: hasher }
    }

    pub async fn hash_async(&self, bytes: Vec<u8>) -> Result<String, CoreError> {
        let hasher = self.inner.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&bytes))
            .await
            .map_err(|e| CoreError::io_failure(None, format!("hashing task join error: {e}")))?
    }
}

impl<T: Hasher + 'static> Clone for AsyncHasherAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake3_hash_is_deterministic_and_hex_encoded() {
        let hasher = Blake3Hasher::new();
        let a = hasher.hash(b"hello world").unwrap();
        let b = hasher.hash(b"hello world").unwrap();
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn different_input_hashes_differently() {
        let hasher = Blake3Hasher::new();
        assert_ne!(hasher.hash(b"a").unwrap(), hasher.hash(b"b").unwrap());
    }

    #[tokio::test]
    async fn async_adapter_hashes_off_the_reactor_thread() {
        let adapter = AsyncHasherAdapter::new(Arc::new(Blake3Hasher::new()));
        let digest = adapter.hash_async(b"hello world".to_vec()).await.unwrap();
        assert_eq!(digest, Blake3Hasher::new().hash(b"hello world").unwrap());
    }
}
