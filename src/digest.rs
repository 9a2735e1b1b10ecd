
//! SHA-256 integrity digests.
//! Every chunk is digested individually, and the container digest
//! is the digest of all chunk digests concatenated in index order.

use sha2::{Digest, Sha256};

/// Number of bytes of a SHA-256 digest.
pub const CHECKSUM_SIZE: usize = 32;

/// A SHA-256 digest of a chunk or of the whole container.
pub type Checksum = [u8; CHECKSUM_SIZE];


/// Digest a byte slice in one shot.
pub fn checksum_of(bytes: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}


/// Accumulates the container-wide digest by folding in
/// one chunk digest after another, in ascending chunk index order.
/// With no chunks at all, this finishes to the digest of the empty string.
#[derive(Clone, Default)]
pub struct GlobalChecksum {
    hasher: Sha256,
}

impl GlobalChecksum {

    /// Start with no chunk digests folded in yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in the digest of the next chunk.
    pub fn add_chunk(&mut self, chunk_checksum: &Checksum) {
        self.hasher.update(chunk_checksum);
    }

    /// The digest over all folded chunk digests.
    pub fn finish(self) -> Checksum {
        self.hasher.finalize().into()
    }
}

impl std::fmt::Debug for GlobalChecksum {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("GlobalChecksum")
    }
}
