//! Key routing: a chunked content hash fed into a jump consistent hash.

use std::hash::{BuildHasher, Hash, Hasher};

/// Keys are hashed in chunks of this many bytes. Each chunk is hashed
/// independently and the results are folded together, so a long key costs
/// one bounded hash per chunk instead of one pass over an ever-growing state.
pub(crate) const HASH_CHUNK_SIZE: usize = 64;

/// A `Hasher` adapter that splits everything written to it into fixed-size
/// chunks, hashes each chunk with a fresh hasher from `H`, and XOR-folds the
/// per-chunk hashes.
///
/// The chunk ordinal is written into each chunk hash so that repeated
/// chunks do not cancel each other out.
pub(crate) struct ChunkedHasher<'a, H: BuildHasher> {
  build: &'a H,
  chunk: [u8; HASH_CHUNK_SIZE],
  filled: usize,
  chunks: u64,
  folded: u64,
}

impl<'a, H: BuildHasher> ChunkedHasher<'a, H> {
  pub(crate) fn new(build: &'a H) -> Self {
    Self {
      build,
      chunk: [0; HASH_CHUNK_SIZE],
      filled: 0,
      chunks: 0,
      folded: 0,
    }
  }

  fn flush_chunk(&mut self) {
    let mut state = self.build.build_hasher();
    state.write_u64(self.chunks);
    state.write(&self.chunk[..self.filled]);
    self.folded ^= state.finish();
    self.chunks += 1;
    self.filled = 0;
  }
}

impl<'a, H: BuildHasher> Hasher for ChunkedHasher<'a, H> {
  fn write(&mut self, mut bytes: &[u8]) {
    while !bytes.is_empty() {
      let room = HASH_CHUNK_SIZE - self.filled;
      let take = room.min(bytes.len());
      self.chunk[self.filled..self.filled + take].copy_from_slice(&bytes[..take]);
      self.filled += take;
      bytes = &bytes[take..];
      if self.filled == HASH_CHUNK_SIZE {
        self.flush_chunk();
      }
    }
  }

  fn finish(&self) -> u64 {
    if self.filled == 0 && self.chunks > 0 {
      return self.folded;
    }
    // Fold in the partial tail without mutating the hasher.
    let mut state = self.build.build_hasher();
    state.write_u64(self.chunks);
    state.write(&self.chunk[..self.filled]);
    self.folded ^ state.finish()
  }
}

/// Computes the chunked content hash of a key.
#[inline]
pub(crate) fn hash_key<Q: Hash + ?Sized, H: BuildHasher>(build: &H, key: &Q) -> u64 {
  let mut state = ChunkedHasher::new(build);
  key.hash(&mut state);
  state.finish()
}

/// Jump consistent hash (Lamping & Veach): maps `key` onto `[0, buckets)`.
///
/// Runs in O(log buckets) with no lookup table, and when the bucket count
/// grows only `1/buckets` of the keys move.
#[inline]
pub(crate) fn jump_hash(mut key: u64, buckets: usize) -> usize {
  debug_assert!(buckets > 0);
  let mut b: i64 = -1;
  let mut j: i64 = 0;
  while j < buckets as i64 {
    b = j;
    key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
    j = ((b + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
  }
  b as usize
}
