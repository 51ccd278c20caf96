//! Streaming content digests
//!
//! Files are read in bounded chunks so that hashing never buffers a whole
//! file. Digests are BLAKE3, rendered as lowercase hex.

use std::path::Path;
use tokio::io::AsyncReadExt;

/// Default read size when hashing local files
pub const HASH_CHUNK_SIZE: usize = 65536;

/// Incremental digest over a byte stream
pub struct ContentHasher {
	hasher: blake3::Hasher,
	bytes: u64,
}

impl ContentHasher {
	pub fn new() -> Self {
		ContentHasher { hasher: blake3::Hasher::new(), bytes: 0 }
	}

	pub fn update(&mut self, data: &[u8]) {
		self.hasher.update(data);
		self.bytes += data.len() as u64;
	}

	/// Number of bytes fed so far
	pub fn bytes(&self) -> u64 {
		self.bytes
	}

	pub fn finalize(&self) -> String {
		self.hasher.finalize().to_hex().to_string()
	}
}

impl Default for ContentHasher {
	fn default() -> Self {
		Self::new()
	}
}

/// Digest of an in-memory buffer
pub fn hash_bytes(data: &[u8]) -> String {
	blake3::hash(data).to_hex().to_string()
}

/// Digest of a file, read `chunk_size` bytes at a time
pub async fn hash_file(path: &Path, chunk_size: usize) -> std::io::Result<String> {
	let mut file = tokio::fs::File::open(path).await?;
	let mut buf = vec![0u8; chunk_size.max(1)];
	let mut hasher = ContentHasher::new();
	loop {
		let n = file.read(&mut buf).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buf[..n]);
	}
	Ok(hasher.finalize())
}


// vim: ts=4
