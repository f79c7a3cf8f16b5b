//! Hash batching for the sign command
//!
//! The card signs hashes of one size per request, and at most ten of them or 1 KiB of data,
//! whichever is less. A batch of mixed sizes is grouped by size, split into chunks and signed
//! chunk by chunk; the signatures are then put back in the caller's order.

use std::collections::BTreeMap;

use crate::{Error, Result};

const MAX_CHUNK_SIZE: usize = 10;
const MAX_CHUNK_BYTES: usize = 1024;

/// A hash with its position in the caller's batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hash {
    /// Position in the input
    pub index: usize,
    /// Hash bytes
    pub data: Vec<u8>,
}

/// Hashes of one size sent in a single sign request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Byte length of every hash in the chunk
    pub hash_size: usize,
    /// Hashes in input order
    pub hashes: Vec<Hash>,
}

impl Chunk {
    /// Hashes concatenated as the card expects them
    pub fn flattened(&self) -> Vec<u8> {
        self.hashes.iter().flat_map(|hash| hash.data.iter().copied()).collect()
    }
}

/// A hash and the card signature over it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHash {
    /// Position in the input
    pub index: usize,
    /// Hash bytes
    pub data: Vec<u8>,
    /// Signature
    pub signature: Vec<u8>,
}

/// Signed hashes of one chunk
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedChunk {
    /// Signed hashes
    pub signed_hashes: Vec<SignedHash>,
}

/// Number of hashes of `hash_size` bytes the card accepts in one request
pub const fn chunk_size(hash_size: usize) -> usize {
    if hash_size == 0 {
        return 1;
    }
    let by_bytes = MAX_CHUNK_BYTES / hash_size;
    let size = if by_bytes < MAX_CHUNK_SIZE { by_bytes } else { MAX_CHUNK_SIZE };
    if size == 0 { 1 } else { size }
}

/// Group hashes by size, ascending, and split each group into chunks
pub fn chunk_hashes(hashes: &[Vec<u8>]) -> Vec<Chunk> {
    let mut groups: BTreeMap<usize, Vec<Hash>> = BTreeMap::new();
    for (index, data) in hashes.iter().enumerate() {
        groups.entry(data.len()).or_default().push(Hash {
            index,
            data: data.clone(),
        });
    }

    groups
        .into_iter()
        .flat_map(|(hash_size, group)| {
            group
                .chunks(chunk_size(hash_size))
                .map(|hashes| Chunk {
                    hash_size,
                    hashes: hashes.to_vec(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Chunk cursor and signature accumulator of one sign operation
#[derive(Debug, Clone)]
pub struct ChunkedHashesContainer {
    chunks: Vec<Chunk>,
    current: usize,
    signed: Vec<SignedHash>,
    len: usize,
}

impl ChunkedHashesContainer {
    /// Split `hashes` into chunks
    ///
    /// Fails with [`Error::EmptyHashes`] when there is nothing to sign or a hash is empty.
    pub fn new(hashes: &[Vec<u8>]) -> Result<Self> {
        if hashes.is_empty() || hashes.iter().any(Vec::is_empty) {
            return Err(Error::EmptyHashes);
        }
        Ok(Self {
            chunks: chunk_hashes(hashes),
            current: 0,
            signed: Vec::with_capacity(hashes.len()),
            len: hashes.len(),
        })
    }

    /// Number of chunks
    pub fn chunks_count(&self) -> usize {
        self.chunks.len()
    }

    /// Index of the chunk to sign next
    pub const fn current_chunk_index(&self) -> usize {
        self.current
    }

    /// Chunk to sign next, `None` once every chunk is signed
    pub fn current_chunk(&self) -> Option<&Chunk> {
        self.chunks.get(self.current)
    }

    /// Whether every chunk has been signed
    pub fn is_complete(&self) -> bool {
        self.current >= self.chunks.len()
    }

    /// Record the signatures of the current chunk and advance
    pub fn add_signed_chunk(&mut self, chunk: SignedChunk) {
        self.signed.extend(chunk.signed_hashes);
        self.current += 1;
    }

    /// Signatures in the order the hashes were given
    pub fn signatures(&self) -> Result<Vec<Vec<u8>>> {
        let mut ordered: Vec<Option<&[u8]>> = vec![None; self.len];
        for hash in &self.signed {
            if let Some(slot) = ordered.get_mut(hash.index) {
                *slot = Some(hash.signature.as_slice());
            }
        }
        ordered
            .into_iter()
            .enumerate()
            .map(|(index, signature)| {
                signature
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| Error::InvalidResponse(format!("hash {index} was not signed")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(lengths: &[usize]) -> Vec<Vec<u8>> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, len)| vec![i as u8; *len])
            .collect()
    }

    fn sign_all(container: &mut ChunkedHashesContainer) {
        while let Some(chunk) = container.current_chunk() {
            let signed = SignedChunk {
                signed_hashes: chunk
                    .hashes
                    .iter()
                    .map(|hash| SignedHash {
                        index: hash.index,
                        data: hash.data.clone(),
                        signature: vec![0xA0 + hash.index as u8],
                    })
                    .collect(),
            };
            container.add_signed_chunk(signed);
        }
    }

    #[test]
    fn test_chunk_size() {
        assert_eq!(chunk_size(16), 10);
        assert_eq!(chunk_size(32), 10);
        assert_eq!(chunk_size(200), 5);
        assert_eq!(chunk_size(2048), 1);
    }

    #[test]
    fn test_groups_by_size() {
        let mut lengths = vec![16, 32, 32];
        lengths.extend([32; 9]);
        lengths.extend([16, 17, 17]);
        let chunks = chunk_hashes(&hashes(&lengths));

        let summary: Vec<(usize, Vec<usize>)> = chunks
            .iter()
            .map(|chunk| (chunk.hash_size, chunk.hashes.iter().map(|h| h.index).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (16, vec![0, 12]),
                (17, vec![13, 14]),
                (32, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]),
                (32, vec![11]),
            ]
        );
    }

    #[test]
    fn test_signatures_follow_input_order() {
        let mut container = ChunkedHashesContainer::new(&hashes(&[16, 32, 32, 17, 16])).unwrap();
        assert_eq!(container.chunks_count(), 3);
        sign_all(&mut container);

        assert!(container.is_complete());
        assert_eq!(
            container.signatures().unwrap(),
            vec![vec![0xA0], vec![0xA1], vec![0xA2], vec![0xA3], vec![0xA4]]
        );
    }

    #[test]
    fn test_unsigned_hash_is_an_error() {
        let mut container = ChunkedHashesContainer::new(&hashes(&[16, 32])).unwrap();
        container.add_signed_chunk(SignedChunk {
            signed_hashes: vec![SignedHash {
                index: 0,
                data: vec![0; 16],
                signature: vec![0x01],
            }],
        });
        assert!(matches!(container.signatures(), Err(Error::InvalidResponse(_))));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(ChunkedHashesContainer::new(&[]).unwrap_err(), Error::EmptyHashes);
        assert_eq!(
            ChunkedHashesContainer::new(&[vec![0x01], Vec::new()]).unwrap_err(),
            Error::EmptyHashes
        );
    }
}
