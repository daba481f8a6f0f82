//! Chunk codec for payloads larger than the transport message limit
//!
//! An oversized payload is split into an ordered group of chunks sharing one
//! `MessageId`. Every chunk travels as its own session event and consumes its
//! own sequence number, so a group always occupies a contiguous run of the
//! sequence space. The final chunk carries a CRC-32 of the whole payload.
//!
//! The codec is stateless: `decode(encode(b, n)) == b` for every payload `b`
//! and every `n > 0`, including the empty payload (one empty chunk).

use serde::{Deserialize, Serialize};

use crate::errors::ChunkError;
use crate::types::MessageId;

// ----------------------------------------------------------------------------
// Chunk Header
// ----------------------------------------------------------------------------

/// Position of a chunk inside its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Identifier shared by every chunk of the group
    pub message_id: MessageId,
    /// Zero-based position in the group
    pub index: u32,
    /// Number of chunks in the group
    pub total: u32,
    /// CRC-32 of the reassembled payload, present on the final chunk only
    pub checksum: Option<u32>,
}

impl ChunkInfo {
    /// Check if this is the final chunk of its group
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// One piece of a split payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub info: ChunkInfo,
    pub data: Vec<u8>,
}

// ----------------------------------------------------------------------------
// Codec
// ----------------------------------------------------------------------------

/// Splits and reassembles payloads against a maximum chunk size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkCodec {
    max_chunk_size: usize,
}

impl ChunkCodec {
    /// Create a codec; a zero chunk size cannot make progress and is rejected
    pub fn new(max_chunk_size: usize) -> Result<Self, ChunkError> {
        if max_chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize {
                max_size: max_chunk_size,
            });
        }
        Ok(Self { max_chunk_size })
    }

    /// Maximum payload bytes per chunk
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Check if a payload of this size must be split
    pub fn needs_chunking(&self, payload_len: usize) -> bool {
        payload_len > self.max_chunk_size
    }

    /// Number of chunks `encode` produces for a payload of this size
    pub fn chunk_count(&self, payload_len: usize) -> usize {
        payload_len.div_ceil(self.max_chunk_size).max(1)
    }

    /// Split a payload under a freshly generated message identifier
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<Chunk>, ChunkError> {
        self.encode_with_id(MessageId::new(), payload)
    }

    /// Split a payload under the given message identifier
    pub fn encode_with_id(
        &self,
        message_id: MessageId,
        payload: &[u8],
    ) -> Result<Vec<Chunk>, ChunkError> {
        let count = self.chunk_count(payload.len());
        let total = u32::try_from(count).map_err(|_| ChunkError::TooManyChunks { count })?;
        let checksum = crc32fast::hash(payload);

        if payload.is_empty() {
            return Ok(vec![Chunk {
                info: ChunkInfo {
                    message_id,
                    index: 0,
                    total: 1,
                    checksum: Some(checksum),
                },
                data: Vec::new(),
            }]);
        }

        let chunks = payload
            .chunks(self.max_chunk_size)
            .enumerate()
            .map(|(i, data)| {
                let index = i as u32;
                Chunk {
                    info: ChunkInfo {
                        message_id,
                        index,
                        total,
                        checksum: (index + 1 == total).then_some(checksum),
                    },
                    data: data.to_vec(),
                }
            })
            .collect();

        Ok(chunks)
    }

    /// Reassemble an ordered, complete chunk group
    pub fn decode(chunks: &[Chunk]) -> Result<Vec<u8>, ChunkError> {
        let first = chunks.first().ok_or(ChunkError::EmptyGroup)?;
        let message_id = first.info.message_id;
        let total = first.info.total;

        let actual = u32::try_from(chunks.len()).map_err(|_| ChunkError::TooManyChunks {
            count: chunks.len(),
        })?;
        if actual != total {
            return Err(ChunkError::TotalMismatch {
                expected: total,
                actual,
            });
        }

        let mut reassembled = Vec::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
        for (i, chunk) in chunks.iter().enumerate() {
            if chunk.info.message_id != message_id {
                return Err(ChunkError::MessageIdMismatch {
                    expected: message_id,
                    actual: chunk.info.message_id,
                });
            }
            if chunk.info.index != i as u32 {
                return Err(ChunkError::IndexOutOfOrder {
                    expected: i as u32,
                    actual: chunk.info.index,
                });
            }
            if chunk.info.total != total {
                return Err(ChunkError::TotalMismatch {
                    expected: total,
                    actual: chunk.info.total,
                });
            }
            reassembled.extend_from_slice(&chunk.data);
        }

        let expected = chunks
            .last()
            .and_then(|c| c.info.checksum)
            .ok_or(ChunkError::MissingChecksum)?;
        let actual = crc32fast::hash(&reassembled);
        if expected != actual {
            return Err(ChunkError::ChecksumMismatch { expected, actual });
        }

        Ok(reassembled)
    }
}

/// Split `payload` into chunks of at most `max_size` bytes
pub fn encode(payload: &[u8], max_size: usize) -> Result<Vec<Chunk>, ChunkError> {
    ChunkCodec::new(max_size)?.encode(payload)
}

/// Reassemble an ordered chunk group produced by `encode`
pub fn decode(chunks: &[Chunk]) -> Result<Vec<u8>, ChunkError> {
    ChunkCodec::decode(chunks)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_chunk_size_rejected() {
        assert_eq!(
            ChunkCodec::new(0),
            Err(ChunkError::InvalidChunkSize { max_size: 0 })
        );
    }

    #[test]
    fn test_payload_split_into_ordered_group() {
        let codec = ChunkCodec::new(100).unwrap();
        let data = vec![7u8; 250];

        let chunks = codec.encode(&data).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(codec.chunk_count(data.len()), 3);
        assert_eq!(codec.chunk_count(0), 1);

        let message_id = chunks[0].info.message_id;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.info.message_id, message_id);
            assert_eq!(chunk.info.index, i as u32);
            assert_eq!(chunk.info.total, 3);
        }
        assert_eq!(chunks[0].data.len(), 100);
        assert_eq!(chunks[2].data.len(), 50);
        assert!(chunks[0].info.checksum.is_none());
        assert_eq!(chunks[2].info.checksum, Some(crc32fast::hash(&data)));
        assert!(chunks[2].info.is_last());

        assert_eq!(decode(&chunks).unwrap(), data);
    }

    #[test]
    fn test_exact_multiple_and_small_payloads() {
        let codec = ChunkCodec::new(4).unwrap();
        assert_eq!(codec.encode(b"abcdefgh").unwrap().len(), 2);
        assert_eq!(codec.encode(b"abc").unwrap().len(), 1);
        assert!(!codec.needs_chunking(4));
        assert!(codec.needs_chunking(5));
    }

    #[test]
    fn test_empty_payload_is_one_empty_chunk() {
        let chunks = encode(&[], 16).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
        assert_eq!(decode(&chunks).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_rejects_malformed_groups() {
        let codec = ChunkCodec::new(2).unwrap();
        let chunks = codec
            .encode_with_id(MessageId::from_u128(1), b"abcdef")
            .unwrap();

        assert_eq!(decode(&[]), Err(ChunkError::EmptyGroup));

        assert_eq!(
            decode(&chunks[..2]),
            Err(ChunkError::TotalMismatch {
                expected: 3,
                actual: 2
            })
        );

        let swapped = vec![chunks[1].clone(), chunks[0].clone(), chunks[2].clone()];
        assert_eq!(
            decode(&swapped),
            Err(ChunkError::IndexOutOfOrder {
                expected: 0,
                actual: 1
            })
        );

        let mut foreign = chunks.clone();
        foreign[1].info.message_id = MessageId::from_u128(2);
        assert!(matches!(
            decode(&foreign),
            Err(ChunkError::MessageIdMismatch { .. })
        ));

        let mut corrupted = chunks.clone();
        corrupted[0].data[0] ^= 0xFF;
        assert!(matches!(
            decode(&corrupted),
            Err(ChunkError::ChecksumMismatch { .. })
        ));

        let mut unsigned = chunks;
        unsigned[2].info.checksum = None;
        assert_eq!(decode(&unsigned), Err(ChunkError::MissingChecksum));
    }
}
