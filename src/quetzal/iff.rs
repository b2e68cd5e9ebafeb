//! IFF (Interchange File Format) framing: a `FORM` header wrapping big-endian-length-prefixed
//! chunks, each padded to an even byte count.
//!
//! Grounded on the source lineage's `quetzal/iff.rs`, with `write_to_file`/`read_from_file`
//! replaced by `to_bytes`/`from_bytes` operating on an in-memory buffer.

use crate::error::{GameError, Result};

pub struct IffChunk {
    pub chunk_type: [u8; 4],
    pub data: Vec<u8>,
}

pub struct IffFile {
    pub form_type: [u8; 4],
    pub chunks: Vec<IffChunk>,
}

impl IffFile {
    pub fn new(form_type: [u8; 4]) -> IffFile {
        IffFile {
            form_type,
            chunks: Vec::new(),
        }
    }

    pub fn add_chunk(&mut self, chunk_type: [u8; 4], data: Vec<u8>) {
        self.chunks.push(IffChunk { chunk_type, data });
    }

    pub fn find_chunk(&self, chunk_type: &[u8; 4]) -> Option<&IffChunk> {
        self.chunks.iter().find(|c| &c.chunk_type == chunk_type)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let total_size = 4
            + self
                .chunks
                .iter()
                .map(|c| 8 + c.data.len() + (c.data.len() % 2))
                .sum::<usize>();

        let mut bytes = Vec::with_capacity(8 + total_size);
        bytes.extend_from_slice(b"FORM");
        bytes.extend_from_slice(&(total_size as u32).to_be_bytes());
        bytes.extend_from_slice(&self.form_type);

        for chunk in &self.chunks {
            bytes.extend_from_slice(&chunk.chunk_type);
            bytes.extend_from_slice(&(chunk.data.len() as u32).to_be_bytes());
            bytes.extend_from_slice(&chunk.data);
            if chunk.data.len() % 2 == 1 {
                bytes.push(0);
            }
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<IffFile> {
        if bytes.len() < 12 || &bytes[0..4] != b"FORM" {
            return Err(GameError::MalformedImage(
                "save data is missing the IFF FORM header".into(),
            ));
        }
        let mut form_type = [0u8; 4];
        form_type.copy_from_slice(&bytes[8..12]);
        let mut iff = IffFile::new(form_type);

        let mut offset = 12;
        while offset + 8 <= bytes.len() {
            let mut chunk_type = [0u8; 4];
            chunk_type.copy_from_slice(&bytes[offset..offset + 4]);
            let chunk_size = u32::from_be_bytes(bytes[offset + 4..offset + 8].try_into().unwrap())
                as usize;
            offset += 8;
            if offset + chunk_size > bytes.len() {
                return Err(GameError::MalformedImage(format!(
                    "IFF chunk {:?} claims {chunk_size} bytes past end of buffer",
                    String::from_utf8_lossy(&chunk_type)
                )));
            }
            let data = bytes[offset..offset + chunk_size].to_vec();
            offset += chunk_size;
            if chunk_size % 2 == 1 {
                offset += 1;
            }
            iff.chunks.push(IffChunk { chunk_type, data });
        }
        Ok(iff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut iff = IffFile::new(*b"IFZS");
        iff.add_chunk(*b"IFhd", vec![1, 2, 3]);
        iff.add_chunk(*b"Stks", vec![4, 5, 6, 7]);
        let bytes = iff.to_bytes();
        let parsed = IffFile::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.form_type, *b"IFZS");
        assert_eq!(parsed.find_chunk(b"IFhd").unwrap().data, vec![1, 2, 3]);
        assert_eq!(parsed.find_chunk(b"Stks").unwrap().data, vec![4, 5, 6, 7]);
    }

    #[test]
    fn odd_length_chunk_is_padded() {
        let mut iff = IffFile::new(*b"IFZS");
        iff.add_chunk(*b"IFhd", vec![1, 2, 3]);
        let bytes = iff.to_bytes();
        // chunk type(4) + size(4) + data(3) + pad(1) = 12, plus the 12-byte FORM preamble.
        assert_eq!(bytes.len(), 24);
    }

    #[test]
    fn missing_form_header_is_rejected() {
        assert!(IffFile::from_bytes(&[0u8; 4]).is_err());
    }
}
