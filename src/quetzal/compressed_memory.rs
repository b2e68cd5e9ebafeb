//! XOR-RLE compression for the `CMem` chunk (standard §5): XOR current dynamic memory against
//! the original story image, then run-length-encode the resulting zero runs.
//!
//! Grounded on the source lineage's `quetzal/compressed_memory.rs`, unchanged algorithmically;
//! errors are reported through [`GameError`] instead of bare `String`s.

use crate::error::{GameError, Result};
use log::debug;

pub fn compress_memory(current: &[u8], original: &[u8]) -> Vec<u8> {
    assert_eq!(
        current.len(),
        original.len(),
        "dynamic memory size changed since load"
    );

    let mut compressed = Vec::new();
    let mut i = 0;
    while i < current.len() {
        let xor_byte = current[i] ^ original[i];
        if xor_byte == 0 {
            let start = i;
            while i < current.len() && (current[i] ^ original[i]) == 0 {
                i += 1;
            }
            let mut remaining = i - start;
            while remaining > 256 {
                compressed.push(0);
                compressed.push(255);
                remaining -= 256;
            }
            if remaining > 0 {
                compressed.push(0);
                compressed.push((remaining - 1) as u8);
            }
        } else {
            compressed.push(xor_byte);
            i += 1;
        }
    }
    debug!(
        "compressed {} bytes of dynamic memory to {} bytes",
        current.len(),
        compressed.len()
    );
    compressed
}

pub fn decompress_memory(compressed: &[u8], original: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(original.len());
    let mut ci = 0;
    let mut oi = 0;

    while ci < compressed.len() && oi < original.len() {
        let byte = compressed[ci];
        ci += 1;
        if byte == 0 {
            if ci >= compressed.len() {
                return Err(GameError::MalformedImage(
                    "CMem chunk ends mid run-length sequence".into(),
                ));
            }
            let run_length = compressed[ci] as usize + 1;
            ci += 1;
            for _ in 0..run_length {
                if oi >= original.len() {
                    return Err(GameError::MalformedImage(
                        "CMem run-length run extends past dynamic memory".into(),
                    ));
                }
                decompressed.push(original[oi]);
                oi += 1;
            }
        } else {
            if oi >= original.len() {
                return Err(GameError::MalformedImage(
                    "CMem chunk extends past dynamic memory".into(),
                ));
            }
            decompressed.push(original[oi] ^ byte);
            oi += 1;
        }
    }
    while oi < original.len() {
        decompressed.push(original[oi]);
        oi += 1;
    }

    if decompressed.len() != original.len() {
        return Err(GameError::MalformedImage(format!(
            "CMem chunk decompressed to {} bytes, expected {}",
            decompressed.len(),
            original.len()
        )));
    }
    Ok(decompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_change() {
        let original = vec![0x10, 0x20, 0x30, 0x40, 0x50, 0x60, 0x70, 0x80];
        let mut current = original.clone();
        current[1] = 0x21;
        current[6] = 0x71;

        let compressed = compress_memory(&current, &original);
        let restored = decompress_memory(&compressed, &original).unwrap();
        assert_eq!(current, restored);
    }

    #[test]
    fn long_runs_of_unchanged_memory_compress_well() {
        let original = vec![0xFFu8; 1000];
        let mut current = original.clone();
        current[500] = 0xFE;

        let compressed = compress_memory(&current, &original);
        assert!(compressed.len() < current.len());
        assert_eq!(decompress_memory(&compressed, &original).unwrap(), current);
    }
}
