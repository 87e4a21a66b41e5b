//! SPIR-V shader loading.

use crate::error::{GpuError, Result};
use std::path::Path;

/// SPIR-V magic number (little-endian first word).
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a compiled SPIR-V binary from disk.
///
/// The pipeline expects 4-byte-aligned `u32` words, so the raw bytes are
/// re-packed instead of transmuted. Fails if the file cannot be read, is
/// not a whole number of words, or lacks the SPIR-V magic number.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| GpuError::ShaderLoad(format!("{}: {e}", path.display())))?;

    spirv_from_bytes(&bytes)
        .map_err(|reason| GpuError::ShaderLoad(format!("{}: {reason}", path.display())))
}

/// Convert raw bytes to SPIR-V words, validating shape and magic.
fn spirv_from_bytes(bytes: &[u8]) -> std::result::Result<Vec<u32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!(
            "length {} is not a multiple of 4",
            bytes.len()
        ));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(format!("bad magic number {other:#010x}")),
        None => Err("empty file".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn roundtrips_valid_words() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 42, 0, 7];
        let bytes = words_to_bytes(&words);

        assert_eq!(spirv_from_bytes(&bytes).unwrap(), words);
    }

    #[test]
    fn rejects_truncated_word() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 1]);
        bytes.pop();

        assert!(spirv_from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 1, 2]);
        assert!(spirv_from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_empty_input() {
        assert!(spirv_from_bytes(&[]).is_err());
    }

    #[test]
    fn missing_file_is_a_shader_load_error() {
        let err = load_spirv("/nonexistent/trigon/shader.spv").unwrap_err();
        assert!(matches!(err, GpuError::ShaderLoad(_)));
    }

    #[test]
    fn loads_from_disk() {
        let dir = std::env::temp_dir();
        let path = dir.join("trigon_shader_load_test.spv");
        std::fs::write(&path, words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000, 0])).unwrap();

        let words = load_spirv(&path).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words.len(), 3);

        std::fs::remove_file(&path).ok();
    }
}
