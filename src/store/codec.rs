//! One-page LZ4 block codec.
//!
//! The compressor is opaque to the engine: one page in, one bounded blob out.
//! Any failure makes the caller treat the page as unfreezable and leave it
//! resident, so both directions report through [`GhostError::Codec`].

use lz4_flex::block;

use crate::error::GhostError;
use crate::vm::PAGE_SIZE;

/// Upper bound on the compressed size of one page.
pub fn max_compressed_bound() -> usize {
    block::get_maximum_output_size(PAGE_SIZE)
}

/// Compress exactly one page.
pub fn compress_page(page: &[u8]) -> Result<Vec<u8>, GhostError> {
    debug_assert_eq!(page.len(), PAGE_SIZE);
    let blob = block::compress(page);
    if blob.is_empty() {
        return Err(GhostError::Codec("compressor produced no output".into()));
    }
    debug_assert!(blob.len() <= max_compressed_bound());
    Ok(blob)
}

/// Exact inverse of [`compress_page`]; anything but a full page is an error.
pub fn decompress_page(blob: &[u8]) -> Result<Vec<u8>, GhostError> {
    let page = block::decompress(blob, PAGE_SIZE).map_err(|e| GhostError::Codec(e.to_string()))?;
    if page.len() != PAGE_SIZE {
        return Err(GhostError::Codec(format!(
            "decompressed {} bytes, expected {}",
            page.len(),
            PAGE_SIZE
        )));
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_patterned_page() {
        let page: Vec<u8> = (0..PAGE_SIZE).map(|i| (i & 0xff) as u8).collect();
        let blob = compress_page(&page).unwrap();
        assert!(blob.len() <= max_compressed_bound());
        assert_eq!(decompress_page(&blob).unwrap(), page);
    }

    #[test]
    fn test_constant_page_compresses_hard() {
        let page = vec![0xaa; PAGE_SIZE];
        let blob = compress_page(&page).unwrap();
        // a constant page should collapse to a tiny fraction of its size
        assert!(blob.len() < PAGE_SIZE / 10, "blob was {} bytes", blob.len());
        assert_eq!(decompress_page(&blob).unwrap(), page);
    }

    #[test]
    fn test_roundtrip_incompressible_page() {
        // xorshift so the input has no structure LZ4 can use
        let mut state = 0x2545f4914f6cdd1du64;
        let page: Vec<u8> = (0..PAGE_SIZE)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state & 0xff) as u8
            })
            .collect();
        let blob = compress_page(&page).unwrap();
        assert!(blob.len() <= max_compressed_bound());
        assert_eq!(decompress_page(&blob).unwrap(), page);
    }

    #[test]
    fn test_garbage_blob_is_rejected() {
        assert!(decompress_page(&[0xff, 0x00, 0x12, 0x34]).is_err());
    }

    #[test]
    fn test_bound_covers_worst_case() {
        assert!(max_compressed_bound() >= PAGE_SIZE);
    }
}
