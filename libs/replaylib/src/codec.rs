//! Per-frame compression
//!
//! Raw BGRA frames are far too large to retain for a full replay window, so
//! every frame is compressed to a bounded JPEG blob on insert and
//! decompressed back on extraction. JPEG streams terminate in an EOI marker
//! (`FF D9`), which is what lets a variable-length blob be recovered from a
//! fixed-stride disk slot without a separate length field.

use std::io::Cursor;

use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{ColorType, ExtendedColorType, ImageDecoder, ImageEncoder};

use crate::error::CodecError;

/// JPEG end-of-image marker.
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Fixed framing overhead of a baseline JPEG stream: SOI/APP0 segments,
/// quantization and Huffman tables, SOF/SOS headers. Independent of the
/// pixel payload, so the per-frame size bound must carry it on top of the
/// entropy-coded bytes.
pub const CODEC_OVERHEAD_BYTES: usize = 2048;

/// Per-frame BGRA codec.
///
/// One instance is meant to live per thread: methods take `&mut self` and
/// reuse an internal RGB scratch buffer, and `Clone` produces an
/// independent instance with its own scratch.
pub struct CodecCtx {
    width: u32,
    height: u32,
    quality: u8,
    rgb_scratch: Vec<u8>,
}

impl CodecCtx {
    /// Create a codec for frames of `width x height` BGRA pixels.
    ///
    /// `quality` is the JPEG quality factor, clamped to 1..=100.
    pub fn new(width: u32, height: u32, quality: u8) -> Self {
        Self {
            width,
            height,
            quality: quality.clamp(1, 100),
            rgb_scratch: vec![0u8; width as usize * height as usize * 3],
        }
    }

    /// Bytes in one raw frame.
    pub fn frame_size(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Hard upper bound on the compressed blob length.
    pub fn max_compressed_size(&self) -> usize {
        self.width as usize * self.height as usize * 3 / 2 + CODEC_OVERHEAD_BYTES
    }

    /// Compress a raw BGRA frame into `dst`.
    ///
    /// `dst` is cleared first. Fails with `SizeMismatch` if `raw` is not
    /// exactly one frame or the blob would exceed [`max_compressed_size`].
    ///
    /// [`max_compressed_size`]: CodecCtx::max_compressed_size
    pub fn compress(&mut self, raw: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        if raw.len() != self.frame_size() {
            return Err(CodecError::SizeMismatch {
                expected: self.frame_size(),
                actual: raw.len(),
            });
        }

        // BGRA -> RGB. Screen captures carry an opaque alpha channel; it is
        // reconstructed as 0xFF on decompression.
        for (src, dst_px) in raw.chunks_exact(4).zip(self.rgb_scratch.chunks_exact_mut(3)) {
            dst_px[0] = src[2];
            dst_px[1] = src[1];
            dst_px[2] = src[0];
        }

        dst.clear();
        let encoder = JpegEncoder::new_with_quality(&mut *dst, self.quality);
        encoder
            .write_image(
                &self.rgb_scratch,
                self.width,
                self.height,
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| CodecError::CorruptedBlob(format!("jpeg encode failed: {e}")))?;

        if dst.len() > self.max_compressed_size() {
            return Err(CodecError::SizeMismatch {
                expected: self.max_compressed_size(),
                actual: dst.len(),
            });
        }
        Ok(())
    }

    /// Decompress a blob into a caller-provided raw BGRA buffer of exactly
    /// one frame.
    pub fn decompress_into(&mut self, src: &[u8], dst: &mut [u8]) -> Result<(), CodecError> {
        if dst.len() != self.frame_size() {
            return Err(CodecError::SizeMismatch {
                expected: self.frame_size(),
                actual: dst.len(),
            });
        }

        let decoder = JpegDecoder::new(Cursor::new(src))
            .map_err(|e| CodecError::CorruptedBlob(format!("jpeg header invalid: {e}")))?;

        let (w, h) = decoder.dimensions();
        if (w, h) != (self.width, self.height) {
            return Err(CodecError::CorruptedBlob(format!(
                "frame dimensions {}x{} do not match configured {}x{}",
                w, h, self.width, self.height
            )));
        }
        if decoder.color_type() != ColorType::Rgb8 {
            return Err(CodecError::CorruptedBlob(format!(
                "unexpected color type {:?}",
                decoder.color_type()
            )));
        }

        decoder
            .read_image(&mut self.rgb_scratch)
            .map_err(|e| CodecError::CorruptedBlob(format!("jpeg decode failed: {e}")))?;

        // RGB -> BGRA with opaque alpha.
        for (src_px, dst_px) in self
            .rgb_scratch
            .chunks_exact(3)
            .zip(dst.chunks_exact_mut(4))
        {
            dst_px[0] = src_px[2];
            dst_px[1] = src_px[1];
            dst_px[2] = src_px[0];
            dst_px[3] = 0xFF;
        }
        Ok(())
    }

    /// Length of the blob at the start of `slot`, recovered by scanning for
    /// the EOI marker. Returns `None` when no marker is found within the
    /// slot. Entropy-coded JPEG data byte-stuffs `FF` as `FF 00` and the
    /// only in-stream `FF`-markers are RST0..7 (`D0..D7`), so a bare
    /// `FF D9` can only be the end of the stream.
    pub fn delimited_len(&self, slot: &[u8]) -> Option<usize> {
        let limit = slot.len().min(self.max_compressed_size());
        slot[..limit]
            .windows(2)
            .position(|w| w == EOI)
            .map(|pos| pos + EOI.len())
    }
}

impl Clone for CodecCtx {
    fn clone(&self) -> Self {
        // Fresh scratch; clones are for handing to another thread, not for
        // duplicating in-flight state.
        Self::new(self.width, self.height, self.quality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32) -> Vec<u8> {
        let mut raw = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                raw.push((x * 255 / (width - 1).max(1)) as u8); // B
                raw.push((y * 255 / (height - 1).max(1)) as u8); // G
                raw.push(128); // R
                raw.push(0xFF); // A
            }
        }
        raw
    }

    #[test]
    fn test_round_trip_preserves_frame_size() {
        let mut codec = CodecCtx::new(64, 48, 90);
        let raw = gradient_frame(64, 48);

        let mut blob = Vec::new();
        codec.compress(&raw, &mut blob).unwrap();
        assert!(!blob.is_empty());
        assert!(blob.len() <= codec.max_compressed_size());

        let mut out = vec![0u8; codec.frame_size()];
        codec.decompress_into(&blob, &mut out).unwrap();
        assert_eq!(out.len(), raw.len());
    }

    #[test]
    fn test_compress_rejects_wrong_input_size() {
        let mut codec = CodecCtx::new(16, 16, 90);
        let mut blob = Vec::new();
        let err = codec.compress(&[0u8; 100], &mut blob).unwrap_err();
        assert!(matches!(err, CodecError::SizeMismatch { .. }));
    }

    #[test]
    fn test_decompress_rejects_wrong_output_size() {
        let mut codec = CodecCtx::new(16, 16, 90);
        let raw = gradient_frame(16, 16);
        let mut blob = Vec::new();
        codec.compress(&raw, &mut blob).unwrap();

        let mut short = vec![0u8; 10];
        let err = codec.decompress_into(&blob, &mut short).unwrap_err();
        assert!(matches!(err, CodecError::SizeMismatch { .. }));
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        let mut codec = CodecCtx::new(16, 16, 90);
        let mut out = vec![0u8; codec.frame_size()];
        let err = codec
            .decompress_into(&[0xAB; 256], &mut out)
            .unwrap_err();
        assert!(matches!(err, CodecError::CorruptedBlob(_)));
    }

    #[test]
    fn test_decompress_rejects_dimension_mismatch() {
        let mut small = CodecCtx::new(16, 16, 90);
        let raw = gradient_frame(16, 16);
        let mut blob = Vec::new();
        small.compress(&raw, &mut blob).unwrap();

        let mut other = CodecCtx::new(32, 32, 90);
        let mut out = vec![0u8; other.frame_size()];
        let err = other.decompress_into(&blob, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::CorruptedBlob(_)));
    }

    #[test]
    fn test_blob_ends_with_eoi() {
        let mut codec = CodecCtx::new(32, 32, 85);
        let raw = gradient_frame(32, 32);
        let mut blob = Vec::new();
        codec.compress(&raw, &mut blob).unwrap();
        assert_eq!(&blob[blob.len() - 2..], &EOI);
    }

    #[test]
    fn test_delimited_len_recovers_blob_from_padded_slot() {
        let mut codec = CodecCtx::new(32, 32, 90);
        let raw = gradient_frame(32, 32);
        let mut blob = Vec::new();
        codec.compress(&raw, &mut blob).unwrap();

        // Simulate a fixed-stride disk slot: blob followed by stale bytes
        // that deliberately avoid forming an earlier EOI.
        let mut slot = blob.clone();
        slot.resize(codec.max_compressed_size(), 0x00);

        let len = codec.delimited_len(&slot).unwrap();
        assert_eq!(len, blob.len());

        let mut out = vec![0u8; codec.frame_size()];
        codec.decompress_into(&slot[..len], &mut out).unwrap();
    }

    #[test]
    fn test_delimited_len_none_without_marker() {
        let codec = CodecCtx::new(16, 16, 90);
        let slot = vec![0u8; 512];
        assert!(codec.delimited_len(&slot).is_none());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut codec = CodecCtx::new(16, 16, 75);
        let raw = gradient_frame(16, 16);
        let mut blob_a = Vec::new();
        codec.compress(&raw, &mut blob_a).unwrap();

        let mut clone = codec.clone();
        let mut blob_b = Vec::new();
        clone.compress(&raw, &mut blob_b).unwrap();
        assert_eq!(blob_a, blob_b);
    }

    #[test]
    fn test_lossy_round_trip_is_close() {
        let mut codec = CodecCtx::new(32, 32, 95);
        let raw = gradient_frame(32, 32);
        let mut blob = Vec::new();
        codec.compress(&raw, &mut blob).unwrap();

        let mut out = vec![0u8; codec.frame_size()];
        codec.decompress_into(&blob, &mut out).unwrap();

        // JPEG is lossy but a smooth gradient at quality 95 stays close.
        let max_err = raw
            .chunks_exact(4)
            .zip(out.chunks_exact(4))
            .flat_map(|(a, b)| {
                (0..3).map(move |i| (a[i] as i16 - b[i] as i16).unsigned_abs())
            })
            .max()
            .unwrap();
        assert!(max_err < 64, "max channel error {max_err} too large");
        // Alpha is reconstructed opaque.
        assert!(out.chunks_exact(4).all(|px| px[3] == 0xFF));
    }
}
