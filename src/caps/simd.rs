//! SIMD span fills for the pixel buffer.
//!
//! These are only ever installed in the dispatch table after the matching
//! runtime probe succeeds, so the `target_feature` functions are safe to
//! call by construction. Rects arrive pre-clamped from the buffer.

#![allow(dead_code)] // per-arch entries; only the host arch's are installed

use crate::color::Rgba;
use crate::geometry::Rect;

#[cfg(target_arch = "x86_64")]
mod x86 {
    use std::arch::x86_64::*;

    /// Safety: caller must have verified SSE2 via `is_x86_feature_detected!`.
    #[target_feature(enable = "sse2")]
    pub unsafe fn fill_span_sse2(span: &mut [u32], color: u32) {
        let splat = _mm_set1_epi32(color as i32);
        let mut chunks = span.chunks_exact_mut(4);
        for chunk in &mut chunks {
            _mm_storeu_si128(chunk.as_mut_ptr().cast::<__m128i>(), splat);
        }
        for px in chunks.into_remainder() {
            *px = color;
        }
    }

    /// Safety: caller must have verified AVX2 via `is_x86_feature_detected!`.
    #[target_feature(enable = "avx2")]
    pub unsafe fn fill_span_avx2(span: &mut [u32], color: u32) {
        let splat = _mm256_set1_epi32(color as i32);
        let mut chunks = span.chunks_exact_mut(8);
        for chunk in &mut chunks {
            _mm256_storeu_si256(chunk.as_mut_ptr().cast::<__m256i>(), splat);
        }
        for px in chunks.into_remainder() {
            *px = color;
        }
    }
}

#[cfg(target_arch = "aarch64")]
mod arm {
    use std::arch::aarch64::*;

    /// Safety: caller must have verified NEON via `is_aarch64_feature_detected!`.
    #[target_feature(enable = "neon")]
    pub unsafe fn fill_span_neon(span: &mut [u32], color: u32) {
        let splat = vdupq_n_u32(color);
        let mut chunks = span.chunks_exact_mut(4);
        for chunk in &mut chunks {
            vst1q_u32(chunk.as_mut_ptr(), splat);
        }
        for px in chunks.into_remainder() {
            *px = color;
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub(super) fn pb_fill_sse2(pixels: &mut [Rgba], stride: u32, rect: Rect, color: Rgba) {
    for y in rect.y1..=rect.y2 {
        let row = (y as u32 * stride) as usize;
        let span = &mut pixels[row + rect.x1 as usize..=row + rect.x2 as usize];
        // Safety: only installed after the SSE2 probe passed
        unsafe { x86::fill_span_sse2(span, color) }
    }
}

#[cfg(target_arch = "x86_64")]
pub(super) fn pb_fill_avx2(pixels: &mut [Rgba], stride: u32, rect: Rect, color: Rgba) {
    for y in rect.y1..=rect.y2 {
        let row = (y as u32 * stride) as usize;
        let span = &mut pixels[row + rect.x1 as usize..=row + rect.x2 as usize];
        // Safety: only installed after the AVX2 probe passed
        unsafe { x86::fill_span_avx2(span, color) }
    }
}

#[cfg(target_arch = "aarch64")]
pub(super) fn pb_fill_neon(pixels: &mut [Rgba], stride: u32, rect: Rect, color: Rgba) {
    for y in rect.y1..=rect.y2 {
        let row = (y as u32 * stride) as usize;
        let span = &mut pixels[row + rect.x1 as usize..=row + rect.x2 as usize];
        // Safety: only installed after the NEON probe passed
        unsafe { arm::fill_span_neon(span, color) }
    }
}
