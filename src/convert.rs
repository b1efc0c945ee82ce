//! Half-precision float conversions
//!
//! Bit-exact conversions between `f32` and the two 16-bit float encodings
//! that appear in safetensors payloads: IEEE 754 half precision (`F16`)
//! and brain float (`BF16`). Pure bit manipulation, no allocation, no
//! failure paths.

/// Convert bfloat16 to `f32`.
///
/// A bf16 value is the upper half of an `f32` bit pattern, so widening is a
/// shift. Sign, exponent and the top 7 mantissa bits are preserved;
/// infinities and NaNs survive unchanged.
#[inline]
#[must_use]
pub fn bf16_to_f32(x: u16) -> f32 {
    f32::from_bits(u32::from(x) << 16)
}

/// Convert `f32` to bfloat16 with round-to-nearest-even.
///
/// Inf/NaN truncate to the upper 16 bits; a NaN whose payload lives only in
/// the lower 16 bits gets bit 16 forced so it stays NaN after truncation.
#[inline]
#[must_use]
pub fn f32_to_bf16(x: f32) -> u16 {
    let mut bits = x.to_bits();

    if bits & 0x7F80_0000 == 0x7F80_0000 {
        if bits & 0xFFFF != 0 {
            bits |= 0x0001_0000;
        }
    } else {
        // Round to nearest even: add half an ulp minus one, plus the
        // current lsb of the kept bits.
        bits = bits.wrapping_add(0x7FFF + ((bits >> 16) & 1));
    }

    (bits >> 16) as u16
}

/// Convert IEEE 754 half-precision (f16) to single-precision (f32).
///
/// Handles normal values, subnormals, infinities, and NaN. Exponent
/// re-biasing and denormal reconstruction use the shifted-magic-constant
/// technique, so there are no per-bit loops.
#[inline]
#[must_use]
pub fn f16_to_f32(x: u16) -> f32 {
    const SHIFTED_EXP: u32 = 0x7C00 << 13;

    let mut bits = (u32::from(x) & 0x7FFF) << 13;
    let exp = bits & SHIFTED_EXP;
    bits = bits.wrapping_add((127 - 15) << 23);

    if exp == SHIFTED_EXP {
        // Inf/NaN: push the exponent field to 255
        bits = bits.wrapping_add((128 - 16) << 23);
    } else if exp == 0 {
        // Subnormal or zero: renormalize via the magic constant
        bits = bits.wrapping_add(1 << 23);
        bits = (f32::from_bits(bits) - f32::from_bits(113 << 23)).to_bits();
    }

    f32::from_bits(bits | (u32::from(x & 0x8000) << 16))
}

/// Convert single-precision (f32) to IEEE 754 half-precision (f16) with
/// round-to-nearest-even.
///
/// Overflow saturates to ±Inf, NaN is quietened (bit 9 forced), and values
/// below the subnormal range flush to signed zero.
#[inline]
#[must_use]
pub fn f32_to_f16(x: f32) -> u16 {
    let bits = x.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xFF) as i32;
    let mant = bits & 0x007F_FFFF;

    if exp == 0 {
        // f32 subnormals are far below the half subnormal range
        return sign;
    }
    if exp == 255 {
        return if mant != 0 {
            sign | 0x7C00 | 0x200
        } else {
            sign | 0x7C00
        };
    }

    let newexp = exp - 127 + 15;
    if newexp >= 31 {
        return sign | 0x7C00;
    }

    if newexp <= 0 {
        let shift = 14 - newexp;
        if shift > 24 {
            return sign;
        }
        let m = mant | 0x0080_0000;
        #[allow(clippy::cast_possible_truncation)]
        let kept = (m >> shift) as u16;
        let dropped = m & ((1u32 << shift) - 1);
        let halfway = 1u32 << (shift - 1);
        let round_up = dropped > halfway || (dropped == halfway && kept & 1 != 0);
        return sign | (kept + u16::from(round_up));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let half = sign | ((newexp as u16) << 10) | (mant >> 13) as u16;
    let dropped = mant & 0x1FFF;
    let round_up = dropped > 0x1000 || (dropped == 0x1000 && half & 1 != 0);
    // A carry out of the mantissa lands in the exponent, which is the
    // correctly rounded result (including overflow to Inf).
    half + u16::from(round_up)
}
