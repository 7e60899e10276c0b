// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Element types the accelerator operates on.
//!
//! The datapath runs either on `f32` or on `i16` fixed point. In fixed-point
//! mode every operand carries a Q value (binary point position): the real
//! value of `x` at Q `q` is `x * 2^-q`.

use std::fmt;

/// Numeric precision of one inference session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// 32-bit IEEE 754 floating point.
    #[default]
    Fp32,
    /// 16-bit fixed point with per-operand Q values.
    Int16,
}

impl Precision {
    /// Parses a precision from a config string. Accepts common aliases.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fp32" | "f32" | "float" | "float32" => Some(Self::Fp32),
            "int16" | "i16" | "fixed" | "fixed16" => Some(Self::Int16),
            _ => None,
        }
    }

    pub fn size_bytes(self) -> usize {
        match self {
            Self::Fp32 => 4,
            Self::Int16 => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fp32 => "fp32",
            Self::Int16 => "int16",
        }
    }

    pub fn is_fixed_point(self) -> bool {
        matches!(self, Self::Int16)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A datapath element plus the arithmetic the reference pipeline needs.
///
/// `Acc` is the accumulator type used between bias load and write-back.
/// For `f32` all Q arguments are ignored.
pub trait Element: Copy + Default + PartialOrd + fmt::Debug + Send + Sync + 'static {
    type Acc: Copy + Default + fmt::Debug + Send + Sync;

    const PRECISION: Precision;
    /// Value used for out-of-bounds pool window taps.
    const POOL_FLOOR: Self;

    /// Decodes one element from little-endian bytes (`PRECISION.size_bytes()` long).
    fn from_le_slice(bytes: &[u8]) -> Self;

    /// Converts a real value to this type at Q `q`, rounding and saturating.
    fn quantize(value: f32, q: i32) -> Self;
    /// Converts back to a real value at Q `q`.
    fn dequantize(self, q: i32) -> f32;
    /// Moves the binary point right by `shift` bits (divides), saturating.
    fn shift_down(self, shift: i32) -> Self;

    fn widen(self) -> Self::Acc;
    fn mul_acc(weight: Self, input: Self) -> Self::Acc;
    fn add_acc(a: Self::Acc, b: Self::Acc) -> Self::Acc;
    /// Aligns a bias stored at `from_q` to the product Q `to_q`.
    fn bias_acc(bias: Self, from_q: i32, to_q: i32) -> Self::Acc;
    /// Leaky ReLU with slope 0.1.
    fn leaky(acc: Self::Acc) -> Self::Acc;
    /// Narrows an accumulator, dropping `shift` fractional bits.
    fn narrow(acc: Self::Acc, shift: i32) -> Self;
}

impl Element for f32 {
    type Acc = f32;

    const PRECISION: Precision = Precision::Fp32;
    const POOL_FLOOR: Self = -1024.0 * 1024.0;

    fn from_le_slice(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    fn quantize(value: f32, _q: i32) -> Self {
        value
    }

    fn dequantize(self, _q: i32) -> f32 {
        self
    }

    fn shift_down(self, _shift: i32) -> Self {
        self
    }

    #[inline]
    fn widen(self) -> f32 {
        self
    }

    #[inline]
    fn mul_acc(weight: Self, input: Self) -> f32 {
        weight * input
    }

    #[inline]
    fn add_acc(a: f32, b: f32) -> f32 {
        a + b
    }

    fn bias_acc(bias: Self, _from_q: i32, _to_q: i32) -> f32 {
        bias
    }

    #[inline]
    fn leaky(acc: f32) -> f32 {
        if acc < 0.0 {
            acc * 0.1
        } else {
            acc
        }
    }

    fn narrow(acc: f32, _shift: i32) -> Self {
        acc
    }
}

/// Arithmetic right shift with round-half-up; left shift for negative `shift`.
fn shift_i64(v: i64, shift: i32) -> i64 {
    match shift {
        0 => v,
        s if s > 0 => {
            let s = s.min(62) as u32;
            (v + (1i64 << (s - 1))) >> s
        }
        s => v << (-s).min(62) as u32,
    }
}

fn saturate_i16(v: i64) -> i16 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i16
}

impl Element for i16 {
    type Acc = i64;

    const PRECISION: Precision = Precision::Int16;
    const POOL_FLOOR: Self = i16::MIN;

    fn from_le_slice(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }

    fn quantize(value: f32, q: i32) -> Self {
        let scaled = (value as f64 * 2f64.powi(q)).round();
        scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }

    fn dequantize(self, q: i32) -> f32 {
        (self as f64 * 2f64.powi(-q)) as f32
    }

    fn shift_down(self, shift: i32) -> Self {
        saturate_i16(shift_i64(self as i64, shift))
    }

    #[inline]
    fn widen(self) -> i64 {
        self as i64
    }

    #[inline]
    fn mul_acc(weight: Self, input: Self) -> i64 {
        weight as i64 * input as i64
    }

    #[inline]
    fn add_acc(a: i64, b: i64) -> i64 {
        a + b
    }

    fn bias_acc(bias: Self, from_q: i32, to_q: i32) -> i64 {
        shift_i64(bias as i64, from_q - to_q)
    }

    #[inline]
    fn leaky(acc: i64) -> i64 {
        // 0.1 as Q15
        if acc < 0 {
            (acc * 3277) >> 15
        } else {
            acc
        }
    }

    fn narrow(acc: i64, shift: i32) -> Self {
        saturate_i16(shift_i64(acc, shift))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precision_parse() {
        assert_eq!(Precision::from_str_loose("FP32"), Some(Precision::Fp32));
        assert_eq!(Precision::from_str_loose("fixed"), Some(Precision::Int16));
        assert_eq!(Precision::from_str_loose("bf16"), None);
        assert_eq!(Precision::Int16.size_bytes(), 2);
    }

    #[test]
    fn test_quantize_rounds_and_saturates() {
        assert_eq!(i16::quantize(1.5, 8), 384);
        assert_eq!(i16::quantize(-0.00390625, 8), -1);
        assert_eq!(i16::quantize(1000.0, 8), i16::MAX);
        assert_eq!(i16::quantize(-1000.0, 8), i16::MIN);
        assert_eq!(i16::dequantize(384, 8), 1.5);
    }

    #[test]
    fn test_negative_q_dequantize() {
        // q <= 0 scales up
        assert_eq!(i16::dequantize(3, -2), 12.0);
    }

    #[test]
    fn test_shift_down() {
        assert_eq!(i16::shift_down(100, 2), 25);
        assert_eq!(i16::shift_down(-7, 1), -3);
        assert_eq!(i16::shift_down(20000, -1), i16::MAX);
        assert_eq!(f32::shift_down(1.25, 3), 1.25);
    }

    #[test]
    fn test_fixed_point_mac_and_narrow() {
        // 0.5 (Q8) * 2.0 (Q8) = 1.0 at Q16, bias 0.25 (Q8) aligned to Q16
        let w = i16::quantize(0.5, 8);
        let x = i16::quantize(2.0, 8);
        let acc = i16::add_acc(i16::bias_acc(i16::quantize(0.25, 8), 8, 16), i16::mul_acc(w, x));
        let out = i16::narrow(acc, 16 - 8);
        assert_eq!(out.dequantize(8), 1.25);
    }

    #[test]
    fn test_leaky() {
        assert_eq!(f32::leaky(-2.0), -0.2);
        assert_eq!(f32::leaky(3.0), 3.0);
        assert_eq!(i16::leaky(-32768), -3277);
        assert_eq!(i16::leaky(100), 100);
    }

    #[test]
    fn test_from_le_slice() {
        assert_eq!(f32::from_le_slice(&1.5f32.to_le_bytes()), 1.5);
        assert_eq!(i16::from_le_slice(&(-2i16).to_le_bytes()), -2);
    }
}
