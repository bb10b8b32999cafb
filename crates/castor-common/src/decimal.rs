//! Arbitrary-precision `xsd:decimal` arithmetic.
//!
//! A decimal is a sign, an unscaled digit string and a scale (count of
//! fractional digits). Division keeps [`DIV_SCALE`] fractional digits.

use std::cmp::Ordering;
use std::fmt;

/// Fractional digits kept by division.
const DIV_SCALE: usize = 18;

/// An `xsd:decimal` value.
#[derive(Debug, Clone, Default)]
pub struct XsdDecimal {
    /// True for values strictly below zero.
    neg: bool,
    /// Unscaled digits, least significant first. Empty means zero.
    digits: Vec<u8>,
    /// Number of fractional digits.
    scale: usize,
}

impl XsdDecimal {
    /// Zero.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Decimal from a 64-bit integer.
    pub fn from_i64(mut v: i64) -> Self {
        let neg = v < 0;
        let mut digits = Vec::new();
        while v != 0 {
            digits.push((v % 10).unsigned_abs() as u8);
            v /= 10;
        }
        Self {
            neg,
            digits,
            scale: 0,
        }
        .normalized()
    }

    /// Parse the lexical form `[+-]? digits ('.' digits)?`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (neg, rest) = match s.as_bytes().first()? {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = match rest.split_once('.') {
            Some((i, f)) => (i, f),
            None => (rest, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let mut digits = Vec::with_capacity(int_part.len() + frac_part.len());
        for b in frac_part.bytes().rev().chain(int_part.bytes().rev()) {
            digits.push(b - b'0');
        }
        Some(
            Self {
                neg,
                digits,
                scale: frac_part.len(),
            }
            .normalized(),
        )
    }

    fn normalized(mut self) -> Self {
        while self.digits.last() == Some(&0) {
            self.digits.pop();
        }
        // drop trailing fractional zeros
        let mut drop = 0;
        while drop < self.scale && self.digits.get(drop) == Some(&0) {
            drop += 1;
        }
        if drop > 0 && self.digits.len() >= drop {
            self.digits.drain(..drop);
            self.scale -= drop;
        }
        if self.digits.is_empty() {
            self.neg = false;
            self.scale = 0;
        }
        self
    }

    /// Whether the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// Whether the value is strictly negative.
    pub fn is_negative(&self) -> bool {
        self.neg && !self.is_zero()
    }

    /// Negation.
    pub fn negate(&self) -> Self {
        let mut r = self.clone();
        if !r.is_zero() {
            r.neg = !r.neg;
        }
        r
    }

    /// Exact comparison.
    pub fn compare(&self, o: &XsdDecimal) -> Ordering {
        match (self.is_negative(), o.is_negative()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let mag = cmp_aligned(self, o);
        if self.is_negative() {
            mag.reverse()
        } else {
            mag
        }
    }

    /// Sum.
    pub fn add(&self, o: &XsdDecimal) -> Self {
        let scale = self.scale.max(o.scale);
        let a = scaled_digits(self, scale);
        let b = scaled_digits(o, scale);
        let (neg, digits) = if self.neg == o.neg {
            (self.neg, add_digits(&a, &b))
        } else {
            match cmp_digits(&a, &b) {
                Ordering::Less => (o.neg, sub_digits(&b, &a)),
                Ordering::Greater => (self.neg, sub_digits(&a, &b)),
                Ordering::Equal => (false, Vec::new()),
            }
        };
        Self { neg, digits, scale }.normalized()
    }

    /// Difference.
    pub fn sub(&self, o: &XsdDecimal) -> Self {
        self.add(&o.negate())
    }

    /// Product.
    pub fn mul(&self, o: &XsdDecimal) -> Self {
        Self {
            neg: self.neg != o.neg,
            digits: mul_digits(&self.digits, &o.digits),
            scale: self.scale + o.scale,
        }
        .normalized()
    }

    /// Quotient with [`DIV_SCALE`] fractional digits (truncated). Returns
    /// `None` on division by zero.
    pub fn div(&self, o: &XsdDecimal) -> Option<Self> {
        if o.is_zero() {
            return None;
        }
        // scale the dividend so the integer quotient carries DIV_SCALE
        // fractional digits
        let shift = DIV_SCALE + o.scale;
        let mut a = vec![0u8; shift];
        a.extend_from_slice(&self.digits);
        let q = div_digits(&a, &o.digits);
        Some(
            Self {
                neg: self.neg != o.neg,
                digits: q,
                scale: DIV_SCALE + self.scale,
            }
            .normalized(),
        )
    }

    /// Largest integer not greater than this value.
    pub fn floor(&self) -> Self {
        if self.scale == 0 {
            return self.clone();
        }
        let mut int_digits: Vec<u8> = self.digits.get(self.scale..).unwrap_or(&[]).to_vec();
        let has_fraction = self.digits.iter().take(self.scale).any(|&d| d != 0);
        let mut r = Self {
            neg: self.neg,
            digits: std::mem::take(&mut int_digits),
            scale: 0,
        }
        .normalized();
        if self.is_negative() && has_fraction {
            r = r.sub(&Self::from_i64(1));
        }
        r
    }

    /// Floor as an `i64`, or `None` if out of range.
    pub fn floor_i64(&self) -> Option<i64> {
        let f = self.floor();
        let mut v: i64 = 0;
        for &d in f.digits.iter().rev() {
            v = v.checked_mul(10)?.checked_add(i64::from(d))?;
        }
        if f.neg {
            v = -v;
        }
        Some(v)
    }

    /// Closest `f64`.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(0.0)
    }
}

impl PartialEq for XsdDecimal {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}
impl Eq for XsdDecimal {}

impl fmt::Display for XsdDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        if self.neg {
            f.write_str("-")?;
        }
        let n = self.digits.len();
        if self.scale >= n {
            f.write_str("0.")?;
            for _ in 0..self.scale - n {
                f.write_str("0")?;
            }
            for &d in self.digits.iter().rev() {
                write!(f, "{}", d)?;
            }
            Ok(())
        } else {
            for (i, &d) in self.digits.iter().enumerate().rev() {
                write!(f, "{}", d)?;
                if self.scale > 0 && i == self.scale {
                    f.write_str(".")?;
                }
            }
            Ok(())
        }
    }
}

/// Digits of `d` rescaled (padded with fractional zeros) to `scale`.
fn scaled_digits(d: &XsdDecimal, scale: usize) -> Vec<u8> {
    let pad = scale - d.scale;
    let mut out = vec![0u8; pad];
    out.extend_from_slice(&d.digits);
    out
}

fn cmp_aligned(a: &XsdDecimal, b: &XsdDecimal) -> Ordering {
    let scale = a.scale.max(b.scale);
    cmp_digits(&scaled_digits(a, scale), &scaled_digits(b, scale))
}

fn cmp_digits(a: &[u8], b: &[u8]) -> Ordering {
    let la = a.iter().rposition(|&d| d != 0).map_or(0, |p| p + 1);
    let lb = b.iter().rposition(|&d| d != 0).map_or(0, |p| p + 1);
    if la != lb {
        return la.cmp(&lb);
    }
    for i in (0..la).rev() {
        if a[i] != b[i] {
            return a[i].cmp(&b[i]);
        }
    }
    Ordering::Equal
}

fn add_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len().max(b.len()) + 1);
    let mut carry = 0u8;
    for i in 0..a.len().max(b.len()) {
        let s = a.get(i).copied().unwrap_or(0) + b.get(i).copied().unwrap_or(0) + carry;
        out.push(s % 10);
        carry = s / 10;
    }
    if carry > 0 {
        out.push(carry);
    }
    out
}

/// `a - b`, requires `a >= b`.
fn sub_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = 0i8;
    for i in 0..a.len() {
        let mut d = a[i] as i8 - b.get(i).copied().unwrap_or(0) as i8 - borrow;
        if d < 0 {
            d += 10;
            borrow = 1;
        } else {
            borrow = 0;
        }
        out.push(d as u8);
    }
    out
}

fn mul_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u32; a.len() + b.len()];
    for (i, &da) in a.iter().enumerate() {
        for (j, &db) in b.iter().enumerate() {
            out[i + j] += u32::from(da) * u32::from(db);
        }
    }
    let mut carry = 0u32;
    let mut digits = Vec::with_capacity(out.len());
    for v in out {
        let s = v + carry;
        digits.push((s % 10) as u8);
        carry = s / 10;
    }
    while carry > 0 {
        digits.push((carry % 10) as u8);
        carry /= 10;
    }
    digits
}

/// Integer quotient `a / b` on digit vectors, truncated. `b` non-zero.
fn div_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut quotient = vec![0u8; a.len()];
    let mut rem: Vec<u8> = Vec::new();
    for i in (0..a.len()).rev() {
        rem.insert(0, a[i]);
        while rem.last() == Some(&0) {
            rem.pop();
        }
        let mut q = 0u8;
        while cmp_digits(&rem, b) != Ordering::Less {
            rem = sub_digits(&rem, b);
            while rem.last() == Some(&0) {
                rem.pop();
            }
            q += 1;
        }
        quotient[i] = q;
    }
    quotient
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> XsdDecimal {
        XsdDecimal::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(dec("3.14").to_string(), "3.14");
        assert_eq!(dec("-0.5").to_string(), "-0.5");
        assert_eq!(dec("007").to_string(), "7");
        assert_eq!(dec("2.500").to_string(), "2.5");
        assert_eq!(dec("0.0").to_string(), "0");
        assert!(XsdDecimal::parse("abc").is_none());
    }

    #[test]
    fn test_compare() {
        assert_eq!(dec("1.5").compare(&dec("1.50")), Ordering::Equal);
        assert_eq!(dec("-2").compare(&dec("1")), Ordering::Less);
        assert_eq!(dec("10.1").compare(&dec("10.09")), Ordering::Greater);
        assert_eq!(dec("-3.5").compare(&dec("-3.4")), Ordering::Less);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(dec("1.5").add(&dec("2.25")).to_string(), "3.75");
        assert_eq!(dec("1.5").sub(&dec("2.25")).to_string(), "-0.75");
        assert_eq!(dec("1.5").mul(&dec("-2")).to_string(), "-3");
        assert_eq!(dec("1").div(&dec("4")).unwrap().to_string(), "0.25");
        assert!(dec("1").div(&dec("0")).is_none());
    }

    #[test]
    fn test_floor() {
        assert_eq!(dec("2.7").floor_i64(), Some(2));
        assert_eq!(dec("-2.7").floor_i64(), Some(-3));
        assert_eq!(dec("-2.0").floor_i64(), Some(-2));
        assert_eq!(dec("5").floor_i64(), Some(5));
    }

    #[test]
    fn test_from_i64_round_trip() {
        assert_eq!(XsdDecimal::from_i64(-12045).to_string(), "-12045");
        assert_eq!(XsdDecimal::from_i64(0).to_string(), "0");
    }

    #[test]
    fn test_zero_handling() {
        assert!(dec("0.000").is_zero());
        assert!(!dec("0.000").is_negative());
        assert_eq!(dec("-0").compare(&dec("0")), Ordering::Equal);
    }
}
