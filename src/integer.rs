//! Arbitrary-precision signed integers.
//!
//! The representation is sign-and-magnitude over little-endian 32-bit
//! limbs. The limb register is always kept at an even length (the
//! multiplier's split relies on it) and zero is canonically positive.
//! Byte-level encodings (fixed-width big-endian, two's-complement
//! signed, DER/BER) are pinned by the on-disk formats and must not
//! change.

use crate::error::{Error, ErrorKind, Result};
use crate::queue::ByteQueue;
use crate::rng::RandomSource;
use std::cmp::Ordering;
use std::fmt;

/// Sign tag. Zero is always `Positive`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    Positive,
    Negative,
}

/// How byte-level encodings interpret the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signedness {
    /// Magnitude only.
    Unsigned,
    /// Two's complement; the MSB of the leading byte carries the sign.
    Signed,
}

/// Below this limb count multiplication uses the schoolbook kernel.
const KARATSUBA_CUTOFF: usize = 24;

/// Signed multi-precision integer.
#[derive(Clone)]
pub struct Integer {
    /// Little-endian limbs; length always even, may carry high zeros.
    reg: Vec<u32>,
    sign: Sign,
}

// ---------------------------------------------------------------------
// magnitude helpers (sign-free, operate on limb slices)
// ---------------------------------------------------------------------

fn sig_limbs(reg: &[u32]) -> usize {
    let mut n = reg.len();
    while n > 0 && reg[n - 1] == 0 {
        n -= 1;
    }
    n
}

fn cmp_mag(a: &[u32], b: &[u32]) -> Ordering {
    let (an, bn) = (sig_limbs(a), sig_limbs(b));
    if an != bn {
        return an.cmp(&bn);
    }
    for i in (0..an).rev() {
        if a[i] != b[i] {
            return a[i].cmp(&b[i]);
        }
    }
    Ordering::Equal
}

fn add_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut out = Vec::with_capacity(long.len() + 1);
    let mut carry = 0u64;
    for i in 0..long.len() {
        let s = long[i] as u64 + *short.get(i).unwrap_or(&0) as u64 + carry;
        out.push(s as u32);
        carry = s >> 32;
    }
    if carry != 0 {
        out.push(carry as u32);
    }
    out
}

/// `a - b`; requires `a >= b`.
fn sub_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
    debug_assert!(cmp_mag(a, b) != Ordering::Less);
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = 0i64;
    for i in 0..a.len() {
        let d = a[i] as i64 - *b.get(i).unwrap_or(&0) as i64 - borrow;
        if d < 0 {
            out.push((d + (1i64 << 32)) as u32);
            borrow = 1;
        } else {
            out.push(d as u32);
            borrow = 0;
        }
    }
    debug_assert_eq!(borrow, 0);
    out
}

/// Column-accumulating schoolbook product (Comba style).
fn school_mul(a: &[u32], b: &[u32]) -> Vec<u32> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0u32; a.len() + b.len()];
    let mut acc: u128 = 0;
    for k in 0..out.len() {
        let lo = (k + 1).saturating_sub(b.len());
        let hi = k.min(a.len().saturating_sub(1));
        let mut i = lo;
        while i <= hi {
            acc += a[i] as u128 * b[k - i] as u128;
            i += 1;
        }
        out[k] = acc as u32;
        acc >>= 32;
    }
    debug_assert_eq!(acc, 0);
    out
}

/// Specialized squaring: doubled cross terms plus the diagonal.
fn square_mag(a: &[u32]) -> Vec<u32> {
    let n = sig_limbs(a);
    if n == 0 {
        return Vec::new();
    }
    let a = &a[..n];
    let mut out = vec![0u32; 2 * n];
    let mut acc: u128 = 0;
    for k in 0..2 * n {
        let lo = (k + 1).saturating_sub(n);
        let mut i = lo;
        // cross terms a[i]*a[k-i] with i < k-i appear twice
        while 2 * i < k {
            let j = k - i;
            if j < n {
                acc += 2 * (a[i] as u128 * a[j] as u128);
            }
            i += 1;
        }
        if k % 2 == 0 && k / 2 < n {
            acc += a[k / 2] as u128 * a[k / 2] as u128;
        }
        out[k] = acc as u32;
        acc >>= 32;
    }
    debug_assert_eq!(acc, 0);
    out
}

fn shl_limbs(a: &[u32], limbs: usize) -> Vec<u32> {
    let mut out = vec![0u32; limbs];
    out.extend_from_slice(a);
    out
}

fn mul_mag(a: &[u32], b: &[u32]) -> Vec<u32> {
    let an = sig_limbs(a);
    let bn = sig_limbs(b);
    if an == 0 || bn == 0 {
        return Vec::new();
    }
    let a = &a[..an];
    let b = &b[..bn];
    if an.min(bn) <= KARATSUBA_CUTOFF {
        return school_mul(a, b);
    }
    // Karatsuba split at half the longer operand.
    let m = an.max(bn) / 2;
    let (a0, a1) = a.split_at(m.min(an));
    let (b0, b1) = b.split_at(m.min(bn));
    let z0 = mul_mag(a0, b0);
    let z2 = mul_mag(a1, b1);
    let sa = add_mag(a0, a1);
    let sb = add_mag(b0, b1);
    let mut z1 = mul_mag(&sa, &sb);
    z1 = sub_mag(&z1, &z0);
    z1 = sub_mag(&z1, &z2);

    let mut out = add_mag(&z0, &shl_limbs(&z1, m));
    out = add_mag(&out, &shl_limbs(&z2, 2 * m));
    out
}

/// Knuth Algorithm D. Returns (quotient, remainder) of magnitudes.
fn div_rem_mag(u: &[u32], v: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let un = sig_limbs(u);
    let vn = sig_limbs(v);
    debug_assert!(vn > 0);
    if un == 0 || cmp_mag(u, v) == Ordering::Less {
        return (Vec::new(), u[..un].to_vec());
    }
    if vn == 1 {
        let (q, r) = div_rem_mag_word(&u[..un], v[0]);
        return (q, if r == 0 { Vec::new() } else { vec![r] });
    }

    // Normalize so the top divisor limb has its high bit set.
    let s = v[vn - 1].leading_zeros() as usize;
    let vnorm = shl_bits_mag(&v[..vn], s);
    let mut unorm = shl_bits_mag(&u[..un], s);
    unorm.resize(un + 1, 0); // room for the extra top limb

    let n = vn;
    let m = un - vn;
    let mut q = vec![0u32; m + 1];
    let vtop = vnorm[n - 1] as u64;
    let vnext = vnorm[n - 2] as u64;

    for j in (0..=m).rev() {
        let numer = ((unorm[j + n] as u64) << 32) | unorm[j + n - 1] as u64;
        let mut qhat = numer / vtop;
        let mut rhat = numer % vtop;
        while qhat >= 1u64 << 32
            || qhat * vnext > ((rhat << 32) | unorm[j + n - 2] as u64)
        {
            qhat -= 1;
            rhat += vtop;
            if rhat >= 1u64 << 32 {
                break;
            }
        }

        // multiply-subtract
        let mut borrow = 0i64;
        let mut carry = 0u64;
        for i in 0..n {
            let p = qhat * vnorm[i] as u64 + carry;
            carry = p >> 32;
            let d = unorm[i + j] as i64 - (p as u32) as i64 - borrow;
            if d < 0 {
                unorm[i + j] = (d + (1i64 << 32)) as u32;
                borrow = 1;
            } else {
                unorm[i + j] = d as u32;
                borrow = 0;
            }
        }
        let d = unorm[j + n] as i64 - carry as i64 - borrow;
        if d < 0 {
            unorm[j + n] = (d + (1i64 << 32)) as u32;
            // qhat was one too large: add the divisor back
            qhat -= 1;
            let mut c = 0u64;
            for i in 0..n {
                let s2 = unorm[i + j] as u64 + vnorm[i] as u64 + c;
                unorm[i + j] = s2 as u32;
                c = s2 >> 32;
            }
            unorm[j + n] = (unorm[j + n] as u64 + c) as u32;
        } else {
            unorm[j + n] = d as u32;
        }
        q[j] = qhat as u32;
    }

    let mut r = unorm[..n].to_vec();
    r = shr_bits_mag(&r, s);
    (q, r)
}

fn div_rem_mag_word(u: &[u32], d: u32) -> (Vec<u32>, u32) {
    debug_assert!(d != 0);
    let mut q = vec![0u32; u.len()];
    let mut rem = 0u64;
    for i in (0..u.len()).rev() {
        let cur = (rem << 32) | u[i] as u64;
        q[i] = (cur / d as u64) as u32;
        rem = cur % d as u64;
    }
    (q, rem as u32)
}

fn shl_bits_mag(a: &[u32], bits: usize) -> Vec<u32> {
    let n = sig_limbs(a);
    if n == 0 {
        return Vec::new();
    }
    let limb_shift = bits / 32;
    let bit_shift = bits % 32;
    let mut out = vec![0u32; n + limb_shift + 1];
    for i in 0..n {
        let v = a[i] as u64;
        let shifted = v << bit_shift;
        out[i + limb_shift] |= shifted as u32;
        out[i + limb_shift + 1] |= (shifted >> 32) as u32;
    }
    out
}

fn shr_bits_mag(a: &[u32], bits: usize) -> Vec<u32> {
    let n = sig_limbs(a);
    let limb_shift = bits / 32;
    let bit_shift = bits % 32;
    if limb_shift >= n {
        return Vec::new();
    }
    let mut out = vec![0u32; n - limb_shift];
    for i in 0..out.len() {
        let lo = a[i + limb_shift] >> bit_shift;
        let hi = if bit_shift > 0 && i + limb_shift + 1 < n {
            (a[i + limb_shift + 1] as u64) << (32 - bit_shift)
        } else {
            0
        };
        out[i] = lo | hi as u32;
    }
    out
}

// ---------------------------------------------------------------------
// Integer
// ---------------------------------------------------------------------

impl Integer {
    fn from_parts(mut reg: Vec<u32>, sign: Sign) -> Integer {
        let n = sig_limbs(&reg);
        reg.truncate(n);
        // keep the register even-length for the multiplier
        if reg.len() % 2 != 0 {
            reg.push(0);
        }
        let sign = if n == 0 { Sign::Positive } else { sign };
        Integer { reg, sign }
    }

    /// Little-endian limb view, for the modular-arithmetic kernels.
    pub(crate) fn limbs(&self) -> &[u32] {
        &self.reg
    }

    /// Assemble from little-endian limbs, normalizing as usual.
    pub(crate) fn from_limbs(reg: Vec<u32>, sign: Sign) -> Integer {
        Integer::from_parts(reg, sign)
    }

    pub fn zero() -> Integer {
        Integer {
            reg: Vec::new(),
            sign: Sign::Positive,
        }
    }

    pub fn one() -> Integer {
        Integer::from(1u32)
    }

    /// `2^n`.
    pub fn power_of_two(n: usize) -> Integer {
        let mut reg = vec![0u32; n / 32 + 1];
        reg[n / 32] = 1 << (n % 32);
        Integer::from_parts(reg, Sign::Positive)
    }

    /// Decode a big-endian byte string.
    ///
    /// With [`Signedness::Signed`], a set MSB in the first byte marks a
    /// negative two's-complement value.
    pub fn decode(buf: &[u8], signedness: Signedness) -> Integer {
        if buf.is_empty() {
            return Integer::zero();
        }
        let negative = signedness == Signedness::Signed && buf[0] & 0x80 != 0;
        let mut bytes = buf.to_vec();
        if negative {
            // two's complement back to the magnitude
            for b in bytes.iter_mut() {
                *b = !*b;
            }
            for b in bytes.iter_mut().rev() {
                let (v, carry) = b.overflowing_add(1);
                *b = v;
                if !carry {
                    break;
                }
            }
        }
        let mut reg = vec![0u32; (bytes.len() + 3) / 4];
        for (i, &b) in bytes.iter().rev().enumerate() {
            reg[i / 4] |= (b as u32) << (8 * (i % 4));
        }
        Integer::from_parts(reg, if negative { Sign::Negative } else { Sign::Positive })
    }

    /// Uniform random value in `[0, 2^bits)`.
    pub fn random(rng: &mut dyn RandomSource, bits: usize) -> Integer {
        let nbytes = (bits + 7) / 8;
        let mut bytes = vec![0u8; nbytes];
        rng.get_block(&mut bytes);
        if bits % 8 != 0 {
            bytes[0] &= (1u8 << (bits % 8)) - 1;
        }
        Integer::decode(&bytes, Signedness::Unsigned)
    }

    pub fn is_zero(&self) -> bool {
        sig_limbs(&self.reg) == 0
    }

    pub fn is_negative(&self) -> bool {
        self.sign == Sign::Negative
    }

    pub fn is_positive(&self) -> bool {
        self.sign == Sign::Positive && !self.is_zero()
    }

    pub fn is_odd(&self) -> bool {
        self.reg.first().map_or(false, |w| w & 1 == 1)
    }

    pub fn is_even(&self) -> bool {
        !self.is_odd()
    }

    /// True for 1 and -1.
    pub fn is_unit(&self) -> bool {
        sig_limbs(&self.reg) == 1 && self.reg[0] == 1
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    /// Number of significant limbs.
    pub fn word_count(&self) -> usize {
        sig_limbs(&self.reg)
    }

    /// Number of significant bytes in the magnitude.
    pub fn byte_count(&self) -> usize {
        let n = sig_limbs(&self.reg);
        if n == 0 {
            return 0;
        }
        let top = self.reg[n - 1];
        (n - 1) * 4 + (4 - top.leading_zeros() as usize / 8)
    }

    /// Number of significant bits in the magnitude.
    pub fn bit_count(&self) -> usize {
        let n = sig_limbs(&self.reg);
        if n == 0 {
            return 0;
        }
        (n - 1) * 32 + (32 - self.reg[n - 1].leading_zeros() as usize)
    }

    /// Bit `n` of the magnitude (bit 0 is least significant).
    pub fn get_bit(&self, n: usize) -> bool {
        match self.reg.get(n / 32) {
            Some(limb) => limb >> (n % 32) & 1 == 1,
            None => false,
        }
    }

    pub fn set_bit(&mut self, n: usize, value: bool) {
        if n / 32 >= self.reg.len() {
            if !value {
                return;
            }
            let mut new_len = n / 32 + 1;
            if new_len % 2 != 0 {
                new_len += 1;
            }
            self.reg.resize(new_len, 0);
        }
        if value {
            self.reg[n / 32] |= 1 << (n % 32);
        } else {
            self.reg[n / 32] &= !(1 << (n % 32));
            if self.is_zero() {
                self.sign = Sign::Positive;
            }
        }
    }

    /// Byte `n` of the magnitude (byte 0 is least significant).
    pub fn get_byte(&self, n: usize) -> u8 {
        match self.reg.get(n / 4) {
            Some(limb) => (limb >> (8 * (n % 4))) as u8,
            None => 0,
        }
    }

    pub fn set_byte(&mut self, n: usize, value: u8) {
        if n / 4 >= self.reg.len() {
            if value == 0 {
                return;
            }
            let mut new_len = n / 4 + 1;
            if new_len % 2 != 0 {
                new_len += 1;
            }
            self.reg.resize(new_len, 0);
        }
        let shift = 8 * (n % 4);
        self.reg[n / 4] = (self.reg[n / 4] & !(0xFF << shift)) | ((value as u32) << shift);
        if self.is_zero() {
            self.sign = Sign::Positive;
        }
    }

    pub fn abs(&self) -> Integer {
        Integer::from_parts(self.reg.clone(), Sign::Positive)
    }

    pub fn square(&self) -> Integer {
        Integer::from_parts(square_mag(&self.reg), Sign::Positive)
    }

    /// Floor square root. The value must be non-negative.
    pub fn sqrt(&self) -> Result<Integer> {
        if self.is_negative() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "square root of a negative integer",
            ));
        }
        if self.is_zero() {
            return Ok(Integer::zero());
        }
        // Newton iteration from a power-of-two overestimate.
        let mut x = Integer::power_of_two(self.bit_count() / 2 + 1);
        loop {
            let (div, _) = self.div_rem(&x)?;
            let next = (&x + &div) >> 1;
            if next >= x {
                return Ok(x);
            }
            x = next;
        }
    }

    pub fn is_square(&self) -> bool {
        if self.is_negative() {
            return false;
        }
        match self.sqrt() {
            Ok(r) => &r.square() == self,
            Err(_) => false,
        }
    }

    /// Euclidean division: `self == q * d + r` with `0 <= r < |d|`.
    pub fn div_rem(&self, d: &Integer) -> Result<(Integer, Integer)> {
        if d.is_zero() {
            return Err(Error::new(ErrorKind::DivideByZero, "integer division by zero"));
        }
        let (q_mag, r_mag) = div_rem_mag(&self.reg, &d.reg);
        let q_mag = Integer::from_parts(q_mag, Sign::Positive);
        let r_mag = Integer::from_parts(r_mag, Sign::Positive);

        if !self.is_negative() {
            let q = if d.is_negative() { -&q_mag } else { q_mag };
            return Ok((q, r_mag));
        }
        if r_mag.is_zero() {
            let q = if d.is_negative() { q_mag } else { -&q_mag };
            return Ok((q, Integer::zero()));
        }
        // negative dividend, non-zero remainder: shift into [0, |d|)
        let r = &d.abs() - &r_mag;
        let q_adj = &q_mag + &Integer::one();
        let q = if d.is_negative() { q_adj } else { -&q_adj };
        Ok((q, r))
    }

    /// Non-negative remainder `self mod m`.
    pub fn modulo(&self, m: &Integer) -> Result<Integer> {
        Ok(self.div_rem(m)?.1)
    }

    /// Short division by a single limb; returns (quotient, remainder).
    /// The remainder follows the Euclidean convention.
    pub fn div_rem_word(&self, d: u32) -> Result<(Integer, u32)> {
        if d == 0 {
            return Err(Error::new(ErrorKind::DivideByZero, "integer division by zero"));
        }
        let n = sig_limbs(&self.reg);
        let (q, r) = div_rem_mag_word(&self.reg[..n], d);
        if !self.is_negative() {
            return Ok((Integer::from_parts(q, Sign::Positive), r));
        }
        if r == 0 {
            return Ok((Integer::from_parts(q, Sign::Negative), 0));
        }
        let q = &Integer::from_parts(q, Sign::Positive) + &Integer::one();
        Ok((-&q, d - r))
    }

    pub fn gcd(a: &Integer, b: &Integer) -> Integer {
        let mut a = a.abs();
        let mut b = b.abs();
        while !b.is_zero() {
            let r = a.modulo(&b).expect("b is non-zero");
            a = b;
            b = r;
        }
        a
    }

    /// Multiplicative inverse mod `m`, if one exists.
    pub fn inverse_mod(&self, m: &Integer) -> Option<Integer> {
        if m.is_zero() || m.is_negative() {
            return None;
        }
        let mut old_r = self.modulo(m).ok()?;
        let mut r = m.clone();
        let mut old_s = Integer::one();
        let mut s = Integer::zero();
        while !r.is_zero() {
            let (q, rem) = old_r.div_rem(&r).ok()?;
            old_r = std::mem::replace(&mut r, rem);
            let next_s = &old_s - &(&q * &s);
            old_s = std::mem::replace(&mut s, next_s);
        }
        if old_r.is_unit() && !old_r.is_negative() {
            Some(old_s.modulo(m).ok()?)
        } else {
            None
        }
    }

    // -----------------------------------------------------------------
    // encodings
    // -----------------------------------------------------------------

    /// Minimum byte count from which [`decode`](Self::decode) recovers
    /// this value under the given signedness.
    pub fn min_encoded_size(&self, signedness: Signedness) -> usize {
        let n = self.byte_count().max(1);
        match signedness {
            Signedness::Unsigned => n,
            Signedness::Signed => {
                if self.is_zero() {
                    return 1;
                }
                let top = self.get_byte(self.byte_count() - 1);
                if !self.is_negative() {
                    n + usize::from(top >= 0x80)
                } else {
                    // -v fits in L bytes iff v <= 2^(8L-1)
                    let exact_power = top == 0x80
                        && (0..self.byte_count() - 1).all(|i| self.get_byte(i) == 0);
                    n + usize::from(top > 0x80 || (top == 0x80 && !exact_power))
                }
            }
        }
    }

    /// Big-endian encode into exactly `out.len()` bytes, left-padding
    /// with 0x00 (or 0xFF for signed negatives).
    pub fn encode(&self, out: &mut [u8], signedness: Signedness) -> Result<()> {
        if out.len() < self.min_encoded_size(signedness) {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                format!(
                    "{} bytes cannot hold a {}-byte integer",
                    out.len(),
                    self.min_encoded_size(signedness)
                ),
            ));
        }
        let len = out.len();
        for i in 0..len {
            out[len - 1 - i] = self.get_byte(i);
        }
        if signedness == Signedness::Signed && self.is_negative() {
            for b in out.iter_mut() {
                *b = !*b;
            }
            for b in out.iter_mut().rev() {
                let (v, carry) = b.overflowing_add(1);
                *b = v;
                if !carry {
                    break;
                }
            }
        }
        Ok(())
    }

    /// Encode at the minimum size into a fresh vector.
    pub fn encode_to_vec(&self, signedness: Signedness) -> Vec<u8> {
        let mut out = vec![0u8; self.min_encoded_size(signedness)];
        self.encode(&mut out, signedness)
            .expect("buffer sized by min_encoded_size");
        out
    }

    /// ASN.1 DER INTEGER: tag 0x02, definite length, signed contents.
    pub fn der_encode(&self, out: &mut ByteQueue) {
        let content = self.encode_to_vec(Signedness::Signed);
        out.put_byte(0x02);
        let len = content.len();
        if len <= 127 {
            out.put_byte(len as u8);
        } else if len <= 0xFF {
            out.put_byte(0x81);
            out.put_byte(len as u8);
        } else {
            out.put_byte(0x82);
            out.put_byte((len >> 8) as u8);
            out.put_byte(len as u8);
        }
        out.put(&content);
    }

    /// Inverse of [`der_encode`](Self::der_encode). Rejects tags other
    /// than INTEGER and long-form lengths beyond two length bytes.
    pub fn ber_decode(input: &mut ByteQueue) -> Result<Integer> {
        let decode_err = |what: &str| Error::new(ErrorKind::DecodeError, what.to_string());
        let tag = input.get_byte().ok_or_else(|| decode_err("missing BER tag"))?;
        if tag != 0x02 {
            return Err(decode_err("BER tag is not INTEGER"));
        }
        let first = input
            .get_byte()
            .ok_or_else(|| decode_err("missing BER length"))?;
        let len = if first & 0x80 == 0 {
            first as usize
        } else {
            let n = (first & 0x7F) as usize;
            if n == 0 || n > 2 {
                return Err(decode_err("unsupported BER length-of-length"));
            }
            let mut len = 0usize;
            for _ in 0..n {
                let b = input
                    .get_byte()
                    .ok_or_else(|| decode_err("truncated BER length"))?;
                len = (len << 8) | b as usize;
            }
            len
        };
        let mut content = vec![0u8; len];
        if input.get(&mut content) != len {
            return Err(decode_err("truncated BER content"));
        }
        Ok(Integer::decode(&content, Signedness::Signed))
    }
}

// ---------------------------------------------------------------------
// conversions
// ---------------------------------------------------------------------

impl From<u32> for Integer {
    fn from(v: u32) -> Integer {
        Integer::from_parts(vec![v], Sign::Positive)
    }
}

impl From<u64> for Integer {
    fn from(v: u64) -> Integer {
        Integer::from_parts(vec![v as u32, (v >> 32) as u32], Sign::Positive)
    }
}

impl From<i64> for Integer {
    fn from(v: i64) -> Integer {
        let mag = v.unsigned_abs();
        let sign = if v < 0 { Sign::Negative } else { Sign::Positive };
        Integer::from_parts(vec![mag as u32, (mag >> 32) as u32], sign)
    }
}

impl From<i32> for Integer {
    fn from(v: i32) -> Integer {
        Integer::from(v as i64)
    }
}

impl std::str::FromStr for Integer {
    type Err = Error;

    /// Radix by suffix: `h`/`H` hex, `o`/`O` octal, `b`/`B` binary,
    /// decimal otherwise. A leading `-` negates.
    fn from_str(s: &str) -> Result<Integer> {
        let parse_err = || Error::new(ErrorKind::InvalidArgument, format!("bad integer literal {:?}", s));
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        if body.is_empty() {
            return Err(parse_err());
        }
        let (radix, digits) = match body.as_bytes()[body.len() - 1] {
            b'h' | b'H' => (16u32, &body[..body.len() - 1]),
            b'o' | b'O' => (8, &body[..body.len() - 1]),
            b'b' | b'B' => (2, &body[..body.len() - 1]),
            _ => (10, body),
        };
        if digits.is_empty() {
            return Err(parse_err());
        }
        let mut value = Integer::zero();
        let radix_int = Integer::from(radix);
        for ch in digits.chars() {
            let d = ch.to_digit(radix).ok_or_else(parse_err)?;
            value = &(&value * &radix_int) + &Integer::from(d);
        }
        if negative && !value.is_zero() {
            value.sign = Sign::Negative;
        }
        Ok(value)
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let mut digits = Vec::new();
        let mut cur = self.abs();
        while !cur.is_zero() {
            let (q, r) = cur.div_rem_word(10).expect("non-zero divisor");
            digits.push(char::from(b'0' + r as u8));
            cur = q;
        }
        if self.is_negative() {
            f.write_str("-")?;
        }
        for d in digits.iter().rev() {
            write!(f, "{}", d)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Integer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Integer({})", self)
    }
}

// ---------------------------------------------------------------------
// comparisons and operators
// ---------------------------------------------------------------------

impl PartialEq for Integer {
    fn eq(&self, other: &Integer) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Integer {}

impl PartialOrd for Integer {
    fn partial_cmp(&self, other: &Integer) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Integer {
    fn cmp(&self, other: &Integer) -> Ordering {
        match (self.sign, other.sign) {
            (Sign::Positive, Sign::Negative) => Ordering::Greater,
            (Sign::Negative, Sign::Positive) => Ordering::Less,
            (Sign::Positive, Sign::Positive) => cmp_mag(&self.reg, &other.reg),
            (Sign::Negative, Sign::Negative) => cmp_mag(&other.reg, &self.reg),
        }
    }
}

impl std::ops::Neg for &Integer {
    type Output = Integer;

    fn neg(self) -> Integer {
        let sign = match self.sign {
            Sign::Positive => Sign::Negative,
            Sign::Negative => Sign::Positive,
        };
        Integer::from_parts(self.reg.clone(), sign)
    }
}

impl std::ops::Add for &Integer {
    type Output = Integer;

    fn add(self, rhs: &Integer) -> Integer {
        if self.sign == rhs.sign {
            return Integer::from_parts(add_mag(&self.reg, &rhs.reg), self.sign);
        }
        match cmp_mag(&self.reg, &rhs.reg) {
            Ordering::Equal => Integer::zero(),
            Ordering::Greater => {
                Integer::from_parts(sub_mag(&self.reg, &rhs.reg), self.sign)
            }
            Ordering::Less => Integer::from_parts(sub_mag(&rhs.reg, &self.reg), rhs.sign),
        }
    }
}

impl std::ops::Sub for &Integer {
    type Output = Integer;

    fn sub(self, rhs: &Integer) -> Integer {
        self + &(-rhs)
    }
}

impl std::ops::Mul for &Integer {
    type Output = Integer;

    fn mul(self, rhs: &Integer) -> Integer {
        let sign = if self.sign == rhs.sign {
            Sign::Positive
        } else {
            Sign::Negative
        };
        Integer::from_parts(mul_mag(&self.reg, &rhs.reg), sign)
    }
}

impl std::ops::Shl<usize> for &Integer {
    type Output = Integer;

    fn shl(self, bits: usize) -> Integer {
        Integer::from_parts(shl_bits_mag(&self.reg, bits), self.sign)
    }
}

impl std::ops::Shr<usize> for &Integer {
    type Output = Integer;

    fn shr(self, bits: usize) -> Integer {
        Integer::from_parts(shr_bits_mag(&self.reg, bits), self.sign)
    }
}

macro_rules! forward_value_binop {
    ($trait:ident, $method:ident) => {
        impl std::ops::$trait<Integer> for Integer {
            type Output = Integer;
            fn $method(self, rhs: Integer) -> Integer {
                (&self).$method(&rhs)
            }
        }
        impl std::ops::$trait<&Integer> for Integer {
            type Output = Integer;
            fn $method(self, rhs: &Integer) -> Integer {
                (&self).$method(rhs)
            }
        }
    };
}

forward_value_binop!(Add, add);
forward_value_binop!(Sub, sub);
forward_value_binop!(Mul, mul);

impl std::ops::Neg for Integer {
    type Output = Integer;
    fn neg(self) -> Integer {
        -&self
    }
}

impl std::ops::Shl<usize> for Integer {
    type Output = Integer;
    fn shl(self, bits: usize) -> Integer {
        &self << bits
    }
}

impl std::ops::Shr<usize> for Integer {
    type Output = Integer;
    fn shr(self, bits: usize) -> Integer {
        &self >> bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn int(s: &str) -> Integer {
        Integer::from_str(s).unwrap()
    }

    #[test]
    fn radix_literals() {
        assert_eq!(int("ffh"), Integer::from(255u32));
        assert_eq!(int("-10h"), Integer::from(-16i64));
        assert_eq!(int("777o"), Integer::from(511u32));
        assert_eq!(int("1010b"), Integer::from(10u32));
        assert_eq!(int("123456789012345678901234567890").to_string(),
                   "123456789012345678901234567890");
        assert!(Integer::from_str("12x3").is_err());
        assert!(Integer::from_str("-").is_err());
    }

    #[test]
    fn zero_is_canonical() {
        let z = &Integer::from(5i64) - &Integer::from(5i64);
        assert!(z.is_zero());
        assert_eq!(z.sign(), Sign::Positive);
        assert_eq!(z, -&z);
        assert_eq!(z.word_count(), 0);
    }

    #[test]
    fn register_stays_even() {
        for v in ["1", "100000000000h", "ffffffffffffffffffffh"] {
            let i = int(v);
            assert_eq!(i.reg.len() % 2, 0, "odd register for {}", v);
        }
    }

    #[test]
    fn arithmetic_basics() {
        let a = int("123456789123456789123456789");
        let b = int("987654321987654321");
        let sum = &a + &b;
        assert_eq!(&sum - &b, a);
        assert_eq!((&a * &b).to_string(),
                   (&b * &a).to_string());
        assert_eq!(&a + &(-&a), Integer::zero());
    }

    #[test]
    fn multiplication_crosses_karatsuba_cutoff() {
        // 40 limbs on each side forces the recursive path.
        let a = Integer::power_of_two(40 * 32) - Integer::one();
        let b = Integer::power_of_two(40 * 32 - 7) - Integer::from(12345u32);
        let p = &a * &b;
        // (2^n - 1) * m == m*2^n - m
        let expect = &(&b << (40 * 32)) - &b;
        assert_eq!(p, expect);
    }

    #[test]
    fn square_matches_mul() {
        let a = int("123456789abcdef0123456789abcdef0123456789h");
        assert_eq!(a.square(), &a * &a);
        let b = -&a;
        assert_eq!(b.square(), a.square());
    }

    #[test]
    fn division_identity_and_euclidean_remainder() {
        let cases = [
            ("1000000000000000000000000", "37"),
            ("-1000000000000000000000000", "37"),
            ("1000000000000000000000000", "-37"),
            ("-1000000000000000000000000", "-37"),
            ("12345", "123456789123456789"),
            ("-7", "2"),
        ];
        for (sa, sb) in cases {
            let a = int(sa);
            let b = int(sb);
            let (q, r) = a.div_rem(&b).unwrap();
            assert_eq!(&(&q * &b) + &r, a, "identity for {} / {}", sa, sb);
            assert!(!r.is_negative(), "remainder sign for {} / {}", sa, sb);
            assert!(r < b.abs(), "remainder bound for {} / {}", sa, sb);
        }
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let err = Integer::one().div_rem(&Integer::zero()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivideByZero);
        let err = Integer::one().div_rem_word(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DivideByZero);
    }

    #[test]
    fn knuth_d_add_back_case() {
        // Exercise the rare qhat-correction branch with a divisor of
        // the form b^2/2 against a crafted dividend.
        let u = int("7fffffff800000010000000000000000h");
        let v = int("800000008000000200000005h");
        let (q, r) = u.div_rem(&v).unwrap();
        assert_eq!(&(&q * &v) + &r, u);
        assert!(r < v);
    }

    #[test]
    fn bit_and_byte_access() {
        let mut a = Integer::zero();
        a.set_bit(100, true);
        assert_eq!(a, Integer::power_of_two(100));
        assert!(a.get_bit(100));
        assert!(!a.get_bit(99));
        a.set_bit(100, false);
        assert!(a.is_zero());

        let mut b = Integer::zero();
        b.set_byte(5, 0xAB);
        assert_eq!(b.get_byte(5), 0xAB);
        assert_eq!(b.byte_count(), 6);
        assert_eq!(b.bit_count(), 48);
    }

    #[test]
    fn shifts() {
        let a = int("123456789h");
        assert_eq!(&(&a << 12) >> 12, a);
        assert_eq!(&a >> 500, Integer::zero());
        assert_eq!(&Integer::one() << 75, Integer::power_of_two(75));
    }

    #[test]
    fn gcd_and_inverse() {
        let a = int("270");
        let b = int("192");
        assert_eq!(Integer::gcd(&a, &b), int("6"));

        let m = int("1000000007");
        let x = int("123456789");
        let inv = x.inverse_mod(&m).unwrap();
        assert_eq!((&x * &inv).modulo(&m).unwrap(), Integer::one());

        // 6 has no inverse mod 9
        assert!(int("6").inverse_mod(&int("9")).is_none());
    }

    #[test]
    fn sqrt_and_is_square() {
        let a = int("144");
        assert_eq!(a.sqrt().unwrap(), int("12"));
        assert!(a.is_square());
        assert!(!int("145").is_square());
        let big = int("123456789123456789");
        let r = big.sqrt().unwrap();
        assert!(r.square() <= big);
        assert!((&r + &Integer::one()).square() > big);
        assert!((-&a).sqrt().is_err());
    }

    #[test]
    fn unsigned_encode_round_trip_with_padding() {
        let a = int("deadbeefh");
        for extra in 0..4 {
            let len = a.min_encoded_size(Signedness::Unsigned) + extra;
            let mut buf = vec![0u8; len];
            a.encode(&mut buf, Signedness::Unsigned).unwrap();
            assert_eq!(Integer::decode(&buf, Signedness::Unsigned), a);
        }
        let mut small = [0u8; 3];
        assert!(a.encode(&mut small, Signedness::Unsigned).is_err());
    }

    #[test]
    fn signed_encode_round_trip() {
        for s in ["0", "1", "127", "128", "255", "256", "-1", "-127", "-128", "-129",
                  "-32768", "-32769", "123456789123456789", "-123456789123456789"] {
            let a = int(s);
            for extra in 0..3 {
                let len = a.min_encoded_size(Signedness::Signed) + extra;
                let mut buf = vec![0u8; len];
                a.encode(&mut buf, Signedness::Signed).unwrap();
                assert_eq!(Integer::decode(&buf, Signedness::Signed), a, "value {}", s);
            }
        }
    }

    #[test]
    fn signed_min_sizes_match_twos_complement() {
        assert_eq!(int("127").min_encoded_size(Signedness::Signed), 1);
        assert_eq!(int("128").min_encoded_size(Signedness::Signed), 2);
        assert_eq!(int("-128").min_encoded_size(Signedness::Signed), 1);
        assert_eq!(int("-129").min_encoded_size(Signedness::Signed), 2);
        assert_eq!(Integer::zero().min_encoded_size(Signedness::Signed), 1);
    }

    #[test]
    fn der_round_trip() {
        for s in ["0", "1", "-1", "127", "128", "-128", "-129",
                  "123456789123456789123456789123456789"] {
            let a = int(s);
            let mut q = ByteQueue::new();
            a.der_encode(&mut q);
            assert_eq!(Integer::ber_decode(&mut q).unwrap(), a, "value {}", s);
            assert!(q.is_empty());
        }
    }

    #[test]
    fn der_long_form_length() {
        // > 127 content bytes forces the 0x81 long form.
        let big = &Integer::power_of_two(130 * 8) - &Integer::one();
        let mut q = ByteQueue::new();
        big.der_encode(&mut q);
        assert_eq!(q[0], 0x02);
        assert_eq!(q[1], 0x81);
        assert_eq!(Integer::ber_decode(&mut q).unwrap(), big);
    }

    #[test]
    fn ber_rejects_damage() {
        let mut q = ByteQueue::new();
        q.put(&[0x04, 0x01, 0x00]); // wrong tag
        assert_eq!(
            Integer::ber_decode(&mut q).unwrap_err().kind(),
            ErrorKind::DecodeError
        );

        let mut q = ByteQueue::new();
        q.put(&[0x02, 0x83, 0x00, 0x00, 0x01]); // 3 length bytes
        assert_eq!(
            Integer::ber_decode(&mut q).unwrap_err().kind(),
            ErrorKind::DecodeError
        );

        let mut q = ByteQueue::new();
        q.put(&[0x02, 0x05, 0x01]); // truncated content
        assert_eq!(
            Integer::ber_decode(&mut q).unwrap_err().kind(),
            ErrorKind::DecodeError
        );
    }

    #[test]
    fn display_matches_decimal() {
        assert_eq!(int("-255").to_string(), "-255");
        assert_eq!(Integer::zero().to_string(), "0");
        assert_eq!(Integer::power_of_two(64).to_string(), "18446744073709551616");
    }
}
