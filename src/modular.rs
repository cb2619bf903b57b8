//! Modular arithmetic rings.
//!
//! [`ModularRing`] is the plain reduce-and-divide ring over any
//! positive modulus. [`Montgomery`] trades a one-time precomputation
//! over an odd modulus for multiplication without trial division; it is
//! what every exponentiation in the signature scheme runs on.

use crate::error::{Error, ErrorKind, Result};
use crate::integer::{Integer, Sign};

/// Plain modular ring over a positive modulus.
#[derive(Clone)]
pub struct ModularRing {
    modulus: Integer,
}

impl ModularRing {
    pub fn new(modulus: Integer) -> Result<ModularRing> {
        if !modulus.is_positive() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "modulus must be positive",
            ));
        }
        Ok(ModularRing { modulus })
    }

    pub fn modulus(&self) -> &Integer {
        &self.modulus
    }

    /// Reduce an arbitrary integer into the ring.
    pub fn convert_in(&self, a: &Integer) -> Integer {
        a.modulo(&self.modulus).expect("modulus is non-zero")
    }

    pub fn add(&self, a: &Integer, b: &Integer) -> Integer {
        self.convert_in(&(a + b))
    }

    pub fn sub(&self, a: &Integer, b: &Integer) -> Integer {
        self.convert_in(&(a - b))
    }

    pub fn mul(&self, a: &Integer, b: &Integer) -> Integer {
        self.convert_in(&(a * b))
    }

    pub fn inverse(&self, a: &Integer) -> Option<Integer> {
        a.inverse_mod(&self.modulus)
    }

    pub fn div(&self, a: &Integer, b: &Integer) -> Option<Integer> {
        Some(self.mul(a, &self.inverse(b)?))
    }

    /// `a^e mod m` by square-and-multiply. For odd moduli the
    /// Montgomery ring is the faster path.
    pub fn exponentiate(&self, a: &Integer, e: &Integer) -> Integer {
        let mut result = Integer::one();
        let base = self.convert_in(a);
        if e.is_zero() {
            return self.convert_in(&result);
        }
        for i in (0..e.bit_count()).rev() {
            result = self.mul(&result, &result);
            if e.get_bit(i) {
                result = self.mul(&result, &base);
            }
        }
        result
    }

    /// `x^ex · y^ey mod m` with interleaved squarings.
    pub fn cascade_exponentiate(
        &self,
        x: &Integer,
        ex: &Integer,
        y: &Integer,
        ey: &Integer,
    ) -> Integer {
        let x = self.convert_in(x);
        let y = self.convert_in(y);
        let xy = self.mul(&x, &y);
        let mut result = Integer::one();
        let bits = ex.bit_count().max(ey.bit_count());
        for i in (0..bits).rev() {
            result = self.mul(&result, &result);
            match (ex.get_bit(i), ey.get_bit(i)) {
                (true, true) => result = self.mul(&result, &xy),
                (true, false) => result = self.mul(&result, &x),
                (false, true) => result = self.mul(&result, &y),
                (false, false) => {}
            }
        }
        result
    }
}

/// Montgomery representation over an odd modulus.
///
/// Elements are held as `a · R mod m` with `R = 2^(32·n)`; products are
/// reduced with REDC instead of division by the modulus.
#[derive(Clone, Debug)]
pub struct Montgomery {
    modulus: Integer,
    /// Significant limb count of the modulus; R = 2^(32·limbs).
    limbs: usize,
    /// `-m^{-1} mod 2^32`, the per-limb REDC multiplier.
    m_prime: u32,
    /// `R^2 mod m`, for conversion into the representation.
    r_squared: Integer,
}

impl Montgomery {
    /// Fails with `InvalidArgument` unless the modulus is odd and
    /// positive.
    pub fn new(modulus: Integer) -> Result<Montgomery> {
        if !modulus.is_positive() || !modulus.is_odd() {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "Montgomery representation requires an odd positive modulus",
            ));
        }
        let limbs = modulus.word_count();
        // Newton iteration doubles correct low bits each round:
        // four rounds take the seed to a full 32-bit inverse.
        let m0 = modulus.limbs()[0];
        let mut inv: u32 = m0;
        for _ in 0..4 {
            inv = inv.wrapping_mul(2u32.wrapping_sub(m0.wrapping_mul(inv)));
        }
        let m_prime = inv.wrapping_neg();

        let r = Integer::power_of_two(64 * limbs);
        let r_squared = r.modulo(&modulus).expect("modulus is non-zero");
        Ok(Montgomery {
            modulus,
            limbs,
            m_prime,
            r_squared,
        })
    }

    pub fn modulus(&self) -> &Integer {
        &self.modulus
    }

    /// REDC: given `t < m·R`, returns `t · R^{-1} mod m`.
    fn reduce(&self, t: &Integer) -> Integer {
        let n = self.limbs;
        let mut work = vec![0u32; 2 * n + 1];
        let src = t.limbs();
        work[..src.len().min(2 * n + 1)]
            .copy_from_slice(&src[..src.len().min(2 * n + 1)]);
        let m = self.modulus.limbs();

        for i in 0..n {
            let u = work[i].wrapping_mul(self.m_prime);
            let mut carry = 0u64;
            for (j, &mj) in m.iter().enumerate().take(n) {
                let s = work[i + j] as u64 + u as u64 * mj as u64 + carry;
                work[i + j] = s as u32;
                carry = s >> 32;
            }
            // propagate the carry through the upper limbs
            let mut k = i + n;
            while carry != 0 {
                let s = work[k] as u64 + carry;
                work[k] = s as u32;
                carry = s >> 32;
                k += 1;
            }
        }

        let mut out = Integer::from_limbs(work[n..].to_vec(), Sign::Positive);
        if out >= self.modulus {
            out = &out - &self.modulus;
        }
        out
    }

    /// `a·R mod m`.
    pub fn convert_in(&self, a: &Integer) -> Integer {
        let a = a.modulo(&self.modulus).expect("modulus is non-zero");
        self.reduce(&(&a * &self.r_squared))
    }

    /// Back out of the representation.
    pub fn convert_out(&self, a: &Integer) -> Integer {
        self.reduce(a)
    }

    /// Product of two Montgomery-form elements, in Montgomery form.
    pub fn mul(&self, a: &Integer, b: &Integer) -> Integer {
        self.reduce(&(a * b))
    }

    fn mont_one(&self) -> Integer {
        Integer::power_of_two(32 * self.limbs)
            .modulo(&self.modulus)
            .expect("modulus is non-zero")
    }

    /// `base^e` where `base` is in Montgomery form; the result is in
    /// Montgomery form. 4-bit fixed windows.
    pub fn exponentiate(&self, base: &Integer, e: &Integer) -> Integer {
        if e.is_zero() {
            return self.mont_one();
        }
        // table[i] = base^i
        let mut table = Vec::with_capacity(16);
        table.push(self.mont_one());
        table.push(base.clone());
        for i in 2..16 {
            let next = self.mul(&table[i - 1], base);
            table.push(next);
        }

        let nibbles = (e.bit_count() + 3) / 4;
        let mut result = self.mont_one();
        for i in (0..nibbles).rev() {
            if i != nibbles - 1 {
                for _ in 0..4 {
                    result = self.mul(&result, &result);
                }
            }
            let nibble = (e.get_byte(i / 2) >> (4 * (i % 2))) & 0x0F;
            if nibble != 0 {
                result = self.mul(&result, &table[nibble as usize]);
            }
        }
        result
    }

    /// `x^ex · y^ey` over Montgomery-form bases (Shamir's trick).
    pub fn cascade_exponentiate(
        &self,
        x: &Integer,
        ex: &Integer,
        y: &Integer,
        ey: &Integer,
    ) -> Integer {
        let xy = self.mul(x, y);
        let mut result = self.mont_one();
        let bits = ex.bit_count().max(ey.bit_count());
        for i in (0..bits).rev() {
            result = self.mul(&result, &result);
            match (ex.get_bit(i), ey.get_bit(i)) {
                (true, true) => result = self.mul(&result, &xy),
                (true, false) => result = self.mul(&result, x),
                (false, true) => result = self.mul(&result, y),
                (false, false) => {}
            }
        }
        result
    }
}

/// `a^e mod m` through the fastest applicable ring.
pub fn mod_exp(a: &Integer, e: &Integer, m: &Integer) -> Result<Integer> {
    if m.is_odd() {
        let ring = Montgomery::new(m.clone())?;
        let base = ring.convert_in(a);
        Ok(ring.convert_out(&ring.exponentiate(&base, e)))
    } else {
        let ring = ModularRing::new(m.clone())?;
        Ok(ring.exponentiate(a, e))
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
    fn ring_basics() {
        let ring = ModularRing::new(int("97")).unwrap();
        assert_eq!(ring.add(&int("90"), &int("10")), int("3"));
        assert_eq!(ring.sub(&int("3"), &int("10")), int("90"));
        assert_eq!(ring.mul(&int("13"), &int("15")), int("1"));
        assert_eq!(ring.inverse(&int("13")).unwrap(), int("15"));
        assert_eq!(ring.div(&int("1"), &int("15")).unwrap(), int("13"));
    }

    #[test]
    fn ring_exponentiation() {
        let ring = ModularRing::new(int("1000000007")).unwrap();
        // 2^10 = 1024
        assert_eq!(ring.exponentiate(&int("2"), &int("10")), int("1024"));
        // Fermat: a^(p-1) == 1 mod p
        assert_eq!(
            ring.exponentiate(&int("123456"), &int("1000000006")),
            Integer::one()
        );
        assert_eq!(ring.exponentiate(&int("5"), &Integer::zero()), Integer::one());
    }

    #[test]
    fn montgomery_requires_odd_modulus() {
        assert!(Montgomery::new(int("100")).is_err());
        assert!(Montgomery::new(int("-7")).is_err());
        assert!(Montgomery::new(int("99")).is_ok());
    }

    #[test]
    fn montgomery_round_trip() {
        let ring = Montgomery::new(int("1000000007")).unwrap();
        for s in ["0", "1", "2", "999999999", "123456789"] {
            let a = int(s);
            let m = ring.convert_in(&a);
            assert_eq!(ring.convert_out(&m), a, "value {}", s);
        }
    }

    #[test]
    fn montgomery_mul_matches_plain() {
        let m = int("fedcba9876543211h"); // odd
        let plain = ModularRing::new(m.clone()).unwrap();
        let mont = Montgomery::new(m).unwrap();
        let a = int("123456789abcdefh");
        let b = int("fedcba987654321h");
        let expect = plain.mul(&a, &b);
        let got = mont.convert_out(&mont.mul(&mont.convert_in(&a), &mont.convert_in(&b)));
        assert_eq!(got, expect);
    }

    #[test]
    fn montgomery_exponentiation_matches_plain() {
        let m = int("c3a5a7b5d2b7f71b3be0b1bd2f3a5c0ce2b19f1d44b2cf7d71f3e2a9d6b8e461h");
        let plain = ModularRing::new(m.clone()).unwrap();
        let mont = Montgomery::new(m).unwrap();
        let a = int("2b7e151628aed2a6abf7158809cf4f3ch");
        let e = int("deadbeefcafebabe1234h");
        let expect = plain.exponentiate(&a, &e);
        let got = mont.convert_out(&mont.exponentiate(&mont.convert_in(&a), &e));
        assert_eq!(got, expect);
    }

    #[test]
    fn cascade_matches_two_exponentiations() {
        let m = int("1000000007");
        let plain = ModularRing::new(m.clone()).unwrap();
        let mont = Montgomery::new(m.clone()).unwrap();
        let (x, ex) = (int("12345"), int("6789"));
        let (y, ey) = (int("54321"), int("9876"));
        let expect = plain.mul(
            &plain.exponentiate(&x, &ex),
            &plain.exponentiate(&y, &ey),
        );
        let got = mont.convert_out(&mont.cascade_exponentiate(
            &mont.convert_in(&x),
            &ex,
            &mont.convert_in(&y),
            &ey,
        ));
        assert_eq!(got, expect);
        assert_eq!(plain.cascade_exponentiate(&x, &ex, &y, &ey), expect);
    }

    #[test]
    fn mod_exp_helper_covers_both_rings() {
        let odd = int("1000000007");
        let even = int("1000000006");
        assert_eq!(mod_exp(&int("2"), &int("20"), &odd).unwrap(), int("1048576"));
        assert_eq!(
            mod_exp(&int("2"), &int("20"), &even).unwrap(),
            int("1048576").modulo(&even).unwrap()
        );
    }
}
