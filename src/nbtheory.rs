//! Number theory: primality testing, prime generation, and the
//! prime-plus-generator construction behind signature key generation.
//!
//! Testing stacks a small-divisor sieve, a base-2 strong probable-prime
//! test, and a strong Lucas test; Rabin-Miller with random bases is
//! available when a caller wants tunable confidence. Candidate search
//! uses a per-prime remainder table advanced by constant strides.

use crate::error::{Error, ErrorKind, Result};
use crate::integer::Integer;
use crate::modular::mod_exp;
use crate::rng::RandomSource;
use std::sync::OnceLock;

/// Entries the reference keeps statically resident; the rest of the
/// table exists for the candidate sieve.
pub const SMALL_PRIME_COUNT: usize = 552;
/// Full table length.
pub const PRIME_TABLE_SIZE: usize = 3511;

/// The first [`PRIME_TABLE_SIZE`] primes. Built once, on first use;
/// the build is not re-entrant but the `OnceLock` makes it race-free.
pub fn prime_table() -> &'static [u32] {
    static TABLE: OnceLock<Vec<u32>> = OnceLock::new();
    TABLE.get_or_init(|| {
        // 33,000 comfortably covers the 3511th prime.
        let limit = 33_000usize;
        let mut composite = vec![false; limit];
        let mut primes = Vec::with_capacity(PRIME_TABLE_SIZE);
        for n in 2..limit {
            if !composite[n] {
                primes.push(n as u32);
                if primes.len() == PRIME_TABLE_SIZE {
                    break;
                }
                let mut k = n * n;
                while k < limit {
                    composite[k] = true;
                    k += n;
                }
            }
        }
        debug_assert_eq!(primes.len(), PRIME_TABLE_SIZE);
        primes
    })
}

/// True if `p` passes trial division by the first 552 primes (or is
/// one of them).
pub fn small_divisors_test(p: &Integer) -> bool {
    for &prime in &prime_table()[..SMALL_PRIME_COUNT] {
        let (_, r) = match p.div_rem_word(prime) {
            Ok(v) => v,
            Err(_) => return false,
        };
        if r == 0 {
            return p == &Integer::from(prime);
        }
    }
    true
}

/// Strong probable-prime test to base `b`.
pub fn is_strong_probable_prime(n: &Integer, b: &Integer) -> bool {
    let three = Integer::from(3u32);
    if n < &three {
        return n == &Integer::from(2u32);
    }
    if n.is_even() {
        return false;
    }
    let n_minus_1 = n - &Integer::one();
    let mut d = n_minus_1.clone();
    let mut s = 0usize;
    while d.is_even() {
        d = &d >> 1;
        s += 1;
    }
    let mut x = match mod_exp(b, &d, n) {
        Ok(x) => x,
        Err(_) => return false,
    };
    if x.is_unit() || x == n_minus_1 {
        return true;
    }
    for _ in 1..s {
        x = match (&x * &x).modulo(n) {
            Ok(x) => x,
            Err(_) => return false,
        };
        if x == n_minus_1 {
            return true;
        }
        if x.is_unit() {
            return false;
        }
    }
    false
}

/// Jacobi symbol `(a/n)` for odd positive `n`.
pub fn jacobi(a: &Integer, n: &Integer) -> i32 {
    debug_assert!(n.is_odd() && n.is_positive());
    let mut a = match a.modulo(n) {
        Ok(a) => a,
        Err(_) => return 0,
    };
    let mut n = n.clone();
    let mut result = 1i32;
    while !a.is_zero() {
        while a.is_even() {
            a = &a >> 1;
            let n_mod_8 = n.get_byte(0) & 7;
            if n_mod_8 == 3 || n_mod_8 == 5 {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut n);
        if a.get_byte(0) & 3 == 3 && n.get_byte(0) & 3 == 3 {
            result = -result;
        }
        a = a.modulo(&n).expect("n stays non-zero here");
    }
    if n.is_unit() {
        result
    } else {
        0
    }
}

/// Lucas function `V_e(p, 1) mod n` by the paired ladder.
pub fn lucas(e: &Integer, p: &Integer, n: &Integer) -> Integer {
    let two = Integer::from(2u32);
    if e.is_zero() {
        return two.modulo(n).unwrap_or_else(|_| Integer::zero());
    }
    let p = match p.modulo(n) {
        Ok(p) => p,
        Err(_) => return Integer::zero(),
    };
    // ladder over (V_k, V_{k+1})
    let mut vk = two.modulo(n).expect("n is non-zero");
    let mut vk1 = p.clone();
    for i in (0..e.bit_count()).rev() {
        let cross = (&(&vk * &vk1) - &p).modulo(n).expect("n is non-zero");
        if e.get_bit(i) {
            vk = cross;
            vk1 = (&(&vk1 * &vk1) - &two).modulo(n).expect("n is non-zero");
        } else {
            vk1 = cross;
            vk = (&(&vk * &vk) - &two).modulo(n).expect("n is non-zero");
        }
    }
    vk
}

/// Strong Lucas probable-prime test with Q = 1 and the smallest `b`
/// whose discriminant is a non-residue.
pub fn is_strong_lucas_probable_prime(n: &Integer) -> bool {
    let two = Integer::from(2u32);
    let three = Integer::from(3u32);
    if n < &two {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if n.is_even() || n.is_square() {
        return false;
    }

    // smallest b >= 3 with jacobi(b^2 - 4, n) == -1
    let mut b = three.clone();
    let p = loop {
        let disc = &(&b * &b) - &Integer::from(4u32);
        match jacobi(&disc, n) {
            -1 => break b,
            0 => {
                // shares a factor with n unless the discriminant is 0 mod n
                if !disc.modulo(n).map(|d| d.is_zero()).unwrap_or(false) {
                    return false;
                }
                b = &b + &Integer::one();
            }
            _ => b = &b + &Integer::one(),
        }
        if b > Integer::from(64u32) {
            // pathologically smooth n; everything this small was
            // caught by trial division already
            return false;
        }
    };

    let n_plus_1 = n + &Integer::one();
    let mut d = n_plus_1.clone();
    let mut s = 0usize;
    while d.is_even() {
        d = &d >> 1;
        s += 1;
    }

    // (V_d, V_{d+1}) ladder mod n
    let mut vk = two.modulo(n).expect("n is non-zero");
    let mut vk1 = p.modulo(n).expect("n is non-zero");
    for i in (0..d.bit_count()).rev() {
        let cross = (&(&vk * &vk1) - &p).modulo(n).expect("n is non-zero");
        if d.get_bit(i) {
            vk = cross;
            vk1 = (&(&vk1 * &vk1) - &two).modulo(n).expect("n is non-zero");
        } else {
            vk1 = cross;
            vk = (&(&vk * &vk) - &two).modulo(n).expect("n is non-zero");
        }
    }

    // U_d == 0  <=>  2*V_{d+1} == P*V_d (mod n)
    let lhs = (&two * &vk1).modulo(n).expect("n is non-zero");
    let rhs = (&p * &vk).modulo(n).expect("n is non-zero");
    if lhs == rhs {
        return true;
    }

    // V_{d * 2^r} == 0 for some r in [0, s)
    let mut v = vk;
    for _ in 0..s {
        if v.is_zero() {
            return true;
        }
        v = (&(&v * &v) - &two).modulo(n).expect("n is non-zero");
    }
    false
}

/// Rabin-Miller: `rounds` strong probable-prime tests with uniformly
/// random bases.
pub fn rabin_miller(rng: &mut dyn RandomSource, n: &Integer, rounds: usize) -> bool {
    let three = Integer::from(3u32);
    if n <= &three {
        return n == &Integer::from(2u32) || n == &three;
    }
    if n.is_even() {
        return false;
    }
    let span = n - &three; // bases in [2, n-2]
    for _ in 0..rounds {
        let b = loop {
            let r = Integer::random(rng, span.bit_count());
            if r <= span {
                break &r + &Integer::from(2u32);
            }
        };
        if !is_strong_probable_prime(n, &b) {
            return false;
        }
    }
    true
}

/// The production predicate: small divisors + strong base-2 +
/// strong Lucas.
pub fn is_prime(p: &Integer) -> bool {
    if !p.is_positive() {
        return false;
    }
    if !small_divisors_test(p) {
        return false;
    }
    if p.bit_count() <= 12 {
        // below the sieve ceiling a survivor is prime iff tabulated
        return prime_table()
            .binary_search(&p.limbs().first().copied().unwrap_or(0))
            .is_ok();
    }
    is_strong_probable_prime(p, &Integer::from(2u32)) && is_strong_lucas_probable_prime(p)
}

/// Advance `p` to the next prime at or above `p + 1`, not exceeding
/// `max`. With `blum`, candidates are kept at 3 mod 4. Returns whether
/// a prime was found; on success `p` holds it.
pub fn next_prime(p: &mut Integer, max: &Integer, blum: bool) -> bool {
    let stride: u32 = if blum { 4 } else { 2 };
    let mut candidate = &*p + &Integer::one();

    // line the candidate up with the stride
    if candidate <= Integer::from(2u32) {
        if blum {
            candidate = Integer::from(3u32);
        } else {
            let two = Integer::from(2u32);
            if &two > max {
                return false;
            }
            *p = two;
            return true;
        }
    }
    if candidate.is_even() {
        candidate = &candidate + &Integer::one();
    }
    if blum {
        while candidate.get_byte(0) & 3 != 3 {
            candidate = &candidate + &Integer::from(2u32);
        }
    }

    // remainder table over the sieve primes, advanced by the stride
    let table = prime_table();
    let mut rems: Vec<u32> = Vec::with_capacity(table.len());
    for &prime in table.iter() {
        match candidate.div_rem_word(prime) {
            Ok((_, r)) => rems.push(r),
            Err(_) => return false,
        }
    }

    loop {
        if &candidate > max {
            return false;
        }
        let mut passes_sieve = true;
        for (i, &prime) in table.iter().enumerate() {
            if rems[i] == 0 {
                // the candidate might be the table prime itself
                if candidate != Integer::from(prime) {
                    passes_sieve = false;
                }
                break;
            }
        }
        if passes_sieve && is_prime(&candidate) {
            *p = candidate;
            return true;
        }
        candidate = &candidate + &Integer::from(stride);
        for (i, &prime) in table.iter().enumerate() {
            rems[i] = (rems[i] + stride) % prime;
        }
    }
}

/// Log-base-2 estimate of the work to take a discrete log at the given
/// modulus size; sets the subgroup size for signature keys.
pub fn discrete_log_work_factor(bit_length: usize) -> usize {
    // bits -> natural-log scale, then the subexponential L(1/3) shape
    let n = bit_length as f64 * 2323.0 / 3355.0;
    if n < 8.0 {
        return bit_length;
    }
    (2.4 * n.powf(1.0 / 3.0) * n.ln().powf(2.0 / 3.0)) as usize
}

/// Constraint for [`random_integer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomType {
    Any,
    Odd,
    Prime,
    /// Prime congruent to 3 mod 4.
    Blum,
}

/// Uniform-by-rejection random integer in `[min, max]` meeting the
/// constraint. Fails with `InvalidArgument` when the range cannot
/// satisfy it.
pub fn random_integer(
    rng: &mut dyn RandomSource,
    min: &Integer,
    max: &Integer,
    kind: RandomType,
) -> Result<Integer> {
    if min > max {
        return Err(Error::new(ErrorKind::InvalidArgument, "empty random range"));
    }
    let span = max - min;
    let bits = span.bit_count().max(1);
    let uniform = |rng: &mut dyn RandomSource| loop {
        let r = Integer::random(rng, bits);
        if r <= span {
            return min + &r;
        }
    };

    // Candidate attempts before giving up on a constrained draw.
    let attempts = 64 * (bits + 16);
    match kind {
        RandomType::Any => Ok(uniform(&mut *rng)),
        RandomType::Odd => {
            for _ in 0..attempts {
                let mut c = uniform(&mut *rng);
                if c.is_even() {
                    c = &c + &Integer::one();
                }
                if &c >= min && &c <= max {
                    return Ok(c);
                }
            }
            Err(Error::new(
                ErrorKind::InvalidArgument,
                "no odd value in range",
            ))
        }
        RandomType::Prime | RandomType::Blum => {
            let blum = kind == RandomType::Blum;
            for _ in 0..attempts {
                let start = uniform(&mut *rng);
                let mut c = &start - &Integer::one();
                if next_prime(&mut c, max, blum) && &c >= min {
                    return Ok(c);
                }
            }
            Err(Error::new(
                ErrorKind::InvalidArgument,
                "no prime found in range",
            ))
        }
    }
}

/// A prime `p`, the prime `q` dividing the group order, and a
/// generator `g` of the order-`q` subgroup mod `p`.
pub struct PrimeAndGenerator {
    p: Integer,
    q: Integer,
    g: Integer,
}

impl PrimeAndGenerator {
    /// Safe-prime form: `p = 2q + delta` with both prime. With
    /// `delta = 1` the generator is the smallest quadratic residue;
    /// with `delta = -1` it is the smallest base whose Lucas sequence
    /// lies in the order-(p+1) twist and certifiably does not collapse
    /// into the order-q part.
    pub fn safe_prime(
        delta: i32,
        rng: &mut dyn RandomSource,
        pbits: usize,
    ) -> Result<PrimeAndGenerator> {
        if delta != 1 && delta != -1 {
            return Err(Error::new(ErrorKind::InvalidArgument, "delta must be +/-1"));
        }
        if pbits < 8 {
            return Err(Error::new(ErrorKind::InvalidKeySize, "modulus too small"));
        }
        let qmin = Integer::power_of_two(pbits - 2);
        let qmax = &Integer::power_of_two(pbits - 1) - &Integer::one();
        let delta_int = Integer::from(delta as i64);
        loop {
            let q = random_integer(rng, &qmin, &qmax, RandomType::Prime)?;
            let p = &(&(&q << 1) + &delta_int);
            if p.bit_count() != pbits {
                continue;
            }
            if !is_prime(p) {
                continue;
            }
            let g = if delta == 1 {
                // smallest quadratic residue
                let mut g = Integer::from(2u32);
                while jacobi(&g, p) != 1 {
                    g = &g + &Integer::one();
                }
                g
            } else {
                // twist generator, order certified by the Lucas function
                let mut g = Integer::from(3u32);
                loop {
                    let disc = &(&g * &g) - &Integer::from(4u32);
                    if jacobi(&disc, p) == -1 && lucas(&q, &g, p) != Integer::from(2u32) {
                        break g;
                    }
                    g = &g + &Integer::one();
                }
            };
            return Ok(PrimeAndGenerator {
                p: p.clone(),
                q,
                g,
            });
        }
    }

    /// Subgroup form: `p = 2rq + 1` with `|p| = pbits`, `|q| = qbits`,
    /// and `g` of order `q` mod `p`.
    pub fn with_subgroup(
        delta: i32,
        rng: &mut dyn RandomSource,
        pbits: usize,
        qbits: usize,
    ) -> Result<PrimeAndGenerator> {
        if delta != 1 {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "only delta = 1 is supported for subgroup generation",
            ));
        }
        if qbits < 8 || pbits < qbits + 8 {
            return Err(Error::new(ErrorKind::InvalidKeySize, "field sizes too small"));
        }
        let q = random_integer(
            rng,
            &Integer::power_of_two(qbits - 1),
            &(&Integer::power_of_two(qbits) - &Integer::one()),
            RandomType::Prime,
        )?;

        let pmin = Integer::power_of_two(pbits - 1);
        let pmax = &Integer::power_of_two(pbits) - &Integer::one();
        let two_q = &q << 1;
        let (rmin, rem) = (&pmin - &Integer::one()).div_rem(&two_q)?;
        let rmin = if rem.is_zero() { rmin } else { &rmin + &Integer::one() };
        let (rmax, _) = (&pmax - &Integer::one()).div_rem(&two_q)?;

        let p = loop {
            let r = random_integer(rng, &rmin, &rmax, RandomType::Any)?;
            let p = &(&two_q * &r) + &Integer::one();
            if p.bit_count() == pbits && is_prime(&p) {
                break p;
            }
        };

        // g = h^((p-1)/q) for random h until the power is non-trivial
        let exp = (&(&p - &Integer::one())).div_rem(&q)?.0;
        let hmax = &p - &Integer::from(2u32);
        let g = loop {
            let h = random_integer(rng, &Integer::from(2u32), &hmax, RandomType::Any)?;
            let g = mod_exp(&h, &exp, &p)?;
            if !g.is_unit() {
                break g;
            }
        };
        debug_assert!(mod_exp(&g, &q, &p).map(|v| v.is_unit()).unwrap_or(false));

        Ok(PrimeAndGenerator { p, q, g })
    }

    pub fn prime(&self) -> &Integer {
        &self.p
    }

    pub fn sub_prime(&self) -> &Integer {
        &self.q
    }

    pub fn generator(&self) -> &Integer {
        &self.g
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::des::{Direction, TripleDes};
    use crate::rng::X917Rng;
    use std::str::FromStr;

    fn int(s: &str) -> Integer {
        Integer::from_str(s).unwrap()
    }

    fn test_rng() -> X917Rng {
        let key: Vec<u8> = (10u8..34).collect();
        X917Rng::new(
            TripleDes::from_key_bytes(Direction::Encrypt, &key),
            *b"nbtseeds",
        )
    }

    #[test]
    fn prime_table_shape() {
        let table = prime_table();
        assert_eq!(table.len(), PRIME_TABLE_SIZE);
        assert_eq!(&table[..8], &[2, 3, 5, 7, 11, 13, 17, 19]);
        assert!(table.windows(2).all(|w| w[0] < w[1]));
        // the sieve ceiling sits just below 2^15
        let last = *table.last().unwrap();
        assert!(last > 32_000 && last < 33_000);
        assert!(table.contains(&4001));
    }

    #[test]
    fn small_divisor_sieve() {
        assert!(small_divisors_test(&int("104729"))); // 10000th prime
        assert!(!small_divisors_test(&int("104730")));
        assert!(small_divisors_test(&int("3"))); // a table prime itself
    }

    #[test]
    fn strong_probable_prime_vectors() {
        let two = Integer::from(2u32);
        assert!(is_strong_probable_prime(&int("104729"), &two));
        assert!(!is_strong_probable_prime(&int("104731"), &two));
        // 2047 = 23 * 89 is the smallest base-2 strong pseudoprime.
        assert!(is_strong_probable_prime(&int("2047"), &two));
        assert!(!is_strong_lucas_probable_prime(&int("2047")));
    }

    #[test]
    fn jacobi_small_values() {
        // (1/9) = 1, (2/9) = 1, (3/9) = 0, (2/7) = 1, (3/7) = -1
        assert_eq!(jacobi(&int("1"), &int("9")), 1);
        assert_eq!(jacobi(&int("2"), &int("9")), 1);
        assert_eq!(jacobi(&int("3"), &int("9")), 0);
        assert_eq!(jacobi(&int("2"), &int("7")), 1);
        assert_eq!(jacobi(&int("3"), &int("7")), -1);
        assert_eq!(jacobi(&int("-1"), &int("7")), -1);
        assert_eq!(jacobi(&int("-1"), &int("13")), 1);
    }

    #[test]
    fn lucas_function_vectors() {
        // V_k(3, 1): 2, 3, 7, 18, 47, 123, 322...
        let n = int("1000003");
        let p = int("3");
        assert_eq!(lucas(&int("0"), &p, &n), int("2"));
        assert_eq!(lucas(&int("1"), &p, &n), int("3"));
        assert_eq!(lucas(&int("4"), &p, &n), int("47"));
        assert_eq!(lucas(&int("6"), &p, &n), int("322"));
        assert_eq!(lucas(&int("10"), &p, &n), int("15127"));
        // and reduced mod n
        let small = int("101");
        assert_eq!(lucas(&int("10"), &p, &small), int("15127").modulo(&small).unwrap());
    }

    #[test]
    fn is_prime_agrees_with_known_values() {
        for s in ["2", "3", "5", "104729", "2147483647", "1000000007"] {
            assert!(is_prime(&int(s)), "{} is prime", s);
        }
        for s in ["1", "0", "4", "2047", "104730", "1000000008"] {
            assert!(!is_prime(&int(s)), "{} is composite", s);
        }
        // Carmichael numbers must not slip through.
        assert!(!is_prime(&int("561")));
        assert!(!is_prime(&int("41041")));
    }

    #[test]
    fn rabin_miller_rejects_composites() {
        let mut rng = test_rng();
        assert!(rabin_miller(&mut rng, &int("1000000007"), 12));
        // base-2 strong pseudoprime falls to random bases
        assert!(!rabin_miller(&mut rng, &int("2047"), 12));
        // Carmichael number
        assert!(!rabin_miller(&mut rng, &int("41041"), 12));
    }

    #[test]
    fn next_prime_walks_forward() {
        let max = int("200");
        let mut p = int("89");
        assert!(next_prime(&mut p, &max, false));
        assert_eq!(p, int("97"));

        let mut p = int("113");
        assert!(next_prime(&mut p, &max, true));
        assert_eq!(p, int("127")); // 127 = 3 mod 4

        let mut p = int("199");
        assert!(!next_prime(&mut p, &max, false));
    }

    #[test]
    fn random_integer_respects_constraints() {
        let mut rng = test_rng();
        let min = int("1000");
        let max = int("100000");
        for _ in 0..10 {
            let v = random_integer(&mut rng, &min, &max, RandomType::Any).unwrap();
            assert!(v >= min && v <= max);
        }
        let odd = random_integer(&mut rng, &min, &max, RandomType::Odd).unwrap();
        assert!(odd.is_odd() && odd >= min && odd <= max);
        let prime = random_integer(&mut rng, &min, &max, RandomType::Prime).unwrap();
        assert!(is_prime(&prime) && prime >= min && prime <= max);
        let blum = random_integer(&mut rng, &min, &max, RandomType::Blum).unwrap();
        assert!(is_prime(&blum) && blum.get_byte(0) & 3 == 3);
    }

    #[test]
    fn work_factor_monotone_and_in_range() {
        let wf512 = discrete_log_work_factor(512);
        let wf1024 = discrete_log_work_factor(1024);
        let wf2048 = discrete_log_work_factor(2048);
        assert!(wf512 < wf1024 && wf1024 < wf2048);
        // q stays within the 28-byte wire bound: 2 * wf bits <= 224
        assert!(2 * wf2048 <= 28 * 8);
        assert!(wf1024 >= 64);
    }

    #[test]
    fn safe_prime_generation_small() {
        let mut rng = test_rng();
        let pg = PrimeAndGenerator::safe_prime(1, &mut rng, 64).unwrap();
        assert!(is_prime(pg.prime()));
        assert!(is_prime(pg.sub_prime()));
        assert_eq!(
            &(&(pg.sub_prime() << 1) + &Integer::one()),
            pg.prime()
        );
        assert_eq!(jacobi(pg.generator(), pg.prime()), 1);

        let pg = PrimeAndGenerator::safe_prime(-1, &mut rng, 48).unwrap();
        assert!(is_prime(pg.prime()));
        assert_eq!(
            &(&(pg.sub_prime() << 1) - &Integer::one()),
            pg.prime()
        );
    }

    #[test]
    fn subgroup_generation_small() {
        let mut rng = test_rng();
        let pg = PrimeAndGenerator::with_subgroup(1, &mut rng, 128, 40).unwrap();
        assert_eq!(pg.prime().bit_count(), 128);
        assert_eq!(pg.sub_prime().bit_count(), 40);
        assert!(is_prime(pg.prime()));
        assert!(is_prime(pg.sub_prime()));
        // p - 1 divisible by q, and g has order q
        let rem = (&(pg.prime() - &Integer::one())).modulo(pg.sub_prime()).unwrap();
        assert!(rem.is_zero());
        let gq = mod_exp(pg.generator(), pg.sub_prime(), pg.prime()).unwrap();
        assert!(gq.is_unit());
        assert!(!pg.generator().is_unit());
    }
}
