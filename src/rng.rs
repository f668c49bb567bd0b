//! Deterministic, seedable random number generation.
//!
//! A seed (text or number) is reduced to a 32-bit state with the `xmur3`
//! string hash, then fed to a `mulberry32` generator. Both are pure 32-bit
//! integer arithmetic, so a given seed produces the same stream on every
//! platform and in every process. Text seeds are hashed over their UTF-16
//! code units so the stream also matches the browser implementation of
//! the same game.

use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Additive constant applied to the generator state on every draw.
const MULBERRY_INCREMENT: u32 = 0x6d2b_79f5;

/// 2^32 as a float, used to map a `u32` into `[0, 1)`.
const TWO_POW_32: f64 = 4_294_967_296.0;

/// A user-supplied seed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seed {
    Number(u32),
    Text(String),
}

impl From<u32> for Seed {
    fn from(value: u32) -> Self {
        Seed::Number(value)
    }
}

impl From<&str> for Seed {
    fn from(value: &str) -> Self {
        Seed::Text(value.to_string())
    }
}

impl From<String> for Seed {
    fn from(value: String) -> Self {
        Seed::Text(value)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seed::Number(n) => write!(f, "{n}"),
            Seed::Text(s) => f.write_str(s),
        }
    }
}

impl Seed {
    /// Reduces the seed to the 32-bit generator state.
    pub fn to_u32(&self) -> u32 {
        match self {
            Seed::Number(n) => *n,
            Seed::Text(s) => xmur3(s),
        }
    }
}

/// `xmur3` string hash: iterative multiply-xor-rotate over the input, then
/// two xor-shift-multiply finalisation rounds.
pub fn xmur3(input: &str) -> u32 {
    let units: Vec<u16> = input.encode_utf16().collect();
    let mut h: u32 = 1_779_033_703 ^ units.len() as u32;
    for unit in units {
        h = (h ^ unit as u32).wrapping_mul(3_432_918_353);
        h = h.rotate_left(13);
    }
    h = (h ^ (h >> 16)).wrapping_mul(2_246_822_507);
    h = (h ^ (h >> 13)).wrapping_mul(3_266_489_909);
    h ^ (h >> 16)
}

/// A small, fast, reproducible generator (`mulberry32`).
///
/// Implements [`RngCore`] so it can be used anywhere the `rand` ecosystem
/// expects a generator, but the search itself draws through
/// [`SeededRng::next_f64`] so the float stream is bit-exact.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u32,
}

impl SeededRng {
    /// Creates a generator from a text or numeric seed.
    ///
    /// # Examples
    /// ```rust
    /// use uttt_mcts::SeededRng;
    /// let mut a = SeededRng::from_seed("s1");
    /// let mut b = SeededRng::from_seed("s1");
    /// assert_eq!(a.next_f64(), b.next_f64());
    /// ```
    pub fn from_seed(seed: impl Into<Seed>) -> Self {
        SeededRng {
            state: seed.into().to_u32(),
        }
    }

    /// Creates a generator directly from a 32-bit state.
    pub fn from_state(state: u32) -> Self {
        SeededRng { state }
    }

    /// Creates a generator from non-deterministic entropy.
    pub fn from_entropy() -> Self {
        SeededRng {
            state: rand::rng().random::<u32>(),
        }
    }

    /// Seeded if a seed is given, otherwise from entropy.
    pub fn from_optional_seed(seed: Option<&Seed>) -> Self {
        match seed {
            Some(seed) => SeededRng::from_seed(seed.clone()),
            None => SeededRng::from_entropy(),
        }
    }

    #[inline]
    fn next_raw(&mut self) -> u32 {
        self.state = self.state.wrapping_add(MULBERRY_INCREMENT);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Next float in `[0, 1)`.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        self.next_raw() as f64 / TWO_POW_32
    }

    /// Uniform index in `0..n` computed as `floor(next_f64() * n)`.
    #[inline]
    pub fn pick_index(&mut self, n: usize) -> usize {
        debug_assert!(n > 0);
        ((self.next_f64() * n as f64) as usize).min(n.saturating_sub(1))
    }

    /// Symmetric jitter in `[-scale, scale)`.
    #[inline]
    pub fn jitter(&mut self, scale: f64) -> f64 {
        (self.next_f64() * 2.0 - 1.0) * scale
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        self.next_raw()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_raw() as u64;
        let lo = self.next_raw() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(4) {
            let bytes = self.next_raw().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// Convenience constructor mirroring the search entry points.
pub fn create_seeded_rng(seed: impl Into<Seed>) -> SeededRng {
    SeededRng::from_seed(seed)
}
