//! シード付き乱数源
//!
//! エンコーダとプールで共有する。グローバル状態にはせず、呼び出し側から
//! 明示的に渡すことで、同じシードなら出力が完全に一致する。

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

pub struct RandomSource {
    rng: Xoshiro256PlusPlus,
    seed: u64,
}

impl RandomSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            seed,
        }
    }

    /// OS乱数からシードを決めて作成（シードは `seed()` で取得してログに残す）
    pub fn from_entropy() -> Self {
        Self::new(rand::rng().random())
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// `[0, n)` の一様整数
    ///
    /// # Panics
    /// `n == 0` の場合
    #[inline]
    pub fn next_below(&mut self, n: usize) -> usize {
        assert!(n > 0, "next_below called with empty range");
        self.rng.random_range(0..n)
    }

    /// `[0, 1)` の一様実数
    #[inline]
    pub fn next_double(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Fisher–Yates シャッフル
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }
}
