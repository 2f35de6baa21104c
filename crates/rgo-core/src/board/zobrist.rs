//! Zobristハッシュ乱数テーブル（石×交点）
//!
//! 固定シードで一度だけ生成するため、同じ局面は実行をまたいで同じハッシュになる。

use std::sync::LazyLock;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use super::MAX_BOARD_SIZE;
use crate::types::Color;

const ZOBRIST_SEED: u64 = 0x5EED_601D_BA0D_0001;

/// `[色][盤サイズ][交点インデックス]`
///
/// 盤サイズごとに別のキーを持つので、異なるサイズの局面が衝突しにくい。
pub struct Zobrist {
    psq: Vec<[u64; Color::NUM]>,
}

pub static ZOBRIST: LazyLock<Zobrist> = LazyLock::new(|| {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(ZOBRIST_SEED);
    let len = (MAX_BOARD_SIZE + 1) * MAX_BOARD_SIZE * MAX_BOARD_SIZE;
    let psq = (0..len).map(|_| [rng.random::<u64>(), rng.random::<u64>()]).collect();
    Zobrist { psq }
});

impl Zobrist {
    /// 盤サイズ `size` の交点 `idx` に `color` の石があるときのキー
    #[inline]
    pub fn stone(&self, size: usize, idx: usize, color: Color) -> u64 {
        self.psq[size * MAX_BOARD_SIZE * MAX_BOARD_SIZE + idx][color.index()]
    }
}
