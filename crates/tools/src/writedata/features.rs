//! 行レイアウト
//!
//! 1行 = 入力テンソル（交点ごとに `NUM_FEATURES` 個、交点優先で平坦化）
//!     + ターゲット（着手位置の one-hot）+ 重み（1要素）。
//!
//! テンソルは常に `TENSOR_BOARD_SIZE` 路で、小さい盤は中央寄せ
//! （周囲の未使用交点はすべて0）。現在は19路のみ受け付けるが、
//! `SUPPORTED_BOARD_SIZES` を広げてもレイアウトが崩れないようにしてある。

use rgo_core::Point;
use serde::Serialize;

/// テンソルの一辺
pub const TENSOR_BOARD_SIZE: usize = 19;
/// 処理対象の盤サイズ（それ以外の棋譜は0行）
pub const SUPPORTED_BOARD_SIZES: &[usize] = &[19];

pub const NUM_FEATURES: usize = 13;
pub const INPUT_LEN: usize = TENSOR_BOARD_SIZE * TENSOR_BOARD_SIZE * NUM_FEATURES;
pub const TARGET_LEN: usize = TENSOR_BOARD_SIZE * TENSOR_BOARD_SIZE;
pub const WEIGHT_LEN: usize = 1;
pub const ROW_LEN: usize = INPUT_LEN + TARGET_LEN + WEIGHT_LEN;

/// 特徴量プレーンの番号
pub mod plane {
    pub const ON_BOARD: usize = 0;
    pub const OWN_STONE: usize = 1;
    pub const OPP_STONE: usize = 2;
    /// 自分の石で呼吸点1,2,3（+0,+1,+2）
    pub const OWN_LIBERTIES: usize = 3;
    /// 相手の石で呼吸点1,2,3（+0,+1,+2）
    pub const OPP_LIBERTIES: usize = 6;
    /// 1,2,3手前の着手位置（+0,+1,+2）
    pub const PREV_MOVES: usize = 9;
    pub const KO: usize = 12;
}

/// 直前の手を含める確率（2,3手前はそれぞれ前の手を含めた場合の条件付き確率）
pub const PREV_MOVE_KEEP_PROB: [f64; 3] = [0.9, 0.95, 0.95];

#[inline]
pub fn is_supported_board_size(size: usize) -> bool {
    SUPPORTED_BOARD_SIZES.contains(&size) && size <= TENSOR_BOARD_SIZE
}

/// 中央寄せのオフセット
#[inline]
pub const fn board_offset(size: usize) -> usize {
    (TENSOR_BOARD_SIZE - size) / 2
}

/// テンソル上の交点位置
#[inline]
pub const fn tensor_pos(point: Point, offset: usize) -> usize {
    (point.y as usize + offset) * TENSOR_BOARD_SIZE + (point.x as usize + offset)
}

/// 入力テンソルの特徴量を立てる
#[inline]
pub fn set_feature(row: &mut [f32], pos: usize, feature: usize) {
    debug_assert!(feature < NUM_FEATURES);
    row[pos * NUM_FEATURES + feature] = 1.0;
}

#[inline]
pub fn feature(row: &[f32], pos: usize, feature: usize) -> f32 {
    row[pos * NUM_FEATURES + feature]
}

/// ターゲット領域
#[inline]
pub fn target(row: &[f32]) -> &[f32] {
    &row[INPUT_LEN..INPUT_LEN + TARGET_LEN]
}

/// 重み
#[inline]
pub fn weight(row: &[f32]) -> f32 {
    row[INPUT_LEN + TARGET_LEN]
}

/// マニフェストに記録するレイアウト情報
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RowLayout {
    pub tensor_board_size: usize,
    pub num_features: usize,
    pub input_len: usize,
    pub target_len: usize,
    pub weight_len: usize,
    pub row_len: usize,
}

pub const ROW_LAYOUT: RowLayout = RowLayout {
    tensor_board_size: TENSOR_BOARD_SIZE,
    num_features: NUM_FEATURES,
    input_len: INPUT_LEN,
    target_len: TARGET_LEN,
    weight_len: WEIGHT_LEN,
    row_len: ROW_LEN,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(INPUT_LEN, 4693);
        assert_eq!(TARGET_LEN, 361);
        assert_eq!(ROW_LEN, 5055);
        assert_eq!(plane::KO, NUM_FEATURES - 1);
    }

    #[test]
    fn test_centering_offset() {
        assert_eq!(board_offset(19), 0);
        assert_eq!(board_offset(13), 3);
        assert_eq!(board_offset(9), 5);
        // 9路の中央 (4,4) はテンソルの中央 (9,9)
        assert_eq!(tensor_pos(Point::new(4, 4), board_offset(9)), 9 * 19 + 9);
    }

    #[test]
    fn test_size_filter() {
        assert!(is_supported_board_size(19));
        assert!(!is_supported_board_size(9));
        assert!(!is_supported_board_size(21));
    }
}
