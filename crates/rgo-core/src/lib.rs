//! 囲碁ルールコア
//!
//! 盤面（石・呼吸点・単純コウ）の管理と、局面ハッシュ（Zobrist）を提供する。
//! 学習データ生成で棋譜を再生するための最小限のルールエンジン。

pub mod board;
pub mod types;

pub use board::{Board, BoardError, MAX_BOARD_SIZE};
pub use types::{Color, Move, Point};
