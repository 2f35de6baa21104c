//! rgo 学習データツール
//!
//! SGF棋譜のアーカイブから、着手予測モデル用の固定長 `f32` 行データセット
//! （train / test）を生成する。

pub mod common;
pub mod writedata;
