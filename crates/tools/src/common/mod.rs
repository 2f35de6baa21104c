//! 棋譜収集・ファイルI/Oの共通モジュール

pub mod files;
pub mod io;
