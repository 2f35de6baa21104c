//! SGF → train/test データセット生成
//!
//! - `random`: 注入可能なシード付き乱数源
//! - `features`: 行レイアウト（特徴量プレーン・ターゲット・重み）
//! - `encoder`: 棋譜を再生して1手ごとに1行を書き込む
//! - `pool`: 有界メモリでのtest抽出（リザーバサンプリング）とtrainシャッフル
//! - `store`: チャンク分割・圧縮された追記専用の2次元テーブル
//! - `manifest`: 生成条件と件数の記録

pub mod encoder;
pub mod features;
pub mod manifest;
pub mod pool;
pub mod random;
pub mod store;

pub use encoder::{GameReplayEncoder, ReplayStats};
pub use pool::{PoolConfig, PoolStats, RowSink, ShuffleSplitPool};
pub use random::RandomSource;
pub use store::{MemoryTable, StoreOptions, Table, TableWriter};
