//! 生成条件と件数のマニフェスト（`<output>.manifest.json`）

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use super::encoder::ReplayStats;
use super::features::{ROW_LAYOUT, RowLayout};
use super::pool::{PoolConfig, PoolStats};
use super::store::{FORMAT_VERSION, StoreOptions};

#[derive(Debug, Clone, Serialize)]
pub struct DatasetManifest {
    /// RFC 3339（ローカル時刻）
    pub created_at: String,
    pub format_version: u32,
    pub seed: u64,
    pub games_dirs: Vec<PathBuf>,
    pub output: PathBuf,
    pub files_found: usize,
    /// 読み込み・解析に失敗したファイル
    pub files_skipped: usize,
    pub layout: RowLayout,
    pub pool: PoolConfig,
    pub store: StoreOptions,
    pub replay: ReplayStats,
    pub pool_stats: PoolStats,
    pub distinct_positions: usize,
    pub train_rows: u64,
    pub test_rows: u64,
}

impl DatasetManifest {
    /// 件数以外の項目を埋めた状態で作る
    pub fn new(seed: u64, games_dirs: Vec<PathBuf>, output: PathBuf, pool: PoolConfig, store: StoreOptions) -> Self {
        Self {
            created_at: chrono::Local::now().to_rfc3339(),
            format_version: FORMAT_VERSION,
            seed,
            games_dirs,
            output,
            files_found: 0,
            files_skipped: 0,
            layout: ROW_LAYOUT,
            pool,
            store,
            replay: ReplayStats::default(),
            pool_stats: PoolStats::default(),
            distinct_positions: 0,
            train_rows: 0,
            test_rows: 0,
        }
    }
}

pub fn write_manifest(path: &Path, manifest: &DatasetManifest) -> Result<()> {
    let f = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut w = BufWriter::new(f);
    serde_json::to_writer_pretty(&mut w, manifest)?;
    writeln!(w)?;
    w.flush()?;
    Ok(())
}
