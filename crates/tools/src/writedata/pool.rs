//! train/test 振り分けプール
//!
//! 長さ不明の行ストリームを1行ずつ受け取り、
//! - test: 容量 `test_size` のリザーバに一様無作為抽出（Algorithm R）
//! - train: 容量 `train_pool_size` のバッファに溜め、満杯になったらシャッフルして書き出す
//!
//! メモリは `(train_pool_size + test_size) * row_len` 要素で頭打ちになる。
//! trainのシャッフルはバッファ1杯分（1世代）の中でしか行われず、世代をまたいだ
//! 並べ替えはしない。`train_pool_size` がシャッフル品質とメモリのトレードオフになる。
//!
//! 振り分けは行の内容を見ずに行数と乱数だけで決める。`add_row` は書き込み先の
//! スロットを予約してゼロ埋めした可変スライスを返し、呼び出し側がその場で埋める。

use anyhow::{Result, ensure};
use serde::Serialize;

use super::random::RandomSource;

/// 完成した行グループの書き出し先
///
/// `rows` は行優先で平坦化された `n * row_len` 要素。呼び出しごとに末尾へ追記される。
pub trait RowSink {
    fn append_rows(&mut self, rows: &[f32]) -> Result<()>;
}

impl<T: RowSink + ?Sized> RowSink for &mut T {
    fn append_rows(&mut self, rows: &[f32]) -> Result<()> {
        (**self).append_rows(rows)
    }
}

/// プールの構成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolConfig {
    pub row_len: usize,
    pub train_pool_size: usize,
    pub test_size: usize,
    /// 1回の書き出しの最大行数
    pub chunk_height: usize,
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.row_len > 0, "row_len must be positive");
        ensure!(self.train_pool_size > 0, "train_pool_size must be positive");
        ensure!(self.chunk_height > 0, "chunk_height must be positive");
        Ok(())
    }
}

/// 件数の記録
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub rows_added: u64,
    /// リザーバから追い出されてtrainに回った行数
    pub evictions: u64,
    pub train_rows_flushed: u64,
    pub train_groups_flushed: u64,
    pub test_rows_flushed: u64,
    pub test_groups_flushed: u64,
}

pub struct ShuffleSplitPool<S> {
    config: PoolConfig,
    train: Vec<f32>,
    /// `train` の有効行数
    cursor: usize,
    reservoir: Vec<f32>,
    /// これまでに受け取った行数
    seen: usize,
    /// `None` ならtrain側は閉じている
    train_sink: Option<S>,
    test_written: bool,
    stats: PoolStats,
}

impl<S: RowSink> ShuffleSplitPool<S> {
    pub fn new(config: PoolConfig, train_sink: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            train: vec![0.0; config.train_pool_size * config.row_len],
            cursor: 0,
            reservoir: vec![0.0; config.test_size * config.row_len],
            seen: 0,
            train_sink: Some(train_sink),
            test_written: false,
            stats: PoolStats::default(),
        })
    }

    #[inline]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[inline]
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// trainバッファで書き出し待ちの行数
    #[inline]
    pub fn pending_train_rows(&self) -> usize {
        self.cursor
    }

    /// リザーバの占有行数 `min(test_size, seen)`
    #[inline]
    pub fn reservoir_len(&self) -> usize {
        self.seen.min(self.config.test_size)
    }

    /// リザーバの現在の中身
    pub fn reservoir_rows(&self) -> impl Iterator<Item = &[f32]> {
        let len = self.reservoir_len() * self.config.row_len;
        self.reservoir[..len].chunks_exact(self.config.row_len)
    }

    #[inline]
    pub fn is_train_closed(&self) -> bool {
        self.train_sink.is_none()
    }

    /// 次の行の書き込み先を予約する
    ///
    /// 返るスライスはゼロ埋め済みで、長さは `row_len`。
    /// trainバッファが満杯なら、予約の前にシャッフルして書き出す。
    ///
    /// # Panics
    /// `finish_and_write_train_pool` の後に呼んだ場合
    pub fn add_row(&mut self, rng: &mut RandomSource) -> Result<&mut [f32]> {
        let row_len = self.config.row_len;
        let capacity = self.config.train_pool_size;
        let test_size = self.config.test_size;

        let Some(sink) = self.train_sink.as_mut() else {
            panic!("add_row called after the train pool was closed");
        };
        if self.cursor == capacity {
            let groups = shuffle_and_flush(
                &mut self.train[..capacity * row_len],
                row_len,
                self.config.chunk_height,
                sink,
                rng,
            )?;
            self.stats.train_rows_flushed += capacity as u64;
            self.stats.train_groups_flushed += groups;
            self.cursor = 0;
        }

        let seen = self.seen;
        self.seen += 1;
        self.stats.rows_added += 1;

        let slot = if seen < test_size {
            &mut self.reservoir[seen * row_len..(seen + 1) * row_len]
        } else {
            let r = rng.next_below(seen + 1);
            if r < test_size {
                // 追い出された行は捨てずに、今到着したものとしてtrainへ
                let evicted = &self.reservoir[r * row_len..(r + 1) * row_len];
                let dst = self.cursor * row_len;
                self.train[dst..dst + row_len].copy_from_slice(evicted);
                self.cursor += 1;
                self.stats.evictions += 1;
                &mut self.reservoir[r * row_len..(r + 1) * row_len]
            } else {
                let dst = self.cursor * row_len;
                self.cursor += 1;
                &mut self.train[dst..dst + row_len]
            }
        };
        slot.fill(0.0);
        Ok(slot)
    }

    /// ストリーム終端: trainバッファの残りをシャッフルして書き出し、train側を閉じる
    ///
    /// 書き出し先を返すので、呼び出し側で終端処理（テーブルのクローズ等）を行う。
    ///
    /// # Panics
    /// 2回目以降の呼び出し
    pub fn finish_and_write_train_pool(&mut self, rng: &mut RandomSource) -> Result<S> {
        let Some(mut sink) = self.train_sink.take() else {
            panic!("train pool already finished");
        };
        let row_len = self.config.row_len;
        let pending = self.cursor;
        let groups = shuffle_and_flush(
            &mut self.train[..pending * row_len],
            row_len,
            self.config.chunk_height,
            &mut sink,
            rng,
        )?;
        self.stats.train_rows_flushed += pending as u64;
        self.stats.train_groups_flushed += groups;
        self.cursor = 0;
        self.train = Vec::new();
        Ok(sink)
    }

    /// リザーバをシャッフルしてtest側へ書き出す
    ///
    /// # Panics
    /// train側を閉じる前、または2回目以降の呼び出し
    pub fn write_test_pool<T: RowSink>(&mut self, sink: &mut T, rng: &mut RandomSource) -> Result<()> {
        assert!(self.is_train_closed(), "test pool written before the train pool was finished");
        assert!(!self.test_written, "test pool already written");
        let row_len = self.config.row_len;
        let len = self.reservoir_len();
        let groups = shuffle_and_flush(
            &mut self.reservoir[..len * row_len],
            row_len,
            self.config.chunk_height,
            sink,
            rng,
        )?;
        self.stats.test_rows_flushed += len as u64;
        self.stats.test_groups_flushed += groups;
        self.test_written = true;

        debug_assert_eq!(
            self.stats.train_rows_flushed + self.stats.test_rows_flushed,
            self.stats.rows_added
        );
        Ok(())
    }
}

/// 行単位でシャッフルし、`chunk_height` 行ずつ書き出す。書き出したグループ数を返す。
fn shuffle_and_flush<S: RowSink>(
    rows: &mut [f32],
    row_len: usize,
    chunk_height: usize,
    sink: &mut S,
    rng: &mut RandomSource,
) -> Result<u64> {
    shuffle_rows(rows, row_len, rng);
    let mut groups = 0;
    for group in rows.chunks(chunk_height * row_len) {
        sink.append_rows(group)?;
        groups += 1;
    }
    Ok(groups)
}

/// 平坦化された行列の行を Fisher–Yates で並べ替える
fn shuffle_rows(rows: &mut [f32], row_len: usize, rng: &mut RandomSource) {
    debug_assert_eq!(rows.len() % row_len, 0);
    let n = rows.len() / row_len;
    for i in (1..n).rev() {
        let j = rng.next_below(i + 1);
        if i != j {
            let (head, tail) = rows.split_at_mut(i * row_len);
            head[j * row_len..(j + 1) * row_len].swap_with_slice(&mut tail[..row_len]);
        }
    }
}
