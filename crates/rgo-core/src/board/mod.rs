//! 盤面モジュール
//!
//! - `Board`: 交点ごとの石、単純コウの禁止点、Zobristハッシュ
//! - `set_stone`: 置き石（初期配置）の設置
//! - `play_move`: 着手（取り・自殺手判定・コウ判定を含む）
//! - `num_liberties` / `liberty_map`: 連の呼吸点数
//!
//! 石とハッシュは `set_stone` / `play_move` を通じてのみ更新され、常に整合している。
//! 不正な操作はエラーを返し、盤面を変更しない。

mod zobrist;

use std::fmt;

use crate::types::{Color, Point};
pub use zobrist::{ZOBRIST, Zobrist};

/// 扱える最大の盤サイズ
pub const MAX_BOARD_SIZE: usize = 25;

/// 盤面操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("point ({}, {}) is off the {size}x{size} board", .point.x, .point.y)]
    OffBoard { point: Point, size: usize },
    #[error("point ({}, {}) is already occupied", .point.x, .point.y)]
    Occupied { point: Point },
    #[error("point ({}, {}) is forbidden by simple ko", .point.x, .point.y)]
    Ko { point: Point },
    #[error("move at ({}, {}) is suicide", .point.x, .point.y)]
    Suicide { point: Point },
    #[error("placement at ({}, {}) leaves a group without liberties", .point.x, .point.y)]
    NoLiberties { point: Point },
}

/// 盤面
#[derive(Clone, PartialEq, Eq)]
pub struct Board {
    size: usize,
    stones: Vec<Option<Color>>,
    ko_point: Option<Point>,
    pos_hash: u64,
}

/// 上下左右の隣接交点（最大4つ）
#[inline]
fn neighbors(idx: usize, size: usize) -> impl Iterator<Item = usize> {
    let x = idx % size;
    let y = idx / size;
    let mut out = [0usize; 4];
    let mut n = 0;
    if x > 0 {
        out[n] = idx - 1;
        n += 1;
    }
    if x + 1 < size {
        out[n] = idx + 1;
        n += 1;
    }
    if y > 0 {
        out[n] = idx - size;
        n += 1;
    }
    if y + 1 < size {
        out[n] = idx + size;
        n += 1;
    }
    out.into_iter().take(n)
}

impl Board {
    /// 空の盤面を作成
    ///
    /// # Panics
    /// `size` が `1..=MAX_BOARD_SIZE` の範囲外の場合
    pub fn new(size: usize) -> Self {
        assert!(
            (1..=MAX_BOARD_SIZE).contains(&size),
            "board size {size} out of range 1..={MAX_BOARD_SIZE}"
        );
        Self {
            size,
            stones: vec![None; size * size],
            ko_point: None,
            pos_hash: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// 交点の石（盤外は `None`）
    #[inline]
    pub fn stone_at(&self, point: Point) -> Option<Color> {
        if point.is_on_board(self.size) {
            self.stones[point.index(self.size)]
        } else {
            None
        }
    }

    /// 単純コウで着手が禁止されている交点
    #[inline]
    pub fn ko_point(&self) -> Option<Point> {
        self.ko_point
    }

    /// 石の配置のみから計算したZobristハッシュ
    #[inline]
    pub fn pos_hash(&self) -> u64 {
        self.pos_hash
    }

    fn check_empty_on_board(&self, point: Point) -> Result<usize, BoardError> {
        if !point.is_on_board(self.size) {
            return Err(BoardError::OffBoard {
                point,
                size: self.size,
            });
        }
        let idx = point.index(self.size);
        if self.stones[idx].is_some() {
            return Err(BoardError::Occupied { point });
        }
        Ok(idx)
    }

    #[inline]
    fn put(&mut self, idx: usize, color: Color) {
        debug_assert!(self.stones[idx].is_none());
        self.stones[idx] = Some(color);
        self.pos_hash ^= ZOBRIST.stone(self.size, idx, color);
    }

    #[inline]
    fn remove(&mut self, idx: usize) {
        if let Some(color) = self.stones[idx].take() {
            self.pos_hash ^= ZOBRIST.stone(self.size, idx, color);
        }
    }

    /// `start` を含む連の石と呼吸点数
    fn group(&self, start: usize) -> (Vec<usize>, u32) {
        let color = self.stones[start];
        debug_assert!(color.is_some());
        let n = self.stones.len();
        let mut members = vec![start];
        let mut in_group = vec![false; n];
        let mut is_liberty = vec![false; n];
        in_group[start] = true;
        let mut libs = 0;

        let mut i = 0;
        while i < members.len() {
            let cur = members[i];
            i += 1;
            for nb in neighbors(cur, self.size) {
                match self.stones[nb] {
                    None => {
                        if !is_liberty[nb] {
                            is_liberty[nb] = true;
                            libs += 1;
                        }
                    }
                    c if c == color => {
                        if !in_group[nb] {
                            in_group[nb] = true;
                            members.push(nb);
                        }
                    }
                    _ => {}
                }
            }
        }
        (members, libs)
    }

    /// 交点の石が属する連の呼吸点数（空点は0）
    pub fn num_liberties(&self, point: Point) -> u32 {
        if !point.is_on_board(self.size) {
            return 0;
        }
        let idx = point.index(self.size);
        if self.stones[idx].is_none() {
            return 0;
        }
        self.group(idx).1
    }

    /// 全交点について、石が属する連の呼吸点数を一括計算（空点は0）
    ///
    /// 交点ごとに `num_liberties` を呼ぶと同じ連を何度も辿るため、
    /// 特徴量抽出ではこちらを使う。
    pub fn liberty_map(&self) -> Vec<u32> {
        let mut libs = vec![0u32; self.stones.len()];
        let mut done = vec![false; self.stones.len()];
        for idx in 0..self.stones.len() {
            if done[idx] || self.stones[idx].is_none() {
                continue;
            }
            let (members, count) = self.group(idx);
            for m in members {
                done[m] = true;
                libs[m] = count;
            }
        }
        libs
    }

    /// 置き石を設置する
    ///
    /// 設置の結果、自分または隣接する相手の連の呼吸点が無くなる場合はエラーとし、盤面を戻す。
    pub fn set_stone(&mut self, point: Point, color: Color) -> Result<(), BoardError> {
        let idx = self.check_empty_on_board(point)?;
        self.put(idx, color);

        let starved = self.group(idx).1 == 0
            || neighbors(idx, self.size)
                .any(|nb| self.stones[nb] == Some(!color) && self.group(nb).1 == 0);
        if starved {
            self.remove(idx);
            return Err(BoardError::NoLiberties { point });
        }
        Ok(())
    }

    /// 着手する（`None` はパス）
    ///
    /// 取られた相手の連を盤から除き、単純コウの禁止点を更新する。
    /// 自殺手・コウ・着手済みの交点への着手はエラーとし、盤面を変更しない。
    pub fn play_move(&mut self, loc: Option<Point>, color: Color) -> Result<(), BoardError> {
        let Some(point) = loc else {
            self.ko_point = None;
            return Ok(());
        };
        let idx = self.check_empty_on_board(point)?;
        if self.ko_point == Some(point) {
            return Err(BoardError::Ko { point });
        }

        self.put(idx, color);

        let mut captured = 0usize;
        let mut last_captured = idx;
        for nb in neighbors(idx, self.size) {
            if self.stones[nb] != Some(!color) {
                continue;
            }
            let (members, libs) = self.group(nb);
            if libs == 0 {
                captured += members.len();
                last_captured = members[0];
                for m in members {
                    self.remove(m);
                }
            }
        }

        let (own, own_libs) = self.group(idx);
        if own_libs == 0 {
            debug_assert_eq!(captured, 0);
            self.remove(idx);
            return Err(BoardError::Suicide { point });
        }

        self.ko_point = if captured == 1 && own.len() == 1 && own_libs == 1 {
            Some(Point::from_index(last_captured, self.size))
        } else {
            None
        };
        Ok(())
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   ")?;
        for x in 0..self.size {
            let p = Point::new(x as u8, 0);
            let label = p.to_gtp(self.size);
            write!(f, "{}", &label[..1])?;
        }
        writeln!(f)?;
        for y in 0..self.size {
            write!(f, "{:>2} ", self.size - y)?;
            for x in 0..self.size {
                let p = Point::new(x as u8, y as u8);
                let c = match self.stones[p.index(self.size)] {
                    Some(color) => color.to_char(),
                    None if self.ko_point == Some(p) => '*',
                    None => '.',
                };
                write!(f, "{c}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Board(size={}, hash={:016x})", self.size, self.pos_hash)?;
        write!(f, "{self}")
    }
}
