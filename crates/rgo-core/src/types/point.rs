//! 盤上の座標（Point）と指し手（Move）

use std::fmt;

use super::Color;

/// GTP表記の列文字（`I` は使わない）
const GTP_COLUMNS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

/// 盤上の座標
///
/// `x` は左から、`y` は上から数える 0 始まりの値（SGFと同じ向き）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub x: u8,
    pub y: u8,
}

/// GTP表記の解析エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PointParseError {
    #[error("empty coordinate")]
    Empty,
    #[error("invalid column in coordinate: {0}")]
    Column(String),
    #[error("invalid row in coordinate: {0}")]
    Row(String),
}

impl Point {
    #[inline]
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// 一辺 `size` の盤上にあるか
    #[inline]
    pub const fn is_on_board(self, size: usize) -> bool {
        (self.x as usize) < size && (self.y as usize) < size
    }

    /// 一辺 `size` の盤での行優先インデックス
    #[inline]
    pub const fn index(self, size: usize) -> usize {
        self.y as usize * size + self.x as usize
    }

    /// 行優先インデックスから座標を復元
    #[inline]
    pub const fn from_index(idx: usize, size: usize) -> Self {
        Self {
            x: (idx % size) as u8,
            y: (idx / size) as u8,
        }
    }

    /// GTP表記（例: `"D4"`、`A1` が左下）から変換
    pub fn from_gtp(s: &str, size: usize) -> Result<Self, PointParseError> {
        let s = s.trim();
        let mut chars = s.chars();
        let col = chars.next().ok_or(PointParseError::Empty)?.to_ascii_uppercase();
        let x = GTP_COLUMNS
            .iter()
            .position(|&c| c as char == col)
            .filter(|&x| x < size)
            .ok_or_else(|| PointParseError::Column(s.to_string()))?;
        let row: usize = chars.as_str().parse().map_err(|_| PointParseError::Row(s.to_string()))?;
        if row == 0 || row > size {
            return Err(PointParseError::Row(s.to_string()));
        }
        Ok(Self::new(x as u8, (size - row) as u8))
    }

    /// GTP表記に変換
    pub fn to_gtp(self, size: usize) -> String {
        format!("{}{}", GTP_COLUMNS[self.x as usize] as char, size - self.y as usize)
    }
}

/// 指し手（`loc == None` はパス）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub color: Color,
    pub loc: Option<Point>,
}

impl Move {
    #[inline]
    pub const fn play(color: Color, point: Point) -> Self {
        Self {
            color,
            loc: Some(point),
        }
    }

    #[inline]
    pub const fn pass(color: Color) -> Self {
        Self { color, loc: None }
    }

    #[inline]
    pub const fn is_pass(&self) -> bool {
        self.loc.is_none()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.color {
            Color::Black => 'B',
            Color::White => 'W',
        };
        match self.loc {
            Some(p) => write!(f, "{side}[{},{}]", p.x, p.y),
            None => write!(f, "{side}[pass]"),
        }
    }
}
