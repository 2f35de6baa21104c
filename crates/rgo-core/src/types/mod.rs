//! 基本型（手番・座標・指し手）

mod color;
mod point;

pub use color::Color;
pub use point::{Move, Point, PointParseError};
