//! 棋譜の再生と行の書き込み
//!
//! 置き石を並べ、着手列を盤面に適用しながら、パス以外の各着手について
//! 「着手前の局面 + その着手」を1行としてプールに書き込む。
//!
//! ルール違反（不正な置き石・着手、同じ手番の連続）はその棋譜だけを打ち切る。
//! それまでに書いた行は有効なまま残す。

use std::collections::HashSet;

use anyhow::Result;
use rgo_core::{Board, Color, Move, Point};
use serde::Serialize;

use super::features::{
    INPUT_LEN, PREV_MOVE_KEEP_PROB, ROW_LEN, TARGET_LEN, board_offset,
    is_supported_board_size, plane, set_feature, tensor_pos,
};
use super::pool::{RowSink, ShuffleSplitPool};
use super::random::RandomSource;

/// 再生の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub games: u64,
    /// 対象外の盤サイズで読み飛ばした棋譜
    pub skipped_board_size: u64,
    pub illegal_placement: u64,
    pub illegal_move: u64,
    pub same_side_in_a_row: u64,
    pub rows: u64,
}

#[derive(Default)]
pub struct GameReplayEncoder {
    pos_hashes: HashSet<u64>,
    stats: ReplayStats,
}

impl GameReplayEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// 行を書いた局面（着手前）の異なるハッシュの数
    #[inline]
    pub fn distinct_positions(&self) -> usize {
        self.pos_hashes.len()
    }

    /// 1局を再生して行を書き込み、書いた行数を返す
    ///
    /// エラーはプールの書き出し失敗のみ。ルール違反はログに残して打ち切る。
    pub fn encode_game<S: RowSink>(
        &mut self,
        file_name: &str,
        board_size: usize,
        placements: &[Move],
        moves: &[Move],
        pool: &mut ShuffleSplitPool<S>,
        rng: &mut RandomSource,
    ) -> Result<usize> {
        debug_assert_eq!(pool.config().row_len, ROW_LEN);
        self.stats.games += 1;
        if !is_supported_board_size(board_size) {
            self.stats.skipped_board_size += 1;
            return Ok(0);
        }

        let mut board = Board::new(board_size);
        for (i, m) in placements.iter().enumerate() {
            let Some(point) = m.loc else { continue };
            if let Err(e) = board.set_stone(point, m.color) {
                log::warn!("{file_name}: illegal stone placement {i}: {e}\n{board}");
                self.stats.illegal_placement += 1;
                return Ok(0);
            }
        }

        // 置き石を同じ手番の連続着手で表す棋譜がある
        let mut idx = 0;
        if moves.len() > 1 && moves[0].color == moves[1].color {
            let lead = moves[0].color;
            while idx < moves.len() && moves[idx].color == lead {
                if let Err(e) = board.play_move(moves[idx].loc, lead) {
                    log::warn!("{file_name}: illegal handicap move {idx}: {e}\n{board}");
                    self.stats.illegal_move += 1;
                    return Ok(0);
                }
                idx += 1;
            }
        }

        let mut rows = 0;
        let mut prev_color: Option<Color> = None;
        while idx < moves.len() {
            let m = moves[idx];
            if prev_color == Some(m.color) {
                log::warn!("{file_name}: multiple moves in a row by same player at {idx}\n{board}");
                self.stats.same_side_in_a_row += 1;
                break;
            }

            if !m.is_pass() {
                let row = pool.add_row(rng)?;
                fill_row(&board, moves, idx, row, rng);
                self.pos_hashes.insert(board.pos_hash());
                rows += 1;
            }

            // 行は着手前の局面から作るので、不正な手でもその手の行は残る
            if let Err(e) = board.play_move(m.loc, m.color) {
                log::warn!("{file_name}: illegal move {idx}: {e}\n{board}");
                self.stats.illegal_move += 1;
                break;
            }

            prev_color = Some(m.color);
            idx += 1;
        }

        self.stats.rows += rows as u64;
        Ok(rows)
    }
}

/// 着手前の盤面 `board` と `moves[next_idx]` から1行を埋める
///
/// `row` はゼロ埋め済みであること。直前の手の特徴は確率的に含める。
/// 2手前・3手前の乱数は、1つ新しい手を含めた場合にだけ引く。
pub fn fill_row(
    board: &Board,
    moves: &[Move],
    next_idx: usize,
    row: &mut [f32],
    rng: &mut RandomSource,
) {
    debug_assert_eq!(row.len(), ROW_LEN);
    let next = moves[next_idx];
    let Some(target) = next.loc else {
        panic!("fill_row called for a pass");
    };
    let pla = next.color;
    let size = board.size();
    let offset = board_offset(size);
    let libs = board.liberty_map();

    for idx in 0..size * size {
        let point = Point::from_index(idx, size);
        let pos = tensor_pos(point, offset);
        set_feature(row, pos, plane::ON_BOARD);

        let Some(stone) = board.stone_at(point) else {
            continue;
        };
        let (stone_plane, lib_plane) = if stone == pla {
            (plane::OWN_STONE, plane::OWN_LIBERTIES)
        } else {
            (plane::OPP_STONE, plane::OPP_LIBERTIES)
        };
        set_feature(row, pos, stone_plane);
        if let l @ 1..=3 = libs[idx] {
            set_feature(row, pos, lib_plane + l as usize - 1);
        }
    }

    let include1 = rng.next_double() < PREV_MOVE_KEEP_PROB[0];
    let include2 = include1 && rng.next_double() < PREV_MOVE_KEEP_PROB[1];
    let include3 = include2 && rng.next_double() < PREV_MOVE_KEEP_PROB[2];
    for (back, include) in [include1, include2, include3].into_iter().enumerate() {
        let back = back + 1;
        if !include || next_idx < back {
            break;
        }
        // 手番が交互になっている範囲だけを遡る
        let prev = moves[next_idx - back];
        let expected = if back % 2 == 1 { !pla } else { pla };
        if prev.color != expected {
            break;
        }
        if let Some(p) = prev.loc {
            set_feature(row, tensor_pos(p, offset), plane::PREV_MOVES + back - 1);
        }
    }

    if let Some(ko) = board.ko_point() {
        set_feature(row, tensor_pos(ko, offset), plane::KO);
    }

    row[INPUT_LEN + tensor_pos(target, offset)] = 1.0;
    row[INPUT_LEN + TARGET_LEN] = 1.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writedata::features::{TENSOR_BOARD_SIZE, feature, target, weight};
    use crate::writedata::pool::PoolConfig;
    use crate::writedata::store::MemoryTable;

    const N: usize = TENSOR_BOARD_SIZE * TENSOR_BOARD_SIZE;

    fn pt(s: &str) -> Point {
        Point::from_gtp(s, 19).unwrap()
    }

    fn b(s: &str) -> Move {
        Move::play(Color::Black, pt(s))
    }

    fn w(s: &str) -> Move {
        Move::play(Color::White, pt(s))
    }

    fn pool(train_pool_size: usize) -> ShuffleSplitPool<MemoryTable> {
        let cfg = PoolConfig {
            row_len: ROW_LEN,
            train_pool_size,
            test_size: 0,
            chunk_height: train_pool_size,
        };
        ShuffleSplitPool::new(cfg, MemoryTable::new(ROW_LEN)).unwrap()
    }

    /// 1局を再生し、書かれた行を返す（シャッフル後の順序）
    fn encode(
        size: usize,
        placements: &[Move],
        moves: &[Move],
        seed: u64,
    ) -> (usize, MemoryTable, GameReplayEncoder) {
        let mut rng = RandomSource::new(seed);
        let mut pool = pool(10);
        let mut enc = GameReplayEncoder::new();
        let n = enc
            .encode_game("test.sgf", size, placements, moves, &mut pool, &mut rng)
            .unwrap();
        let table = pool.finish_and_write_train_pool(&mut rng).unwrap();
        (n, table, enc)
    }

    fn plane_count(row: &[f32], f: usize) -> usize {
        (0..N).filter(|&pos| feature(row, pos, f) == 1.0).count()
    }

    fn target_pos(row: &[f32]) -> usize {
        let t = target(row);
        assert_eq!(t.iter().filter(|&&v| v == 1.0).count(), 1);
        t.iter().position(|&v| v == 1.0).unwrap()
    }

    /// 単独の石の行（着手前の石の数で識別）
    fn row_with_stones(table: &MemoryTable, stones: usize) -> &[f32] {
        table
            .rows()
            .find(|r| plane_count(r, plane::OWN_STONE) + plane_count(r, plane::OPP_STONE) == stones)
            .unwrap()
    }

    fn row_with_target<'a>(table: &'a MemoryTable, s: &str) -> &'a [f32] {
        let pos = tensor_pos(pt(s), 0);
        table.rows().find(|r| target_pos(r) == pos).unwrap()
    }

    #[test]
    fn test_three_move_game() {
        let moves = [b("A1"), w("B2"), b("C3")];
        let (n, table, enc) = encode(19, &[], &moves, 1);
        assert_eq!(n, 3);
        assert_eq!(table.num_rows(), 3);
        for row in table.rows() {
            assert_eq!(plane_count(row, plane::ON_BOARD), N);
            assert_eq!(weight(row), 1.0);
        }

        let first = row_with_stones(&table, 0);
        assert_eq!(target_pos(first), tensor_pos(pt("A1"), 0));

        let second = row_with_stones(&table, 1);
        assert_eq!(target_pos(second), tensor_pos(pt("B2"), 0));
        // 白番から見て A1 は相手の石（呼吸点2）
        assert_eq!(feature(second, tensor_pos(pt("A1"), 0), plane::OPP_STONE), 1.0);
        assert_eq!(feature(second, tensor_pos(pt("A1"), 0), plane::OPP_LIBERTIES + 1), 1.0);
        assert_eq!(plane_count(second, plane::OWN_STONE), 0);

        let third = row_with_stones(&table, 2);
        assert_eq!(target_pos(third), tensor_pos(pt("C3"), 0));
        assert_eq!(feature(third, tensor_pos(pt("A1"), 0), plane::OWN_STONE), 1.0);
        assert_eq!(feature(third, tensor_pos(pt("B2"), 0), plane::OPP_STONE), 1.0);
        assert_eq!(feature(third, tensor_pos(pt("B2"), 0), plane::OPP_LIBERTIES), 0.0);

        assert_eq!(enc.stats().rows, 3);
        assert_eq!(enc.distinct_positions(), 3);
    }

    #[test]
    fn test_passes_emit_no_rows() {
        let moves = [b("D4"), Move::pass(Color::White), b("Q16"), Move::pass(Color::White)];
        let (n, table, _) = encode(19, &[], &moves, 2);
        assert_eq!(n, 2);
        assert_eq!(table.num_rows(), 2);
    }

    #[test]
    fn test_unsupported_board_size_yields_nothing() {
        let moves = [
            Move::play(Color::Black, Point::new(2, 2)),
            Move::play(Color::White, Point::new(3, 3)),
        ];
        let (n, table, enc) = encode(9, &[], &moves, 3);
        assert_eq!(n, 0);
        assert_eq!(table.num_rows(), 0);
        assert_eq!(enc.stats().skipped_board_size, 1);
        assert_eq!(enc.stats().games, 1);
    }

    #[test]
    fn test_same_side_twice_stops_game_but_keeps_rows() {
        let moves = [b("D4"), w("Q16"), w("Q4"), b("D16")];
        let (n, table, enc) = encode(19, &[], &moves, 4);
        assert_eq!(n, 2);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(enc.stats().same_side_in_a_row, 1);
    }

    #[test]
    fn test_leading_run_is_handicap() {
        let moves = [b("D4"), b("Q16"), w("Q4"), b("D16")];
        let (n, table, _) = encode(19, &[], &moves, 5);
        assert_eq!(n, 2);
        // 白の1手目の時点で黒石2つが盤上にある
        let first = row_with_stones(&table, 2);
        assert_eq!(target_pos(first), tensor_pos(pt("Q4"), 0));
        assert_eq!(plane_count(first, plane::OPP_STONE), 2);
    }

    #[test]
    fn test_white_leading_run_is_handicap() {
        let moves = [w("D4"), w("Q16"), b("Q4"), w("D16")];
        let (n, table, enc) = encode(19, &[], &moves, 14);
        assert_eq!(n, 2);
        let first = row_with_stones(&table, 2);
        assert_eq!(target_pos(first), tensor_pos(pt("Q4"), 0));
        // 黒番から見て白石2つ
        assert_eq!(plane_count(first, plane::OPP_STONE), 2);
        assert_eq!(plane_count(first, plane::OWN_STONE), 0);
        assert_eq!(enc.stats().same_side_in_a_row, 0);
    }

    #[test]
    fn test_illegal_move_in_leading_run_aborts_game() {
        let moves = [b("D4"), b("D4"), w("Q4")];
        let (n, table, enc) = encode(19, &[], &moves, 15);
        assert_eq!(n, 0);
        assert_eq!(table.num_rows(), 0);
        assert_eq!(enc.stats().illegal_move, 1);
        assert_eq!(enc.stats().rows, 0);
        assert_eq!(enc.distinct_positions(), 0);
    }

    #[test]
    fn test_placements_are_applied() {
        let placements = [b("D4"), b("Q16")];
        let moves = [w("Q4"), b("D16")];
        let (n, table, _) = encode(19, &placements, &moves, 6);
        assert_eq!(n, 2);
        let first = row_with_stones(&table, 2);
        assert_eq!(feature(first, tensor_pos(pt("D4"), 0), plane::OPP_STONE), 1.0);
    }

    #[test]
    fn test_illegal_placement_aborts_game() {
        let placements = [b("D4"), w("D4")];
        let (n, _, enc) = encode(19, &placements, &[b("A1")], 7);
        assert_eq!(n, 0);
        assert_eq!(enc.stats().illegal_placement, 1);
    }

    #[test]
    fn test_illegal_move_stops_game() {
        let moves = [b("D4"), w("D4"), b("Q16")];
        let (n, table, enc) = encode(19, &[], &moves, 8);
        // 不正な手の行までは書かれ、その後は書かれない
        assert_eq!(n, 2);
        assert_eq!(table.num_rows(), 2);
        assert!(table.rows().all(|r| target_pos(r) == tensor_pos(pt("D4"), 0)));
        assert_eq!(enc.stats().illegal_move, 1);
        assert_eq!(enc.stats().rows, 2);
    }

    #[test]
    fn test_liberty_planes() {
        // 黒 A1 は白 B1 に接して呼吸点1、白 B1 は呼吸点2
        let placements = [b("A1"), w("B1")];
        let moves = [w("A2"), b("T19")];
        let (_, table, _) = encode(19, &placements, &moves, 9);
        let row = row_with_target(&table, "A2");
        // 白番から見て
        assert_eq!(feature(row, tensor_pos(pt("A1"), 0), plane::OPP_LIBERTIES), 1.0);
        assert_eq!(feature(row, tensor_pos(pt("B1"), 0), plane::OWN_LIBERTIES + 1), 1.0);
        assert_eq!(plane_count(row, plane::OWN_LIBERTIES), 0);
    }

    #[test]
    fn test_ko_plane() {
        // 黒がコウを取った直後の白番
        let placements = [b("B19"), b("A18"), b("B17"), w("C19"), w("D18"), w("C17"), w("B18")];
        let moves = [b("C18"), w("Q16")];
        let (n, table, _) = encode(19, &placements, &moves, 10);
        assert_eq!(n, 2);
        let after_capture = row_with_target(&table, "Q16");
        assert_eq!(plane_count(after_capture, plane::KO), 1);
        assert_eq!(feature(after_capture, tensor_pos(pt("B18"), 0), plane::KO), 1.0);

        let before = row_with_target(&table, "C18");
        assert_eq!(plane_count(before, plane::KO), 0);
    }

    #[test]
    fn test_history_planes_frequency() {
        // 4手目の行で 1,2,3手前の特徴がそれぞれ 0.9, 0.855, 0.812 の頻度で立つ
        let moves = [b("D4"), w("Q16"), b("Q4"), w("D16")];
        let board = {
            let mut board = Board::new(19);
            for m in &moves[..3] {
                board.play_move(m.loc, m.color).unwrap();
            }
            board
        };
        let mut rng = RandomSource::new(11);
        let trials = 20_000;
        let mut counts = [0usize; 3];
        let mut row = vec![0.0f32; ROW_LEN];
        for _ in 0..trials {
            row.fill(0.0);
            fill_row(&board, &moves, 3, &mut row, &mut rng);
            for (k, c) in counts.iter_mut().enumerate() {
                let prev = moves[2 - k].loc.unwrap();
                if feature(&row, tensor_pos(prev, 0), plane::PREV_MOVES + k) == 1.0 {
                    *c += 1;
                }
            }
            // 3手より前は存在しないので他の点には立たない
            assert!(plane_count(&row, plane::PREV_MOVES) <= 1);
        }
        let expected = [0.9, 0.9 * 0.95, 0.9 * 0.95 * 0.95];
        for k in 0..3 {
            let freq = counts[k] as f64 / trials as f64;
            assert!((freq - expected[k]).abs() < 0.015, "plane {k}: {freq}");
        }
    }

    #[test]
    fn test_history_skips_passes_and_breaks_on_same_side() {
        let moves = [b("D4"), Move::pass(Color::White), b("Q4"), w("D16")];
        let mut board = Board::new(19);
        for m in &moves[..3] {
            board.play_move(m.loc, m.color).unwrap();
        }
        let mut rng = RandomSource::new(12);
        let mut row = vec![0.0f32; ROW_LEN];
        for _ in 0..200 {
            row.fill(0.0);
            fill_row(&board, &moves, 3, &mut row, &mut rng);
            // 2手前はパスなので立たない
            assert_eq!(plane_count(&row, plane::PREV_MOVES + 1), 0);
        }

        // 手番が交互でない履歴は遡らない
        let moves = [b("D4"), b("Q4"), w("D16")];
        let mut row = vec![0.0f32; ROW_LEN];
        for _ in 0..200 {
            row.fill(0.0);
            fill_row(&board, &moves, 2, &mut row, &mut rng);
            assert_eq!(plane_count(&row, plane::PREV_MOVES + 1), 0);
        }
    }

    #[test]
    fn test_deterministic_rows_for_seed() {
        let moves = [b("D4"), w("Q16"), b("Q4"), w("D16"), b("C3")];
        let (_, a, _) = encode(19, &[], &moves, 13);
        let (_, b2, _) = encode(19, &[], &moves, 13);
        assert_eq!(a.data(), b2.data());
    }
}
