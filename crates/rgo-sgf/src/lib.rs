//! SGF棋譜パーサー
//!
//! 学習データ生成に必要な情報（盤サイズ・置き石・着手列）だけを取り出す。
//! 変化図は本譜（各分岐の最初の子）のみを辿る。

use rgo_core::{Color, Move, Point};

/// 盤サイズ指定が無い場合の既定値
pub const DEFAULT_BOARD_SIZE: usize = 19;

/// SGF座標で表現できる最大の盤サイズ（`a-z` + `A-Z`）
const MAX_SGF_SIZE: usize = 52;

/// SGF解析エラー
#[derive(Debug, thiserror::Error)]
pub enum SgfError {
    #[error("syntax error at byte {pos}: {msg}")]
    Syntax { pos: usize, msg: &'static str },
    #[error("invalid board size: {0}")]
    BoardSize(String),
    #[error("invalid point `{value}` for board size {size}")]
    Point { value: String, size: usize },
    #[error("unsupported property {0}")]
    Unsupported(&'static str),
}

/// ノード（プロパティ列）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SgfNode {
    pub props: Vec<(String, Vec<String>)>,
}

impl SgfNode {
    /// プロパティの値（最初に現れたもの）
    pub fn get(&self, id: &str) -> Option<&[String]> {
        self.props.iter().find(|(k, _)| k == id).map(|(_, v)| v.as_slice())
    }
}

/// 本譜のノード列
#[derive(Debug, Clone)]
pub struct Sgf {
    pub file_name: String,
    pub nodes: Vec<SgfNode>,
}

impl Sgf {
    /// 文字列から解析する
    pub fn parse(text: &str, file_name: &str) -> Result<Self, SgfError> {
        let mut parser = Parser {
            src: text.as_bytes(),
            pos: 0,
        };
        parser.skip_ws();
        if parser.peek().is_none() {
            return Err(parser.error("empty input"));
        }
        let mut nodes = Vec::new();
        parser.game_tree(&mut nodes)?;
        if nodes.is_empty() {
            return Err(parser.error("game tree has no nodes"));
        }
        Ok(Self {
            file_name: file_name.to_string(),
            nodes,
        })
    }

    fn root(&self) -> &SgfNode {
        &self.nodes[0]
    }

    /// 盤サイズ（`SZ`、未指定なら19）
    ///
    /// 長方形盤（`SZ[w:h]` で w != h）はエラー。
    pub fn board_size(&self) -> Result<usize, SgfError> {
        let Some(values) = self.root().get("SZ") else {
            return Ok(DEFAULT_BOARD_SIZE);
        };
        let raw = values.first().map(|s| s.trim()).unwrap_or_default();
        let parse = |s: &str| {
            s.trim()
                .parse::<usize>()
                .ok()
                .filter(|&n| (1..=MAX_SGF_SIZE).contains(&n))
                .ok_or_else(|| SgfError::BoardSize(raw.to_string()))
        };
        match raw.split_once(':') {
            Some((w, h)) => {
                let (w, h) = (parse(w)?, parse(h)?);
                if w != h {
                    return Err(SgfError::BoardSize(raw.to_string()));
                }
                Ok(w)
            }
            None => parse(raw),
        }
    }

    /// 置き石（本譜上の全ノードの `AB` / `AW`、出現順）
    pub fn placements(&self, size: usize) -> Result<Vec<Move>, SgfError> {
        let mut out = Vec::new();
        for node in &self.nodes {
            for (id, values) in &node.props {
                let color = match id.as_str() {
                    "AB" => Color::Black,
                    "AW" => Color::White,
                    "AE" => return Err(SgfError::Unsupported("AE")),
                    _ => continue,
                };
                for value in values {
                    for point in parse_point_list(value, size)? {
                        out.push(Move::play(color, point));
                    }
                }
            }
        }
        Ok(out)
    }

    /// 着手列（`B` / `W`、空値と19路以下の `tt` はパス）
    pub fn moves(&self, size: usize) -> Result<Vec<Move>, SgfError> {
        let mut out = Vec::new();
        for node in &self.nodes {
            for (id, values) in &node.props {
                let color = match id.as_str() {
                    "B" => Color::Black,
                    "W" => Color::White,
                    _ => continue,
                };
                let value = values.first().map(String::as_str).unwrap_or_default();
                out.push(Move {
                    color,
                    loc: parse_move(value, size)?,
                });
            }
        }
        Ok(out)
    }
}

fn coord(c: u8) -> Option<usize> {
    match c {
        b'a'..=b'z' => Some((c - b'a') as usize),
        b'A'..=b'Z' => Some((c - b'A') as usize + 26),
        _ => None,
    }
}

fn parse_point(value: &str, size: usize) -> Result<Point, SgfError> {
    let bad = || SgfError::Point {
        value: value.to_string(),
        size,
    };
    let bytes = value.trim().as_bytes();
    if bytes.len() != 2 {
        return Err(bad());
    }
    let x = coord(bytes[0]).ok_or_else(bad)?;
    let y = coord(bytes[1]).ok_or_else(bad)?;
    if x >= size || y >= size {
        return Err(bad());
    }
    Ok(Point::new(x as u8, y as u8))
}

fn parse_move(value: &str, size: usize) -> Result<Option<Point>, SgfError> {
    let v = value.trim();
    if v.is_empty() || (v == "tt" && size <= 19) {
        return Ok(None);
    }
    parse_point(v, size).map(Some)
}

/// 単一座標または `aa:cc` 形式の矩形
fn parse_point_list(value: &str, size: usize) -> Result<Vec<Point>, SgfError> {
    let Some((a, b)) = value.split_once(':') else {
        return Ok(vec![parse_point(value, size)?]);
    };
    let (p, q) = (parse_point(a, size)?, parse_point(b, size)?);
    let mut out = Vec::new();
    for y in p.y.min(q.y)..=p.y.max(q.y) {
        for x in p.x.min(q.x)..=p.x.max(q.x) {
            out.push(Point::new(x, y));
        }
    }
    Ok(out)
}

struct Parser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, msg: &'static str) -> SgfError {
        SgfError::Syntax { pos: self.pos, msg }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: u8, msg: &'static str) -> Result<(), SgfError> {
        self.skip_ws();
        if self.peek() != Some(c) {
            return Err(self.error(msg));
        }
        self.pos += 1;
        Ok(())
    }

    /// `( Sequence GameTree* )`
    ///
    /// 入れ子の深さに上限は無いので、再帰せず開いている木をスタックで持つ。
    /// 各要素は「本譜上か」と「まだ最初の子を読んでいないか」。
    fn game_tree(&mut self, nodes: &mut Vec<SgfNode>) -> Result<(), SgfError> {
        self.expect(b'(', "expected '('")?;
        self.sequence(nodes, true)?;
        let mut open = vec![(true, true)];
        while let Some((main_line, first_child)) = open.last_mut() {
            self.skip_ws();
            match self.peek() {
                Some(b'(') => {
                    self.pos += 1;
                    let child_main = *main_line && *first_child;
                    *first_child = false;
                    self.sequence(nodes, child_main)?;
                    open.push((child_main, true));
                }
                Some(b')') => {
                    self.pos += 1;
                    open.pop();
                }
                Some(_) => return Err(self.error("unexpected character in game tree")),
                None => return Err(self.error("unterminated game tree")),
            }
        }
        Ok(())
    }

    /// `;Node` の並び。`main_line` のときだけノードを集める。
    fn sequence(&mut self, nodes: &mut Vec<SgfNode>, main_line: bool) -> Result<(), SgfError> {
        self.skip_ws();
        if self.peek() != Some(b';') {
            return Err(self.error("expected ';' at start of sequence"));
        }
        while {
            self.skip_ws();
            self.peek() == Some(b';')
        } {
            self.pos += 1;
            let node = self.node()?;
            if main_line {
                nodes.push(node);
            }
        }
        Ok(())
    }

    fn node(&mut self) -> Result<SgfNode, SgfError> {
        let mut node = SgfNode::default();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(c) if c.is_ascii_alphabetic() => {
                    let id = self.prop_ident();
                    let mut values = Vec::new();
                    while {
                        self.skip_ws();
                        self.peek() == Some(b'[')
                    } {
                        values.push(self.prop_value()?);
                    }
                    if values.is_empty() {
                        return Err(self.error("property without value"));
                    }
                    node.props.push((id, values));
                }
                _ => return Ok(node),
            }
        }
    }

    /// 旧形式の小文字混じり識別子（`AddBlack` など）は大文字のみを残す
    fn prop_ident(&mut self) -> String {
        let mut id = String::new();
        while let Some(c) = self.peek().filter(u8::is_ascii_alphabetic) {
            if c.is_ascii_uppercase() {
                id.push(c as char);
            }
            self.pos += 1;
        }
        id
    }

    fn prop_value(&mut self) -> Result<String, SgfError> {
        self.pos += 1;
        let mut buf = Vec::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated property value")),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(String::from_utf8_lossy(&buf).into_owned());
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        None => return Err(self.error("unterminated escape")),
                        // soft line break
                        Some(b'\n') => self.pos += 1,
                        Some(b'\r') => {
                            self.pos += 1;
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        Some(c) => {
                            buf.push(c);
                            self.pos += 1;
                        }
                    }
                }
                Some(c) => {
                    buf.push(c);
                    self.pos += 1;
                }
            }
        }
    }
}
