//! チャンク分割・圧縮された追記専用テーブル
//!
//! 1つの出力ファイルに名前付きの2次元 `f32` テーブルを順番に書く
//! （train を閉じてから test を開く）。行は `chunk_height` 行ごとの
//! チャンクにまとめ、zlib（`deflate_level`）で圧縮する。
//!
//! ```text
//! file  := "RGODSET\0" | version u32 | table*
//! table := "DSET" | name_len u16 | name | row_width u32 | chunk_height u32 | deflate_level u32
//!          chunk* | "DEND" | total_rows u64
//! chunk := "CHNK" | rows u32 | compressed_len u64 | zlib(rows * row_width f32 LE)
//! ```
//!
//! 整数はすべてリトルエンディアン。

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::Serialize;

use super::pool::RowSink;

pub const FILE_MAGIC: &[u8; 8] = b"RGODSET\0";
pub const FORMAT_VERSION: u32 = 1;

const TAG_TABLE: &[u8; 4] = b"DSET";
const TAG_CHUNK: &[u8; 4] = b"CHNK";
const TAG_END: &[u8; 4] = b"DEND";

/// テーブルの物理構成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreOptions {
    pub row_width: usize,
    pub chunk_height: usize,
    /// 0（無圧縮）〜 9
    pub deflate_level: u32,
}

impl StoreOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.row_width > 0, "row_width must be positive");
        ensure!(self.chunk_height > 0, "chunk_height must be positive");
        ensure!(self.deflate_level <= 9, "deflate_level must be in 0..=9");
        Ok(())
    }
}

/// ファイルヘッダを書く（テーブルより前に1回だけ）
pub fn write_file_header<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(FILE_MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)
}

/// 1テーブル分の書き込み
///
/// `append` は行数を伸ばして末尾に連続した行ブロックを書く。
/// `chunk_height` 行たまるごとにチャンクとして圧縮・出力し、
/// 端数は `finish` で最後のチャンクになる。
#[must_use = "call .finish() to write the last chunk and the table trailer"]
pub struct TableWriter<W: Write> {
    inner: W,
    name: String,
    options: StoreOptions,
    pending: Vec<f32>,
    rows: u64,
    chunks: u64,
}

impl<W: Write> TableWriter<W> {
    /// テーブルヘッダを書いて開始する
    pub fn begin(mut inner: W, name: &str, options: StoreOptions) -> Result<Self> {
        options.validate()?;
        let name_len = u16::try_from(name.len()).context("table name too long")?;
        inner.write_all(TAG_TABLE)?;
        inner.write_u16::<LittleEndian>(name_len)?;
        inner.write_all(name.as_bytes())?;
        inner.write_u32::<LittleEndian>(options.row_width as u32)?;
        inner.write_u32::<LittleEndian>(options.chunk_height as u32)?;
        inner.write_u32::<LittleEndian>(options.deflate_level)?;
        Ok(Self {
            inner,
            name: name.to_string(),
            options,
            pending: Vec::with_capacity(options.chunk_height * options.row_width),
            rows: 0,
            chunks: 0,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// これまでに追加された行数（未出力の端数を含む）
    #[inline]
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// 出力済みのチャンク数
    #[inline]
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    /// 行ブロックを末尾に追加する
    pub fn append(&mut self, rows: &[f32]) -> Result<()> {
        let width = self.options.row_width;
        ensure!(
            rows.len() % width == 0,
            "append of {} values is not a whole number of {width}-wide rows",
            rows.len()
        );
        let chunk_len = self.options.chunk_height * width;
        let mut rest = rows;
        while !rest.is_empty() {
            let take = (chunk_len - self.pending.len()).min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];
            if self.pending.len() == chunk_len {
                self.write_chunk()?;
            }
        }
        self.rows += (rows.len() / width) as u64;
        Ok(())
    }

    fn write_chunk(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let n_rows = self.pending.len() / self.options.row_width;
        let mut enc = ZlibEncoder::new(
            Vec::with_capacity(self.pending.len()),
            Compression::new(self.options.deflate_level),
        );
        let mut raw = vec![0u8; self.pending.len() * 4];
        LittleEndian::write_f32_into(&self.pending, &mut raw);
        enc.write_all(&raw)?;
        let compressed = enc.finish()?;

        self.inner.write_all(TAG_CHUNK)?;
        self.inner.write_u32::<LittleEndian>(n_rows as u32)?;
        self.inner.write_u64::<LittleEndian>(compressed.len() as u64)?;
        self.inner
            .write_all(&compressed)
            .with_context(|| format!("Failed to write chunk {} of table {}", self.chunks, self.name))?;
        self.pending.clear();
        self.chunks += 1;
        Ok(())
    }

    /// 端数チャンクと終端を書き、下位のライターを返す
    pub fn finish(mut self) -> Result<W> {
        self.write_chunk()?;
        self.inner.write_all(TAG_END)?;
        self.inner.write_u64::<LittleEndian>(self.rows)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> RowSink for TableWriter<W> {
    fn append_rows(&mut self, rows: &[f32]) -> Result<()> {
        self.append(rows)
    }
}

/// 読み込んだテーブル
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub row_width: usize,
    pub chunk_height: usize,
    pub deflate_level: u32,
    /// チャンクごとの行数
    pub chunk_rows: Vec<usize>,
    pub data: Vec<f32>,
}

impl Table {
    pub fn num_rows(&self) -> usize {
        self.data.len() / self.row_width
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.row_width..(i + 1) * self.row_width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.row_width)
    }
}

fn read_tag<R: Read>(r: &mut R) -> Result<Option<[u8; 4]>> {
    let mut tag = [0u8; 4];
    match r.read_exact(&mut tag) {
        Ok(()) => Ok(Some(tag)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_table<R: Read>(r: &mut R) -> Result<Table> {
    let name_len = r.read_u16::<LittleEndian>()? as usize;
    let mut name = vec![0u8; name_len];
    r.read_exact(&mut name)?;
    let name = String::from_utf8(name).context("table name is not UTF-8")?;
    let row_width = r.read_u32::<LittleEndian>()? as usize;
    let chunk_height = r.read_u32::<LittleEndian>()? as usize;
    let deflate_level = r.read_u32::<LittleEndian>()?;
    ensure!(row_width > 0, "table {name}: row_width is zero");

    let mut table = Table {
        name,
        row_width,
        chunk_height,
        deflate_level,
        chunk_rows: Vec::new(),
        data: Vec::new(),
    };
    loop {
        let Some(tag) = read_tag(r)? else {
            bail!("table {}: missing trailer", table.name);
        };
        match &tag {
            TAG_CHUNK => {
                let n_rows = r.read_u32::<LittleEndian>()? as usize;
                let comp_len = r.read_u64::<LittleEndian>()?;
                ensure!(
                    n_rows > 0 && n_rows <= chunk_height,
                    "table {}: chunk of {n_rows} rows exceeds chunk height {chunk_height}",
                    table.name
                );
                let mut compressed = vec![0u8; comp_len as usize];
                r.read_exact(&mut compressed)?;
                let mut raw = Vec::with_capacity(n_rows * row_width * 4);
                ZlibDecoder::new(compressed.as_slice()).read_to_end(&mut raw)?;
                ensure!(
                    raw.len() == n_rows * row_width * 4,
                    "table {}: chunk {} decompressed to {} bytes",
                    table.name,
                    table.chunk_rows.len(),
                    raw.len()
                );
                let start = table.data.len();
                table.data.resize(start + n_rows * row_width, 0.0);
                LittleEndian::read_f32_into(&raw, &mut table.data[start..]);
                table.chunk_rows.push(n_rows);
            }
            TAG_END => {
                let total = r.read_u64::<LittleEndian>()?;
                ensure!(
                    total as usize == table.num_rows(),
                    "table {}: trailer says {total} rows but {} were read",
                    table.name,
                    table.num_rows()
                );
                return Ok(table);
            }
            other => bail!("table {}: unexpected tag {:?}", table.name, String::from_utf8_lossy(other)),
        }
    }
}

/// ファイル内の全テーブルを読む
pub fn read_tables<R: Read>(mut r: R) -> Result<Vec<Table>> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic).context("Failed to read file header")?;
    ensure!(&magic == FILE_MAGIC, "not a dataset file (bad magic)");
    let version = r.read_u32::<LittleEndian>()?;
    ensure!(version == FORMAT_VERSION, "unsupported format version {version}");

    let mut tables = Vec::new();
    while let Some(tag) = read_tag(&mut r)? {
        ensure!(&tag == TAG_TABLE, "unexpected tag {:?}", String::from_utf8_lossy(&tag));
        tables.push(read_table(&mut r)?);
    }
    Ok(tables)
}

pub fn read_tables_from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Table>> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_tables(BufReader::new(f)).with_context(|| format!("Failed to read {}", path.display()))
}

/// メモリ上のテーブル（書き出しグループの行数も記録する）
#[derive(Debug, Clone)]
pub struct MemoryTable {
    row_width: usize,
    data: Vec<f32>,
    group_rows: Vec<usize>,
}

impl MemoryTable {
    pub fn new(row_width: usize) -> Self {
        Self {
            row_width,
            data: Vec::new(),
            group_rows: Vec::new(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.data.len() / self.row_width
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// `append_rows` 1回ごとの行数
    pub fn group_rows(&self) -> &[usize] {
        &self.group_rows
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.row_width)
    }
}

impl RowSink for MemoryTable {
    fn append_rows(&mut self, rows: &[f32]) -> Result<()> {
        ensure!(rows.len() % self.row_width == 0, "partial row in append");
        self.group_rows.push(rows.len() / self.row_width);
        self.data.extend_from_slice(rows);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(row_width: usize, chunk_height: usize) -> StoreOptions {
        StoreOptions {
            row_width,
            chunk_height,
            deflate_level: 6,
        }
    }

    fn rows(start: usize, n: usize, width: usize) -> Vec<f32> {
        (start * width..(start + n) * width).map(|v| v as f32).collect()
    }

    #[test]
    fn test_two_tables_in_one_file() {
        let mut buf = Vec::new();
        write_file_header(&mut buf).unwrap();

        let mut train = TableWriter::begin(buf, "train", options(4, 3)).unwrap();
        train.append(&rows(0, 2, 4)).unwrap();
        train.append(&rows(2, 5, 4)).unwrap();
        assert_eq!(train.rows(), 7);
        assert_eq!(train.chunks(), 2);
        let buf = train.finish().unwrap();

        let test = TableWriter::begin(buf, "test", options(4, 3)).unwrap();
        let buf = test.finish().unwrap();

        let tables = read_tables(buf.as_slice()).unwrap();
        assert_eq!(tables.len(), 2);
        let train = &tables[0];
        assert_eq!(train.name, "train");
        assert_eq!(train.num_rows(), 7);
        assert_eq!(train.chunk_rows, vec![3, 3, 1]);
        assert_eq!(train.data, rows(0, 7, 4));
        assert_eq!(train.row(6), &[24.0, 25.0, 26.0, 27.0]);

        assert_eq!(tables[1].name, "test");
        assert_eq!(tables[1].num_rows(), 0);
        assert!(tables[1].chunk_rows.is_empty());
    }

    #[test]
    fn test_rejects_partial_rows_and_bad_options() {
        let mut w = TableWriter::begin(Vec::new(), "t", options(3, 2)).unwrap();
        assert!(w.append(&[1.0, 2.0]).is_err());
        assert!(TableWriter::begin(Vec::new(), "t", options(3, 0)).is_err());
        assert!(
            TableWriter::begin(
                Vec::new(),
                "t",
                StoreOptions {
                    deflate_level: 10,
                    ..options(3, 2)
                }
            )
            .is_err()
        );
    }

    #[test]
    fn test_detects_corruption() {
        assert!(read_tables(&b"NOTADSET\x01\0\0\0"[..]).is_err());

        let mut buf = Vec::new();
        write_file_header(&mut buf).unwrap();
        let mut t = TableWriter::begin(buf, "train", options(2, 2)).unwrap();
        t.append(&rows(0, 3, 2)).unwrap();
        let buf = t.finish().unwrap();
        // 終端を切り落とす
        let truncated = &buf[..buf.len() - 12];
        assert!(read_tables(truncated).is_err());
    }

    #[test]
    fn test_uncompressed_level() {
        let mut buf = Vec::new();
        write_file_header(&mut buf).unwrap();
        let mut t = TableWriter::begin(
            buf,
            "train",
            StoreOptions {
                deflate_level: 0,
                ..options(2, 8)
            },
        )
        .unwrap();
        t.append(&rows(0, 5, 2)).unwrap();
        let buf = t.finish().unwrap();
        let tables = read_tables(buf.as_slice()).unwrap();
        assert_eq!(tables[0].data, rows(0, 5, 2));
        assert_eq!(tables[0].deflate_level, 0);
    }

    #[test]
    fn test_memory_table_records_groups() {
        let mut m = MemoryTable::new(2);
        m.append_rows(&rows(0, 3, 2)).unwrap();
        m.append_rows(&rows(3, 1, 2)).unwrap();
        assert_eq!(m.group_rows(), &[3, 1]);
        assert_eq!(m.num_rows(), 4);
        assert_eq!(m.rows().nth(3).unwrap(), &[6.0, 7.0]);
    }
}
