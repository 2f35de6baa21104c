//! ファイルI/Oユーティリティ（gzip対応）

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB
const WRITER_BUF_CAP: usize = 1024 * 1024; // 1 MiB

/// 拡張子が `.gz` なら展開しながら読むリーダーを開く
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let p = path.as_ref();
    let f = File::open(p)?;
    let ext = p.extension().and_then(|e| e.to_str()).unwrap_or_default().to_ascii_lowercase();

    if ext == "gz" {
        let dec = flate2::read::GzDecoder::new(f);
        return Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, dec)));
    }
    Ok(Box::new(BufReader::with_capacity(READER_BUF_CAP, f)))
}

/// ファイル全体を文字列として読む（不正なUTF-8は置換）
///
/// 古い棋譜はShift_JISなどで書かれていることがあるが、
/// 必要な情報（プロパティ名・座標）はASCIIなので置換で問題ない。
pub fn read_text_lossy<P: AsRef<Path>>(path: P) -> io::Result<String> {
    let mut bytes = Vec::new();
    open_reader(path)?.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// 出力ファイルを作成（既存ファイルは切り詰める）
pub fn create_writer<P: AsRef<Path>>(path: P) -> io::Result<BufWriter<File>> {
    let f = File::create(path)?;
    Ok(BufWriter::with_capacity(WRITER_BUF_CAP, f))
}

/// バッファをフラッシュしてディスクに同期する
///
/// `drop` に任せるとフラッシュ時のエラーが握りつぶされるため、明示的に閉じる。
pub fn close_writer(writer: BufWriter<File>) -> io::Result<()> {
    let mut file = writer.into_inner().map_err(|e| e.into_error())?;
    file.flush()?;
    file.sync_all()
}

/// `out.rgd` に対する `out.rgd.manifest.json` のような付随ファイルのパス
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
