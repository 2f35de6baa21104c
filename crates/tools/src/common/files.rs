//! 棋譜ファイルの収集

use std::path::PathBuf;

use anyhow::{Result, bail};

/// ディレクトリ群を再帰的に走査し、ファイル名が `suffix` で終わるファイルを集める
///
/// 大文字小文字は区別しない。結果はパス順に整列する（走査順に依存しないように）。
/// 読めないエントリは警告を出して読み飛ばす。
pub fn collect_files(dirs: &[PathBuf], suffix: &str) -> Result<Vec<PathBuf>> {
    let suffix = suffix.to_ascii_lowercase();
    let mut files = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            bail!("Games directory not found: {}", dir.display());
        }
        for entry in walkdir::WalkDir::new(dir).follow_links(true) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {e}", dir.display());
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_ascii_lowercase();
            if name.ends_with(&suffix) {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    Ok(files)
}
