//! writedata - SGF棋譜から着手予測の train/test データセットを生成
//!
//! 棋譜ディレクトリ群を再帰的に走査し、各棋譜を再生して1手ごとに1行
//! （入力特徴量 + 着手位置 + 重み）を作る。test は全体から一様に
//! `--test-size` 行を抽出し、残りを `--train-pool-size` 行単位でシャッフルして
//! train に書き出す。メモリ使用量は両プールの大きさで決まり、棋譜の総数には依存しない。
//!
//! # 使用例
//!
//! ```bash
//! cargo run -p tools --release --bin writedata -- \
//!   --gamesdir games/pro --gamesdir games/amateur \
//!   --output data/go.rgd \
//!   --train-pool-size 2000000 --test-size 50000 --seed 42
//! ```
//!
//! 出力ファイルには `train`、`test` の順に2つのテーブルが入る。
//! 生成条件と件数は `<output>.manifest.json` に記録される。

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rgo_sgf::Sgf;
use tools::common::files::collect_files;
use tools::common::io::{close_writer, create_writer, read_text_lossy, sibling_path};
use tools::writedata::features::{INPUT_LEN, NUM_FEATURES, ROW_LEN, SUPPORTED_BOARD_SIZES, TENSOR_BOARD_SIZE};
use tools::writedata::manifest::{DatasetManifest, write_manifest};
use tools::writedata::store::write_file_header;
use tools::writedata::{GameReplayEncoder, PoolConfig, RandomSource, ShuffleSplitPool, StoreOptions, TableWriter};

#[derive(Parser, Debug)]
#[command(name = "writedata", version, about = "SGF棋譜から train/test データセットを生成")]
struct Cli {
    /// 棋譜ディレクトリ（複数指定可、再帰的に走査）
    #[arg(long = "gamesdir", required = true, num_args = 1)]
    games_dirs: Vec<PathBuf>,

    /// 出力ファイル
    #[arg(long)]
    output: PathBuf,

    /// trainシャッフルの単位（行数）
    #[arg(long)]
    train_pool_size: usize,

    /// test の行数
    #[arg(long)]
    test_size: usize,

    /// 乱数シード（省略時はランダム、ログに出力）
    #[arg(long)]
    seed: Option<u64>,

    /// 1回の書き出し・1チャンクの最大行数
    #[arg(long, default_value_t = 2000)]
    chunk_height: usize,

    /// 圧縮レベル
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    deflate_level: u32,

    /// 対象とするファイル名の末尾
    #[arg(long, default_value = ".sgf")]
    suffix: String,

    /// 進捗ログの間隔（棋譜数）
    #[arg(long, default_value_t = 100)]
    progress_interval: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let pool_config = PoolConfig {
        row_len: ROW_LEN,
        train_pool_size: cli.train_pool_size,
        test_size: cli.test_size,
        chunk_height: cli.chunk_height,
    };
    pool_config.validate().context("Invalid pool settings")?;
    let store_options = StoreOptions {
        row_width: ROW_LEN,
        chunk_height: cli.chunk_height,
        deflate_level: cli.deflate_level,
    };
    store_options.validate().context("Invalid store settings")?;
    if cli.progress_interval == 0 {
        anyhow::bail!("--progress-interval must be positive");
    }

    log::info!(
        "Tensor {0}x{0}, {NUM_FEATURES} features, input {INPUT_LEN} + target + weight = {ROW_LEN} per row, board sizes {SUPPORTED_BOARD_SIZES:?}",
        TENSOR_BOARD_SIZE
    );

    let mut files = collect_files(&cli.games_dirs, &cli.suffix)?;
    log::info!("Found {} files", files.len());

    let mut rng = match cli.seed {
        Some(seed) => RandomSource::new(seed),
        None => RandomSource::from_entropy(),
    };
    log::info!("Using seed: {}", rng.seed());
    rng.shuffle(&mut files);

    let mut manifest = DatasetManifest::new(
        rng.seed(),
        cli.games_dirs.clone(),
        cli.output.clone(),
        pool_config,
        store_options,
    );
    manifest.files_found = files.len();

    let mut out = create_writer(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    write_file_header(&mut out)?;
    let train = TableWriter::begin(out, "train", store_options)?;

    let mut pool = ShuffleSplitPool::new(pool_config, train)?;
    let mut encoder = GameReplayEncoder::new();

    for (i, path) in files.iter().enumerate() {
        if i > 0 && i % cli.progress_interval == 0 {
            log::info!(
                "Processed {i} sgfs, {} rows, {} rows written",
                pool.stats().rows_added,
                pool.stats().train_rows_flushed
            );
        }

        let name = path.display().to_string();
        let game = read_text_lossy(path)
            .with_context(|| format!("Failed to read {name}"))
            .and_then(|text| {
                let sgf = Sgf::parse(&text, &name)?;
                let size = sgf.board_size()?;
                let placements = sgf.placements(size)?;
                let moves = sgf.moves(size)?;
                Ok((size, placements, moves))
            });
        let (size, placements, moves) = match game {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Skipping {name}: {e:#}");
                manifest.files_skipped += 1;
                continue;
            }
        };

        encoder.encode_game(&name, size, &placements, &moves, &mut pool, &mut rng)?;
    }
    log::info!(
        "Processed {} sgfs, {} rows, {} rows written",
        files.len(),
        pool.stats().rows_added,
        pool.stats().train_rows_flushed
    );

    let train = pool.finish_and_write_train_pool(&mut rng)?;
    let train_rows = train.rows();
    let out = train.finish()?;

    let mut test = TableWriter::begin(out, "test", store_options)?;
    pool.write_test_pool(&mut test, &mut rng)?;
    let test_rows = test.rows();
    let out = test.finish()?;
    close_writer(out).with_context(|| format!("Failed to close {}", cli.output.display()))?;

    manifest.replay = *encoder.stats();
    manifest.pool_stats = *pool.stats();
    manifest.distinct_positions = encoder.distinct_positions();
    manifest.train_rows = train_rows;
    manifest.test_rows = test_rows;
    let manifest_path = sibling_path(&cli.output, ".manifest.json");
    write_manifest(&manifest_path, &manifest)?;

    log::info!("Total rows: {}", pool.stats().rows_added);
    log::info!("Train rows: {train_rows}");
    log::info!("Test rows: {test_rows}");
    log::info!("Distinct position hashes: {}", encoder.distinct_positions());
    log::info!("Output: {} (manifest: {})", cli.output.display(), manifest_path.display());
    Ok(())
}
