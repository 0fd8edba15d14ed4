use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

pub fn setup_logger(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    // -v 指定時はパケット単位の診断ログ (重複・並び替え・欠落) を出力する
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    // ビルダーでロガーをカスタマイズ
    Builder::new()
        // ログレベルの設定
        .filter_level(level)
        // タイムスタンプ付きのフォーマット
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;

    Ok(())
}
