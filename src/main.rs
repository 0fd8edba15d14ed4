use clap::Parser;
use dotenv::dotenv;
use log::{debug, error, warn};
use pcap_sentry::analyzer::selector::Selector;
use pcap_sentry::analyzer::PcapAnalyzer;
use pcap_sentry::cli::{parse_dump_rotation, parse_timespan, Args};
use pcap_sentry::config::AnalyzerConfig;
use pcap_sentry::error::{InitProcessError, ReadError};
use pcap_sentry::filters::registry;
use pcap_sentry::pcap::{PcapDump, PcapReader};
use pcap_sentry::setup_logger::setup_logger;
use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<(), InitProcessError> {
    dotenv().ok();
    let args = Args::parse();

    if args.list_filters {
        registry::print_available_filters();
        return Ok(());
    }

    // 設定の組み立て: 環境変数の既定値をCLIで上書きする
    let mut config = AnalyzerConfig::from_env();
    config.verbose = args.verbose;
    config.watch_interval_ms = (args.watch * 1000) as i64;
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if let Some(spec) = &args.timespan {
        let (start, end) = parse_timespan(spec)?;
        config.time_start = Some(start);
        config.time_end = Some(end);
    }

    setup_logger(config.verbose).map_err(|e| InitProcessError::LoggerError(e.to_string()))?;

    // ダンプシンクの設定
    let mut dump = args.dump.clone().map(PcapDump::new);
    if let Some(spec) = &args.dump_rotate {
        let (max_size, max_files) = parse_dump_rotation(spec)?;
        match dump.as_mut() {
            Some(dump) => {
                dump.set_max_size(max_size);
                dump.set_max_files(max_files);
            }
            None => {
                return Err(InitProcessError::OptionParseError(
                    "--dump-rotate には --dump でダンプ名の指定が必要です".to_string(),
                ))
            }
        }
    }

    // 入力ストリーム (ファイルまたは標準入力)
    let input: Box<dyn Read> = match &args.file {
        Some(path) => {
            println!("{} を解析します", path.display());
            Box::new(
                File::open(path)
                    .map_err(|e| InitProcessError::InputOpenError(format!("{}: {}", path.display(), e)))?,
            )
        }
        None => Box::new(std::io::stdin()),
    };

    let reader = PcapReader::open(input, dump)?;
    let mut analyzer = PcapAnalyzer::new(reader, &config);

    for group in &args.join {
        analyzer.join_group(*group);
    }

    // セレクタとフィルタチェーンの構築
    for (selector_spec, filter_list) in args.selector_pairs() {
        let mut selector = Selector::parse(selector_spec)?;
        for filter_spec in filter_list.split(',') {
            match registry::create_filter(filter_spec, config.window_size) {
                Ok(filter) => selector.add_filter(filter),
                // フィルタ1つの設定ミスはセレクタ全体を止めない
                Err(e) => warn!("{}", e),
            }
        }
        analyzer.add_selector(selector);
    }

    if config.watch_interval_ms > 0 {
        analyzer.enable_watch();
    }

    // Ctrl+Cは次のレコード境界でループを止める (パケット途中の中断はしない)
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            warn!("シグナルハンドラを設定できません: {}", e);
        }
    }

    let nb_selectors = analyzer.nb_selectors();
    let mut nb_packets: u64 = 0;
    let mut last_watch: i64 = 0;

    while !stop.load(Ordering::SeqCst) {
        let packet = match analyzer.next_packet() {
            Ok(released) => {
                nb_packets += 1;
                match released {
                    Some(packet) => packet,
                    // 再構築FIFOが溜め込み中
                    None => continue,
                }
            }
            Err(ReadError::StreamEnded) => break,
            Err(e @ ReadError::ShortRead) => {
                warn!("{}", e);
                break;
            }
            Err(e @ ReadError::Io(_)) => {
                error!("{}", e);
                break;
            }
            // レコード単位のデコード失敗は読み飛ばして継続する
            Err(e @ ReadError::Decode { .. }) => {
                debug!("{}", e);
                continue;
            }
        };

        let ts = packet.time_millis();
        if let Some(start) = config.time_start {
            if ts < start {
                continue;
            }
        }
        if let Some(end) = config.time_end {
            if ts > end {
                break;
            }
        }

        if nb_selectors == 0 {
            // セレクタ未定義ならパケットをそのまま表示する
            println!("{}", packet);
        } else {
            analyzer.process_packet(&packet);

            // watchはパケットのタイムスタンプで駆動する
            if config.watch_interval_ms > 0 {
                if last_watch == 0 {
                    last_watch = ts;
                } else if ts - last_watch > config.watch_interval_ms {
                    analyzer.watch();
                    last_watch = ts;
                }
            }
        }
    }

    println!("{} パケットを読み取りました", nb_packets);
    analyzer.finish();

    Ok(())
}
