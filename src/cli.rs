use crate::error::InitProcessError;
use chrono::{Local, NaiveDateTime, TimeZone};
use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;

// -timespan オプションの日時形式
const TIMESPAN_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// PCAPストリームを解析し、シーケンスカウンタの欠落・重複・並び替えを検出します。
/// tcpdumpへのパイプでも使えます: tcpdump -Uw - | pcap-sentry ...
#[derive(Parser, Debug)]
#[command(name = "pcap-sentry", version)]
pub struct Args {
    /// 解析するPCAPファイル (省略時は標準入力)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// フィルタのパケット単位の詳細出力を有効にする
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// マルチキャストアドレスに参加する (複数指定可)
    #[arg(long = "join", value_name = "ADDR")]
    pub join: Vec<Ipv4Addr>,

    /// セレクタとフィルタ列を追加する (複数指定可)。
    /// セレクタは "[<TCP|UDP|IGMP>$][<送信元IP>|ANY][:<ポート>]=[<宛先IP>|ANY][:<ポート>]"、
    /// フィルタ列は "CODE[@オフセット][:名前]" のカンマ区切り (例: "RTP:Cam1,STAT")
    #[arg(long = "select", num_args = 2, value_names = ["SELECTOR", "FILTERS"], action = clap::ArgAction::Append)]
    pub select: Vec<String>,

    /// セレクタの区間レポート周期 (秒, 0で無効)
    #[arg(long = "watch", value_name = "SECS", default_value_t = 0)]
    pub watch: u64,

    /// 読み取ったPCAPデータをファイルへダンプする
    #[arg(long = "dump", value_name = "NAME")]
    pub dump: Option<String>,

    /// ダンプファイルのローテーション設定 "最大サイズMB[:ファイル数]"
    #[arg(long = "dump-rotate", value_name = "SIZE[:NUM]")]
    pub dump_rotate: Option<String>,

    /// 取り込み期間 "[開始]:終了" (形式: YYYY-MM-DD-HH-mm-ss, 開始省略で現在時刻)
    #[arg(long = "timespan", value_name = "[START]:END")]
    pub timespan: Option<String>,

    /// 並び替え/再構築FIFOのウィンドウサイズ (既定: 100)
    #[arg(long = "window", value_name = "N")]
    pub window: Option<usize>,

    /// 利用可能なフィルタ一覧を表示する
    #[arg(long = "list-filters")]
    pub list_filters: bool,
}

impl Args {
    // --select はセレクタ記述とフィルタ列のペアで並ぶ
    pub fn selector_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.select.chunks(2).filter_map(|pair| match pair {
            [selector, filters] => Some((selector.as_str(), filters.as_str())),
            _ => None,
        })
    }
}

// "[開始]:終了" をエポックミリ秒の組に変換する
pub fn parse_timespan(spec: &str) -> Result<(i64, i64), InitProcessError> {
    let (start, end) = spec.split_once(':').ok_or_else(|| {
        InitProcessError::OptionParseError(format!(
            "timespan '{}' には開始と終了を':'で区切って指定してください",
            spec
        ))
    })?;

    let start_ms = if start.is_empty() {
        Local::now().timestamp_millis()
    } else {
        parse_local_datetime(start)?
    };
    let end_ms = parse_local_datetime(end)?;

    Ok((start_ms, end_ms))
}

fn parse_local_datetime(text: &str) -> Result<i64, InitProcessError> {
    let naive = NaiveDateTime::parse_from_str(text, TIMESPAN_FORMAT).map_err(|e| {
        InitProcessError::OptionParseError(format!("不正な日時 '{}' です: {}", text, e))
    })?;
    Local
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| {
            InitProcessError::OptionParseError(format!("日時 '{}' を解決できません", text))
        })
}

// "最大サイズMB[:ファイル数]" を (バイト数, ファイル数) に変換する
pub fn parse_dump_rotation(spec: &str) -> Result<(u64, u32), InitProcessError> {
    let (size, count) = match spec.split_once(':') {
        Some((size, count)) => {
            let count = count.parse::<u32>().map_err(|_| {
                InitProcessError::OptionParseError(format!(
                    "不正なダンプファイル数 '{}' です",
                    count
                ))
            })?;
            (size, count)
        }
        None => (spec, 0),
    };

    let size_mb = size.parse::<u64>().map_err(|_| {
        InitProcessError::OptionParseError(format!("不正なダンプサイズ '{}' です", size))
    })?;

    Ok((size_mb * 1024 * 1024, count))
}
