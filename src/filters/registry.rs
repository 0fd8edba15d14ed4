use crate::error::InitProcessError;
use crate::filters::counter::{CounterFilter, CounterWidth};
use crate::filters::empty::EmptyFilter;
use crate::filters::print_all::PrintAllFilter;
use crate::filters::rtp::RtpFilter;
use crate::filters::stat::{AddressKey, StatByAddress, StatFilter};
use crate::filters::MessageFilter;
use lazy_static::lazy_static;

type FilterFactory = fn(Option<usize>, usize) -> Result<Box<dyn MessageFilter>, InitProcessError>;

pub struct FilterSpec {
    pub code: &'static str,
    pub description: &'static str,
    factory: FilterFactory,
}

// オフセット指定を受け付けないフィルタ用のガード
fn no_offset(
    code: &'static str,
    offset: Option<usize>,
) -> Result<(), InitProcessError> {
    if offset.is_some() {
        return Err(InitProcessError::FilterConfigError(format!(
            "フィルタ '{}' はオフセット指定に対応していません",
            code
        )));
    }
    Ok(())
}

// コード文字列からフィルタ実体を生成する静的テーブル。
// 未知のコードは設定エラーとして扱う
lazy_static! {
    static ref REGISTRY: Vec<FilterSpec> = vec![
        FilterSpec {
            code: "EMPTY",
            description: "パケットを静かに処理します",
            factory: |offset, _| {
                no_offset("EMPTY", offset)?;
                Ok(Box::new(EmptyFilter::new()))
            },
        },
        FilterSpec {
            code: "PRINT",
            description: "受信した全パケットを表示します",
            factory: |offset, _| {
                no_offset("PRINT", offset)?;
                Ok(Box::new(PrintAllFilter::new()))
            },
        },
        FilterSpec {
            code: "STAT",
            description: "パケット数・サイズ・頻度を集計します",
            factory: |offset, _| {
                no_offset("STAT", offset)?;
                Ok(Box::new(StatFilter::new()))
            },
        },
        FilterSpec {
            code: "STATSRC",
            description: "送信元IPごとにパケット統計を集計します",
            factory: |offset, _| {
                no_offset("STATSRC", offset)?;
                Ok(Box::new(StatByAddress::new(AddressKey::Source)))
            },
        },
        FilterSpec {
            code: "STATDST",
            description: "宛先IPごとにパケット統計を集計します",
            factory: |offset, _| {
                no_offset("STATDST", offset)?;
                Ok(Box::new(StatByAddress::new(AddressKey::Destination)))
            },
        },
        FilterSpec {
            code: "RTP",
            description: "RTPストリームを解析します (16ビットカウンタ, オフセット2)",
            factory: |offset, window| {
                no_offset("RTP", offset)?;
                Ok(Box::new(RtpFilter::new(window)))
            },
        },
        FilterSpec {
            code: "CNT8",
            description: "8ビットカウンタの欠落・重複・並び替えを検出します",
            factory: |offset, window| {
                Ok(Box::new(CounterFilter::new(
                    CounterWidth::W8,
                    offset.unwrap_or(0),
                    window,
                )))
            },
        },
        FilterSpec {
            code: "CNT16",
            description: "16ビットカウンタの欠落・重複・並び替えを検出します",
            factory: |offset, window| {
                Ok(Box::new(CounterFilter::new(
                    CounterWidth::W16,
                    offset.unwrap_or(0),
                    window,
                )))
            },
        },
        FilterSpec {
            code: "CNT32",
            description: "32ビットカウンタの欠落・重複・並び替えを検出します",
            factory: |offset, window| {
                Ok(Box::new(CounterFilter::new(
                    CounterWidth::W32,
                    offset.unwrap_or(0),
                    window,
                )))
            },
        },
    ];
}

// 記述形式 "CODE[@オフセット][:名前]" からフィルタを生成する
pub fn create_filter(
    spec: &str,
    window_size: usize,
) -> Result<Box<dyn MessageFilter>, InitProcessError> {
    let (code_part, name) = match spec.split_once(':') {
        Some((code, name)) => (code, Some(name.to_string())),
        None => (spec, None),
    };

    let (code, offset) = match code_part.split_once('@') {
        Some((code, offset)) => {
            let offset = offset.parse::<usize>().map_err(|_| {
                InitProcessError::FilterConfigError(format!(
                    "不正なカウンタオフセット '{}' です",
                    offset
                ))
            })?;
            (code, Some(offset))
        }
        None => (code_part, None),
    };

    let code = code.to_ascii_uppercase();
    let entry = REGISTRY.iter().find(|f| f.code == code).ok_or_else(|| {
        InitProcessError::FilterConfigError(format!("フィルタ '{}' が見つかりません", code))
    })?;

    let mut filter = (entry.factory)(offset, window_size)?;
    filter.set_name(name);
    Ok(filter)
}

pub fn print_available_filters() {
    println!("利用可能なフィルタ:");
    let width = REGISTRY.iter().map(|f| f.code.len()).max().unwrap_or(0);
    for spec in REGISTRY.iter() {
        println!("    {:<width$}: {}", spec.code, spec.description, width = width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REORDUPL_WINDOW;

    #[test]
    fn create_filter_with_offset_and_name() {
        let filter = create_filter("CNT16@4:video", DEFAULT_REORDUPL_WINDOW).unwrap();
        assert_eq!(filter.code(), "CNT16");
        assert_eq!(filter.name(), Some("video"));
    }

    #[test]
    fn codes_are_case_insensitive() {
        let filter = create_filter("stat", DEFAULT_REORDUPL_WINDOW).unwrap();
        assert_eq!(filter.code(), "STAT");
        assert_eq!(filter.name(), None);
    }

    #[test]
    fn unknown_code_is_a_configuration_error() {
        assert!(matches!(
            create_filter("NOPE", DEFAULT_REORDUPL_WINDOW),
            Err(InitProcessError::FilterConfigError(_))
        ));
    }

    #[test]
    fn offset_is_rejected_for_non_counter_filters() {
        assert!(create_filter("STAT@3", DEFAULT_REORDUPL_WINDOW).is_err());
    }

    #[test]
    fn bad_offset_is_rejected() {
        assert!(create_filter("CNT8@x", DEFAULT_REORDUPL_WINDOW).is_err());
    }
}
