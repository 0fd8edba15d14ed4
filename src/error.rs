use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitProcessError {
    #[error("ロガーのセットアップに失敗しました: {0}")]
    LoggerError(String),

    #[error("入力ファイルを開けませんでした: {0}")]
    InputOpenError(String),

    #[error("PCAPストリームを開けませんでした: {0}")]
    PcapOpenError(#[from] OpenError),

    #[error("セレクタ設定エラー: {0}")]
    SelectorConfigError(String),

    #[error("フィルタ設定エラー: {0}")]
    FilterConfigError(String),

    #[error("オプション解析エラー: {0}")]
    OptionParseError(String),
}

// PCAPストリームのオープン時にのみ発生する致命的エラー
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("PCAPマジックナンバー {0:#010x} が不正です (期待値: 0xa1b2c3d4)")]
    BadMagic(u32),

    #[error("未対応のリンクタイプ {0} です (Ethernet=1 のみ対応)")]
    UnsupportedLinkType(u32),

    #[error("入出力エラー: {0}")]
    Io(#[from] std::io::Error),
}

// 1レコード内のヘッダースタックのデコード失敗。
// レコード長は既知のためストリーム自体は継続できる。
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{0}ヘッダーのデコード中にバッファが不足しました")]
    Truncated(&'static str),

    #[error("EtherType {0} は長さフィールドの可能性があり解釈できません")]
    AmbiguousEthertype(u16),

    #[error("未対応のEtherType {0:#06x} です")]
    UnhandledEthertype(u16),

    #[error("不正なヘッダー長 {0} です")]
    InvalidHeaderLength(u8),

    #[error("未対応のプロトコル番号 {0} です")]
    UnhandledProtocol(u8),
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("ストリームの終端に達しました")]
    StreamEnded,

    #[error("レコード境界の途中でストリームが切断されました")]
    ShortRead,

    #[error("入出力エラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("パケット #{record} のデコードに失敗しました: {source}")]
    Decode {
        record: u64,
        #[source]
        source: DecodeError,
    },
}

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("パケット #{packet}: フラグメントID {ident:#06x} の先頭パケットが見つかりません。破棄します")]
    OrphanFragment { packet: u64, ident: u16 },
}
