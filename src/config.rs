use serde::{Deserialize, Serialize};

// 並び替え/重複検出FIFOと再構築FIFOの既定ウィンドウサイズ
pub const DEFAULT_REORDUPL_WINDOW: usize = 100;

// 各コンポーネントのコンストラクタへ明示的に引き渡す設定値。
// グローバルな可変状態は持たない。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub window_size: usize,
    pub watch_interval_ms: i64,
    pub time_start: Option<i64>,
    pub time_end: Option<i64>,
    pub verbose: bool,
}

impl AnalyzerConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        // 環境変数 REORDUPL_WINDOW で既定ウィンドウサイズを上書きできる
        let window_size = std::env::var("REORDUPL_WINDOW")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REORDUPL_WINDOW);

        Self {
            window_size,
            watch_interval_ms: 0,
            time_start: None,
            time_end: None,
            verbose: false,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_REORDUPL_WINDOW,
            watch_interval_ms: 0,
            time_start: None,
            time_end: None,
            verbose: false,
        }
    }
}
