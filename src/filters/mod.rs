pub mod counter;
pub mod empty;
pub mod print_all;
pub mod registry;
pub mod rtp;
pub mod stat;

use crate::network::packet::Packet;

// パケット解析フィルタの能力セット。
// watchフィルタは duplicate() で同一設定・初期状態の複製として作られる。
pub trait MessageFilter {
    // レジストリ上の短いコード ("STAT" など)
    fn code(&self) -> &'static str;

    fn description(&self) -> &'static str;

    // インスタンスの論理名 ("RTP:Cam1" の "Cam1")
    fn set_name(&mut self, name: Option<String>);

    fn name(&self) -> Option<&str>;

    // パケットを処理し、フィルタが理解できたかどうかを返す
    fn process(&mut self, packet: &Packet) -> bool;

    // 区間レポートを出力する (watchフィルタのみ呼ばれる)
    fn watch(&mut self);

    // 内部状態を初期化し、次のwatch区間に備える
    fn reset(&mut self);

    // ストリーム終端の後始末と最終レポート
    fn finish(&mut self) -> bool;

    fn duplicate(&self) -> Box<dyn MessageFilter>;
}

// "[CODE:name]: " ヘッダー付きでレポートを出力する。
// 2行目以降はヘッダー幅で字下げして揃える
pub fn print_report(filter: &dyn MessageFilter, text: &str) {
    let head = match filter.name() {
        Some(name) => format!("[{}:{}]: ", filter.code(), name),
        None => format!("[{}]: ", filter.code()),
    };
    let sep = " ".repeat(head.chars().count());
    for (i, line) in text.lines().enumerate() {
        if i == 0 {
            println!("{}{}", head, line);
        } else {
            println!("{}{}", sep, line);
        }
    }
}
