use crate::filters::stat::StatAccumulator;
use crate::filters::{print_report, MessageFilter};
use crate::network::packet::Packet;
use log::debug;
use std::collections::VecDeque;

// ペイロードに埋め込まれたシーケンスカウンタのビット幅
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterWidth {
    W8,
    W16,
    W32,
}

impl CounterWidth {
    pub fn size_bytes(self) -> usize {
        match self {
            CounterWidth::W8 => 1,
            CounterWidth::W16 => 2,
            CounterWidth::W32 => 4,
        }
    }

    pub fn mask(self) -> u64 {
        match self {
            CounterWidth::W8 => 0xff,
            CounterWidth::W16 => 0xffff,
            CounterWidth::W32 => 0xffff_ffff,
        }
    }

    // 指定オフセットからビッグエンディアンでカウンタ値を取り出す
    pub fn extract(self, data: &[u8], pos: usize) -> Option<u64> {
        let end = pos.checked_add(self.size_bytes())?;
        if end > data.len() {
            return None;
        }
        let mut value = 0u64;
        for &byte in &data[pos..end] {
            value = value << 8 | byte as u64;
        }
        Some(value)
    }

    pub fn next_value(self, value: u64) -> u64 {
        (value + 1) & self.mask()
    }

    // lastからcurrentへのジャンプで飛ばされた値の個数 (mod 2^W)
    pub fn positions_lost(self, current: u64, last: u64) -> u64 {
        let mask = self.mask();
        (current.wrapping_sub(last) & mask).wrapping_sub(1) & mask
    }
}

// カウンタFIFOの1エントリ。フィルタが抽出したカウンタ値は
// パケット本体ではなくここに保持する
#[derive(Debug, Clone)]
struct CounterEntry {
    counter: u64,
    packet_num: u64,
    ts_millis: i64,
    total_len: u64,
    fragmented: bool,
}

// カウンタ値から欠落・重複・並び替えを検出するフィルタ。
// 統計集計器を値として埋め込む
pub struct CounterFilter {
    name: Option<String>,
    code: &'static str,
    width: CounterWidth,
    counter_pos: usize,
    window_size: usize,
    // この距離以上のジャンプは欠落ではなく並び替えとみなす。
    // カウンタ範囲の約90% (調整可能なヒューリスティック)
    reorder_threshold: u64,
    fifo: VecDeque<CounterEntry>,
    stats: StatAccumulator,
    last_counter: u64,
    nb_lost: u64,
    nb_lost_max: u64,
    nb_duplicated: u64,
    nb_unordered: u64,
    nb_unordered_max: u64,
    nb_watch: u32,
}

impl CounterFilter {
    pub fn new(width: CounterWidth, counter_pos: usize, window_size: usize) -> Self {
        let code = match width {
            CounterWidth::W8 => "CNT8",
            CounterWidth::W16 => "CNT16",
            CounterWidth::W32 => "CNT32",
        };
        Self::with_code(code, width, counter_pos, window_size)
    }

    pub fn with_code(
        code: &'static str,
        width: CounterWidth,
        counter_pos: usize,
        window_size: usize,
    ) -> Self {
        let max = width.mask();
        Self {
            name: None,
            code,
            width,
            counter_pos,
            window_size,
            reorder_threshold: max - max / 10,
            fifo: VecDeque::new(),
            stats: StatAccumulator::default(),
            last_counter: 0,
            nb_lost: 0,
            nb_lost_max: 0,
            nb_duplicated: 0,
            nb_unordered: 0,
            nb_unordered_max: 0,
            nb_watch: 0,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn nb_duplicated(&self) -> u64 {
        self.nb_duplicated
    }

    pub fn nb_unordered(&self) -> u64 {
        self.nb_unordered
    }

    pub fn nb_unordered_max(&self) -> u64 {
        self.nb_unordered_max
    }

    pub fn nb_lost(&self) -> u64 {
        self.nb_lost
    }

    pub fn nb_lost_max(&self) -> u64 {
        self.nb_lost_max
    }

    pub fn nb_received(&self) -> u64 {
        self.stats.nb_packets()
    }

    // FIFOから押し出されたエントリに対する欠落計上
    fn release(&mut self, entry: CounterEntry) {
        self.stats
            .record(entry.ts_millis, entry.total_len, entry.fragmented);

        // 最初の1件は基準値の初期化のみ
        if self.stats.nb_packets() > 1 {
            let expected = self.width.next_value(self.last_counter);
            if entry.counter != expected {
                let lost = self.width.positions_lost(entry.counter, self.last_counter);
                if lost > self.nb_lost_max {
                    self.nb_lost_max = lost;
                }
                self.nb_lost += lost;
                debug!(
                    "#{}: {}パケット欠落 (ジャンプ {} > {})",
                    entry.packet_num, lost, self.last_counter, entry.counter
                );
            }
        }
        self.last_counter = entry.counter;
    }

    fn report(&self) -> String {
        let nb_total = self.stats.nb_packets() + self.nb_lost;
        if nb_total == 0 {
            return self.stats.report();
        }
        let duration = self.stats.duration_secs();
        let nb_received = self.stats.nb_packets();
        format!(
            "In {:6.3} s: {:5} packets, {:3} duplicated ({:6.3}%), \
             {:3} unordered ({:6.3}%, {:2} max positions), \
             {:4} lost ({:6.3}%, {:2} max in a row), \
             {:4} fragmented ({:6.3}%), {:8.3} packets/s, \
             length: avg {:6.1} min {:4} max {:4}, {:6.3} kB/s",
            duration,
            nb_total,
            self.nb_duplicated,
            100.0 * self.nb_duplicated as f64 / nb_received as f64,
            self.nb_unordered,
            100.0 * self.nb_unordered as f64 / nb_received as f64,
            self.nb_unordered_max,
            self.nb_lost,
            100.0 * self.nb_lost as f64 / nb_total as f64,
            self.nb_lost_max,
            self.stats.nb_fragmented(),
            100.0 * self.stats.nb_fragmented() as f64 / nb_total as f64,
            nb_total as f64 / duration,
            self.stats.sz_total() as f64 / nb_total as f64,
            self.stats.sz_min(),
            self.stats.sz_max(),
            self.stats.sz_total() as f64 / (1024.0 * duration),
        )
    }
}

impl MessageFilter for CounterFilter {
    fn code(&self) -> &'static str {
        self.code
    }

    fn description(&self) -> &'static str {
        "カウンタ値から欠落・重複・並び替えを検出します"
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn process(&mut self, packet: &Packet) -> bool {
        let counter = match self.width.extract(packet.available_data(), self.counter_pos) {
            Some(counter) => counter,
            None => {
                debug!(
                    "#{}: ペイロードが短くカウンタを抽出できません",
                    packet.packet_num
                );
                return false;
            }
        };

        // FIFO内に同じカウンタ値があれば重複。パケットは破棄する
        if let Some(prev) = self.fifo.iter().find(|e| e.counter == counter) {
            self.nb_duplicated += 1;
            debug!(
                "#{} は #{} の重複です (counter {})",
                packet.packet_num, prev.packet_num, counter
            );
            return true;
        }

        let entry = CounterEntry {
            counter,
            packet_num: packet.packet_num,
            ts_millis: packet.time_millis(),
            total_len: packet.total_data_len() as u64,
            fragmented: packet.is_fragmented(),
        };

        // 並び替え判定は末尾との距離のみで行う。末尾で検出できなければ
        // それ以前を調べる意味はない
        let mut insert_at = None;
        if let Some(tail) = self.fifo.back() {
            if self.width.positions_lost(counter, tail.counter) >= self.reorder_threshold {
                self.nb_unordered += 1;
                // 末尾から遡って正しい挿入位置を探す
                let mut index = self.fifo.len() - 1;
                for entry in self.fifo.iter().rev().skip(1) {
                    if entry.counter > counter {
                        index -= 1;
                    } else {
                        break;
                    }
                }
                let nb_positions = (self.fifo.len() - index + 1) as u64;
                if nb_positions > self.nb_unordered_max {
                    self.nb_unordered_max = nb_positions;
                }
                debug!(
                    "#{} は{}ポジション並び替えられました",
                    packet.packet_num, nb_positions
                );
                insert_at = Some(index);
            }
        }

        match insert_at {
            Some(index) => self.fifo.insert(index, entry),
            None => self.fifo.push_back(entry),
        }

        // ウィンドウに達したら先頭を押し出して欠落計上へ回す
        if self.fifo.len() >= self.window_size {
            if let Some(head) = self.fifo.pop_front() {
                self.release(head);
            }
        }

        true
    }

    fn watch(&mut self) {
        self.nb_watch += 1;
        let text = format!("(watch {}) - {}", self.nb_watch, self.report());
        print_report(self, &text);
    }

    fn reset(&mut self) {
        // FIFOは滞留中のエントリを保持したまま計数のみ初期化する
        self.stats.reset();
        self.last_counter = 0;
        self.nb_lost = 0;
        self.nb_lost_max = 0;
        self.nb_duplicated = 0;
        self.nb_unordered = 0;
        self.nb_unordered_max = 0;
    }

    fn finish(&mut self) -> bool {
        // 残存エントリを同じ欠落計上を通して払い出す
        while let Some(entry) = self.fifo.pop_front() {
            self.release(entry);
        }
        let text = self.report();
        print_report(self, &text);
        true
    }

    fn duplicate(&self) -> Box<dyn MessageFilter> {
        let mut filter =
            CounterFilter::with_code(self.code, self.width, self.counter_pos, self.window_size);
        filter.name = self.name.clone();
        Box::new(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REORDUPL_WINDOW;
    use crate::network::packet::testutil::udp_packet;
    use std::net::Ipv4Addr;

    fn packet(num: u64, payload: &[u8]) -> Packet {
        udp_packet(
            num,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(230, 116, 1, 1),
            5004,
            29866,
            num as u16,
            0x0,
            0,
            payload,
        )
    }

    #[test]
    fn counter_wraps_around() {
        assert_eq!(CounterWidth::W16.next_value(0xffff), 0x0000);
        assert_eq!(CounterWidth::W8.next_value(0xff), 0x00);
        assert_eq!(CounterWidth::W32.next_value(0xffff_ffff), 0x0000_0000);
    }

    #[test]
    fn positions_lost_counts_skipped_values() {
        // 2の次に5が来た場合、3と4の2つが飛ばされている
        assert_eq!(CounterWidth::W8.positions_lost(5, 2), 2);
        // 連続していれば欠落なし
        assert_eq!(CounterWidth::W8.positions_lost(3, 2), 0);
        // ラップアラウンドをまたぐ欠落
        assert_eq!(CounterWidth::W16.positions_lost(0x0001, 0xfffe), 2);
    }

    #[test]
    fn extract_is_big_endian_and_bounded() {
        let data = [0x0a, 0x0b, 0x0c, 0x0d, 0x0e];
        assert_eq!(CounterWidth::W8.extract(&data, 0), Some(0x0a));
        assert_eq!(CounterWidth::W16.extract(&data, 1), Some(0x0b0c));
        assert_eq!(CounterWidth::W32.extract(&data, 1), Some(0x0b0c0d0e));
        // 末尾を越える読み出しは失敗する
        assert_eq!(CounterWidth::W32.extract(&data, 2), None);
        assert_eq!(CounterWidth::W16.extract(&data, usize::MAX), None);
    }

    #[test]
    fn short_payload_does_not_match() {
        let mut filter = CounterFilter::new(CounterWidth::W16, 4, DEFAULT_REORDUPL_WINDOW);
        assert!(!filter.process(&packet(1, &[0x00, 0x01])));
        assert_eq!(filter.nb_received(), 0);
    }

    // 16ビットカウンタ列に重複・並び替え・欠落を混ぜた検証シナリオ:
    // 0xFF00, 0x00FF, 0x0100, 0x0105, 0x0106, 0x0108, 0x0107, 0x010A, 0x0107, 0x0108
    #[test]
    fn duplicate_and_reorder_scenario() {
        let mut filter = CounterFilter::new(CounterWidth::W16, 0, DEFAULT_REORDUPL_WINDOW);

        let counters: [u16; 10] = [
            0xff00, 0x00ff, 0x0100, 0x0105, 0x0106, 0x0108, 0x0107, 0x010a, 0x0107, 0x0108,
        ];
        for (i, c) in counters.iter().enumerate() {
            let payload = c.to_be_bytes();
            assert!(filter.process(&packet(i as u64 + 1, &payload)));
        }
        assert!(filter.finish());

        // 2回目の 0x0107 と 0x0108 は重複として破棄される
        assert_eq!(filter.nb_duplicated(), 2);
        // 0x0108, 0x010A の後に来た 0x0107 は並び替えとして挿入し直される
        assert_eq!(filter.nb_unordered(), 1);
        assert_eq!(filter.nb_unordered_max(), 2);
        // 欠落: 0xFF00->0x00FF (510), 0x0100->0x0105 (4), 0x0108->0x010A (1)
        assert_eq!(filter.nb_lost(), 515);
        assert_eq!(filter.nb_lost_max(), 510);
        // 受信は重複2を除く8パケット
        assert_eq!(filter.nb_received(), 8);
    }

    #[test]
    fn window_overflow_feeds_loss_accounting() {
        let mut filter = CounterFilter::new(CounterWidth::W8, 0, 4);

        // 4パケット目でウィンドウに達し、先頭から押し出しが始まる
        for (i, c) in [0u8, 1, 3, 4, 5].iter().enumerate() {
            assert!(filter.process(&packet(i as u64 + 1, &[*c])));
        }

        // この時点で押し出されたのは2件 (counter 0, 1)。
        // カウンタ2の欠落は3が払い出されるfinishで計上される
        assert_eq!(filter.nb_received(), 2);
        assert!(filter.finish());
        assert_eq!(filter.nb_received(), 5);
        assert_eq!(filter.nb_lost(), 1);
        assert_eq!(filter.nb_lost_max(), 1);
    }

    #[test]
    fn duplicates_are_excluded_from_loss_accounting() {
        let mut filter = CounterFilter::new(CounterWidth::W8, 0, DEFAULT_REORDUPL_WINDOW);

        for (i, c) in [1u8, 2, 2, 3].iter().enumerate() {
            filter.process(&packet(i as u64 + 1, &[*c]));
        }
        filter.finish();

        assert_eq!(filter.nb_duplicated(), 1);
        assert_eq!(filter.nb_lost(), 0);
        assert_eq!(filter.nb_received(), 3);
    }
}
