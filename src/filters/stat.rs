use crate::filters::{print_report, MessageFilter};
use crate::network::packet::Packet;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

// パケット数・サイズ・頻度の集計器。
// フィルタへ値として埋め込んで使う (継承の代わりにコンポジション)
#[derive(Debug, Clone, Default)]
pub struct StatAccumulator {
    ms_first: i64,
    ms_last: i64,
    nb_packets: u64,
    nb_fragmented: u64,
    sz_total: u64,
    sz_min: u64,
    sz_max: u64,
}

impl StatAccumulator {
    pub fn record(&mut self, ts_millis: i64, total_len: u64, fragmented: bool) {
        if self.nb_packets == 0 {
            self.ms_first = ts_millis;
            self.sz_min = total_len;
            self.sz_max = total_len;
        }
        self.ms_last = ts_millis;
        self.nb_packets += 1;
        if fragmented {
            self.nb_fragmented += 1;
        }
        if total_len < self.sz_min {
            self.sz_min = total_len;
        }
        if total_len > self.sz_max {
            self.sz_max = total_len;
        }
        self.sz_total += total_len;
    }

    pub fn record_packet(&mut self, packet: &Packet) {
        self.record(
            packet.time_millis(),
            packet.total_data_len() as u64,
            packet.is_fragmented(),
        );
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn nb_packets(&self) -> u64 {
        self.nb_packets
    }

    pub fn nb_fragmented(&self) -> u64 {
        self.nb_fragmented
    }

    pub fn sz_min(&self) -> u64 {
        self.sz_min
    }

    pub fn sz_max(&self) -> u64 {
        self.sz_max
    }

    pub fn sz_total(&self) -> u64 {
        self.sz_total
    }

    pub fn duration_secs(&self) -> f64 {
        (self.ms_last - self.ms_first) as f64 / 1000.0
    }

    pub fn report(&self) -> String {
        if self.nb_packets == 0 {
            return "No packets received.".to_string();
        }
        let duration = self.duration_secs();
        format!(
            "In {:6.3} s: {:6} packets, {:4} fragmented ({:6.3}%), {:8.3} packets/s, \
             length: avg {:6.1} min {:4} max {:4}, {:4.3} kB/s",
            duration,
            self.nb_packets,
            self.nb_fragmented,
            100.0 * self.nb_fragmented as f64 / self.nb_packets as f64,
            self.nb_packets as f64 / duration,
            self.sz_total as f64 / self.nb_packets as f64,
            self.sz_min,
            self.sz_max,
            self.sz_total as f64 / (1024.0 * duration),
        )
    }
}

pub struct StatFilter {
    name: Option<String>,
    stats: StatAccumulator,
    nb_watch: u32,
}

impl StatFilter {
    pub fn new() -> Self {
        Self {
            name: None,
            stats: StatAccumulator::default(),
            nb_watch: 0,
        }
    }
}

impl Default for StatFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFilter for StatFilter {
    fn code(&self) -> &'static str {
        "STAT"
    }

    fn description(&self) -> &'static str {
        "パケット数・サイズ・頻度を集計します"
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn process(&mut self, packet: &Packet) -> bool {
        self.stats.record_packet(packet);
        true
    }

    fn watch(&mut self) {
        self.nb_watch += 1;
        let text = format!("(watch {:4}) - {}", self.nb_watch, self.stats.report());
        print_report(self, &text);
    }

    fn reset(&mut self) {
        self.stats.reset();
    }

    fn finish(&mut self) -> bool {
        let text = self.stats.report();
        print_report(self, &text);
        true
    }

    fn duplicate(&self) -> Box<dyn MessageFilter> {
        let mut filter = StatFilter::new();
        filter.name = self.name.clone();
        Box::new(filter)
    }
}

// 集計をアドレスで分割する軸
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKey {
    Source,
    Destination,
}

// 全体集計に加えて送信元または宛先アドレスごとの内訳を持つ。
// BTreeMapによりレポート順序はアドレス順で決定的になる
pub struct StatByAddress {
    name: Option<String>,
    key: AddressKey,
    totals: StatAccumulator,
    per_address: BTreeMap<Ipv4Addr, StatAccumulator>,
    nb_watch: u32,
}

impl StatByAddress {
    pub fn new(key: AddressKey) -> Self {
        Self {
            name: None,
            key,
            totals: StatAccumulator::default(),
            per_address: BTreeMap::new(),
            nb_watch: 0,
        }
    }

    fn report(&self) -> String {
        let mut text = self.totals.report();
        for (address, stats) in &self.per_address {
            text.push_str(&format!("\n--{:>15}: {}", address, stats.report()));
        }
        text
    }
}

impl MessageFilter for StatByAddress {
    fn code(&self) -> &'static str {
        match self.key {
            AddressKey::Source => "STATSRC",
            AddressKey::Destination => "STATDST",
        }
    }

    fn description(&self) -> &'static str {
        match self.key {
            AddressKey::Source => "送信元IPごとにパケット統計を集計します",
            AddressKey::Destination => "宛先IPごとにパケット統計を集計します",
        }
    }

    fn set_name(&mut self, name: Option<String>) {
        self.name = name;
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn process(&mut self, packet: &Packet) -> bool {
        self.totals.record_packet(packet);

        let address = match self.key {
            AddressKey::Source => packet.source_ip(),
            AddressKey::Destination => packet.destination_ip(),
        };
        self.per_address
            .entry(address)
            .or_default()
            .record_packet(packet);

        true
    }

    fn watch(&mut self) {
        self.nb_watch += 1;
        let text = format!("(watch {:4}) - {}", self.nb_watch, self.report());
        print_report(self, &text);
    }

    fn reset(&mut self) {
        self.totals.reset();
        self.per_address.clear();
    }

    fn finish(&mut self) -> bool {
        let text = self.report();
        print_report(self, &text);
        true
    }

    fn duplicate(&self) -> Box<dyn MessageFilter> {
        let mut filter = StatByAddress::new(self.key);
        filter.name = self.name.clone();
        Box::new(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::testutil::udp_packet;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn accumulator_tracks_sizes_and_times() {
        let mut stats = StatAccumulator::default();
        stats.record(1_000, 100, false);
        stats.record(2_000, 300, true);
        stats.record(4_000, 200, false);

        assert_eq!(stats.nb_packets(), 3);
        assert_eq!(stats.nb_fragmented(), 1);
        assert_eq!(stats.sz_min(), 100);
        assert_eq!(stats.sz_max(), 300);
        assert_eq!(stats.sz_total(), 600);
        assert!((stats.duration_secs() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn accumulator_reports_without_packets() {
        let stats = StatAccumulator::default();
        assert_eq!(stats.report(), "No packets received.");
    }

    #[test]
    fn by_address_partitions_per_source() {
        let mut filter = StatByAddress::new(AddressKey::Source);

        for (i, last) in [1u8, 2, 1, 3, 1].iter().enumerate() {
            let p = udp_packet(
                i as u64 + 1,
                addr(*last),
                addr(200),
                1000,
                2000,
                i as u16,
                0,
                0,
                &[0u8; 10],
            );
            assert!(filter.process(&p));
        }

        assert_eq!(filter.totals.nb_packets(), 5);
        assert_eq!(filter.per_address.len(), 3);
        assert_eq!(filter.per_address[&addr(1)].nb_packets(), 3);
        assert_eq!(filter.per_address[&addr(2)].nb_packets(), 1);
        // BTreeMapなので列挙順はアドレス順
        let keys: Vec<_> = filter.per_address.keys().copied().collect();
        assert_eq!(keys, vec![addr(1), addr(2), addr(3)]);
    }

    #[test]
    fn duplicate_starts_with_fresh_state() {
        let mut filter = StatFilter::new();
        filter.set_name(Some("cam1".to_string()));
        let p = udp_packet(1, addr(1), addr(2), 1, 2, 0, 0, 0, &[0u8; 4]);
        filter.process(&p);

        let copy = filter.duplicate();
        assert_eq!(copy.name(), Some("cam1"));
        assert_eq!(filter.stats.nb_packets(), 1);
        // 複製は同一設定だが状態は初期化される
        let mut copy = copy;
        assert!(copy.finish());
    }
}
