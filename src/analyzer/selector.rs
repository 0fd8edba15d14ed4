use crate::error::InitProcessError;
use crate::filters::MessageFilter;
use crate::network::packet::ipv4::{PROTOCOL_IGMP, PROTOCOL_TCP, PROTOCOL_UDP};
use crate::network::packet::Packet;
use std::net::Ipv4Addr;

// ワイルドカードを表すアドレス
pub const ADDR_ANY: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

// プロトコル・アドレス・ポートの述語でパケットをフィルタチェーンへ振り分ける。
// 送信元と宛先の条件が同一の場合は方向を問わずにマッチする (対称モード)。
pub struct Selector {
    protocol: u8,
    src_address: Ipv4Addr,
    src_port: u16,
    dst_address: Ipv4Addr,
    dst_port: u16,
    filters: Vec<Box<dyn MessageFilter>>,
    watch_filters: Vec<Box<dyn MessageFilter>>,
}

impl Selector {
    pub fn new() -> Self {
        Self {
            protocol: 0,
            src_address: ADDR_ANY,
            src_port: 0,
            dst_address: ADDR_ANY,
            dst_port: 0,
            filters: Vec::new(),
            watch_filters: Vec::new(),
        }
    }

    // 記述形式: "[<TCP|UDP|IGMP>$][<送信元IP>|ANY][:<ポート>]=[<宛先IP>|ANY][:<ポート>]"
    // "=" 以降を省略すると送信元条件が両方向に適用される
    pub fn parse(descr: &str) -> Result<Self, InitProcessError> {
        let mut selector = Self::new();

        let rest = match descr.split_once('$') {
            Some((prot, rest)) => {
                selector.protocol = match prot.to_ascii_uppercase().as_str() {
                    "TCP" => PROTOCOL_TCP,
                    "UDP" => PROTOCOL_UDP,
                    "IGMP" => PROTOCOL_IGMP,
                    other => {
                        return Err(InitProcessError::SelectorConfigError(format!(
                            "不明なプロトコル '{}' です",
                            other
                        )))
                    }
                };
                rest
            }
            None => descr,
        };

        match rest.split_once('=') {
            Some((src, dst)) => {
                let (addr, port) = Self::parse_endpoint(src)?;
                selector.src_address = addr;
                selector.src_port = port;
                let (addr, port) = Self::parse_endpoint(dst)?;
                selector.dst_address = addr;
                selector.dst_port = port;
            }
            None => {
                // 条件が1つだけなら送信元・宛先の両方に適用する
                let (addr, port) = Self::parse_endpoint(rest)?;
                selector.src_address = addr;
                selector.src_port = port;
                selector.dst_address = addr;
                selector.dst_port = port;
            }
        }

        Ok(selector)
    }

    fn parse_endpoint(endpoint: &str) -> Result<(Ipv4Addr, u16), InitProcessError> {
        let (ip, port) = match endpoint.split_once(':') {
            Some((ip, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    InitProcessError::SelectorConfigError(format!("不正なポート '{}' です", port))
                })?;
                (ip, port)
            }
            None => (endpoint, 0),
        };

        let addr = if ip.is_empty() || ip.eq_ignore_ascii_case("ANY") {
            ADDR_ANY
        } else {
            ip.parse::<Ipv4Addr>().map_err(|_| {
                InitProcessError::SelectorConfigError(format!("不正なアドレス '{}' です", ip))
            })?
        };

        Ok((addr, port))
    }

    pub fn add_filter(&mut self, filter: Box<dyn MessageFilter>) {
        self.filters.push(filter);
    }

    pub fn nb_filters(&self) -> usize {
        self.filters.len()
    }

    // watch用に同一設定・初期状態のフィルタ群を複製する
    pub fn enable_watch(&mut self) {
        self.watch_filters = self.filters.iter().map(|f| f.duplicate()).collect();
    }

    pub fn accepts(&self, packet: &Packet) -> bool {
        // プロトコル判定
        if self.protocol != 0 && packet.protocol() != self.protocol {
            return false;
        }

        // アドレス判定
        if self.src_address == self.dst_address {
            // 対称モード: どちらかの方向でマッチすればよい
            if self.src_address != ADDR_ANY
                && self.src_address != packet.source_ip()
                && self.src_address != packet.destination_ip()
            {
                return false;
            }
        } else {
            if self.src_address != ADDR_ANY && self.src_address != packet.source_ip() {
                return false;
            }
            if self.dst_address != ADDR_ANY && self.dst_address != packet.destination_ip() {
                return false;
            }
        }

        // ポート判定 (0はワイルドカード)
        if self.src_port == self.dst_port {
            if self.src_port > 0
                && packet.source_port() != self.src_port
                && packet.destination_port() != self.src_port
            {
                return false;
            }
        } else {
            if self.src_port > 0 && packet.source_port() != self.src_port {
                return false;
            }
            if self.dst_port > 0 && packet.destination_port() != self.dst_port {
                return false;
            }
        }

        true
    }

    // チェーン内の全フィルタへパケットを渡し、処理できたフィルタ数を返す
    pub fn process(&mut self, packet: &Packet) -> usize {
        let mut nb_matched = 0;
        for filter in self.filters.iter_mut() {
            if filter.process(packet) {
                nb_matched += 1;
            }
        }

        // watchフィルタにも同じパケットを流す (集計は別管理)
        for filter in self.watch_filters.iter_mut() {
            filter.process(packet);
        }

        nb_matched
    }

    // watchフィルタへ区間レポートを要求し、次の区間に備えてリセットする
    pub fn watch(&mut self) {
        for filter in self.watch_filters.iter_mut() {
            filter.watch();
            filter.reset();
        }
    }

    pub fn finish(&mut self) -> usize {
        let mut nb_ok = 0;
        for filter in self.filters.iter_mut() {
            if filter.finish() {
                nb_ok += 1;
            }
        }
        nb_ok
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::testutil::udp_packet;

    const CAMERA: Ipv4Addr = Ipv4Addr::new(10, 116, 4, 41);
    const GROUP: Ipv4Addr = Ipv4Addr::new(230, 116, 1, 1);
    const OTHER: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 9);

    fn packet(src: Ipv4Addr, dst: Ipv4Addr, sport: u16, dport: u16) -> Packet {
        udp_packet(1, src, dst, sport, dport, 0x1, 0x0, 0, &[0u8; 4])
    }

    #[test]
    fn symmetric_selector_matches_both_directions() {
        let selector = Selector::parse("10.116.4.41").unwrap();

        // 送信元として
        assert!(selector.accepts(&packet(CAMERA, GROUP, 1000, 2000)));
        // 宛先として (逆方向)
        assert!(selector.accepts(&packet(OTHER, CAMERA, 1000, 2000)));
        // どちらにも現れない
        assert!(!selector.accepts(&packet(OTHER, GROUP, 1000, 2000)));
    }

    #[test]
    fn directional_selector_is_strict() {
        let selector = Selector::parse("10.116.4.41=230.116.1.1").unwrap();

        assert!(selector.accepts(&packet(CAMERA, GROUP, 1000, 2000)));
        // 逆方向はマッチしない
        assert!(!selector.accepts(&packet(GROUP, CAMERA, 1000, 2000)));
        // 宛先のみ異なる
        assert!(!selector.accepts(&packet(CAMERA, OTHER, 1000, 2000)));
    }

    #[test]
    fn wildcard_axes_are_ignored() {
        let selector = Selector::parse("ANY=230.116.1.1:29866").unwrap();

        assert!(selector.accepts(&packet(CAMERA, GROUP, 5004, 29866)));
        assert!(selector.accepts(&packet(OTHER, GROUP, 1, 29866)));
        assert!(!selector.accepts(&packet(CAMERA, GROUP, 5004, 29867)));
    }

    #[test]
    fn protocol_criterion_filters_packets() {
        let selector = Selector::parse("UDP$ANY=ANY").unwrap();
        assert!(selector.accepts(&packet(CAMERA, GROUP, 1, 2)));

        let selector = Selector::parse("TCP$ANY=ANY").unwrap();
        assert!(!selector.accepts(&packet(CAMERA, GROUP, 1, 2)));
    }

    #[test]
    fn symmetric_port_matches_either_side() {
        let selector = Selector::parse(":29866").unwrap();

        assert!(selector.accepts(&packet(CAMERA, GROUP, 29866, 5004)));
        assert!(selector.accepts(&packet(CAMERA, GROUP, 5004, 29866)));
        assert!(!selector.accepts(&packet(CAMERA, GROUP, 5004, 5005)));
    }

    #[test]
    fn reject_unknown_protocol() {
        assert!(Selector::parse("ICMP$ANY").is_err());
    }

    #[test]
    fn reject_bad_port() {
        assert!(Selector::parse("ANY:notaport").is_err());
    }
}
