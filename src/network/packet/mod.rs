pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod udp;

use crate::network::packet::ethernet::EthernetHeader;
use crate::network::packet::ipv4::IPv4Header;
use crate::network::packet::tcp::TCPHeader;
use crate::network::packet::udp::UDPHeader;
use crate::pcap::header::PcapRecordHeader;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub enum TransportHeader {
    TCP(TCPHeader),
    UDP(UDPHeader),
}

impl TransportHeader {
    pub fn protocol(&self) -> u8 {
        match self {
            TransportHeader::TCP(_) => ipv4::PROTOCOL_TCP,
            TransportHeader::UDP(_) => ipv4::PROTOCOL_UDP,
        }
    }

    pub fn source_port(&self) -> u16 {
        match self {
            TransportHeader::TCP(tcp) => tcp.source_port,
            TransportHeader::UDP(udp) => udp.source_port,
        }
    }

    pub fn destination_port(&self) -> u16 {
        match self {
            TransportHeader::TCP(tcp) => tcp.destination_port,
            TransportHeader::UDP(udp) => udp.destination_port,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Packet {
    pub record: PcapRecordHeader,
    // ストリーム中のレコード通し番号。フラグメントの場合は先頭フラグメントの番号
    pub packet_num: u64,
    pub ethernet: EthernetHeader,
    pub ipv4: IPv4Header,
    pub transport: TransportHeader,
    pub payload: Bytes,
    // フローが主張するペイロード総量。フラグメントのマージで累積する
    total_data_len: usize,
    nb_fragments: u32,
    more_fragments: bool,
}

impl Packet {
    pub fn new(
        record: PcapRecordHeader,
        packet_num: u64,
        ethernet: EthernetHeader,
        ipv4: IPv4Header,
        transport: TransportHeader,
        payload: Bytes,
        total_data_len: usize,
    ) -> Self {
        let more_fragments = ipv4.is_fragmented();
        Self {
            record,
            packet_num,
            ethernet,
            ipv4,
            transport,
            payload,
            total_data_len,
            nb_fragments: 1,
            more_fragments,
        }
    }

    pub fn is_fragmented(&self) -> bool {
        self.ipv4.is_fragmented()
    }

    pub fn is_fragment(&self) -> bool {
        self.ipv4.is_fragment()
    }

    pub fn expect_more_fragments(&self) -> bool {
        self.more_fragments
    }

    // nextがこのパケットのフラグメントかどうか (次のフラグメントとは限らない)
    pub fn matches_fragment(&self, next: &Packet) -> bool {
        self.ipv4.is_fragmented() && self.ipv4.identification == next.ipv4.identification
    }

    // フラグメントをこのパケットへマージする。ペイロードは結合せず、
    // 宣言された総量とフラグメント数のみ積み上げる
    pub fn merge_with(&mut self, next: &Packet) -> bool {
        if !self.matches_fragment(next) {
            return false;
        }
        self.nb_fragments += 1;
        self.total_data_len += next.total_data_len;
        self.more_fragments = next.is_fragmented();
        true
    }

    pub fn nb_fragments(&self) -> u32 {
        self.nb_fragments
    }

    pub fn ip_identification(&self) -> u16 {
        self.ipv4.identification
    }

    pub fn protocol(&self) -> u8 {
        self.transport.protocol()
    }

    pub fn source_ip(&self) -> Ipv4Addr {
        self.ipv4.source
    }

    pub fn destination_ip(&self) -> Ipv4Addr {
        self.ipv4.destination
    }

    pub fn source_port(&self) -> u16 {
        self.transport.source_port()
    }

    pub fn destination_port(&self) -> u16 {
        self.transport.destination_port()
    }

    pub fn available_data(&self) -> &[u8] {
        &self.payload
    }

    pub fn available_data_len(&self) -> usize {
        self.payload.len()
    }

    pub fn total_data_len(&self) -> usize {
        self.total_data_len
    }

    pub fn time_millis(&self) -> i64 {
        self.record.ts_sec as i64 * 1000 + (self.record.ts_usec as i64 + 500) / 1000
    }

    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.time_millis())
            .single()
            .unwrap_or_default()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}: {}:{} > {}:{} ({} bytes)",
            self.packet_num,
            self.source_ip(),
            self.source_port(),
            self.destination_ip(),
            self.destination_port(),
            self.total_data_len
        )
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::udp_packet;
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn merge_accumulates_fragments() {
        // 先頭フラグメント (MF付き, オフセット0)
        let mut head = udp_packet(1, addr(1), addr(2), 1000, 2000, 0x42, 0x1, 0, &[0u8; 100]);
        // 中間フラグメント (MF付き)
        let mid = udp_packet(2, addr(1), addr(2), 1000, 2000, 0x42, 0x1, 100, &[0u8; 100]);
        // 最終フラグメント (MFなし)
        let tail = udp_packet(3, addr(1), addr(2), 1000, 2000, 0x42, 0x0, 200, &[0u8; 50]);

        assert!(head.expect_more_fragments());
        assert!(head.merge_with(&mid));
        assert!(head.expect_more_fragments());
        assert!(head.merge_with(&tail));

        // 最終フラグメントのマージでパケットは確定する
        assert!(!head.expect_more_fragments());
        assert_eq!(head.nb_fragments(), 3);
        assert_eq!(head.total_data_len(), 250);
        // 利用可能なデータは先頭フラグメントのものだけ
        assert_eq!(head.available_data_len(), 100);
    }

    #[test]
    fn merge_rejects_other_identification() {
        let mut head = udp_packet(1, addr(1), addr(2), 1000, 2000, 0x42, 0x1, 0, &[0u8; 10]);
        let other = udp_packet(2, addr(1), addr(2), 1000, 2000, 0x43, 0x1, 10, &[0u8; 10]);

        assert!(!head.merge_with(&other));
        assert_eq!(head.nb_fragments(), 1);
    }

    #[test]
    fn merge_rejects_unfragmented_parent() {
        let mut plain = udp_packet(1, addr(1), addr(2), 1000, 2000, 0x42, 0x0, 0, &[0u8; 10]);
        let frag = udp_packet(2, addr(1), addr(2), 1000, 2000, 0x42, 0x1, 10, &[0u8; 10]);

        assert!(!plain.merge_with(&frag));
    }

    #[test]
    fn time_millis_rounds_microseconds() {
        let mut p = udp_packet(1, addr(1), addr(2), 1, 2, 0, 0, 0, &[]);
        p.record.ts_sec = 10;
        p.record.ts_usec = 1500;
        assert_eq!(p.time_millis(), 10_002);
    }
}
