use crate::error::{DecodeError, OpenError, ReadError};
use crate::network::packet::ethernet::{EthernetHeader, ETHERTYPE_IPV4};
use crate::network::packet::ipv4::{IPv4Header, PROTOCOL_TCP, PROTOCOL_UDP};
use crate::network::packet::tcp::TCPHeader;
use crate::network::packet::udp::UDPHeader;
use crate::network::packet::{Packet, TransportHeader};
use crate::pcap::dump::PcapDump;
use crate::pcap::header::{PcapFileHeader, PcapRecordHeader};
use bytes::Bytes;
use log::error;
use std::io::Read;

pub struct PcapReader {
    input: Box<dyn Read>,
    dump: Option<PcapDump>,
    file_header: PcapFileHeader,
    // 消費したレコード数。デコードの成否に関わらず単調増加する
    packet_num: u64,
}

impl PcapReader {
    pub fn open(mut input: Box<dyn Read>, mut dump: Option<PcapDump>) -> Result<Self, OpenError> {
        let file_header = PcapFileHeader::read(&mut input)?;
        if let Some(dump) = dump.as_mut() {
            dump.set_file_header(&file_header);
        }
        Ok(Self {
            input,
            dump,
            file_header,
            packet_num: 0,
        })
    }

    pub fn snap_length(&self) -> u32 {
        self.file_header.snaplen
    }

    pub fn last_packet_number(&self) -> u64 {
        self.packet_num
    }

    pub fn read_next(&mut self) -> Result<Packet, ReadError> {
        let record = PcapRecordHeader::read(&mut self.input)?;

        let mut data = vec![0u8; record.included_length as usize];
        self.input.read_exact(&mut data).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ReadError::ShortRead
            } else {
                ReadError::Io(e)
            }
        })?;
        let data = Bytes::from(data);

        // レコードヘッダーとペイロードを読み終えた時点で番号を進める
        self.packet_num += 1;

        // デコード前に読み取ったままのバイト列をダンプへ書き戻す
        if let Some(dump) = self.dump.as_mut() {
            if let Err(e) = dump.write_record(&record.raw, &data) {
                error!("ダンプ書き込みに失敗しました: {}", e);
            }
        }

        let packet_num = self.packet_num;
        self.decode(record, data)
            .map_err(|source| ReadError::Decode {
                record: packet_num,
                source,
            })
    }

    // Ethernet -> IPv4 -> TCP/UDP の順にヘッダースタックをデコードする
    fn decode(&self, record: PcapRecordHeader, data: Bytes) -> Result<Packet, DecodeError> {
        let (ethernet, rest) = EthernetHeader::parse(&data)?;
        if ethernet.ethertype != ETHERTYPE_IPV4 {
            return Err(DecodeError::UnhandledEthertype(ethernet.ethertype));
        }

        let (ipv4, rest) = IPv4Header::parse(rest)?;

        let (transport, remaining) = match ipv4.protocol {
            PROTOCOL_TCP => {
                let (tcp, rest) = TCPHeader::parse(rest)?;
                (TransportHeader::TCP(tcp), rest.len())
            }
            PROTOCOL_UDP => {
                let (udp, rest) = UDPHeader::parse(rest)?;
                (TransportHeader::UDP(udp), rest.len())
            }
            other => return Err(DecodeError::UnhandledProtocol(other)),
        };

        let consumed = data.len() - remaining;
        let payload = data.slice(consumed..);
        // 総量はキャプチャ長ではなく回線上の宣言サイズから求める
        let total_data_len = (record.original_length as usize).saturating_sub(consumed);

        Ok(Packet::new(
            record,
            self.packet_num,
            ethernet,
            ipv4,
            transport,
            payload,
            total_data_len,
        ))
    }

    pub fn close(&mut self) {
        if let Some(dump) = self.dump.as_mut() {
            dump.close();
        }
    }
}
