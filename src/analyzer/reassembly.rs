use crate::error::AnalyzeError;
use crate::network::packet::Packet;
use std::collections::VecDeque;

// フラグメント再構築FIFO。到着順を保つため、フラグメントが滞留している間は
// 後続のパケットもFIFOを経由させる。払い出しは常に先頭のみを評価する。
pub struct FragmentFifo {
    fifo: VecDeque<Packet>,
    window_size: usize,
    nb_fragments_lost: u64,
    nb_unfinished_packets: u64,
}

impl FragmentFifo {
    pub fn new(window_size: usize) -> Self {
        Self {
            fifo: VecDeque::new(),
            window_size,
            nb_fragments_lost: 0,
            nb_unfinished_packets: 0,
        }
    }

    // 1パケットを受け入れ、払い出せるパケットがあればそれを返す。
    // 親が見つからないフラグメントは欠落として数え、破棄する。
    pub fn push(&mut self, packet: Packet) -> Result<Option<Packet>, AnalyzeError> {
        // フラグメントなし、かつ滞留なし: FIFOを素通しして遅延ゼロで返す
        if !packet.is_fragmented() && self.fifo.is_empty() {
            return Ok(Some(packet));
        }

        if packet.is_fragment() {
            // 既存エントリへのマージを試みる
            let mut merged = false;
            for entry in self.fifo.iter_mut() {
                if entry.merge_with(&packet) {
                    merged = true;
                    break;
                }
            }
            if !merged {
                self.nb_fragments_lost += 1;
                return Err(AnalyzeError::OrphanFragment {
                    packet: packet.packet_num,
                    ident: packet.ip_identification(),
                });
            }
        } else {
            self.fifo.push_back(packet);
        }

        // 先頭が確定していれば到着順に払い出す
        if let Some(head) = self.fifo.front() {
            if !head.expect_more_fragments() {
                return Ok(self.fifo.pop_front());
            }
        }

        // ウィンドウ超過: 未完了でも先頭を強制的に払い出す
        if self.fifo.len() > self.window_size {
            let head = self.fifo.pop_front();
            if let Some(p) = head.as_ref() {
                if p.expect_more_fragments() {
                    self.nb_unfinished_packets += 1;
                }
            }
            return Ok(head);
        }

        Ok(None)
    }

    // ストリーム終端で残存パケットを到着順に取り出す
    pub fn drain_remaining(&mut self) -> Vec<Packet> {
        self.fifo.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn nb_fragments_lost(&self) -> u64 {
        self.nb_fragments_lost
    }

    pub fn nb_unfinished_packets(&self) -> u64 {
        self.nb_unfinished_packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::testutil::udp_packet;
    use std::net::Ipv4Addr;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(230, 116, 1, 1);

    fn plain(num: u64, ident: u16) -> Packet {
        udp_packet(num, SRC, DST, 1000, 2000, ident, 0x0, 0, &[0u8; 10])
    }

    fn first_fragment(num: u64, ident: u16) -> Packet {
        udp_packet(num, SRC, DST, 1000, 2000, ident, 0x1, 0, &[0u8; 100])
    }

    fn middle_fragment(num: u64, ident: u16, offset: u16) -> Packet {
        udp_packet(num, SRC, DST, 1000, 2000, ident, 0x1, offset, &[0u8; 100])
    }

    fn last_fragment(num: u64, ident: u16, offset: u16) -> Packet {
        udp_packet(num, SRC, DST, 1000, 2000, ident, 0x0, offset, &[0u8; 50])
    }

    #[test]
    fn unfragmented_packet_bypasses_fifo() {
        let mut fifo = FragmentFifo::new(10);
        let released = fifo.push(plain(1, 0x10)).unwrap();
        assert_eq!(released.map(|p| p.packet_num), Some(1));
        assert!(fifo.is_empty());
    }

    #[test]
    fn fragments_merge_and_release_once() {
        let mut fifo = FragmentFifo::new(10);

        assert!(fifo.push(first_fragment(1, 0x42)).unwrap().is_none());
        assert!(fifo.push(middle_fragment(2, 0x42, 100)).unwrap().is_none());

        let released = fifo.push(last_fragment(3, 0x42, 200)).unwrap();
        let packet = released.expect("最終フラグメントで払い出されるはず");
        assert_eq!(packet.packet_num, 1);
        assert_eq!(packet.nb_fragments(), 3);
        assert_eq!(packet.total_data_len(), 250);
        assert!(!packet.expect_more_fragments());
        assert!(fifo.is_empty());
    }

    #[test]
    fn interleaved_packets_keep_arrival_order() {
        let mut fifo = FragmentFifo::new(10);

        assert!(fifo.push(first_fragment(1, 0x42)).unwrap().is_none());
        // フラグメント滞留中に到着した完結パケットは順序維持のため待たされる
        assert!(fifo.push(plain(2, 0x50)).unwrap().is_none());

        let released = fifo.push(last_fragment(3, 0x42, 100)).unwrap();
        assert_eq!(released.map(|p| p.packet_num), Some(1));

        // 先頭が払い出された後、待たされていたパケットは次のpushで出てくる
        let released = fifo.push(plain(4, 0x51)).unwrap();
        assert_eq!(released.map(|p| p.packet_num), Some(2));
        let remaining = fifo.drain_remaining();
        assert_eq!(
            remaining.iter().map(|p| p.packet_num).collect::<Vec<_>>(),
            vec![4]
        );
    }

    #[test]
    fn orphan_fragment_is_counted_and_discarded() {
        let mut fifo = FragmentFifo::new(10);

        assert!(fifo.push(first_fragment(1, 0x42)).unwrap().is_none());
        let err = fifo.push(middle_fragment(2, 0x99, 100)).unwrap_err();
        assert!(matches!(
            err,
            AnalyzeError::OrphanFragment {
                packet: 2,
                ident: 0x99
            }
        ));
        assert_eq!(fifo.nb_fragments_lost(), 1);
        assert_eq!(fifo.len(), 1);
    }

    #[test]
    fn window_overflow_forces_release_of_incomplete_head() {
        let mut fifo = FragmentFifo::new(3);

        assert!(fifo.push(first_fragment(1, 0x42)).unwrap().is_none());
        // 完結しない先頭の後ろに別パケットを積んでウィンドウを溢れさせる
        assert!(fifo.push(plain(2, 0x50)).unwrap().is_none());
        assert!(fifo.push(plain(3, 0x51)).unwrap().is_none());

        let released = fifo.push(plain(4, 0x52)).unwrap();
        let head = released.expect("ウィンドウ超過で先頭が強制払い出しされるはず");
        assert_eq!(head.packet_num, 1);
        assert!(head.expect_more_fragments());
        // 未完了払い出しはちょうど1回だけ数えられる
        assert_eq!(fifo.nb_unfinished_packets(), 1);
    }
}
