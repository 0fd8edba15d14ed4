use crate::filters::counter::{CounterFilter, CounterWidth};
use crate::filters::MessageFilter;
use crate::network::packet::Packet;

// RTPストリーム解析。シーケンス番号はRTPヘッダーのオフセット2にある
// 16ビットカウンタで、RTPは常に偶数ポートを使う
pub struct RtpFilter {
    inner: CounterFilter,
}

impl RtpFilter {
    pub fn new(window_size: usize) -> Self {
        Self {
            inner: CounterFilter::with_code("RTP", CounterWidth::W16, 2, window_size),
        }
    }
}

impl MessageFilter for RtpFilter {
    fn code(&self) -> &'static str {
        self.inner.code()
    }

    fn description(&self) -> &'static str {
        "RTPストリームを解析します"
    }

    fn set_name(&mut self, name: Option<String>) {
        self.inner.set_name(name);
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    fn process(&mut self, packet: &Packet) -> bool {
        if packet.source_port() % 2 != 0 {
            return false;
        }
        self.inner.process(packet)
    }

    fn watch(&mut self) {
        self.inner.watch();
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn finish(&mut self) -> bool {
        self.inner.finish()
    }

    fn duplicate(&self) -> Box<dyn MessageFilter> {
        let mut inner =
            CounterFilter::with_code("RTP", CounterWidth::W16, 2, self.inner.window_size());
        inner.set_name(self.inner.name().map(str::to_string));
        Box::new(RtpFilter { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REORDUPL_WINDOW;
    use crate::network::packet::testutil::udp_packet;
    use std::net::Ipv4Addr;

    #[test]
    fn odd_source_ports_are_rejected() {
        let mut filter = RtpFilter::new(DEFAULT_REORDUPL_WINDOW);

        let even = udp_packet(
            1,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(230, 116, 1, 1),
            5004,
            29866,
            1,
            0,
            0,
            &[0x80, 0x60, 0x00, 0x01, 0x00, 0x00],
        );
        // RTCPなどの奇数ポート
        let odd = udp_packet(
            2,
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(230, 116, 1, 1),
            5005,
            29867,
            2,
            0,
            0,
            &[0x80, 0x60, 0x00, 0x02, 0x00, 0x00],
        );

        assert!(filter.process(&even));
        assert!(!filter.process(&odd));
    }
}
