use crate::error::DecodeError;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_VLAN: u16 = 0x8100;

// これ未満のEtherTypeはIEEE 802.3の長さフィールドと区別できない
pub const ETHERTYPE_MIN: u16 = 1536;

#[derive(Debug, Clone)]
pub struct EthernetHeader {
    pub destination: [u8; 6],
    pub source: [u8; 6],
    pub qtag: Option<u32>,
    pub ethertype: u16,
}

impl EthernetHeader {
    pub fn parse(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if data.len() < 14 {
            return Err(DecodeError::Truncated("Ethernet"));
        }

        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&data[0..6]);
        source.copy_from_slice(&data[6..12]);

        let mut ethertype = u16::from_be_bytes([data[12], data[13]]);
        let mut qtag = None;
        let mut consumed = 14;

        // 802.1Qタグ (0x8100) が続く場合は4バイトのタグを読み飛ばす
        if ethertype == ETHERTYPE_VLAN {
            if data.len() < 18 {
                return Err(DecodeError::Truncated("Ethernet"));
            }
            let tci = u16::from_be_bytes([data[14], data[15]]);
            qtag = Some((ETHERTYPE_VLAN as u32) << 16 | tci as u32);
            ethertype = u16::from_be_bytes([data[16], data[17]]);
            consumed = 18;
        }

        if ethertype < ETHERTYPE_MIN {
            return Err(DecodeError::AmbiguousEthertype(ethertype));
        }

        Ok((
            Self {
                destination,
                source,
                qtag,
                ethertype,
            },
            &data[consumed..],
        ))
    }

    pub fn header_size(&self) -> usize {
        if self.qtag.is_some() {
            18
        } else {
            14
        }
    }

    pub fn format_mac(mac: &[u8; 6]) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }
}
