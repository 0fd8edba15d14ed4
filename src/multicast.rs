use log::{error, info};
use std::net::{Ipv4Addr, UdpSocket};

// マルチキャストグループへの参加状態。
// ソケットは参加の証として保持し、終了時にまとめて離脱する
pub struct MulticastGroups {
    joined: Vec<(UdpSocket, Ipv4Addr)>,
}

impl MulticastGroups {
    pub fn new() -> Self {
        Self { joined: Vec::new() }
    }

    pub fn join(&mut self, group: Ipv4Addr) -> bool {
        let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) {
            Ok(socket) => socket,
            Err(e) => {
                error!("マルチキャスト用ソケットを作成できません: {}", e);
                return false;
            }
        };

        match socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            Ok(()) => {
                info!("マルチキャストグループ {} に参加しました", group);
                self.joined.push((socket, group));
                true
            }
            Err(e) => {
                error!("マルチキャストアドレス {} に参加できません: {}", group, e);
                false
            }
        }
    }

    pub fn leave_all(&mut self) {
        for (socket, group) in self.joined.drain(..) {
            if let Err(e) = socket.leave_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
                error!("マルチキャストグループ {} から離脱できません: {}", group, e);
            }
        }
    }

    pub fn nb_joined(&self) -> usize {
        self.joined.len()
    }
}

impl Default for MulticastGroups {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MulticastGroups {
    fn drop(&mut self) {
        self.leave_all();
    }
}
