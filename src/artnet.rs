use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;

use crate::error::{ShowError, ShowResult};
use crate::models::universe::{DmxFrame, UNIVERSE_SIZE};
use crate::transport::FrameTransport;

pub const ARTNET_PORT: u16 = 6454;
const HEADER: &[u8] = b"Art-Net\0";
pub const ARTDMX_LEN: usize = 18 + UNIVERSE_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub struct ArtNetConfig {
    /// Local interface to bind, "0.0.0.0" for any
    pub interface: String,
    pub broadcast: bool,
    /// Unicast node address, with or without a port
    pub unicast_ip: Option<String>,
    pub net: u8,
    pub subnet: u8,
    pub universe: u8,
}

impl Default for ArtNetConfig {
    fn default() -> Self {
        Self {
            interface: "0.0.0.0".to_string(),
            broadcast: true,
            unicast_ip: None,
            net: 0,
            subnet: 0,
            universe: 0,
        }
    }
}

impl ArtNetConfig {
    /// Port Address: bits 14-8 Net, 7-4 SubNet, 3-0 Universe
    pub fn port_address(&self) -> u16 {
        ((self.net as u16 & 0x7F) << 8)
            | ((self.subnet as u16 & 0xF) << 4)
            | (self.universe as u16 & 0xF)
    }
}

fn resolve_target(host: &str) -> ShowResult<SocketAddr> {
    let with_port = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, ARTNET_PORT)
    };
    with_port
        .to_socket_addrs()
        .map_err(|e| ShowError::TransportFailure(format!("Bad Art-Net target {}: {}", host, e)))?
        .next()
        .ok_or_else(|| ShowError::TransportFailure(format!("No address for {}", host)))
}

/// One ArtDmx datagram per frame, to a unicast node and/or broadcast.
pub struct ArtNetTransport {
    socket: UdpSocket,
    targets: Vec<SocketAddr>,
    port_address: u16,
    sequence: Mutex<u8>,
}

impl ArtNetTransport {
    pub fn bind(config: &ArtNetConfig) -> ShowResult<Self> {
        let bind_ip = if config.interface.is_empty() {
            "0.0.0.0"
        } else {
            config.interface.as_str()
        };

        // 6454 may already be taken by another controller on this host
        let addr = format!("{}:{}", bind_ip, ARTNET_PORT);
        let socket = match UdpSocket::bind(&addr) {
            Ok(s) => s,
            Err(e) => {
                log::warn!(
                    "[artnet] failed to bind {}: {}, using an ephemeral port",
                    addr,
                    e
                );
                UdpSocket::bind(format!("{}:0", bind_ip)).map_err(|e| {
                    ShowError::TransportFailure(format!("Failed to bind {}: {}", bind_ip, e))
                })?
            }
        };
        socket
            .set_broadcast(true)
            .map_err(|e| ShowError::TransportFailure(e.to_string()))?;

        let mut targets = Vec::new();
        if let Some(ip) = config.unicast_ip.as_deref().filter(|s| !s.is_empty()) {
            targets.push(resolve_target(ip)?);
        }
        if config.broadcast || targets.is_empty() {
            targets.push(SocketAddr::from(([255, 255, 255, 255], ARTNET_PORT)));
        }

        if let Ok(local) = socket.local_addr() {
            log::info!(
                "[artnet] bound to {}, sending universe {:#06x} to {:?}",
                local,
                config.port_address(),
                targets
            );
        }

        Ok(Self {
            socket,
            targets,
            port_address: config.port_address(),
            sequence: Mutex::new(0),
        })
    }

    /// Transport sending only to `targets`; broadcast is not enabled.
    pub fn with_targets(
        socket: UdpSocket,
        targets: Vec<SocketAddr>,
        port_address: u16,
    ) -> Self {
        Self {
            socket,
            targets,
            port_address,
            sequence: Mutex::new(0),
        }
    }

    pub fn targets(&self) -> &[SocketAddr] {
        &self.targets
    }

    fn next_sequence(&self) -> u8 {
        let mut sequence = self.sequence.lock().expect("artnet sequence poisoned");
        let current = *sequence;
        *sequence = sequence.wrapping_add(1);
        current
    }
}

impl FrameTransport for ArtNetTransport {
    fn send_frame(&self, frame: &DmxFrame) -> ShowResult<()> {
        let packet = build_artdmx_packet(self.next_sequence(), self.port_address, frame.as_bytes());
        let mut failed = Vec::new();
        for target in &self.targets {
            if let Err(e) = self.socket.send_to(&packet, target) {
                failed.push(format!("{}: {}", target, e));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ShowError::TransportFailure(failed.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "artnet"
    }
}

pub fn build_artdmx_packet(sequence: u8, port_address: u16, data: &[u8; UNIVERSE_SIZE]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(ARTDMX_LEN);
    packet.extend_from_slice(HEADER);
    packet.extend_from_slice(&[0x00, 0x50]); // OpDmx 0x5000, low byte first
    packet.extend_from_slice(&[0x00, 0x0E]); // ProtVer 14, high byte first
    packet.push(sequence);
    packet.push(0x00); // Physical
    packet.push((port_address & 0xFF) as u8); // SubUni
    packet.push(((port_address >> 8) & 0x7F) as u8); // Net
    packet.extend_from_slice(&[0x02, 0x00]); // Length 512, high byte first
    packet.extend_from_slice(data);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn artdmx_layout() {
        let mut data = [0u8; UNIVERSE_SIZE];
        data[0] = 7;
        data[511] = 9;
        let packet = build_artdmx_packet(42, 0x0123, &data);
        assert_eq!(packet.len(), ARTDMX_LEN);
        assert_eq!(&packet[0..8], HEADER);
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
        assert_eq!(&packet[10..12], &[0x00, 0x0E]);
        assert_eq!(packet[12], 42);
        assert_eq!(packet[14], 0x23);
        assert_eq!(packet[15], 0x01);
        assert_eq!(&packet[16..18], &[0x02, 0x00]);
        assert_eq!(packet[18], 7);
        assert_eq!(packet[ARTDMX_LEN - 1], 9);
    }

    #[test]
    fn port_address_packs_net_subnet_universe() {
        let config = ArtNetConfig {
            net: 1,
            subnet: 2,
            universe: 3,
            ..ArtNetConfig::default()
        };
        assert_eq!(config.port_address(), 0x0123);
    }

    #[test]
    fn sends_one_datagram_per_frame_with_wrapping_sequence() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        let transport =
            ArtNetTransport::with_targets(sender, vec![receiver.local_addr().unwrap()], 0);
        *transport.sequence.lock().unwrap() = 254;

        let mut frame = DmxFrame::blackout();
        frame.set(3, 200);
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        for _ in 0..3 {
            transport.send_frame(&frame).unwrap();
            let (size, _) = receiver.recv_from(&mut buf).unwrap();
            assert_eq!(size, ARTDMX_LEN);
            assert_eq!(buf[18 + 3], 200);
            seen.push(buf[12]);
        }
        assert_eq!(seen, vec![254, 255, 0]);
    }
}
