//! OSC over UDP to a local receiver

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use rosc::{OscMessage, OscPacket, OscType};

use crate::error::TransportError;
use crate::sink::{OscArg, OscTransport};

/// Sends each message as one datagram to `127.0.0.1:<port>`
pub struct UdpOscTransport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpOscTransport {
    /// Bind an ephemeral local socket aimed at `port` on localhost
    pub fn connect(port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))?;
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        log::info!("OSC: sending to {}", target);
        Ok(Self { socket, target })
    }
}

/// Encode a single-argument message
pub fn encode_message(path: &str, arg: OscArg) -> Result<Vec<u8>, TransportError> {
    let arg = match arg {
        OscArg::Int(v) => OscType::Int(v),
        OscArg::True => OscType::Bool(true),
        OscArg::False => OscType::Bool(false),
    };
    let packet = OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args: vec![arg],
    });
    rosc::encoder::encode(&packet).map_err(|e| TransportError::Osc(format!("{:?}", e)))
}

impl OscTransport for UdpOscTransport {
    fn send(&self, path: &str, arg: OscArg) -> Result<(), TransportError> {
        let bytes = encode_message(path, arg)?;
        log::debug!("[OSC OUT] {} {:?}", path, arg);
        self.socket
            .send_to(&bytes, self.target)
            .map_err(|e| TransportError::Osc(e.to_string()))?;
        Ok(())
    }
}
