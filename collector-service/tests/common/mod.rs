//! Wire helpers for the in-process MQTT stubs used by the integration tests.
#![allow(dead_code)]

use tokio::{io::AsyncReadExt, net::TcpStream};

pub const PRIVATE_PEM: &[u8] = include_bytes!("../fixtures/rsa_private.pem");

/// Read one MQTT control packet: fixed-header byte plus the variable part.
/// `None` once the peer hangs up.
pub async fn read_packet(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let header = stream.read_u8().await.ok()?;
    let (mut len, mut shift) = (0usize, 0);
    loop {
        let b = stream.read_u8().await.ok()?;
        len |= ((b & 0x7f) as usize) << shift;
        if b & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    let mut body = vec![0; len];
    stream.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

/// Topic and payload of a QoS 0 PUBLISH body.
pub fn publish_parts(body: &[u8]) -> (String, String) {
    let n = u16::from_be_bytes([body[0], body[1]]) as usize;
    let topic = String::from_utf8_lossy(&body[2..2 + n]).into_owned();
    let payload = String::from_utf8_lossy(&body[2 + n..]).into_owned();
    (topic, payload)
}
