use ballast_base::{err, Result};

use crate::msg::{Req, Resp};

/// Wire format version, the first byte of every encoded message. Peers
/// reject anything newer than they understand rather than guessing.
pub const WIRE_VERS: u8 = 0;

fn encode<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut buf = vec![WIRE_VERS];
    let body = rmp_serde::to_vec(msg)?;
    buf.extend_from_slice(&body);
    Ok(buf)
}

fn decode<T: serde::de::DeserializeOwned>(buf: &[u8]) -> Result<T> {
    let Some((&vers, body)) = buf.split_first() else {
        return Err(err("empty message"));
    };
    if vers != WIRE_VERS {
        return Err(err("unsupported wire format version"));
    }
    Ok(rmp_serde::from_slice(body)?)
}

pub fn encode_req(req: &Req) -> Result<Vec<u8>> {
    encode(req)
}

pub fn decode_req(buf: &[u8]) -> Result<Req> {
    decode(buf)
}

pub fn encode_resp(resp: &Resp) -> Result<Vec<u8>> {
    encode(resp)
}

pub fn decode_resp(buf: &[u8]) -> Result<Resp> {
    decode(buf)
}
