//! Server-side replies for exercising the client and the discovery call.

use std::net::SocketAddr;

use stun_rs::{
    MessageClass, MessageDecoderBuilder, StunMessage, StunMessageBuilder,
    attributes::stun::{ErrorCode, XorMappedAddress},
    methods::BINDING,
};

use super::encode;

fn decode(raw: &[u8]) -> StunMessage {
    MessageDecoderBuilder::default().build().decode(raw).unwrap().0
}

/// Success response to the encoded request `req`, carrying `mapped` as
/// XOR-MAPPED-ADDRESS when given.
pub fn success_response(req: &[u8], mapped: Option<SocketAddr>) -> Vec<u8> {
    let req = decode(req);
    let mut resp = StunMessageBuilder::new(BINDING, MessageClass::SuccessResponse)
        .with_transaction_id(req.transaction_id().clone());
    if let Some(addr) = mapped {
        resp = resp.with_attribute(XorMappedAddress::from(addr));
    }

    encode(&resp.build()).unwrap()
}

pub fn error_response(req: &[u8], code: u16, reason: &str) -> Vec<u8> {
    let req = decode(req);
    let error = stun_rs::ErrorCode::new(code, reason).unwrap();
    let resp = StunMessageBuilder::new(BINDING, MessageClass::ErrorResponse)
        .with_transaction_id(req.transaction_id().clone())
        .with_attribute(ErrorCode::from(error))
        .build();

    encode(&resp).unwrap()
}

pub fn mapped_address(msg: &StunMessage) -> Option<SocketAddr> {
    let attr = msg.get::<XorMappedAddress>()?;
    Some(*attr.as_xor_mapped_address().ok()?.socket_address())
}
