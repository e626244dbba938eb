use crate::client::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot resolve {addr}: {source}")]
    AddressResolution {
        addr: String,
        source: std::io::Error,
    },

    #[error("stun client init failed: {0}")]
    ClientConstruction(ClientError),

    #[error("binding request dispatch failed: {0}")]
    Dispatch(ClientError),

    #[error("binding transaction failed: {0}")]
    ProtocolEvent(ClientError),

    #[error("no reflexive address in response: {0}")]
    AttributeExtraction(#[from] AttributeError),

    #[error("deadline exceeded waiting for binding response")]
    DeadlineExceeded,

    #[error("no stun servers configured")]
    NoServers,

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("discovery task failed: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum AttributeError {
    #[error("XOR-MAPPED-ADDRESS missing")]
    Missing,

    #[error("XOR-MAPPED-ADDRESS unusable: {0}")]
    Malformed(#[from] stun_rs::StunError),
}
