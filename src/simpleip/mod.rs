pub mod client;
pub mod codec;
pub mod listener;
pub mod message;

pub use client::{ClientSettings, SimpleIpClient, DEFAULT_PORT};
pub use codec::SimpleIpCodec;
pub use listener::{ListenerId, SimpleIpListener};
pub use message::{Command, Message, MessageType, Parameter};

use thiserror::Error;

/// Failures to interpret bytes as protocol content.
///
/// Framing noise (bad sync, bad terminator) never becomes an error value;
/// the codec resynchronizes over it silently.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown Simple IP message type '{0}'")]
    UnknownMessageType(char),

    #[error("unknown Simple IP command \"{0}\"")]
    UnknownCommand(String),

    #[error("parameter \"{0}\" is not a decimal value of the expected width")]
    BadParameter(String),

    #[error("constructed frame is {0} bytes, expected 24")]
    FrameLength(usize),
}
