use crate::prelude::*;
use crate::simpleip::message::{Command, Message, MessageType, Parameter};
use crate::simpleip::ProtocolError;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Every PDU is exactly this many bytes on the wire.
pub const FRAME_LEN: usize = 24;

const SYNC: [u8; 2] = *b"*S";
const TERMINATOR: u8 = 0x0a;

/// Stateless apart from a latch that keeps resynchronization noise from
/// flooding the log when the peer emits a long run of garbage.
#[derive(Default)]
pub struct SimpleIpCodec {
    resync_logged: bool,
}

impl SimpleIpCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn log_resync(&mut self, what: &str) {
        if !self.resync_logged {
            warn!("{}, scanning for next frame (coalescing further warnings)", what);
            self.resync_logged = true;
        }
    }

    /// Position of the first sync pair, or None if the buffer holds no
    /// complete candidate.
    fn find_sync(src: &[u8]) -> Option<usize> {
        src.windows(SYNC.len()).position(|w| w == SYNC)
    }
}

impl Encoder<Message> for SimpleIpCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        dst.extend_from_slice(&SYNC);
        dst.extend_from_slice(&[message.message_type.wire_code()]);
        dst.extend_from_slice(message.command.wire_code());
        dst.extend_from_slice(message.parameter.as_bytes());
        dst.extend_from_slice(&[TERMINATOR]);

        // Fixed-width fields make this unreachable; a frame of the wrong
        // size must never be shipped regardless.
        let written = dst.len() - start;
        if written != FRAME_LEN {
            dst.truncate(start);
            return Err(ProtocolError::FrameLength(written).into());
        }

        Ok(())
    }
}

impl Decoder for SimpleIpCodec {
    type Item = Message;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>> {
        loop {
            let Some(sync_at) = Self::find_sync(src) else {
                // No sync in sight. Everything up to a possible dangling '*'
                // at the tail is noise.
                let keep = if src.last() == Some(&SYNC[0]) { 1 } else { 0 };
                if src.len() > keep {
                    self.log_resync("received bytes without frame sync");
                    let garbage = src.len() - keep;
                    src.advance(garbage);
                }
                return Ok(None);
            };

            if sync_at > 0 {
                self.log_resync("received bytes before frame sync");
                src.advance(sync_at);
            }

            if src.len() < FRAME_LEN {
                return Ok(None);
            }

            if src[FRAME_LEN - 1] != TERMINATOR {
                // Candidate frame without terminator. Skip the sync pair and
                // keep hunting; this is framing noise, not an error.
                warn!("frame candidate did not end with 0x0a, discarding");
                src.advance(SYNC.len());
                continue;
            }

            // A full, well-framed candidate. Whatever happens next, it is
            // consumed, so a bad frame can only surface one error.
            self.resync_logged = false;
            let message_type = MessageType::from_wire(src[2]);
            let mut command_code = [0u8; 4];
            command_code.copy_from_slice(&src[3..7]);
            let command = Command::from_wire(&command_code);
            let mut parameter = [0u8; Parameter::LEN];
            parameter.copy_from_slice(&src[7..7 + Parameter::LEN]);
            src.advance(FRAME_LEN);

            return Ok(Some(Message::new(
                message_type?,
                command?,
                Parameter::from_bytes(parameter),
            )));
        }
    }
}
