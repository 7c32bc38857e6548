use crate::prelude::*;
use crate::simpleip::{Command, Message, MessageType, SimpleIpListener};

/// The built-in collaborator: logs every decoded event so the bridge is
/// useful on its own as a TV state monitor. Anything richer (channel
/// mappings, automation glue) registers its own listener instead.
pub struct Monitor;

impl SimpleIpListener for Monitor {
    fn on_message(&self, peer: &str, message: &Message) {
        let prefix = match message.message_type {
            MessageType::Answer => "answer",
            MessageType::Notify => "notify",
            // a well-behaved TV never sends these back
            MessageType::Control | MessageType::Enquiry => {
                warn!("tv {}: unexpected echo of {}", peer, message);
                return;
            }
        };

        let parameter = &message.parameter;
        if parameter.is_error() {
            warn!("tv {}: {} {}: device reported an error", peer, prefix, message.command);
            return;
        }
        if parameter.is_not_found() {
            warn!("tv {}: {} {}: no such item", peer, prefix, message.command);
            return;
        }

        match message.command {
            Command::PowerStatus => {
                info!("tv {}: power {}", peer, if parameter.is_on() { "on" } else { "off" });
            }
            Command::AudioVolume => match parameter.as_value() {
                Ok(volume) => info!("tv {}: volume {}", peer, volume),
                Err(e) => warn!("tv {}: bad volume answer: {}", peer, e),
            },
            Command::AudioMute | Command::PictureMute => {
                info!(
                    "tv {}: {} {}",
                    peer,
                    message.command,
                    if parameter.is_on() { "muted" } else { "unmuted" }
                );
            }
            Command::Input => match (parameter.as_input_type(), parameter.as_input_sequence()) {
                (Ok(input_type), Ok(sequence)) => {
                    info!("tv {}: input type {} sequence {}", peer, input_type, sequence);
                }
                _ => warn!("tv {}: bad input answer: {}", peer, parameter),
            },
            other => {
                if parameter.is_success() {
                    info!("tv {}: {} {} ok", peer, prefix, other);
                } else {
                    info!("tv {}: {} {} {}", peer, prefix, other, parameter);
                }
            }
        }
    }

    fn on_connection_error(&self, peer: &str, reason: &str) {
        error!("tv {}: connection error: {}", peer, reason);
    }
}
