use crate::simpleip::ProtocolError;

/// One of the four Simple IP message classes, tagged with its wire byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MessageType {
    Control,
    Enquiry,
    Answer,
    Notify,
}

impl MessageType {
    pub fn wire_code(&self) -> u8 {
        match self {
            Self::Control => b'C',
            Self::Enquiry => b'E',
            Self::Answer => b'A',
            Self::Notify => b'N',
        }
    }

    pub fn from_wire(code: u8) -> Result<Self, ProtocolError> {
        match code {
            b'C' => Ok(Self::Control),
            b'E' => Ok(Self::Enquiry),
            b'A' => Ok(Self::Answer),
            b'N' => Ok(Self::Notify),
            other => Err(ProtocolError::UnknownMessageType(other as char)),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_code() as char)
    }
}

/// The supported command set, each tagged with its 4-byte wire code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Command {
    PowerStatus,
    TogglePowerStatus,
    AudioVolume,
    AudioMute,
    PictureMute,
    TogglePictureMute,
    Channel,
    InputSource,
    Input,
    Pip,
    TogglePip,
    TogglePipPosition,
    TripletChannel,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Self::PowerStatus,
        Self::TogglePowerStatus,
        Self::AudioVolume,
        Self::AudioMute,
        Self::PictureMute,
        Self::TogglePictureMute,
        Self::Channel,
        Self::InputSource,
        Self::Input,
        Self::Pip,
        Self::TogglePip,
        Self::TogglePipPosition,
        Self::TripletChannel,
    ];

    pub fn wire_code(&self) -> &'static [u8; 4] {
        match self {
            Self::PowerStatus => b"POWR",
            Self::TogglePowerStatus => b"TPOW",
            Self::AudioVolume => b"VOLU",
            Self::AudioMute => b"AMUT",
            Self::PictureMute => b"PMUT",
            Self::TogglePictureMute => b"TPMU",
            Self::Channel => b"CHNN",
            Self::InputSource => b"ISRC",
            Self::Input => b"INPT",
            Self::Pip => b"PIPI",
            Self::TogglePip => b"TPIP",
            Self::TogglePipPosition => b"TPPP",
            Self::TripletChannel => b"TCHN",
        }
    }

    pub fn from_wire(code: &[u8; 4]) -> Result<Self, ProtocolError> {
        match code {
            b"POWR" => Ok(Self::PowerStatus),
            b"TPOW" => Ok(Self::TogglePowerStatus),
            b"VOLU" => Ok(Self::AudioVolume),
            b"AMUT" => Ok(Self::AudioMute),
            b"PMUT" => Ok(Self::PictureMute),
            b"TPMU" => Ok(Self::TogglePictureMute),
            b"CHNN" => Ok(Self::Channel),
            b"ISRC" => Ok(Self::InputSource),
            b"INPT" => Ok(Self::Input),
            b"PIPI" => Ok(Self::Pip),
            b"TPIP" => Ok(Self::TogglePip),
            b"TPPP" => Ok(Self::TogglePipPosition),
            b"TCHN" => Ok(Self::TripletChannel),
            other => Err(ProtocolError::UnknownCommand(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.wire_code()))
    }
}

/// The fixed 16-character payload of a Simple IP frame.
///
/// A parameter is either a 16-digit decimal value, one of the reserved
/// sentinels, or (for INPT) two concatenated 8-digit sub-fields.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Parameter([u8; 16]);

impl Parameter {
    pub const LEN: usize = 16;

    const NONE: [u8; 16] = *b"################";
    const ERROR: [u8; 16] = *b"FFFFFFFFFFFFFFFF";
    const NOT_FOUND: [u8; 16] = *b"NNNNNNNNNNNNNNNN";
    const OFF: [u8; 16] = *b"0000000000000000";
    const ON: [u8; 16] = *b"0000000000000001";

    pub const INPUT_HDMI: u32 = 1;
    pub const INPUT_COMPONENT: u32 = 4;
    pub const INPUT_SCREEN_MIRRORING: u32 = 5;

    /// The "no parameter" sentinel used by enquiries and toggles.
    pub fn none() -> Self {
        Self(Self::NONE)
    }

    pub fn on() -> Self {
        Self(Self::ON)
    }

    pub fn off() -> Self {
        Self(Self::OFF)
    }

    /// A 16-digit zero-padded decimal value (volume, power state, ...).
    /// Values wider than 16 digits cannot be framed.
    pub fn from_value(value: u64) -> Self {
        debug_assert!(value < 10_000_000_000_000_000, "value wider than 16 digits");
        let mut bytes = [0u8; 16];
        let formatted = format!("{:016}", value);
        bytes.copy_from_slice(&formatted.as_bytes()[formatted.len() - 16..]);
        Self(bytes)
    }

    /// The two 8-digit sub-fields used by the INPT command. Each sub-field
    /// must fit in 8 digits.
    pub fn input(input_type: u32, sequence: u32) -> Self {
        debug_assert!(input_type < 100_000_000, "input type wider than 8 digits");
        debug_assert!(sequence < 100_000_000, "input sequence wider than 8 digits");
        let mut bytes = [0u8; 16];
        let formatted = format!("{:08}{:08}", input_type % 100_000_000, sequence % 100_000_000);
        bytes.copy_from_slice(formatted.as_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    pub fn is_error(&self) -> bool {
        self.0 == Self::ERROR
    }

    pub fn is_not_found(&self) -> bool {
        self.0 == Self::NOT_FOUND
    }

    /// All-zero doubles as "off" for states and "success" for control answers.
    pub fn is_success(&self) -> bool {
        self.0 == Self::OFF
    }

    pub fn is_on(&self) -> bool {
        self.0 == Self::ON
    }

    pub fn is_off(&self) -> bool {
        self.0 == Self::OFF
    }

    /// The whole payload as a 16-digit decimal value.
    pub fn as_value(&self) -> Result<u64, ProtocolError> {
        self.digits(&self.0)
    }

    /// First INPT sub-field: the input type.
    pub fn as_input_type(&self) -> Result<u32, ProtocolError> {
        self.digits(&self.0[..8]).map(|v| v as u32)
    }

    /// Second INPT sub-field: the input sequence number.
    pub fn as_input_sequence(&self) -> Result<u32, ProtocolError> {
        self.digits(&self.0[8..]).map(|v| v as u32)
    }

    fn digits(&self, bytes: &[u8]) -> Result<u64, ProtocolError> {
        std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ProtocolError::BadParameter(self.to_string()))
    }
}

impl Default for Parameter {
    fn default() -> Self {
        Self::none()
    }
}

impl std::str::FromStr for Parameter {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN {
            return Err(ProtocolError::BadParameter(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(s.as_bytes());
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// An immutable decoded or to-be-encoded protocol message.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Message {
    pub message_type: MessageType,
    pub command: Command,
    pub parameter: Parameter,
}

impl Message {
    pub fn new(message_type: MessageType, command: Command, parameter: Parameter) -> Self {
        Self {
            message_type,
            command,
            parameter,
        }
    }

    /// An enquiry carries no parameter.
    pub fn enquiry(command: Command) -> Self {
        Self::new(MessageType::Enquiry, command, Parameter::none())
    }

    pub fn control(command: Command, parameter: Parameter) -> Self {
        Self::new(MessageType::Control, command, parameter)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} {}",
            self.message_type, self.command, self.parameter
        )
    }
}
