use simpleip_bridge::simpleip::{Command, Message, MessageType, Parameter, ProtocolError};
use std::str::FromStr;

#[test]
fn sentinels() {
    assert!(Parameter::none().is_none());
    assert!(Parameter::on().is_on());
    assert!(Parameter::off().is_off());
    // all-zero doubles as the control success answer
    assert!(Parameter::off().is_success());

    let error = Parameter::from_str("FFFFFFFFFFFFFFFF").unwrap();
    assert!(error.is_error());
    assert!(!error.is_not_found());

    let not_found = Parameter::from_str("NNNNNNNNNNNNNNNN").unwrap();
    assert!(not_found.is_not_found());
    assert!(!not_found.is_error());
}

#[test]
fn value_is_zero_padded_to_sixteen_digits() {
    assert_eq!(Parameter::from_value(7).to_string(), "0000000000000007");
    assert_eq!(Parameter::from_value(0), Parameter::off());
    assert_eq!(Parameter::from_value(1), Parameter::on());
    assert_eq!(
        Parameter::from_value(1234567890123456).to_string(),
        "1234567890123456"
    );
}

#[test]
#[should_panic(expected = "wider than 16 digits")]
fn value_wider_than_sixteen_digits_is_rejected() {
    let _ = Parameter::from_value(10_000_000_000_000_000);
}

#[test]
#[should_panic(expected = "wider than 8 digits")]
fn input_sub_field_wider_than_eight_digits_is_rejected() {
    let _ = Parameter::input(100_000_000, 0);
}

#[test]
fn value_roundtrip() {
    assert_eq!(Parameter::from_value(25).as_value().unwrap(), 25);
    assert_eq!(Parameter::off().as_value().unwrap(), 0);
}

#[test]
fn sentinel_is_not_a_value() {
    assert_eq!(
        Parameter::none().as_value(),
        Err(ProtocolError::BadParameter("################".to_string()))
    );
}

#[test]
fn input_sub_fields() {
    let parameter = Parameter::input(Parameter::INPUT_HDMI, 2);
    assert_eq!(parameter.to_string(), "0000000100000002");
    assert_eq!(parameter.as_input_type().unwrap(), 1);
    assert_eq!(parameter.as_input_sequence().unwrap(), 2);

    let mirroring = Parameter::input(Parameter::INPUT_SCREEN_MIRRORING, 1);
    assert_eq!(mirroring.as_input_type().unwrap(), 5);
}

#[test]
fn from_str_requires_exact_width() {
    assert!(Parameter::from_str("0000000000000001").is_ok());
    assert!(Parameter::from_str("123").is_err());
    assert!(Parameter::from_str("00000000000000001").is_err());
}

#[test]
fn message_type_wire_codes() {
    for (code, expected) in [
        (b'C', MessageType::Control),
        (b'E', MessageType::Enquiry),
        (b'A', MessageType::Answer),
        (b'N', MessageType::Notify),
    ] {
        assert_eq!(MessageType::from_wire(code).unwrap(), expected);
        assert_eq!(expected.wire_code(), code);
    }

    assert_eq!(
        MessageType::from_wire(b'Z'),
        Err(ProtocolError::UnknownMessageType('Z'))
    );
}

#[test]
fn command_wire_codes_roundtrip() {
    for command in Command::ALL {
        assert_eq!(Command::from_wire(command.wire_code()).unwrap(), command);
    }

    assert_eq!(
        Command::from_wire(b"ZZZZ"),
        Err(ProtocolError::UnknownCommand("ZZZZ".to_string()))
    );
}

#[test]
fn enquiry_defaults_to_no_parameter() {
    let message = Message::enquiry(Command::AudioMute);
    assert_eq!(message.message_type, MessageType::Enquiry);
    assert!(message.parameter.is_none());
}
