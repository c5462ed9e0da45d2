//! Field level edits of parsed messages.
//!
//! Edits are all or nothing: every field is applied to a copy of the payload
//! and the message only changes when all of them succeed. Checksums are not
//! stored, both codecs compute them when the message is serialized.
use crate::{
    error::GnssError,
    message::{FieldValue, Message, ParsedPayload},
    nmea::NmeaSentence,
    status::Status,
    ubx::UbxMessage,
};

fn nmea_error(sentence: &NmeaSentence, field: &str, reason: impl ToString) -> GnssError {
    GnssError::Edit {
        message: sentence.address(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn ubx_error(message: &UbxMessage, field: &str, reason: impl ToString) -> GnssError {
    GnssError::Edit {
        message: format!(
            "{} (class {:#04X}, id {:#04X})",
            message.identity(),
            message.msg_cls(),
            message.msg_id()
        ),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn edit_nmea(sentence: &mut NmeaSentence, fields: &[(&str, FieldValue)]) -> Result<(), GnssError> {
    let mut edited = sentence.clone();
    for (name, value) in fields {
        let value = match value {
            FieldValue::Text(text) => text,
            FieldValue::Int(_) => {
                return Err(nmea_error(sentence, name, "NMEA fields take text values"))
            }
        };
        edited
            .set(name, value)
            .map_err(|e| nmea_error(sentence, name, e))?;
    }
    *sentence = edited;
    Ok(())
}

fn edit_ubx(message: &mut UbxMessage, fields: &[(&str, FieldValue)]) -> Result<(), GnssError> {
    let mut edited = message.clone();
    for (name, value) in fields {
        let value = match value {
            FieldValue::Int(value) => *value,
            FieldValue::Text(_) => {
                return Err(ubx_error(message, name, "UBX fields take integer values"))
            }
        };
        edited
            .set(name, value)
            .map_err(|e| ubx_error(message, name, e))?;
    }
    *message = edited;
    Ok(())
}

/// Apply every `(name, value)` pair to `message`, or none of them
pub fn set_fields(message: &mut Message, fields: &[(&str, FieldValue)]) -> Result<(), GnssError> {
    match &mut message.payload {
        ParsedPayload::Nmea(sentence) => edit_nmea(sentence, fields),
        ParsedPayload::Ubx(msg) => edit_ubx(msg, fields),
    }
}

/// [`set_fields`] that hands the message back with the outcome
pub fn edit(mut message: Message, fields: &[(&str, FieldValue)]) -> (Status, Message) {
    let status = Status::from(&set_fields(&mut message, fields));
    (status, message)
}
