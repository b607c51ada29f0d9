//! Wire codec for session messages
//!
//! A frame is `s=<body length>&<body>` where the body is a urlencoded field
//! list starting with `msg_type`. APDUs travel hex-encoded in `pdu_data`, and
//! begin-operation extensions travel as one nested urlencoded `extensions`
//! field.

use std::{collections::BTreeMap, str::FromStr};

use thiserror::Error;

use super::{BeginOp, ExtendedLoginRequest, Fields, Message, OpType};
use crate::Buffer;

const PARAMETER_PREFIX: &str = "required_parameter";

/// Largest frame body accepted from the peer
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Errors raised while encoding or decoding frames
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame does not start with a `s=<len>&` header
    #[error("malformed frame header")]
    MalformedHeader,

    /// Declared body length differs from the received body
    #[error("frame length mismatch: declared {declared}, got {actual}")]
    LengthMismatch {
        /// Length from the header
        declared: usize,
        /// Actual body length
        actual: usize,
    },

    /// `msg_type` names no known message
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),

    /// A required field is absent
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field value could not be parsed
    #[error("invalid value for field `{field}`: {value}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// Body is not valid urlencoded text
    #[error(transparent)]
    Decode(#[from] serde_urlencoded::de::Error),

    /// Fields could not be urlencoded
    #[error(transparent)]
    Encode(#[from] serde_urlencoded::ser::Error),
}

/// Encode a message into a complete frame
pub fn encode(message: &Message) -> Result<String, CodecError> {
    let body = encode_body(message)?;
    Ok(format!("s={}&{}", body.len(), body))
}

/// Decode a complete frame
pub fn decode(frame: &str) -> Result<Message, CodecError> {
    let rest = frame
        .strip_prefix("s=")
        .ok_or(CodecError::MalformedHeader)?;
    let (len, body) = rest.split_once('&').ok_or(CodecError::MalformedHeader)?;
    let declared = parse_length(len)?;
    if body.len() != declared {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    decode_body(body)
}

/// Parse the decimal length of a frame header
///
/// Lengths above [`MAX_FRAME_LEN`] are rejected as malformed.
pub fn parse_length(text: &str) -> Result<usize, CodecError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::MalformedHeader);
    }
    match text.parse() {
        Ok(len) if len <= MAX_FRAME_LEN => Ok(len),
        _ => Err(CodecError::MalformedHeader),
    }
}

/// Encode the urlencoded body of a message
pub fn encode_body(message: &Message) -> Result<String, CodecError> {
    let mut fields: Vec<(String, String)> =
        vec![("msg_type".into(), message.msg_type().to_string())];
    let mut put = |name: &str, value: String| fields.push((name.to_owned(), value));

    match message {
        Message::BeginOp(begin) => {
            put("operation", begin.op.code().to_string());
            put("extensions", serde_urlencoded::to_string(&begin.extensions)?);
        }
        Message::LoginRequest {
            invalid_pw,
            blocked,
        } => {
            put("invalid_pw", invalid_pw.to_string());
            put("blocked", blocked.to_string());
        }
        Message::LoginResponse(values) | Message::ExtendedLoginResponse(values) => {
            for (name, value) in values {
                put(name.as_str(), value.clone());
            }
        }
        Message::ExtendedLoginRequest(request) => {
            put("invalid_pw", request.invalid_pw.to_string());
            put("blocked", request.blocked.to_string());
            put("title", request.title.clone());
            put("description", request.description.clone());
            for (index, parameter) in request.parameters.iter().enumerate() {
                put(format!("{PARAMETER_PREFIX}{index}").as_str(), parameter.clone());
            }
        }
        Message::TokenPduRequest(pdu) | Message::TokenPduResponse(pdu) => {
            put("pdu_size", pdu.len().to_string());
            put("pdu_data", pdu.to_hex());
        }
        Message::StatusUpdateRequest { status, info } => {
            put("current_state", status.to_string());
            put("next_task_name", info.clone());
        }
        Message::StatusUpdateResponse { status } => {
            put("current_state", status.to_string());
        }
        Message::EndOp {
            op,
            result,
            message,
        } => {
            put("operation", op.code().to_string());
            put("result", result.to_string());
            put("message", message.to_string());
        }
    }

    Ok(serde_urlencoded::to_string(&fields)?)
}

/// Decode a urlencoded body into a message
pub fn decode_body(body: &str) -> Result<Message, CodecError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)?;
    let mut fields: Fields = pairs.into_iter().collect();

    let msg_type: u8 = take_parsed(&mut fields, "msg_type")?;
    let message = match msg_type {
        2 => {
            let op = take_op(&mut fields)?;
            let extensions: BTreeMap<String, String> = match fields.remove("extensions") {
                Some(text) => serde_urlencoded::from_str(&text)?,
                None => BTreeMap::new(),
            };
            Message::BeginOp(BeginOp { op, extensions })
        }
        3 => Message::LoginRequest {
            invalid_pw: take_parsed(&mut fields, "invalid_pw")?,
            blocked: take_parsed(&mut fields, "blocked")?,
        },
        4 => Message::LoginResponse(fields),
        9 | 10 => {
            let size: usize = take_parsed(&mut fields, "pdu_size")?;
            let data = take(&mut fields, "pdu_data")?;
            let pdu = Buffer::from_hex(&data).map_err(|_| CodecError::InvalidField {
                field: "pdu_data",
                value: data.clone(),
            })?;
            if pdu.len() != size {
                return Err(CodecError::LengthMismatch {
                    declared: size,
                    actual: pdu.len(),
                });
            }
            if msg_type == 9 {
                Message::TokenPduRequest(pdu)
            } else {
                Message::TokenPduResponse(pdu)
            }
        }
        13 => Message::EndOp {
            op: take_op(&mut fields)?,
            result: take_parsed(&mut fields, "result")?,
            message: take_parsed(&mut fields, "message")?,
        },
        14 => Message::StatusUpdateRequest {
            status: take_parsed(&mut fields, "current_state")?,
            info: take(&mut fields, "next_task_name")?,
        },
        15 => Message::StatusUpdateResponse {
            status: take_parsed(&mut fields, "current_state")?,
        },
        16 => {
            let invalid_pw = take_parsed(&mut fields, "invalid_pw")?;
            let blocked = take_parsed(&mut fields, "blocked")?;
            let title = take(&mut fields, "title")?;
            let description = take(&mut fields, "description")?;
            let mut indexed: Vec<(usize, String)> = fields
                .into_iter()
                .filter_map(|(name, value)| {
                    let index = name.strip_prefix(PARAMETER_PREFIX)?.parse().ok()?;
                    Some((index, value))
                })
                .collect();
            indexed.sort_by_key(|(index, _)| *index);
            Message::ExtendedLoginRequest(ExtendedLoginRequest {
                invalid_pw,
                blocked,
                title,
                description,
                parameters: indexed.into_iter().map(|(_, value)| value).collect(),
            })
        }
        17 => Message::ExtendedLoginResponse(fields),
        other => return Err(CodecError::UnknownMessageType(other)),
    };

    Ok(message)
}

fn take(fields: &mut Fields, name: &'static str) -> Result<String, CodecError> {
    fields.remove(name).ok_or(CodecError::MissingField(name))
}

fn take_parsed<T: FromStr>(fields: &mut Fields, name: &'static str) -> Result<T, CodecError> {
    let value = take(fields, name)?;
    value
        .parse()
        .map_err(|_| CodecError::InvalidField { field: name, value })
}

fn take_op(fields: &mut Fields) -> Result<OpType, CodecError> {
    let code: u8 = take_parsed(fields, "operation")?;
    OpType::from_code(code).ok_or(CodecError::InvalidField {
        field: "operation",
        value: code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{LOCALE_EXTENSION, STATUS_UPDATE_EXTENSION};
    use hex_literal::hex;

    #[test]
    fn test_frame_length_is_bounded() {
        assert_eq!(parse_length("0").unwrap(), 0);
        assert_eq!(parse_length("65536").unwrap(), MAX_FRAME_LEN);
        assert!(matches!(parse_length("65537"), Err(CodecError::MalformedHeader)));
        assert!(matches!(
            parse_length("18446744073709551616"),
            Err(CodecError::MalformedHeader)
        ));
        assert!(matches!(parse_length("-1"), Err(CodecError::MalformedHeader)));
        assert!(matches!(parse_length(""), Err(CodecError::MalformedHeader)));
    }

    #[test]
    fn test_token_pdu_frame() {
        let msg = Message::TokenPduRequest(Buffer::from(hex!("00A4040007A0000000030000").to_vec()));
        let frame = encode(&msg).unwrap();
        assert_eq!(
            frame,
            "s=56&msg_type=9&pdu_size=12&pdu_data=00A4040007A0000000030000"
        );
        assert_eq!(decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_begin_op_extensions_nest() {
        let begin = BeginOp::new(OpType::Format)
            .with_extension(STATUS_UPDATE_EXTENSION, "true")
            .with_extension(LOCALE_EXTENSION, "en");
        let frame = encode(&Message::BeginOp(begin.clone())).unwrap();
        assert!(frame.contains("extensions=locale%3Den%26statusUpdate%3Dtrue"));

        match decode(&frame).unwrap() {
            Message::BeginOp(decoded) => assert_eq!(decoded, begin),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_extended_login_parameters_keep_order() {
        let request = ExtendedLoginRequest {
            invalid_pw: 0,
            blocked: 0,
            title: "Login".into(),
            description: "Enter credentials".into(),
            parameters: (0..12).map(|i| format!("id=p{i}&name=P{i}")).collect(),
        };
        let msg = Message::ExtendedLoginRequest(request);
        assert_eq!(decode(&encode(&msg).unwrap()).unwrap(), msg);
    }

    #[test]
    fn test_login_response_fields() {
        let msg = decode_body("msg_type=4&screen_name=alice&password=p%26ss").unwrap();
        let Message::LoginResponse(fields) = msg else {
            panic!("expected login response");
        };
        assert_eq!(fields["screen_name"], "alice");
        assert_eq!(fields["password"], "p&ss");
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode("msg_type=4"),
            Err(CodecError::MalformedHeader)
        ));
        assert!(matches!(
            decode("s=3&msg_type=4"),
            Err(CodecError::LengthMismatch {
                declared: 3,
                actual: 10
            })
        ));
        assert!(matches!(
            decode_body("msg_type=99"),
            Err(CodecError::UnknownMessageType(99))
        ));
        assert!(matches!(
            decode_body("msg_type=14&current_state=10"),
            Err(CodecError::MissingField("next_task_name"))
        ));
        assert!(matches!(
            decode_body("msg_type=10&pdu_size=3&pdu_data=9000"),
            Err(CodecError::LengthMismatch { .. })
        ));
    }
}
