//! Protocol objects: schema-validated commands above raw frames.
//!
//! A [`ZnpObject`] binds a direction, a catalog entry and a typed payload
//! map. Converting to a frame serializes the payload in declared parameter
//! order; converting from a frame decodes it, resolving the count fields
//! that variable-length parameters depend on.

use std::fmt;

use crate::error::{Result, ZnpError};
use crate::framing::{Direction, Frame};
use crate::payload::{Payload, PayloadReader, PayloadWriter, ReadContext, Value};
use crate::schema::{
    self, CommandDescriptor, CommandKind, Parameter, ParameterType, Subsystem,
};

/// One command instance, inbound or outbound.
#[derive(Debug, Clone)]
pub struct ZnpObject {
    pub direction: Direction,
    pub subsystem: Subsystem,
    pub command: &'static CommandDescriptor,
    pub payload: Payload,
}

impl ZnpObject {
    /// Build an outbound request for a named command.
    pub fn request(subsystem: Subsystem, name: &str, payload: Payload) -> Result<Self> {
        let command = schema::command_by_name(subsystem, name)?;
        let direction = match command.kind {
            CommandKind::Sreq => Direction::Sreq,
            CommandKind::Areq => Direction::Areq,
        };
        Ok(Self {
            direction,
            subsystem,
            command,
            payload,
        })
    }

    /// Decode an inbound frame against the catalog.
    ///
    /// Synchronous replies decode against the command's response parameter
    /// list; requests and indications decode against the request list. A
    /// reply frame for a command that declares none is a decode failure.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let command = schema::command_by_id(frame.subsystem, frame.command_id)?;

        let parameters = if frame.direction == Direction::Srsp {
            command
                .response
                .ok_or(ZnpError::CannotBeDecoded {
                    subsystem: frame.subsystem,
                    id: frame.command_id,
                    direction: frame.direction,
                })?
        } else {
            command.request
        };

        let payload = read_parameters(&frame.payload, parameters)?;
        Ok(Self {
            direction: frame.direction,
            subsystem: frame.subsystem,
            command,
            payload,
        })
    }

    /// Serialize into a wire frame.
    pub fn to_frame(&self) -> Result<Frame> {
        let parameters = if self.direction == Direction::Srsp {
            self.command.response.ok_or(ZnpError::CannotBeDecoded {
                subsystem: self.subsystem,
                id: self.command.id,
                direction: self.direction,
            })?
        } else {
            self.command.request
        };

        let mut writer = PayloadWriter::new();
        for parameter in parameters {
            let value = self
                .payload
                .get(parameter.name)
                .ok_or_else(|| ZnpError::MissingParameter {
                    parameter: parameter.name.to_owned(),
                })?;
            writer.write(parameter, value)?;
        }

        Ok(Frame::new(
            self.direction,
            self.subsystem,
            self.command.id,
            writer.finish(),
        ))
    }

    /// The soft-reset request gets special queue handling.
    pub fn is_reset_command(&self) -> bool {
        self.subsystem == Subsystem::Sys && self.command.name == "resetReq"
    }
}

impl fmt::Display for ZnpObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:?} - {} - {}",
            self.direction, self.subsystem, self.command.name, self.payload
        )
    }
}

/// Decode an ordered parameter list, resolving sibling count fields.
///
/// A variable-length parameter takes its count from the value decoded
/// immediately before it; the associated-device list additionally takes a
/// start index from two positions back.
fn read_parameters(buf: &[u8], parameters: &'static [Parameter]) -> Result<Payload> {
    let mut reader = PayloadReader::new(buf);
    let mut payload = Payload::new();
    let mut decoded: Vec<Value> = Vec::with_capacity(parameters.len());

    for (index, parameter) in parameters.iter().enumerate() {
        let context = if parameter.ty.is_variable_length() {
            let length = sibling_count(&decoded, index, 1, parameter)?;
            let start_index = if parameter.ty == ParameterType::ListAssocDev {
                Some(sibling_count(&decoded, index, 2, parameter)?)
            } else {
                None
            };
            ReadContext {
                length: Some(length),
                start_index,
            }
        } else {
            ReadContext::default()
        };

        let value = reader.read(parameter, context)?;
        decoded.push(value.clone());
        payload.insert(parameter.name, value);
    }

    Ok(payload)
}

fn sibling_count(
    decoded: &[Value],
    index: usize,
    back: usize,
    parameter: &Parameter,
) -> Result<usize> {
    index
        .checked_sub(back)
        .and_then(|i| decoded.get(i))
        .and_then(|value| value.as_usize())
        .ok_or_else(|| ZnpError::MissingLengthField {
            parameter: parameter.name.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use crate::payload::Value;

    use super::*;

    #[test]
    fn test_request_encodes_in_declared_order() {
        let object = ZnpObject::request(
            Subsystem::Sys,
            "osalNvRead",
            Payload::new().with("id", 1u16).with("offset", 2u8),
        )
        .unwrap();

        let frame = object.to_frame().unwrap();
        assert_eq!(frame.direction, Direction::Sreq);
        assert_eq!(frame.subsystem, Subsystem::Sys);
        assert_eq!(frame.command_id, 8);
        assert_eq!(&frame.payload[..], &[0x01, 0x00, 0x02]);
    }

    #[test]
    fn test_reply_decodes_with_sibling_length() {
        let frame = Frame::new(
            Direction::Srsp,
            Subsystem::Sys,
            8,
            Bytes::from_static(&[0x00, 0x02, 0x01, 0x02]),
        );
        let object = ZnpObject::from_frame(&frame).unwrap();

        assert_eq!(object.command.name, "osalNvRead");
        assert_eq!(object.payload.u8("status").unwrap(), 0);
        assert_eq!(object.payload.u8("len").unwrap(), 2);
        assert_eq!(&object.payload.bytes("value").unwrap()[..], &[0x01, 0x02]);
    }

    #[test]
    fn test_indication_decodes_against_request_parameters() {
        let frame = Frame::new(
            Direction::Areq,
            Subsystem::Af,
            128,
            Bytes::from_static(&[0x00, 0x01, 0x2a]),
        );
        let object = ZnpObject::from_frame(&frame).unwrap();
        assert_eq!(object.command.name, "dataConfirm");
        assert_eq!(object.payload.u8("transid").unwrap(), 0x2a);
    }

    #[test]
    fn test_assoc_dev_list_start_index_two_back() {
        // nwkAddrRsp: status, ieeeaddr, nwkaddr, startindex=1, numassocdev=3,
        // then the two remaining short addresses.
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[0x11; 8]);
        payload.extend_from_slice(&[0x34, 0x12]);
        payload.push(0x01); // startindex
        payload.push(0x03); // numassocdev
        payload.extend_from_slice(&[0x01, 0x00, 0x02, 0x00]);

        let frame = Frame::new(Direction::Areq, Subsystem::Zdo, 128, Bytes::from(payload));
        let object = ZnpObject::from_frame(&frame).unwrap();
        assert_eq!(
            object.payload.get("assocdevlist"),
            Some(&Value::AssocDevices(vec![1, 2]))
        );
    }

    #[test]
    fn test_missing_parameter_fails_encode() {
        let object = ZnpObject::request(
            Subsystem::Sys,
            "osalNvRead",
            Payload::new().with("id", 1u16),
        )
        .unwrap();
        assert!(matches!(
            object.to_frame(),
            Err(ZnpError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_unknown_command_id_fails_decode() {
        let frame = Frame::new(Direction::Areq, Subsystem::Sys, 0x77, Bytes::new());
        assert!(matches!(
            ZnpObject::from_frame(&frame),
            Err(ZnpError::UnknownCommand { .. })
        ));
    }

    #[test]
    fn test_reset_command_detection() {
        let reset = ZnpObject::request(
            Subsystem::Sys,
            "resetReq",
            Payload::new().with("type", 0u8),
        )
        .unwrap();
        assert!(reset.is_reset_command());

        let ping = ZnpObject::request(Subsystem::Sys, "ping", Payload::new()).unwrap();
        assert!(!ping.is_reset_command());
    }

    #[test]
    fn test_display_format() {
        let object = ZnpObject::request(Subsystem::Sys, "ping", Payload::new()).unwrap();
        assert_eq!(object.to_string(), "SREQ: Sys - ping - {}");
    }
}
