//! Decode JSON payloads into typed records.

use serde::de::{DeserializeOwned, Error as _};
use serde_json::Value;

use relay_core::{CallRecord, MessageKind, Record, SmsRecord};

use crate::error::PipelineError;

/// Converts a raw payload into a record of one fixed kind.
pub type Decoder = fn(&[u8]) -> Result<Record, PipelineError>;

/// Parse a payload that must be a JSON object.
pub(crate) fn parse_object(payload: &[u8]) -> Result<Value, serde_json::Error> {
    let value: Value = serde_json::from_slice(payload)?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(serde_json::Error::custom("payload is not a JSON object"))
    }
}

fn decode_as<T: DeserializeOwned>(kind: MessageKind, payload: &[u8]) -> Result<T, PipelineError> {
    parse_object(payload)
        .and_then(serde_json::from_value)
        .map_err(|source| PipelineError::Decode { kind, source })
}

/// Missing fields decode as empty; unknown fields are ignored.
pub fn decode_sms(payload: &[u8]) -> Result<SmsRecord, PipelineError> {
    decode_as(MessageKind::Sms, payload)
}

pub fn decode_call(payload: &[u8]) -> Result<CallRecord, PipelineError> {
    decode_as(MessageKind::Call, payload)
}

fn sms_record(payload: &[u8]) -> Result<Record, PipelineError> {
    decode_sms(payload).map(Record::Sms)
}

fn call_record(payload: &[u8]) -> Result<Record, PipelineError> {
    decode_call(payload).map(Record::Call)
}

pub fn decoder_for(kind: MessageKind) -> Decoder {
    match kind {
        MessageKind::Sms => sms_record,
        MessageKind::Call => call_record,
    }
}

pub fn decode(kind: MessageKind, payload: &[u8]) -> Result<Record, PipelineError> {
    decoder_for(kind)(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_decodes_to_itself() {
        for kind in MessageKind::ALL {
            assert_eq!(decode(kind, b"{}").unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_decode_sms_with_code() {
        let body = br#"{"type":"sms","sender":"Bank","smsCode":"482913","phoneNumber":"+1555"}"#;
        let sms = decode_sms(body).unwrap();
        assert_eq!(sms.sender, "Bank");
        assert_eq!(sms.sms_code.as_deref(), Some("482913"));
        assert_eq!(sms.phone_number, "+1555");
        assert_eq!(sms.sms_msg, None);
    }

    #[test]
    fn test_decode_sms_without_type_field() {
        let body = br#"{"sender":"Shop","phoneNumber":"+1555","smsMsg":"shipped"}"#;
        let sms = decode_sms(body).unwrap();
        assert_eq!(sms.sms_msg.as_deref(), Some("shipped"));
    }

    #[test]
    fn test_decode_empty_object_yields_zero_values() {
        let call = decode_call(b"{}").unwrap();
        assert_eq!(call, CallRecord::default());
    }

    #[test]
    fn test_decode_wrong_field_type_fails() {
        let err = decode_sms(br#"{"smsCode": 482913}"#).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Decode {
                kind: MessageKind::Sms,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        let bodies: [&[u8]; 4] = [b"[\"Bank\", \"1\"]", b"\"sms\"", b"42", b"null"];
        for body in bodies {
            let err = decode_call(body).unwrap_err();
            assert!(matches!(err, PipelineError::Decode { .. }), "{body:?}");
        }
    }

    #[test]
    fn test_decode_invalid_json() {
        let err = decode(MessageKind::Call, b"not json at all").unwrap_err();
        assert_eq!(err.reason().as_str(), "decode-error");
    }

    #[test]
    fn test_decode_dispatches_by_kind() {
        let body = br#"{"incomingPhoneNumber":"+86123","phoneNumberLocation":"Beijing"}"#;
        let record = decode(MessageKind::Call, body).unwrap();
        assert_eq!(record.kind(), MessageKind::Call);

        // Any object decodes as an SMS too; fields simply stay empty.
        let record = decode(MessageKind::Sms, body).unwrap();
        assert_eq!(record, Record::Sms(SmsRecord::default()));
    }
}
