//! Render decoded records into the single line of text sent to chat.

use crate::message::{CallRecord, Record, SmsRecord};

/// A non-empty verification code always wins over the message body.
pub fn format_sms(sms: &SmsRecord) -> String {
    match sms.sms_code.as_deref().filter(|code| !code.is_empty()) {
        Some(code) => format!(
            "来自: {}, 验证码: {}, 发送者: {}",
            sms.phone_number, code, sms.sender
        ),
        None => format!(
            "来自: {}, 内容: {}",
            sms.phone_number,
            sms.sms_msg.as_deref().unwrap_or_default()
        ),
    }
}

pub fn format_call(call: &CallRecord) -> String {
    format!(
        "来电号码: {}, 归宿地: {}",
        call.incoming_phone_number, call.phone_number_location
    )
}

pub fn format_record(record: &Record) -> String {
    match record {
        Record::Sms(sms) => format_sms(sms),
        Record::Call(call) => format_call(call),
    }
}
