use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Local, Timelike};
use tracing::{debug, warn};

use crate::error::{ConfigError, ParseError};
use crate::models::bitmap::Bitmap;
use crate::models::encoding::CharEncoding;
use crate::models::iso_message::IsoMessage;
use crate::models::iso_type::IsoType;
use crate::models::iso_value::{FieldValue, IsoValue};
use crate::service::field_parser::FieldParseInfo;
use crate::service::stan_generator::TraceNumberSource;

/// Builds, answers, and parses ISO 8583 messages.
///
/// Two-phase lifecycle: configure first (headers, templates, parse maps,
/// trace source; all setters take `&mut self`), then share freely.
/// During operation the factory is read-only; `new_message`,
/// `create_response`, and `parse` are safe to call from any number of
/// threads, the internally synchronized trace source being the only
/// shared mutable state.
#[derive(Debug, Default)]
pub struct MessageFactory {
    headers: HashMap<u16, String>,
    templates: HashMap<u16, IsoMessage>,
    parse_maps: HashMap<u16, HashMap<u8, FieldParseInfo>>,
    parse_order: HashMap<u16, Vec<u8>>,
    trace_source: Option<Arc<dyn TraceNumberSource>>,
    assign_date: bool,
    etx: Option<u8>,
    encoding: CharEncoding,
}

impl MessageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header text prepended to every message of type `mti`.
    pub fn set_iso_header<S: Into<String>>(&mut self, mti: u16, header: S) {
        self.headers.insert(mti, header.into());
    }

    pub fn iso_header(&self, mti: u16) -> Option<&str> {
        self.headers.get(&mti).map(String::as_str)
    }

    /// Install `template` for its own MTI; `new_message` and
    /// `create_response` copy its fields into produced messages.
    pub fn set_message_template(&mut self, template: IsoMessage) -> Result<(), ConfigError> {
        let mti = template.mti();
        if let Some(map) = self.parse_maps.get(&mti) {
            check_template_against_map(&template, map)?;
        }
        self.templates.insert(mti, template);
        Ok(())
    }

    pub fn message_template(&self, mti: u16) -> Option<&IsoMessage> {
        self.templates.get(&mti)
    }

    /// Install the parse schema for `mti`. The ascending field order is
    /// precomputed here so parsing never re-sorts.
    pub fn set_parse_map(
        &mut self,
        mti: u16,
        map: HashMap<u8, FieldParseInfo>,
    ) -> Result<(), ConfigError> {
        for (&index, info) in &map {
            match index {
                1 => return Err(ConfigError::ReservedField),
                2..=128 => {}
                _ => return Err(ConfigError::IndexOutOfRange { index }),
            }
            if info.iso_type().needs_length() && info.length() == 0 {
                return Err(ConfigError::ZeroLength {
                    kind: info.iso_type(),
                });
            }
        }
        if let Some(template) = self.templates.get(&mti) {
            check_template_against_map(template, &map)?;
        }
        let mut order: Vec<u8> = map.keys().copied().collect();
        order.sort_unstable();
        self.parse_maps.insert(mti, map);
        self.parse_order.insert(mti, order);
        Ok(())
    }

    pub fn set_trace_number_generator(&mut self, source: Arc<dyn TraceNumberSource>) {
        self.trace_source = Some(source);
    }

    /// When enabled, `new_message` stamps field 7 with the current local
    /// time as DATE10.
    pub fn set_assign_date(&mut self, assign: bool) {
        self.assign_date = assign;
    }

    /// Terminator byte appended after the last field, if any.
    pub fn set_etx(&mut self, etx: Option<u8>) {
        self.etx = etx;
    }

    pub fn set_character_encoding(&mut self, encoding: CharEncoding) {
        self.encoding = encoding;
    }

    pub fn character_encoding(&self) -> CharEncoding {
        self.encoding
    }

    /// Create a message of type `mti`: configured header, template fields
    /// (deep-copied), trace number into field 11, and current DATE10 into
    /// field 7 when date assignment is on.
    pub fn new_message(&self, mti: u16) -> IsoMessage {
        let mut message = IsoMessage::new(mti);
        message.set_header_opt(self.headers.get(&mti).cloned());
        message.set_etx(self.etx);
        message.set_encoding(self.encoding);
        if let Some(template) = self.templates.get(&mti) {
            for (index, value) in template.iter_fields() {
                message.put(index, value.clone());
            }
        }
        if let Some(source) = &self.trace_source {
            message.put(11, trace_value(source.next()));
        }
        if self.assign_date {
            message.put(7, date_value());
        }
        message
    }

    /// Create the response to `request`: type is request + 0x10, fields
    /// come from the response template first, then from the request,
    /// the request winning on overlap.
    pub fn create_response(&self, request: &IsoMessage) -> IsoMessage {
        let mti = request.response_mti();
        let mut message = IsoMessage::new(mti);
        message.set_header_opt(self.headers.get(&mti).cloned());
        message.set_etx(self.etx);
        message.set_encoding(self.encoding);
        if let Some(template) = self.templates.get(&mti) {
            for (index, value) in template.iter_fields() {
                message.put(index, value.clone());
            }
        }
        for (index, value) in request.iter_fields() {
            message.put(index, value.clone());
        }
        message
    }

    /// Parse a raw message whose first `header_len` bytes are the ISO
    /// header. Fails without a registered parse schema for the type; no
    /// partial message is ever returned.
    pub fn parse(&self, buf: &[u8], header_len: usize) -> Result<IsoMessage, ParseError> {
        if buf.len() < header_len {
            return Err(ParseError::Truncated {
                offset: 0,
                needed: header_len,
                available: buf.len(),
            });
        }
        let header = if header_len > 0 {
            Some(
                self.encoding
                    .decode(&buf[..header_len])
                    .map_err(|source| ParseError::Encoding { offset: 0, source })?,
            )
        } else {
            None
        };

        let mti = read_mti(buf, header_len)?;
        let (bitmap, bitmap_len) = Bitmap::read(buf, header_len + 4)?;
        let mut offset = header_len + 4 + bitmap_len;

        let map = self
            .parse_maps
            .get(&mti)
            .ok_or(ParseError::NoSchema { mti })?;
        let order = self
            .parse_order
            .get(&mti)
            .ok_or(ParseError::NoSchema { mti })?;

        let unschemaed: Vec<u8> = bitmap
            .set_indices()
            .into_iter()
            .filter(|i| !map.contains_key(i))
            .collect();
        if !unschemaed.is_empty() {
            warn!(
                fields = ?unschemaed,
                "bitmap of MTI {mti:04X} marks fields absent from the parse schema"
            );
        }

        let mut message = IsoMessage::new(mti);
        message.set_header_opt(header);
        message.set_etx(self.etx);
        message.set_encoding(self.encoding);

        for &index in order {
            if !bitmap.is_set(index) {
                continue;
            }
            if let Some(info) = map.get(&index) {
                let (value, consumed) = info.parse(buf, offset, index)?;
                message.put(index, value);
                offset += consumed;
            }
        }
        debug!(
            fields = message.field_count(),
            consumed = offset,
            "parsed MTI {mti:04X}"
        );
        Ok(message)
    }
}

/// Read four ASCII hex digits as the message type.
fn read_mti(buf: &[u8], offset: usize) -> Result<u16, ParseError> {
    if buf.len() < offset + 4 {
        return Err(ParseError::Truncated {
            offset,
            needed: 4,
            available: buf.len().saturating_sub(offset),
        });
    }
    let raw = &buf[offset..offset + 4];
    if !raw.iter().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidMti {
            offset,
            msg: format!("{raw:02X?} is not four hex digits"),
        });
    }
    let text = std::str::from_utf8(raw).map_err(|_| ParseError::InvalidMti {
        offset,
        msg: format!("{raw:02X?} is not ASCII"),
    })?;
    u16::from_str_radix(text, 16).map_err(|_| ParseError::InvalidMti {
        offset,
        msg: format!("{text:?} is not four hex digits"),
    })
}

fn trace_value(trace: u32) -> IsoValue {
    // Misbehaving sources are folded back into the six-digit space
    // rather than failing message creation.
    let digits = format!("{:06}", trace % 1_000_000);
    IsoValue::trusted(IsoType::Numeric, FieldValue::Numeric(digits), 6)
}

fn date_value() -> IsoValue {
    let now = Local::now().naive_local();
    // sub-second precision never reaches the wire
    let now = now.with_nanosecond(0).unwrap_or(now);
    IsoValue::trusted(IsoType::Date10, FieldValue::DateTime(now), 0)
}

fn check_template_against_map(
    template: &IsoMessage,
    map: &HashMap<u8, FieldParseInfo>,
) -> Result<(), ConfigError> {
    for (index, value) in template.iter_fields() {
        let Some(info) = map.get(&index) else {
            continue;
        };
        if info.iso_type() != value.iso_type() {
            return Err(ConfigError::TemplateMismatch {
                mti: template.mti(),
                index,
                msg: format!(
                    "template is {}, schema expects {}",
                    value.iso_type(),
                    info.iso_type()
                ),
            });
        }
        if info.iso_type().is_fixed() && info.length() != value.length() {
            return Err(ConfigError::TemplateMismatch {
                mti: template.mti(),
                index,
                msg: format!(
                    "template length {} differs from schema length {}",
                    value.length(),
                    info.length()
                ),
            });
        }
    }
    Ok(())
}
