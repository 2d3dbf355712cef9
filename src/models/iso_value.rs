use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Local, Months, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{ConfigError, EncodeError};
use crate::models::encoding::CharEncoding;
use crate::models::iso_type::IsoType;
use crate::service::custom_codec::{CustomFieldCodec, CustomValue};

/// Domain-typed content of a single field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Digit string for NUMERIC fields; leading zeros are significant.
    Numeric(String),
    /// Text for ALPHA/LLVAR/LLLVAR fields.
    Text(String),
    /// AMOUNT with scale 2, no floating point.
    Amount(Decimal),
    /// DATE10
    DateTime(NaiveDateTime),
    /// DATE4
    Date(NaiveDate),
    /// DATE_EXP
    Expiry(NaiveDate),
    /// TIME
    Time(NaiveTime),
    /// BINARY/LLBIN/LLLBIN payload.
    Binary(Vec<u8>),
    /// Object produced by a custom field codec.
    Custom(Arc<dyn CustomValue>),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Numeric(a), FieldValue::Numeric(b)) => a == b,
            (FieldValue::Text(a), FieldValue::Text(b)) => a == b,
            (FieldValue::Amount(a), FieldValue::Amount(b)) => a == b,
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => a == b,
            (FieldValue::Date(a), FieldValue::Date(b)) => a == b,
            (FieldValue::Expiry(a), FieldValue::Expiry(b)) => a == b,
            (FieldValue::Time(a), FieldValue::Time(b)) => a == b,
            (FieldValue::Binary(a), FieldValue::Binary(b)) => a == b,
            // Custom values compare through their wire text; IsoValue::eq
            // handles that with codec access.
            _ => false,
        }
    }
}

/// One field's value together with its kind, declared length, and the
/// optional custom codec that encodes it.
///
/// For fixed kinds the encoded byte length always equals the declared
/// length. For variable kinds the declared length is unused (0) and the
/// length prefix is derived from the payload at encode time.
#[derive(Debug, Clone)]
pub struct IsoValue {
    iso_type: IsoType,
    length: usize,
    value: FieldValue,
    codec: Option<Arc<dyn CustomFieldCodec>>,
}

impl IsoValue {
    /// General constructor; validates that the value shape and length fit
    /// the kind. The per-kind constructors below are usually clearer.
    pub fn new(iso_type: IsoType, value: FieldValue, length: usize) -> Result<Self, ConfigError> {
        let length = match iso_type.intrinsic_length() {
            Some(fixed) => fixed,
            None if iso_type.is_fixed() => {
                if length == 0 {
                    return Err(ConfigError::ZeroLength { kind: iso_type });
                }
                length
            }
            None => 0,
        };
        let v = Self {
            iso_type,
            length,
            value,
            codec: None,
        };
        v.check_pairing()?;
        Ok(v)
    }

    pub fn numeric<S: Into<String>>(digits: S, length: usize) -> Result<Self, ConfigError> {
        let digits = digits.into();
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidValue {
                kind: IsoType::Numeric,
                msg: format!("{digits:?} is not all digits"),
            });
        }
        Self::new(IsoType::Numeric, FieldValue::Numeric(digits), length)
    }

    pub fn alpha<S: Into<String>>(text: S, length: usize) -> Result<Self, ConfigError> {
        Self::new(IsoType::Alpha, FieldValue::Text(text.into()), length)
    }

    pub fn llvar<S: Into<String>>(text: S) -> Result<Self, ConfigError> {
        Self::new(IsoType::Llvar, FieldValue::Text(text.into()), 0)
    }

    pub fn lllvar<S: Into<String>>(text: S) -> Result<Self, ConfigError> {
        Self::new(IsoType::Lllvar, FieldValue::Text(text.into()), 0)
    }

    pub fn amount(value: Decimal) -> Result<Self, ConfigError> {
        Self::new(IsoType::Amount, FieldValue::Amount(value), 0)
    }

    pub fn date10(value: NaiveDateTime) -> Result<Self, ConfigError> {
        Self::new(IsoType::Date10, FieldValue::DateTime(value), 0)
    }

    pub fn date4(value: NaiveDate) -> Result<Self, ConfigError> {
        Self::new(IsoType::Date4, FieldValue::Date(value), 0)
    }

    pub fn expiry(value: NaiveDate) -> Result<Self, ConfigError> {
        Self::new(IsoType::DateExp, FieldValue::Expiry(value), 0)
    }

    pub fn time(value: NaiveTime) -> Result<Self, ConfigError> {
        Self::new(IsoType::Time, FieldValue::Time(value), 0)
    }

    pub fn binary(bytes: Vec<u8>, length: usize) -> Result<Self, ConfigError> {
        Self::new(IsoType::Binary, FieldValue::Binary(bytes), length)
    }

    pub fn llbin(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        Self::new(IsoType::Llbin, FieldValue::Binary(bytes), 0)
    }

    pub fn lllbin(bytes: Vec<u8>) -> Result<Self, ConfigError> {
        Self::new(IsoType::Lllbin, FieldValue::Binary(bytes), 0)
    }

    /// Build a value from its textual representation, the form used by
    /// templates and configuration. Binary kinds take hex text; AMOUNT
    /// takes either minor-unit digits ("1000" = 10.00) or a decimal
    /// string ("10.00"); date kinds take their wire format.
    pub fn from_text(iso_type: IsoType, raw: &str, length: usize) -> Result<Self, ConfigError> {
        let invalid = |msg: String| ConfigError::InvalidValue {
            kind: iso_type,
            msg,
        };
        match iso_type {
            IsoType::Numeric => Self::numeric(raw, length),
            IsoType::Alpha => Self::alpha(raw, length),
            IsoType::Llvar => Self::llvar(raw),
            IsoType::Lllvar => Self::lllvar(raw),
            IsoType::Amount => {
                let value = if raw.contains('.') {
                    raw.parse::<Decimal>()
                        .map_err(|e| invalid(e.to_string()))?
                        .round_dp(2)
                } else {
                    let minor: i64 = raw.parse().map_err(|_| {
                        invalid(format!("{raw:?} is not minor-unit digits"))
                    })?;
                    Decimal::new(minor, 2)
                };
                Self::amount(value)
            }
            IsoType::Date10 | IsoType::Date4 | IsoType::DateExp | IsoType::Time => {
                let value = decode_text(iso_type, raw, Local::now().naive_local())
                    .map_err(invalid)?;
                Self::new(iso_type, value, 0)
            }
            IsoType::Binary | IsoType::Llbin | IsoType::Lllbin => {
                let bytes = hex::decode(raw).map_err(|e| invalid(e.to_string()))?;
                Self::new(iso_type, FieldValue::Binary(bytes), length)
            }
        }
    }

    /// Factory-internal constructor for values whose shape is known good
    /// (trace numbers, timestamps).
    pub(crate) fn trusted(iso_type: IsoType, value: FieldValue, length: usize) -> Self {
        let length = iso_type.intrinsic_length().unwrap_or(length);
        Self {
            iso_type,
            length,
            value,
            codec: None,
        }
    }

    /// Attach a custom codec; encoding will delegate to it for custom
    /// values.
    pub fn with_codec(mut self, codec: Arc<dyn CustomFieldCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Wrap a codec-decoded object as the value of a textual field.
    pub fn custom(
        iso_type: IsoType,
        value: Arc<dyn CustomValue>,
        length: usize,
        codec: Arc<dyn CustomFieldCodec>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(iso_type, FieldValue::Custom(value), length)?.with_codec(codec))
    }

    pub fn iso_type(&self) -> IsoType {
        self.iso_type
    }

    /// Declared length; 0 for the variable kinds.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn codec(&self) -> Option<&Arc<dyn CustomFieldCodec>> {
        self.codec.as_ref()
    }

    fn check_pairing(&self) -> Result<(), ConfigError> {
        let ok = match (&self.value, self.iso_type) {
            (FieldValue::Numeric(_), IsoType::Numeric) => true,
            (
                FieldValue::Text(_) | FieldValue::Custom(_),
                IsoType::Alpha | IsoType::Llvar | IsoType::Lllvar | IsoType::Numeric,
            ) => true,
            (FieldValue::Custom(_), _) => true,
            (FieldValue::Amount(_), IsoType::Amount) => true,
            (FieldValue::DateTime(_), IsoType::Date10) => true,
            (FieldValue::Date(_), IsoType::Date4) => true,
            (FieldValue::Expiry(_), IsoType::DateExp) => true,
            (FieldValue::Time(_), IsoType::Time) => true,
            (
                FieldValue::Binary(_),
                IsoType::Binary | IsoType::Llbin | IsoType::Lllbin,
            ) => true,
            _ => false,
        };
        if !ok {
            return Err(ConfigError::InvalidValue {
                kind: self.iso_type,
                msg: "value variant does not match the field kind".to_string(),
            });
        }
        // Length discipline for text kinds depends on the character
        // encoding the message is written with, so it is enforced in
        // `encode_into` against the actual encoded bytes. Digit strings
        // and binary payloads have a fixed byte count and are checked
        // here.
        match (&self.value, self.iso_type) {
            (FieldValue::Numeric(s), IsoType::Numeric) if s.len() > self.length => {
                Err(ConfigError::ValueTooLong {
                    kind: self.iso_type,
                    length: self.length,
                    actual: s.len(),
                })
            }
            (FieldValue::Binary(b), IsoType::Binary) if b.len() != self.length => {
                Err(ConfigError::ValueTooLong {
                    kind: self.iso_type,
                    length: self.length,
                    actual: b.len(),
                })
            }
            (FieldValue::Binary(b), t @ (IsoType::Llbin | IsoType::Lllbin))
                if b.len() > t.max_length() =>
            {
                Err(ConfigError::ValueTooLong {
                    kind: t,
                    length: t.max_length(),
                    actual: b.len(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Textual wire form before padding/prefixing. Not defined for binary
    /// payloads.
    fn wire_text(&self, index: u8) -> Result<String, EncodeError> {
        match &self.value {
            FieldValue::Numeric(s) | FieldValue::Text(s) => Ok(s.clone()),
            FieldValue::Amount(d) => {
                let minor = (d.round_dp(2) * Decimal::ONE_HUNDRED)
                    .trunc()
                    .to_i128()
                    .ok_or(EncodeError::AmountRange { index })?;
                if !(0..=999_999_999_999).contains(&minor) {
                    return Err(EncodeError::AmountRange { index });
                }
                Ok(format!("{minor:012}"))
            }
            FieldValue::DateTime(dt) => Ok(dt.format("%m%d%H%M%S").to_string()),
            FieldValue::Date(d) => Ok(d.format("%m%d").to_string()),
            FieldValue::Expiry(d) => Ok(d.format("%y%m").to_string()),
            FieldValue::Time(t) => Ok(t.format("%H%M%S").to_string()),
            FieldValue::Custom(v) => match &self.codec {
                Some(codec) => Ok(codec.encode(v.as_ref())),
                None => Err(EncodeError::MissingCodec { index }),
            },
            // Binary payloads never take this path; encode_into handles
            // them without a textual form.
            FieldValue::Binary(_) => Err(EncodeError::MissingCodec { index }),
        }
    }

    /// Append the on-wire form: padding for fixed kinds, ASCII length
    /// prefix plus payload for variable kinds.
    pub fn encode_into(
        &self,
        out: &mut Vec<u8>,
        encoding: CharEncoding,
        index: u8,
    ) -> Result<(), EncodeError> {
        match self.iso_type {
            IsoType::Numeric
            | IsoType::Amount
            | IsoType::Date10
            | IsoType::Date4
            | IsoType::DateExp
            | IsoType::Time => {
                let text = self.wire_text(index)?;
                let bytes = encoding
                    .encode(&text)
                    .map_err(|source| EncodeError::Field { index, source })?;
                if bytes.len() > self.length {
                    return Err(EncodeError::ValueTooLong {
                        index,
                        kind: self.iso_type,
                        max: self.length,
                        actual: bytes.len(),
                    });
                }
                // left-pad with '0' to the declared length
                out.resize(out.len() + self.length - bytes.len(), b'0');
                out.extend_from_slice(&bytes);
                Ok(())
            }
            IsoType::Alpha => {
                let text = self.wire_text(index)?;
                let bytes = encoding
                    .encode(&text)
                    .map_err(|source| EncodeError::Field { index, source })?;
                if bytes.len() > self.length {
                    return Err(EncodeError::ValueTooLong {
                        index,
                        kind: self.iso_type,
                        max: self.length,
                        actual: bytes.len(),
                    });
                }
                out.extend_from_slice(&bytes);
                // right-pad with spaces to the declared length
                out.resize(out.len() + self.length - bytes.len(), b' ');
                Ok(())
            }
            IsoType::Llvar | IsoType::Lllvar => {
                let text = self.wire_text(index)?;
                let bytes = encoding
                    .encode(&text)
                    .map_err(|source| EncodeError::Field { index, source })?;
                self.push_prefixed(out, &bytes, index)
            }
            IsoType::Binary => match &self.value {
                FieldValue::Binary(bytes) => {
                    if bytes.len() != self.length {
                        return Err(EncodeError::ValueTooLong {
                            index,
                            kind: self.iso_type,
                            max: self.length,
                            actual: bytes.len(),
                        });
                    }
                    out.extend_from_slice(bytes);
                    Ok(())
                }
                _ => Err(EncodeError::MissingCodec { index }),
            },
            IsoType::Llbin | IsoType::Lllbin => match &self.value {
                FieldValue::Binary(bytes) => self.push_prefixed(out, bytes, index),
                _ => Err(EncodeError::MissingCodec { index }),
            },
        }
    }

    fn push_prefixed(
        &self,
        out: &mut Vec<u8>,
        payload: &[u8],
        index: u8,
    ) -> Result<(), EncodeError> {
        let max = self.iso_type.max_length();
        if payload.len() > max {
            return Err(EncodeError::ValueTooLong {
                index,
                kind: self.iso_type,
                max,
                actual: payload.len(),
            });
        }
        match self.iso_type.prefix_digits() {
            2 => out.extend_from_slice(format!("{:02}", payload.len()).as_bytes()),
            _ => out.extend_from_slice(format!("{:03}", payload.len()).as_bytes()),
        }
        out.extend_from_slice(payload);
        Ok(())
    }
}

impl PartialEq for IsoValue {
    fn eq(&self, other: &Self) -> bool {
        if self.iso_type != other.iso_type || self.length != other.length {
            return false;
        }
        match (&self.value, &other.value) {
            (FieldValue::Custom(_), _) | (_, FieldValue::Custom(_)) => {
                // Wire text is the only codec-independent identity.
                match (self.wire_text(0), other.wire_text(0)) {
                    (Ok(a), Ok(b)) => a == b,
                    _ => false,
                }
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for IsoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FieldValue::Numeric(s) | FieldValue::Text(s) => f.write_str(s),
            FieldValue::Amount(d) => write!(f, "{d}"),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.format("%m%d%H%M%S")),
            FieldValue::Date(d) => write!(f, "{}", d.format("%m%d")),
            FieldValue::Expiry(d) => write!(f, "{}", d.format("%y%m")),
            FieldValue::Time(t) => write!(f, "{}", t.format("%H%M%S")),
            FieldValue::Binary(b) => f.write_str(&hex::encode_upper(b)),
            FieldValue::Custom(v) => write!(f, "{v:?}"),
        }
    }
}

/// Interpret the decoded text of a fixed field as its domain value.
///
/// `reference` is the instant "now" used for the yearless date kinds:
/// the year is the reference year, rolled back by one when the result
/// would land more than six months in the future (settlement traffic
/// around the December/January boundary).
pub(crate) fn decode_text(
    iso_type: IsoType,
    text: &str,
    reference: NaiveDateTime,
) -> Result<FieldValue, String> {
    match iso_type {
        IsoType::Numeric => Ok(FieldValue::Numeric(text.to_string())),
        IsoType::Alpha | IsoType::Llvar | IsoType::Lllvar => {
            Ok(FieldValue::Text(text.to_string()))
        }
        IsoType::Amount => {
            if text.len() != 12 || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("{text:?} is not 12 amount digits"));
            }
            let minor: i64 = text.parse().map_err(|_| "amount overflow".to_string())?;
            Ok(FieldValue::Amount(Decimal::new(minor, 2)))
        }
        IsoType::Date10 => {
            let (month, day) = (two_digits(text, 0)?, two_digits(text, 2)?);
            let time = NaiveTime::from_hms_opt(
                two_digits(text, 4)? as u32,
                two_digits(text, 6)? as u32,
                two_digits(text, 8)? as u32,
            )
            .ok_or_else(|| format!("{text:?} has an invalid time of day"))?;
            let date = yearless_date(month, day, reference)?;
            Ok(FieldValue::DateTime(date.and_time(time)))
        }
        IsoType::Date4 => {
            let (month, day) = (two_digits(text, 0)?, two_digits(text, 2)?);
            Ok(FieldValue::Date(yearless_date(month, day, reference)?))
        }
        IsoType::DateExp => {
            let (yy, month) = (two_digits(text, 0)?, two_digits(text, 2)?);
            let date = NaiveDate::from_ymd_opt(2000 + yy as i32, month as u32, 1)
                .ok_or_else(|| format!("{text:?} is not a valid yyMM expiry"))?;
            Ok(FieldValue::Expiry(date))
        }
        IsoType::Time => {
            let time = NaiveTime::from_hms_opt(
                two_digits(text, 0)? as u32,
                two_digits(text, 2)? as u32,
                two_digits(text, 4)? as u32,
            )
            .ok_or_else(|| format!("{text:?} is not a valid HHmmss time"))?;
            Ok(FieldValue::Time(time))
        }
        IsoType::Binary | IsoType::Llbin | IsoType::Lllbin => {
            Err("binary kinds have no textual form".to_string())
        }
    }
}

fn two_digits(text: &str, at: usize) -> Result<u8, String> {
    let slice = text
        .get(at..at + 2)
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| format!("{text:?} is not all digits"))?;
    slice.parse().map_err(|_| format!("{text:?} is not all digits"))
}

/// MMdd plus the reference year, rolled back one year when more than six
/// months ahead of the reference date.
fn yearless_date(month: u8, day: u8, reference: NaiveDateTime) -> Result<NaiveDate, String> {
    let build = |year: i32| {
        NaiveDate::from_ymd_opt(year, month as u32, day as u32)
            .ok_or_else(|| format!("{month:02}{day:02} is not a valid month/day"))
    };
    let candidate = build(reference.year())?;
    let horizon = reference
        .date()
        .checked_add_months(Months::new(6))
        .ok_or_else(|| "date out of range".to_string())?;
    if candidate > horizon {
        build(reference.year() - 1)
    } else {
        Ok(candidate)
    }
}
