use std::collections::HashMap;
use std::sync::Arc;

use chrono::Local;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::ParseError;
use crate::models::encoding::CharEncoding;
use crate::models::iso_type::IsoType;
use crate::models::iso_value::{self, FieldValue, IsoValue};
use crate::service::custom_codec::CustomFieldCodec;

/// Parse schema entry for one (message type, field index) pair: the kind,
/// the declared length for fixed kinds, the character encoding, and an
/// optional custom codec.
///
/// Immutable once registered; parsing never mutates it, so entries are
/// safe to use from any number of threads.
#[derive(Debug, Clone)]
pub struct FieldParseInfo {
    iso_type: IsoType,
    length: usize,
    encoding: CharEncoding,
    codec: Option<Arc<dyn CustomFieldCodec>>,
}

impl FieldParseInfo {
    /// Generic constructor. For kinds with an intrinsic length the
    /// `length` argument is ignored; zero lengths for NUMERIC/ALPHA/
    /// BINARY are caught when the map is installed into a factory.
    pub fn new(iso_type: IsoType, length: usize) -> Self {
        let length = iso_type.intrinsic_length().unwrap_or(length);
        Self {
            iso_type,
            length,
            encoding: CharEncoding::default(),
            codec: None,
        }
    }

    pub fn numeric(length: usize) -> Self {
        Self::new(IsoType::Numeric, length)
    }

    pub fn alpha(length: usize) -> Self {
        Self::new(IsoType::Alpha, length)
    }

    pub fn llvar() -> Self {
        Self::new(IsoType::Llvar, 0)
    }

    pub fn lllvar() -> Self {
        Self::new(IsoType::Lllvar, 0)
    }

    pub fn date10() -> Self {
        Self::new(IsoType::Date10, 0)
    }

    pub fn date4() -> Self {
        Self::new(IsoType::Date4, 0)
    }

    pub fn date_exp() -> Self {
        Self::new(IsoType::DateExp, 0)
    }

    pub fn time() -> Self {
        Self::new(IsoType::Time, 0)
    }

    pub fn amount() -> Self {
        Self::new(IsoType::Amount, 0)
    }

    pub fn binary(length: usize) -> Self {
        Self::new(IsoType::Binary, length)
    }

    pub fn llbin() -> Self {
        Self::new(IsoType::Llbin, 0)
    }

    pub fn lllbin() -> Self {
        Self::new(IsoType::Lllbin, 0)
    }

    pub fn with_encoding(mut self, encoding: CharEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn CustomFieldCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn iso_type(&self) -> IsoType {
        self.iso_type
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Parse field `index` from `buf` starting at `offset`. Returns the
    /// decoded value and the number of bytes consumed.
    pub fn parse(
        &self,
        buf: &[u8],
        offset: usize,
        index: u8,
    ) -> Result<(IsoValue, usize), ParseError> {
        match self.iso_type {
            IsoType::Numeric
            | IsoType::Alpha
            | IsoType::Date10
            | IsoType::Date4
            | IsoType::DateExp
            | IsoType::Time
            | IsoType::Amount => self.parse_fixed_text(buf, offset, index),
            IsoType::Binary => self.parse_fixed_binary(buf, offset, index),
            IsoType::Llvar | IsoType::Lllvar => self.parse_var_text(buf, offset, index),
            IsoType::Llbin | IsoType::Lllbin => self.parse_var_binary(buf, offset, index),
        }
    }

    fn parse_fixed_text(
        &self,
        buf: &[u8],
        offset: usize,
        index: u8,
    ) -> Result<(IsoValue, usize), ParseError> {
        let raw = self.take(buf, offset, self.length)?;
        let text = self
            .encoding
            .decode(raw)
            .map_err(|e| self.field_err(index, offset, e.to_string()))?;
        let value = self.finish_text(text, index, offset)?;
        Ok((value, self.length))
    }

    fn parse_fixed_binary(
        &self,
        buf: &[u8],
        offset: usize,
        index: u8,
    ) -> Result<(IsoValue, usize), ParseError> {
        let raw = self.take(buf, offset, self.length)?;
        let value = self.build(FieldValue::Binary(raw.to_vec()), index, offset)?;
        Ok((value, self.length))
    }

    fn parse_var_text(
        &self,
        buf: &[u8],
        offset: usize,
        index: u8,
    ) -> Result<(IsoValue, usize), ParseError> {
        let prefix = self.iso_type.prefix_digits();
        let payload_len = self.read_length_prefix(buf, offset, index)?;
        let raw = self.take(buf, offset + prefix, payload_len)?;
        let text = self
            .encoding
            .decode(raw)
            .map_err(|e| self.field_err(index, offset + prefix, e.to_string()))?;
        let value = self.finish_text(text, index, offset + prefix)?;
        Ok((value, prefix + payload_len))
    }

    fn parse_var_binary(
        &self,
        buf: &[u8],
        offset: usize,
        index: u8,
    ) -> Result<(IsoValue, usize), ParseError> {
        let prefix = self.iso_type.prefix_digits();
        let payload_len = self.read_length_prefix(buf, offset, index)?;
        let raw = self.take(buf, offset + prefix, payload_len)?;
        let value = self.build(FieldValue::Binary(raw.to_vec()), index, offset + prefix)?;
        Ok((value, prefix + payload_len))
    }

    /// Read the 2- or 3-digit ASCII length prefix.
    fn read_length_prefix(&self, buf: &[u8], offset: usize, index: u8) -> Result<usize, ParseError> {
        let width = self.iso_type.prefix_digits();
        let raw = self.take(buf, offset, width)?;
        let mut length = 0usize;
        for (i, &b) in raw.iter().enumerate() {
            if !b.is_ascii_digit() {
                return Err(self.field_err(
                    index,
                    offset + i,
                    format!("length prefix byte 0x{b:02X} is not a digit"),
                ));
            }
            length = length * 10 + (b - b'0') as usize;
        }
        Ok(length)
    }

    /// Slice `count` bytes at `offset`, or report truncation.
    fn take<'a>(&self, buf: &'a [u8], offset: usize, count: usize) -> Result<&'a [u8], ParseError> {
        if buf.len() < offset + count {
            return Err(ParseError::Truncated {
                offset,
                needed: count,
                available: buf.len().saturating_sub(offset),
            });
        }
        Ok(&buf[offset..offset + count])
    }

    /// Run the decoded text through the custom codec when one is attached,
    /// keeping the raw text when the codec declines; otherwise interpret
    /// it as the kind's domain value.
    fn finish_text(&self, text: String, index: u8, offset: usize) -> Result<IsoValue, ParseError> {
        if let Some(codec) = &self.codec {
            if let Some(custom) = codec.decode(&text) {
                return self.build(FieldValue::Custom(custom), index, offset);
            }
            debug!(field = index, "custom codec declined value, keeping raw text");
        }
        let value = iso_value::decode_text(self.iso_type, &text, Local::now().naive_local())
            .map_err(|msg| self.field_err(index, offset, msg))?;
        self.build(value, index, offset)
    }

    fn build(&self, value: FieldValue, index: u8, offset: usize) -> Result<IsoValue, ParseError> {
        let built = IsoValue::new(self.iso_type, value, self.length)
            .map_err(|e| self.field_err(index, offset, e.to_string()))?;
        Ok(match &self.codec {
            Some(codec) => built.with_codec(Arc::clone(codec)),
            None => built,
        })
    }

    fn field_err(&self, index: u8, offset: usize, msg: String) -> ParseError {
        ParseError::Field {
            index,
            kind: self.iso_type,
            offset,
            msg,
        }
    }
}

static DEFAULT_PARSE_MAP: Lazy<HashMap<u8, FieldParseInfo>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert(2, FieldParseInfo::llvar()); // PAN
    map.insert(3, FieldParseInfo::numeric(6)); // Processing Code
    map.insert(4, FieldParseInfo::amount()); // Amount, Transaction
    map.insert(7, FieldParseInfo::date10()); // Transmission Date & Time
    map.insert(11, FieldParseInfo::numeric(6)); // STAN
    map.insert(12, FieldParseInfo::time()); // Time, Local Transaction
    map.insert(13, FieldParseInfo::date4()); // Date, Local Transaction
    map.insert(14, FieldParseInfo::date_exp()); // Date, Expiration
    map.insert(18, FieldParseInfo::numeric(4)); // Merchant Type
    map.insert(22, FieldParseInfo::numeric(3)); // POS Entry Mode
    map.insert(23, FieldParseInfo::numeric(3)); // Card Sequence Number
    map.insert(25, FieldParseInfo::numeric(2)); // POS Condition Code
    map.insert(32, FieldParseInfo::llvar()); // Acquiring Institution ID
    map.insert(35, FieldParseInfo::llvar()); // Track 2 Data
    map.insert(37, FieldParseInfo::alpha(12)); // RRN
    map.insert(38, FieldParseInfo::alpha(6)); // Authorization Code
    map.insert(39, FieldParseInfo::alpha(2)); // Response Code
    map.insert(41, FieldParseInfo::alpha(8)); // Terminal ID
    map.insert(42, FieldParseInfo::alpha(15)); // Merchant ID
    map.insert(43, FieldParseInfo::alpha(40)); // Merchant Name/Location
    map.insert(49, FieldParseInfo::numeric(3)); // Currency Code
    map.insert(52, FieldParseInfo::binary(8)); // PIN Data
    map.insert(54, FieldParseInfo::lllvar()); // Additional Amounts
    map.insert(55, FieldParseInfo::lllbin()); // EMV Data (DE55)
    map.insert(60, FieldParseInfo::lllvar()); // Reserved Private
    map.insert(61, FieldParseInfo::lllvar()); // Reserved Private
    map.insert(62, FieldParseInfo::lllvar()); // Reserved Private
    map.insert(63, FieldParseInfo::lllvar()); // Reserved Private
    map.insert(64, FieldParseInfo::binary(8)); // MAC
    map.insert(70, FieldParseInfo::numeric(3)); // Network Management Code
    map.insert(90, FieldParseInfo::numeric(42)); // Original Data Elements
    map.insert(95, FieldParseInfo::alpha(42)); // Replacement Amounts
    map.insert(102, FieldParseInfo::llvar()); // Account ID 1
    map.insert(103, FieldParseInfo::llvar()); // Account ID 2
    map.insert(123, FieldParseInfo::lllvar()); // Reserved Private
    map.insert(127, FieldParseInfo::lllvar()); // Reserved Private
    map.insert(128, FieldParseInfo::binary(8)); // MAC 2
    map
});

/// Parse schema for the common data elements, usable as a starting point
/// for any message type.
pub fn default_parse_map() -> HashMap<u8, FieldParseInfo> {
    DEFAULT_PARSE_MAP.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::any::Any;
    use std::sync::Arc;
    use tracing_subscriber::EnvFilter;

    use crate::service::custom_codec::CustomValue;

    /// Capture the parser's tracing output in test logs.
    fn init_tracing() {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn test_numeric_fixed() {
        let info = FieldParseInfo::numeric(6);
        let (value, consumed) = info.parse(b"000123REST", 0, 11).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(value.value(), &FieldValue::Numeric("000123".to_string()));
    }

    #[test]
    fn test_alpha_keeps_padding() {
        let info = FieldParseInfo::alpha(8);
        let (value, consumed) = info.parse(b"TERM0001", 0, 41).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(value.value(), &FieldValue::Text("TERM0001".to_string()));
    }

    #[test]
    fn test_llvar_reads_prefix_then_payload() {
        let info = FieldParseInfo::llvar();
        let (value, consumed) = info.parse(b"164111111111111111", 0, 2).unwrap();
        assert_eq!(consumed, 18);
        assert_eq!(
            value.value(),
            &FieldValue::Text("4111111111111111".to_string())
        );
    }

    #[test]
    fn test_lllvar_reads_three_digit_prefix() {
        let info = FieldParseInfo::lllvar();
        let (value, consumed) = info.parse(b"012ABCDEFGHIJKL", 0, 54).unwrap();
        assert_eq!(consumed, 15);
        assert_eq!(value.value(), &FieldValue::Text("ABCDEFGHIJKL".to_string()));
    }

    #[test]
    fn test_non_digit_prefix_fails() {
        let info = FieldParseInfo::llvar();
        let err = info.parse(b"1A41111111", 0, 2).unwrap_err();
        match err {
            ParseError::Field { index, offset, .. } => {
                assert_eq!(index, 2);
                assert_eq!(offset, 1);
            }
            other => panic!("expected field error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_payload() {
        let info = FieldParseInfo::llvar();
        let err = info.parse(b"16411111", 0, 2).unwrap_err();
        match err {
            ParseError::Truncated {
                offset,
                needed,
                available,
            } => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 16);
                assert_eq!(available, 6);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_fixed_field() {
        let info = FieldParseInfo::numeric(6);
        let err = info.parse(b"0001", 2, 3).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Truncated {
                offset: 2,
                needed: 6,
                available: 2,
            }
        ));
    }

    #[test]
    fn test_amount_scaled() {
        let info = FieldParseInfo::amount();
        let (value, consumed) = info.parse(b"000000001000", 0, 4).unwrap();
        assert_eq!(consumed, 12);
        assert_eq!(value.value(), &FieldValue::Amount(dec!(10.00)));
    }

    #[test]
    fn test_binary_fixed() {
        let info = FieldParseInfo::binary(4);
        let buf = [0xDE, 0xAD, 0xBE, 0xEF, 0xFF];
        let (value, consumed) = info.parse(&buf, 0, 52).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(
            value.value(),
            &FieldValue::Binary(vec![0xDE, 0xAD, 0xBE, 0xEF])
        );
    }

    #[test]
    fn test_llbin_payload_is_raw() {
        let info = FieldParseInfo::llbin();
        let mut buf = b"03".to_vec();
        buf.extend_from_slice(&[0x9F, 0x26, 0x08]);
        let (value, consumed) = info.parse(&buf, 0, 55).unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(value.value(), &FieldValue::Binary(vec![0x9F, 0x26, 0x08]));
    }

    #[test]
    fn test_expiry_parse() {
        let info = FieldParseInfo::date_exp();
        let (value, _) = info.parse(b"2512", 0, 14).unwrap();
        assert_eq!(
            value.value(),
            &FieldValue::Expiry(chrono::NaiveDate::from_ymd_opt(2025, 12, 1).unwrap())
        );
    }

    #[test]
    fn test_time_parse() {
        let info = FieldParseInfo::time();
        let (value, _) = info.parse(b"143005", 0, 12).unwrap();
        assert_eq!(
            value.value(),
            &FieldValue::Time(chrono::NaiveTime::from_hms_opt(14, 30, 5).unwrap())
        );
    }

    #[test]
    fn test_parse_respects_offset() {
        let info = FieldParseInfo::numeric(6);
        let (value, consumed) = info.parse(b"XXXX650000", 4, 3).unwrap();
        assert_eq!(consumed, 6);
        assert_eq!(value.value(), &FieldValue::Numeric("650000".to_string()));
    }

    #[test]
    fn test_default_map_covers_common_elements() {
        let map = default_parse_map();
        assert_eq!(map.get(&2).unwrap().iso_type(), IsoType::Llvar);
        assert_eq!(map.get(&4).unwrap().iso_type(), IsoType::Amount);
        assert_eq!(map.get(&41).unwrap().length(), 8);
        assert_eq!(map.get(&55).unwrap().iso_type(), IsoType::Lllbin);
        assert!(map.get(&1).is_none());
    }

    #[derive(Debug)]
    struct Track2(String);

    impl CustomValue for Track2 {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct Track2Codec;

    impl CustomFieldCodec for Track2Codec {
        fn encode(&self, value: &dyn CustomValue) -> String {
            value
                .as_any()
                .downcast_ref::<Track2>()
                .map(|t| t.0.clone())
                .unwrap_or_default()
        }

        fn decode(&self, raw: &str) -> Option<Arc<dyn CustomValue>> {
            if raw.contains('=') {
                Some(Arc::new(Track2(raw.to_string())))
            } else {
                None
            }
        }
    }

    #[test]
    fn test_custom_codec_decodes() {
        let info = FieldParseInfo::llvar().with_codec(Arc::new(Track2Codec));
        let wire = b"344111111111111111=25121010000012345";
        let (value, consumed) = info.parse(wire, 0, 35).unwrap();
        assert_eq!(consumed, wire.len());
        match value.value() {
            FieldValue::Custom(v) => {
                let track = v.as_any().downcast_ref::<Track2>().unwrap();
                assert!(track.0.starts_with("4111111111111111="));
            }
            other => panic!("expected custom value, got {other:?}"),
        }
        // re-encoding goes back through the codec
        let mut out = Vec::new();
        value
            .encode_into(&mut out, CharEncoding::Latin1, 35)
            .unwrap();
        assert_eq!(out, wire);
    }

    #[test]
    fn test_custom_codec_decline_keeps_raw_text() {
        init_tracing();
        let info = FieldParseInfo::llvar().with_codec(Arc::new(Track2Codec));
        let (value, _) = info.parse(b"05HELLO", 0, 35).unwrap();
        assert_eq!(value.value(), &FieldValue::Text("HELLO".to_string()));
    }

    #[test]
    fn test_repeated_parse_is_pure() {
        let info = FieldParseInfo::llvar();
        let first = info.parse(b"164111111111111111", 0, 2).unwrap();
        let second = info.parse(b"164111111111111111", 0, 2).unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }
}
