use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use crate::error::{ConfigError, EncodeError};
use crate::models::bitmap::Bitmap;
use crate::models::encoding::CharEncoding;
use crate::models::iso_type::IsoType;
use crate::models::iso_value::IsoValue;

/// One ISO 8583 message: optional header, MTI, sparse field map
/// (indices 2-128), optional single-byte terminator.
///
/// Field 1 is the secondary-bitmap indicator; it is computed while
/// encoding and can never be set through the API.
#[derive(Debug, Clone, PartialEq)]
pub struct IsoMessage {
    header: Option<String>,
    mti: u16,
    fields: HashMap<u8, IsoValue>,
    etx: Option<u8>,
    encoding: CharEncoding,
}

impl IsoMessage {
    pub fn new(mti: u16) -> Self {
        Self {
            header: None,
            mti,
            fields: HashMap::new(),
            etx: None,
            encoding: CharEncoding::default(),
        }
    }

    pub fn mti(&self) -> u16 {
        self.mti
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    pub fn set_header<S: Into<String>>(&mut self, header: S) {
        self.header = Some(header.into());
    }

    pub(crate) fn set_header_opt(&mut self, header: Option<String>) {
        self.header = header;
    }

    pub fn etx(&self) -> Option<u8> {
        self.etx
    }

    pub fn set_etx(&mut self, etx: Option<u8>) {
        self.etx = etx;
    }

    pub fn encoding(&self) -> CharEncoding {
        self.encoding
    }

    pub(crate) fn set_encoding(&mut self, encoding: CharEncoding) {
        self.encoding = encoding;
    }

    /// Install field `index` (2-128). Field 1 is reserved and rejected.
    pub fn set_field(&mut self, index: u8, value: IsoValue) -> Result<(), ConfigError> {
        match index {
            1 => Err(ConfigError::ReservedField),
            2..=128 => {
                self.fields.insert(index, value);
                Ok(())
            }
            _ => Err(ConfigError::IndexOutOfRange { index }),
        }
    }

    /// Convenience wrapper building the [`IsoValue`] from text.
    pub fn set_value(
        &mut self,
        index: u8,
        raw: &str,
        kind: IsoType,
        length: usize,
    ) -> Result<(), ConfigError> {
        self.set_field(index, IsoValue::from_text(kind, raw, length)?)
    }

    /// Trusted insert for factory internals; index must already be 2-128.
    pub(crate) fn put(&mut self, index: u8, value: IsoValue) {
        self.fields.insert(index, value);
    }

    pub fn has_field(&self, index: u8) -> bool {
        self.fields.contains_key(&index)
    }

    pub fn get_field(&self, index: u8) -> Option<&IsoValue> {
        self.fields.get(&index)
    }

    pub fn remove_field(&mut self, index: u8) -> Option<IsoValue> {
        self.fields.remove(&index)
    }

    /// Present field indices in ascending order.
    pub fn field_indices(&self) -> Vec<u8> {
        let mut indices: Vec<u8> = self.fields.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub fn iter_fields(&self) -> impl Iterator<Item = (u8, &IsoValue)> + '_ {
        self.fields.iter().map(|(&i, v)| (i, v))
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Whether encoding will emit the secondary bitmap.
    pub fn has_secondary_bitmap(&self) -> bool {
        self.fields.keys().any(|&i| i >= 65)
    }

    /// Whether the function digit marks this MTI as a request
    /// (requests carry an even function digit, responses odd).
    pub fn is_request(&self) -> bool {
        (self.mti >> 4) & 1 == 0
    }

    pub fn is_response(&self) -> bool {
        !self.is_request()
    }

    /// MTI of the matching response (function digit + 1).
    pub fn response_mti(&self) -> u16 {
        self.mti + 0x10
    }

    /// Serialize to the wire form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        if let Some(header) = &self.header {
            let bytes = self.encoding.encode(header).map_err(EncodeError::Header)?;
            out.extend_from_slice(&bytes);
        }
        out.extend_from_slice(format!("{:04X}", self.mti).as_bytes());
        let bitmap = Bitmap::from_indices(self.fields.keys().copied());
        out.extend_from_slice(bitmap.to_hex().as_bytes());
        for index in self.field_indices() {
            if let Some(value) = self.fields.get(&index) {
                value.encode_into(&mut out, self.encoding, index)?;
            }
        }
        if let Some(etx) = self.etx {
            out.push(etx);
        }
        Ok(out)
    }

    /// Serialize into `sink`. On error the sink contents are undefined
    /// and the caller discards them.
    pub fn write<W: Write>(&self, sink: &mut W) -> Result<(), EncodeError> {
        let bytes = self.to_bytes()?;
        sink.write_all(&bytes)?;
        Ok(())
    }
}

impl fmt::Display for IsoMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MTI {:04X}", self.mti)?;
        if let Some(header) = &self.header {
            write!(f, " header={header}")?;
        }
        for index in self.field_indices() {
            if let Some(value) = self.fields.get(&index) {
                write!(f, " DE{index:03}={value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_one_is_reserved() {
        let mut msg = IsoMessage::new(0x0200);
        let err = msg
            .set_field(1, IsoValue::numeric("1", 1).unwrap())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ReservedField));
    }

    #[test]
    fn test_index_range_enforced() {
        let mut msg = IsoMessage::new(0x0200);
        let v = IsoValue::numeric("1", 1).unwrap();
        assert!(matches!(
            msg.set_field(0, v.clone()),
            Err(ConfigError::IndexOutOfRange { index: 0 })
        ));
        assert!(msg.set_field(128, v).is_ok());
    }

    #[test]
    fn test_accessors() {
        let mut msg = IsoMessage::new(0x0200);
        msg.set_value(3, "650000", IsoType::Numeric, 6).unwrap();
        assert!(msg.has_field(3));
        assert_eq!(msg.field_count(), 1);
        assert!(msg.remove_field(3).is_some());
        assert!(!msg.has_field(3));
    }

    #[test]
    fn test_write_without_header() {
        let mut msg = IsoMessage::new(0x0200);
        msg.set_value(3, "650000", IsoType::Numeric, 6).unwrap();
        msg.set_value(41, "TERM0001", IsoType::Alpha, 8).unwrap();
        let bytes = msg.to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "02002000000000800000650000TERM0001");
    }

    #[test]
    fn test_etx_appended() {
        let mut msg = IsoMessage::new(0x0800);
        msg.set_etx(Some(0x03));
        let bytes = msg.to_bytes().unwrap();
        assert_eq!(bytes.last(), Some(&0x03));
    }

    #[test]
    fn test_secondary_bitmap_flag() {
        let mut msg = IsoMessage::new(0x0200);
        msg.set_value(70, "301", IsoType::Numeric, 3).unwrap();
        assert!(msg.has_secondary_bitmap());
        let bytes = msg.to_bytes().unwrap();
        // MTI + 32 bitmap chars + 3 digit field
        assert_eq!(bytes.len(), 4 + 32 + 3);
    }

    #[test]
    fn test_response_mti() {
        assert_eq!(IsoMessage::new(0x0200).response_mti(), 0x0210);
        assert_eq!(IsoMessage::new(0x0400).response_mti(), 0x0410);
        assert_eq!(IsoMessage::new(0x0800).response_mti(), 0x0810);
    }

    #[test]
    fn test_request_response_classification() {
        assert!(IsoMessage::new(0x0200).is_request());
        assert!(IsoMessage::new(0x0210).is_response());
        assert!(IsoMessage::new(0x0420).is_request());
        assert!(IsoMessage::new(0x0430).is_response());
    }

    #[test]
    fn test_display_lists_fields() {
        let mut msg = IsoMessage::new(0x0200);
        msg.set_value(3, "650000", IsoType::Numeric, 6).unwrap();
        let text = msg.to_string();
        assert!(text.contains("MTI 0200"));
        assert!(text.contains("DE003=650000"));
    }

    #[test]
    fn test_write_into_sink() {
        let mut msg = IsoMessage::new(0x0200);
        msg.set_value(3, "650000", IsoType::Numeric, 6).unwrap();
        let mut sink = Vec::new();
        msg.write(&mut sink).unwrap();
        assert_eq!(sink, msg.to_bytes().unwrap());
    }
}
