//! ISO 8583 codec and message factory.
//!
//! Builds outbound card-transaction messages from per-type templates,
//! derives responses from requests, parses inbound buffers against
//! per-type schemas, and serializes messages back to the identical wire
//! form: optional header, four hex MTI digits, 16/32 hex bitmap
//! characters, then the fields in ascending order.
//!
//! Transport framing, key management, and PIN/MAC cryptography live
//! outside this crate; the factory only exposes the hooks they plug
//! into (trace-number source, custom field codecs, configuration
//! ingestion).
//!
//! ```
//! use std::collections::HashMap;
//! use iso8583_codec::{FieldParseInfo, IsoValue, MessageFactory};
//!
//! # fn main() -> Result<(), iso8583_codec::Iso8583Error> {
//! let mut factory = MessageFactory::new();
//! factory.set_iso_header(0x0200, "ISO015000050");
//! let mut schema = HashMap::new();
//! schema.insert(3, FieldParseInfo::numeric(6));
//! schema.insert(41, FieldParseInfo::alpha(8));
//! factory.set_parse_map(0x0200, schema)?;
//!
//! let mut msg = factory.new_message(0x0200);
//! msg.set_field(3, IsoValue::numeric("650000", 6)?)?;
//! msg.set_field(41, IsoValue::alpha("TERM0001", 8)?)?;
//!
//! let bytes = msg.to_bytes()?;
//! let parsed = factory.parse(&bytes, 12)?;
//! assert_eq!(parsed, msg);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod service;

pub use config::factory_config::{
    FactoryConfig, MessageConfig, ParseFieldConfig, TemplateFieldConfig,
};
pub use error::{ConfigError, EncodeError, Iso8583Error, ParseError};
pub use models::bitmap::Bitmap;
pub use models::encoding::{CharEncoding, EncodingError};
pub use models::iso_message::IsoMessage;
pub use models::iso_type::IsoType;
pub use models::iso_value::{FieldValue, IsoValue};
pub use service::custom_codec::{CustomFieldCodec, CustomValue};
pub use service::field_parser::{FieldParseInfo, default_parse_map};
pub use service::message_factory::MessageFactory;
pub use service::stan_generator::{StanGenerator, TraceNumberSource};
