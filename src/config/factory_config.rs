use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::encoding::CharEncoding;
use crate::models::iso_message::IsoMessage;
use crate::models::iso_type::IsoType;
use crate::models::iso_value::IsoValue;
use crate::service::field_parser::FieldParseInfo;
use crate::service::message_factory::MessageFactory;

/// Declarative factory configuration.
///
/// The codec does not read files; callers deserialize this model from
/// whatever source they own (JSON, TOML, layered settings) and apply it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactoryConfig {
    #[serde(default)]
    pub assign_date: bool,
    #[serde(default)]
    pub etx: Option<u8>,
    #[serde(default)]
    pub encoding: Option<CharEncoding>,
    #[serde(default)]
    pub messages: Vec<MessageConfig>,
}

/// Per-MTI header, template, and parse schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Four hex digits, e.g. "0200".
    pub mti: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub template: Vec<TemplateFieldConfig>,
    #[serde(default)]
    pub parse: Vec<ParseFieldConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFieldConfig {
    pub index: u8,
    #[serde(rename = "type")]
    pub kind: IsoType,
    #[serde(default)]
    pub length: usize,
    /// Textual value; hex for the binary kinds, minor-unit digits or a
    /// decimal string for AMOUNT.
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseFieldConfig {
    pub index: u8,
    #[serde(rename = "type")]
    pub kind: IsoType,
    #[serde(default)]
    pub length: usize,
}

impl FactoryConfig {
    /// Apply every setting onto `factory`. Parse schemas are installed
    /// before templates so template/schema consistency is checked.
    pub fn apply(&self, factory: &mut MessageFactory) -> Result<(), ConfigError> {
        if let Some(encoding) = self.encoding {
            factory.set_character_encoding(encoding);
        }
        factory.set_etx(self.etx);
        factory.set_assign_date(self.assign_date);

        for message in &self.messages {
            let mti = parse_mti(&message.mti)?;
            if let Some(header) = &message.header {
                factory.set_iso_header(mti, header.clone());
            }
            if !message.parse.is_empty() {
                let mut map = HashMap::new();
                for field in &message.parse {
                    map.insert(field.index, FieldParseInfo::new(field.kind, field.length));
                }
                factory.set_parse_map(mti, map)?;
            }
            if !message.template.is_empty() {
                let mut template = IsoMessage::new(mti);
                for field in &message.template {
                    template.set_field(
                        field.index,
                        IsoValue::from_text(field.kind, &field.value, field.length)?,
                    )?;
                }
                factory.set_message_template(template)?;
            }
        }
        Ok(())
    }

    /// Build a fresh factory from this configuration.
    pub fn into_factory(self) -> Result<MessageFactory, ConfigError> {
        let mut factory = MessageFactory::new();
        self.apply(&mut factory)?;
        Ok(factory)
    }
}

fn parse_mti(text: &str) -> Result<u16, ConfigError> {
    if text.len() != 4 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidMti {
            text: text.to_string(),
        });
    }
    u16::from_str_radix(text, 16).map_err(|_| ConfigError::InvalidMti {
        text: text.to_string(),
    })
}
