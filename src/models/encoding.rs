use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Character encoding for textual fields and headers.
///
/// ISO 8583's historical default is ISO-8859-1. Length prefixes of the
/// variable kinds always count bytes, so every supported encoding keeps
/// field lengths well-defined on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharEncoding {
    #[default]
    Latin1,
    Ascii,
    Utf8,
}

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("byte 0x{byte:02X} is not valid {encoding:?} text")]
    Decode { byte: u8, encoding: CharEncoding },

    #[error("character {ch:?} is not representable in {encoding:?}")]
    Encode { ch: char, encoding: CharEncoding },
}

impl CharEncoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            CharEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
            CharEncoding::Ascii => match bytes.iter().find(|&&b| b > 0x7F) {
                Some(&byte) => Err(EncodingError::Decode {
                    byte,
                    encoding: self,
                }),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            CharEncoding::Utf8 => std::str::from_utf8(bytes).map(str::to_owned).map_err(|e| {
                EncodingError::Decode {
                    byte: bytes[e.valid_up_to()],
                    encoding: self,
                }
            }),
        }
    }

    pub fn encode(self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            CharEncoding::Latin1 => text
                .chars()
                .map(|ch| {
                    u8::try_from(ch as u32).map_err(|_| EncodingError::Encode {
                        ch,
                        encoding: self,
                    })
                })
                .collect(),
            CharEncoding::Ascii => {
                match text.chars().find(|ch| !ch.is_ascii()) {
                    Some(ch) => Err(EncodingError::Encode {
                        ch,
                        encoding: self,
                    }),
                    None => Ok(text.as_bytes().to_vec()),
                }
            }
            CharEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
        }
    }
}
