// Data canonicalization for the foreign-call boundary
// Every value crossing into the engine travels as standard base64 text

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, Result};

/// Text encodings a caller may hand us string data in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,
    Utf16Le,
    Latin1,
    Ascii,
    Hex,
    Base64,
    Base64Url,
}

impl Encoding {
    pub const NAMES: &'static [&'static str] = &[
        "utf8", "utf-8", "utf16le", "utf-16le", "ucs2", "ucs-2", "latin1", "binary", "ascii",
        "hex", "base64", "base64url",
    ];

    /// Decode `text` written in this encoding into raw bytes
    pub fn decode(self, text: &str) -> std::result::Result<Vec<u8>, String> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Utf16Le => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()),
            // Node semantics: only the low byte of each code point survives
            Encoding::Latin1 | Encoding::Ascii => {
                Ok(text.chars().map(|c| (c as u32 & 0xFF) as u8).collect())
            }
            Encoding::Hex => hex::decode(text).map_err(|e| format!("invalid hex: {}", e)),
            Encoding::Base64 => STANDARD
                .decode(text)
                .or_else(|_| STANDARD_NO_PAD.decode(text))
                .map_err(|e| format!("invalid base64: {}", e)),
            Encoding::Base64Url => URL_SAFE_NO_PAD
                .decode(text)
                .or_else(|_| URL_SAFE.decode(text))
                .map_err(|e| format!("invalid base64url: {}", e)),
        }
    }
}

impl FromStr for Encoding {
    type Err = CryptoError;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "utf16le" | "utf-16le" | "ucs2" | "ucs-2" => Ok(Encoding::Utf16Le),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "ascii" => Ok(Encoding::Ascii),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "base64url" => Ok(Encoding::Base64Url),
            _ => Err(CryptoError::invalid_argument(
                "encoding",
                format!(
                    "unknown encoding \"{}\", expected one of {}",
                    name,
                    Encoding::NAMES.join(", ")
                ),
            )),
        }
    }
}

/// Base64 text as it crosses the engine boundary.
///
/// Construction always validates, so a `WireText` in hand is known to
/// decode cleanly.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Zeroize)]
#[serde(try_from = "String", into = "String")]
pub struct WireText(String);

impl WireText {
    /// Encode raw bytes into wire form
    pub fn encode(bytes: &[u8]) -> Self {
        Self(STANDARD.encode(bytes))
    }

    /// Accept text that claims to already be in wire form
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = Encoding::Base64
            .decode(text)
            .map_err(|reason| CryptoError::invalid_argument("wire", reason))?;
        // Re-encode so unpadded input still lands in canonical form
        Ok(Self::encode(&bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.0)
            .map_err(|e| CryptoError::invalid_argument("wire", format!("invalid base64: {}", e)))
    }

    /// Decode text carrying plaintext or key material, wiping the text after
    pub fn decode_secret(self) -> Result<Vec<u8>> {
        Zeroizing::new(self).decode()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<String> for WireText {
    type Error = CryptoError;

    fn try_from(text: String) -> Result<Self> {
        WireText::parse(&text)
    }
}

impl From<WireText> for String {
    fn from(wire: WireText) -> Self {
        wire.0
    }
}

impl fmt::Display for WireText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WireText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WireText({} chars)", self.0.len())
    }
}

/// Every shape of input the public API accepts for byte data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Already canonical wire text, passed through untouched
    Wire(WireText),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Text read under the operation's default encoding
    Text(String),
    /// Text carrying its own encoding name
    Tagged { value: String, encoding: String },
}

impl Data {
    pub fn tagged(value: impl Into<String>, encoding: impl Into<String>) -> Self {
        Data::Tagged {
            value: value.into(),
            encoding: encoding.into(),
        }
    }
}

impl From<&[u8]> for Data {
    fn from(bytes: &[u8]) -> Self {
        Data::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Data {
    fn from(bytes: &[u8; N]) -> Self {
        Data::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Data::Bytes(bytes)
    }
}

impl From<&Vec<u8>> for Data {
    fn from(bytes: &Vec<u8>) -> Self {
        Data::Bytes(bytes.clone())
    }
}

impl From<&str> for Data {
    fn from(text: &str) -> Self {
        Data::Text(text.to_string())
    }
}

impl From<String> for Data {
    fn from(text: String) -> Self {
        Data::Text(text)
    }
}

impl From<WireText> for Data {
    fn from(wire: WireText) -> Self {
        Data::Wire(wire)
    }
}

impl From<&WireText> for Data {
    fn from(wire: &WireText) -> Self {
        Data::Wire(wire.clone())
    }
}

/// Dynamic values (e.g. decoded from JSON) map onto the same shapes.
///
/// Strings become `Text`, arrays of numbers become `Bytes`, and objects
/// with string `value` and `encoding` fields become `Tagged`. Anything else,
/// including `null`, is rejected.
impl TryFrom<serde_json::Value> for Data {
    type Error = CryptoError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::String(text) => Ok(Data::Text(text)),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_u64()
                        .and_then(|n| u8::try_from(n).ok())
                        .ok_or_else(|| {
                            CryptoError::invalid_argument("data", "byte arrays must hold integers 0..=255")
                        })
                })
                .collect::<Result<Vec<u8>>>()
                .map(Data::Bytes),
            Value::Object(map) => match (map.get("value"), map.get("encoding")) {
                (Some(Value::String(value)), Some(Value::String(encoding))) => {
                    Ok(Data::tagged(value.clone(), encoding.clone()))
                }
                _ => Err(CryptoError::invalid_argument(
                    "data",
                    "objects must have string \"value\" and \"encoding\" fields",
                )),
            },
            other => Err(CryptoError::invalid_argument(
                "data",
                format!("unsupported value shape: {}", json_kind(&other)),
            )),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Reduce caller data to wire text.
///
/// `default_encoding` only matters for `Data::Text`; it must name a known
/// encoding when text is supplied. `label` names the argument in errors.
pub fn normalize(value: Option<&Data>, default_encoding: Option<&str>, label: &str) -> Result<WireText> {
    let value = value.ok_or_else(|| {
        CryptoError::invalid_argument(label, "expected bytes, a string or a {value, encoding} pair, got nothing")
    })?;

    match value {
        Data::Wire(wire) => Ok(wire.clone()),
        Data::Bytes(bytes) => Ok(WireText::encode(bytes)),
        Data::Text(text) => {
            let name = default_encoding.ok_or_else(|| {
                CryptoError::invalid_argument(label, "no encoding given for string data")
            })?;
            let encoding = Encoding::from_str(name).map_err(|e| e.relabel(label))?;
            encode_text(text, encoding, label)
        }
        Data::Tagged { value, encoding } => {
            let encoding = Encoding::from_str(encoding).map_err(|e| e.relabel(label))?;
            encode_text(value, encoding, label)
        }
    }
}

fn encode_text(text: &str, encoding: Encoding, label: &str) -> Result<WireText> {
    match encoding {
        // Already in wire form, keep the caller's text when it is canonical
        Encoding::Base64 => WireText::parse(text).map_err(|e| e.relabel(label)),
        other => other
            .decode(text)
            .map(|bytes| WireText::encode(&bytes))
            .map_err(|reason| CryptoError::invalid_argument(label, reason)),
    }
}

/// Inverse of [`normalize`]
pub fn denormalize(wire: &WireText) -> Result<Vec<u8>> {
    wire.decode()
}
