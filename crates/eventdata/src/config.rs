//! Decoder configuration: byte order, pointer width and array limits.

use serde::{Deserialize, Serialize};

/// Environment variable holding a JSON encoded [`DecodeConfig`].
pub const CONFIG_ENV: &str = "EVENTDATA_CONFIG";

/// Byte order of multi-byte scalars in decoded buffers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Width of pointer-sized fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PointerWidth {
    Four,
    #[default]
    Eight,
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }
}

impl TryFrom<u8> for PointerWidth {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(PointerWidth::Four),
            8 => Ok(PointerWidth::Eight),
            other => Err(format!("unsupported pointer width {other}, expected 4 or 8")),
        }
    }
}

impl From<PointerWidth> for u8 {
    fn from(value: PointerWidth) -> Self {
        value.bytes() as u8
    }
}

/// Engine level decode options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeConfig {
    pub byte_order: ByteOrder,

    /// Upper bound on the element count of any single array. The remaining
    /// span divided by the minimum element size always applies as well.
    pub max_array_elements: Option<usize>,

    pub pointer_width: PointerWidth,
}

impl DecodeConfig {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Reads the config from [`CONFIG_ENV`], if set.
    pub fn from_env() -> Result<Option<Self>, serde_json::Error> {
        match std::env::var(CONFIG_ENV) {
            Ok(s) if !s.trim().is_empty() => Self::from_json(&s).map(Some),
            _ => Ok(None),
        }
    }

    pub fn with_byte_order(self, byte_order: ByteOrder) -> Self {
        Self { byte_order, ..self }
    }

    pub fn with_pointer_width(self, pointer_width: PointerWidth) -> Self {
        Self {
            pointer_width,
            ..self
        }
    }

    pub fn with_max_array_elements(self, max: usize) -> Self {
        Self {
            max_array_elements: Some(max),
            ..self
        }
    }
}
