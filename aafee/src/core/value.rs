//! The value passed between stages.

use crate::errors::StageValueError;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Control signal carried by an [`Instruction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    /// Keep going.
    Continue,
    /// Stop the surrounding loop.
    End,
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "CONTINUE"),
            Self::End => write!(f, "END"),
        }
    }
}

/// Free text paired with a control signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The text the instruction was derived from.
    pub text: String,
    /// What the producer wants to happen next.
    pub control: ControlSignal,
}

impl Instruction {
    /// Creates a continue instruction.
    pub fn proceed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            control: ControlSignal::Continue,
        }
    }

    /// Creates an end instruction.
    pub fn end(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            control: ControlSignal::End,
        }
    }

    /// Returns true if the instruction says to stop.
    #[must_use]
    pub fn is_end(&self) -> bool {
        self.control == ControlSignal::End
    }
}

/// Tagged union flowing between stages.
///
/// Values are never mutated in place; stages build new ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StageValue {
    /// Plain text.
    Text(String),
    /// Text holding a JSON document.
    Json(String),
    /// Markdown text.
    Markdown(String),
    /// Explicit absence of a value.
    None,
    /// Text plus a control signal.
    Instruction(Instruction),
    /// Decoded model output tagged with the schema it was decoded against.
    Structured {
        /// Name of the target schema.
        schema_tag: String,
        /// Decoded payload.
        payload: serde_json::Value,
    },
    /// A list of strings.
    List(Vec<String>),
}

impl StageValue {
    /// Creates a text value.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Creates a JSON value.
    pub fn json(text: impl Into<String>) -> Self {
        Self::Json(text.into())
    }

    /// Creates a markdown value.
    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown(text.into())
    }

    /// Coerces the value to text.
    ///
    /// Lists render as `[a, b, c]`. `None` and `Structured` have no text
    /// form and fail with [`StageValueError::NotTextRepresentable`].
    pub fn as_text(&self) -> Result<Cow<'_, str>, StageValueError> {
        match self {
            Self::Text(text) | Self::Json(text) | Self::Markdown(text) => {
                Ok(Cow::Borrowed(text.as_str()))
            }
            Self::Instruction(instruction) => Ok(Cow::Borrowed(instruction.text.as_str())),
            Self::List(items) => Ok(Cow::Owned(format!("[{}]", items.join(", ")))),
            Self::None | Self::Structured { .. } => Err(StageValueError::NotTextRepresentable {
                variant: self.variant_name(),
            }),
        }
    }

    /// Returns the variant name used in logs and errors.
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Json(_) => "json",
            Self::Markdown(_) => "markdown",
            Self::None => "none",
            Self::Instruction(_) => "instruction",
            Self::Structured { .. } => "structured",
            Self::List(_) => "list",
        }
    }

    /// Returns true for the `None` variant.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the instruction if this is one.
    #[must_use]
    pub const fn instruction(&self) -> Option<&Instruction> {
        match self {
            Self::Instruction(instruction) => Some(instruction),
            _ => None,
        }
    }
}

impl Default for StageValue {
    fn default() -> Self {
        Self::None
    }
}

impl From<Instruction> for StageValue {
    fn from(instruction: Instruction) -> Self {
        Self::Instruction(instruction)
    }
}

impl fmt::Display for StageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Ok(text) => f.write_str(&text),
            Err(_) => match self {
                Self::Structured { schema_tag, payload } => {
                    write!(f, "<{schema_tag}> {payload}")
                }
                _ => write!(f, "<{}>", self.variant_name()),
            },
        }
    }
}
