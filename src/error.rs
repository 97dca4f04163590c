use std::io;
use thiserror::Error;

/// Failures of a remap run.
///
/// `Structural`, `Configuration`, `Xml` and `Io` abort the run. `UnreadableInput`
/// and `BinaryAsset` are recoverable: callers log them and carry on.
#[derive(Debug, Error)]
pub enum RemapError {
    #[error("input {source_name} cannot be reopened for the title pre-scan")]
    UnreadableInput { source_name: String },

    #[error("malformed export: {0}")]
    Structural(String),

    #[error("cannot read file {file}: {source}")]
    BinaryAsset {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RemapError {
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::Structural(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnreadableInput { .. } | Self::BinaryAsset { .. })
    }
}

impl From<quick_xml::events::attributes::AttrError> for RemapError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.into())
    }
}

pub type Result<T, E = RemapError> = std::result::Result<T, E>;
