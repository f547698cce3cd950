use thiserror::Error;

#[derive(Error, Debug)]
pub enum MorphmineError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database encode error: {0}")]
    Encode(Box<bincode::error::EncodeError>),

    #[error("Database decode error: {0}")]
    Decode(Box<bincode::error::DecodeError>),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Did not find a field called \"{field_name}\" in the note type \"{note_type}\"")]
    NoteFilterFields { field_name: String, note_type: String },

    #[error("No morphemizer is registered under the name \"{0}\"")]
    MorphemizerNotFound(String),

    #[error("A recalc is already running")]
    RecalcInProgress,

    #[error("MorphmineError: {0}")]
    Custom(String),
}

impl MorphmineError {
    /// Actionable message for errors the user can fix themselves; everything
    /// else propagates to the caller unchanged.
    pub fn remediation(&self) -> Option<String> {
        match self {
            MorphmineError::NoteFilterFields { field_name, note_type } => Some(format!(
                "Did not find a field called \"{}\" in the note type \"{}\".\n\n\
                 Field names are case-sensitive!\n\n\
                 Fix the field list of the matching note filter in the preferences.",
                field_name, note_type
            )),
            MorphmineError::MorphemizerNotFound(name) => Some(format!(
                "No morphemizer is registered under the name \"{}\".\n\n\
                 Pick a registered morphemizer in the note filter settings.",
                name
            )),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MorphmineError {
    fn from(error: std::io::Error) -> Self {
        MorphmineError::Io(Box::new(error))
    }
}

impl From<bincode::error::EncodeError> for MorphmineError {
    fn from(error: bincode::error::EncodeError) -> Self {
        MorphmineError::Encode(Box::new(error))
    }
}

impl From<bincode::error::DecodeError> for MorphmineError {
    fn from(error: bincode::error::DecodeError) -> Self {
        MorphmineError::Decode(Box::new(error))
    }
}
