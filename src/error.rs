use std::fmt;
use std::path::PathBuf;

/// Error kinds raised by the conversion pipeline
#[derive(Debug)]
pub enum ConvertError {
    /// Unparseable or corrupt ULog input
    MalformedLog(String),
    /// The log holds no usable position data
    EmptyTrack,
    /// Destination could not be written
    Write { path: PathBuf, source: std::io::Error },
    /// The external converter failed, timed out or produced nothing
    ExternalTool(String),
    /// Source log could not be opened
    Read { path: PathBuf, source: std::io::Error },
    /// Other I/O errors while streaming the log
    Io(std::io::Error),
}

impl ConvertError {
    /// Short name of the error kind, used in reports
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConvertError::MalformedLog(_) => "MalformedLogError",
            ConvertError::EmptyTrack => "EmptyTrackError",
            ConvertError::Write { .. } => "WriteError",
            ConvertError::ExternalTool(_) => "ExternalToolError",
            ConvertError::Read { .. } => "ReadError",
            ConvertError::Io(_) => "IoError",
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Write {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::MalformedLog(msg) => write!(f, "Malformed log: {}", msg),
            ConvertError::EmptyTrack => write!(f, "No usable position data found in log"),
            ConvertError::Write { path, source } => {
                write!(f, "Cannot write {}: {}", path.display(), source)
            }
            ConvertError::ExternalTool(msg) => write!(f, "External converter failed: {}", msg),
            ConvertError::Read { path, source } => {
                write!(f, "Cannot read {}: {}", path.display(), source)
            }
            ConvertError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Write { source, .. } => Some(source),
            ConvertError::Read { source, .. } => Some(source),
            ConvertError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(err: std::io::Error) -> Self {
        ConvertError::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;
