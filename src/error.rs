use std::fmt;

#[derive(Debug)]
pub enum OverprintError {
    /// The template PDF is missing, encrypted, or unparseable. This is the
    /// one failure that aborts assembly; everything else degrades.
    Template(String),
    InvalidConfiguration(String),
    Payload(String),
    Io(std::io::Error),
}

impl fmt::Display for OverprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverprintError::Template(message) => write!(f, "template error: {}", message),
            OverprintError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            OverprintError::Payload(message) => write!(f, "payload error: {}", message),
            OverprintError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for OverprintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OverprintError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for OverprintError {
    fn from(value: std::io::Error) -> Self {
        OverprintError::Io(value)
    }
}
