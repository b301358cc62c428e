use std::num::ParseIntError;

#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    // Errors from external libraries
    Io(std::io::Error),
    Json(serde_json::Error),
    ParseInt(ParseIntError),
    ParseTime(time::error::Parse),

    // Errors from the chatharvest library
    ChannelUnavailable(String),
    NothingCaptured(String),
    Simple(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(ref err) => err.fmt(f),
            Error::Json(ref err) => err.fmt(f),
            Error::ParseInt(ref err) => err.fmt(f),
            Error::ParseTime(ref err) => err.fmt(f),

            Error::ChannelUnavailable(message) => write!(f, "debug channel unavailable: {message}"),
            Error::NothingCaptured(message) => write!(f, "nothing captured: {message}"),

            Error::Simple(ref err) => write!(f, "error occurred: {err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl From<ParseIntError> for Error {
    fn from(err: ParseIntError) -> Error {
        Error::ParseInt(err)
    }
}

impl From<time::error::Parse> for Error {
    fn from(err: time::error::Parse) -> Error {
        Error::ParseTime(err)
    }
}
