use std::io;
use std::net;

/// Maximum size of a single packet exchanged over the worker/master channel.
pub const MSG_MAX: usize = 4096;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Eq, PartialEq)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq)]
pub enum ErrorType {
    /// Packet would exceed `MSG_MAX` and is not a splittable `BCASTMSG`.
    PayloadTooLarge,
    /// Packet was shorter than the minimum framing width; treated as a disconnect.
    EmptyPayload,
    Serialization,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}
