use crate::PortAddress;
use std::ops::Range;

/// The result that this crate uses
pub type Result<T> = std::result::Result<T, Error>;

/// All the possible errors this crate can encounter
#[derive(Debug)]
pub enum Error {
    /// Could not read or write to the inner cursor
    CursorEof(std::io::Error),

    /// Could not serialize an artnet command
    SerializeError(&'static str, Box<Error>),

    /// Could not deserialize an artnet command
    DeserializeError(&'static str, Box<Error>),

    /// The given message was not long enough
    MessageTooShort {
        /// The offending datagram
        message: Vec<u8>,
        /// The minimum length the frame needed to be
        min_len: usize,
    },

    /// The message was outside of the valid size range
    MessageSizeInvalid {
        /// The offending payload
        message: Vec<u8>,
        /// The size range the payload must fall in
        allowed_size: Range<usize>,
    },

    /// The artnet header is invalid
    InvalidArtnetHeader(Vec<u8>),

    /// Could not parse the given opcode
    OpcodeError(&'static str, Box<Error>),

    /// Unknown opcode ID, only reported when running in strict mode
    UnknownOpcode(u16),

    /// A port address string or packed value was out of range
    InvalidPortAddress(String),

    /// Could not bind the UDP socket on port 6454
    BindFailed(std::io::Error),

    /// Both an interface name and manual unicast/broadcast addresses were
    /// supplied, or only one half of the manual address pair was given
    ConflictingIpConfig,

    /// The requested interface does not exist or carries no IPv4 address
    UnknownInterface(String),

    /// No interface matched the configured ranking
    NoUsableInterface,

    /// `set_dmx`/`get_dmx` was called for an address that was never adopted
    /// through `set_port_config`
    UniverseNotConfigured(PortAddress),
}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CursorEof(inner) => write!(fmt, "Cursor EOF: {}", inner),
            Error::SerializeError(message, inner) => write!(fmt, "{}: {}", message, inner),
            Error::DeserializeError(message, inner) => write!(fmt, "{}: {}", message, inner),
            Error::MessageTooShort { min_len, .. } => {
                write!(fmt, "Message too short, need at least {} bytes", min_len)
            }
            Error::MessageSizeInvalid { allowed_size, .. } => write!(
                fmt,
                "Message size invalid, must be between {} and {} bytes",
                allowed_size.start, allowed_size.end
            ),
            Error::InvalidArtnetHeader(_) => write!(fmt, "Invalid artnet header"),
            Error::OpcodeError(opcode, inner) => {
                write!(fmt, "Could not parse opcode {:?}: {}", opcode, inner)
            }
            Error::UnknownOpcode(opcode) => write!(fmt, "Unknown opcode 0x{:X}", opcode),
            Error::InvalidPortAddress(message) => {
                write!(fmt, "Invalid port address: {}", message)
            }
            Error::BindFailed(inner) => write!(fmt, "Could not bind UDP socket: {}", inner),
            Error::ConflictingIpConfig => write!(
                fmt,
                "Conflicting interface and unicast/broadcast configuration"
            ),
            Error::UnknownInterface(name) => write!(fmt, "Unknown interface {:?}", name),
            Error::NoUsableInterface => write!(fmt, "No usable IPv4 interface found"),
            Error::UniverseNotConfigured(address) => {
                write!(fmt, "Universe {} is not configured locally", address)
            }
        }
    }
}

impl std::error::Error for Error {}
