mod poll;
mod poll_reply;
mod output;

use crate::{Error, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use self::poll_reply::{POLL_REPLY_LENGTH, POLL_REPLY_MIN_LENGTH};
pub use self::output::{Output, PaddedData};
pub use self::poll::Poll;
pub use self::poll_reply::PollReply;

/// One Art-Net frame, to be used over UDP port 6454.
///
/// This enum implements a `write_to_buffer` and `from_buffer` function, to be used with UDP connections.
/// OpCodes outside the three the client handles decode into [ArtCommand::Unknown] and round-trip
/// byte-exactly, so unsupported traffic can be observed or forwarded without being understood.
#[derive(Debug)]
pub enum ArtCommand {
    /// A poll command, used to discover devices on the network
    Poll(Poll),

    /// A reply to the poll command, it contains device status information
    PollReply(Box<PollReply>),

    /// An ArtDmx data packet. Used to send actual data to a node in the network
    Output(Output),

    /// Any other Art-Net frame. The payload is everything after the opcode, untouched.
    Unknown {
        /// The opcode that was not recognized
        opcode: u16,
        /// The remainder of the frame
        payload: Vec<u8>,
    },
}

/// The ArtNet header. This is the first 8 bytes of each message, and contains the text "Art-Net\0"
pub const ARTNET_HEADER: &[u8; 8] = b"Art-Net\0";

/// The protocol version, 14. Lower versions are tolerated on receive because
/// the protocol is guaranteed backwards-compatible.
pub const ARTNET_PROTOCOL_VERSION: [u8; 2] = [0, 14];

/// OpPoll
pub const OPCODE_POLL: u16 = 0x2000;
/// OpPollReply
pub const OPCODE_POLL_REPLY: u16 = 0x2100;
/// OpDmx
pub const OPCODE_DMX: u16 = 0x5000;

impl ArtCommand {
    /// Convert an ArtCommand in a byte buffer, which can be send to an UDP socket.
    pub fn write_to_buffer(&self) -> Result<Vec<u8>> {
        let mut result = Vec::new();
        let (opcode, data) = self.get_opcode()?;

        // Append Art-Net\0 header
        result.extend_from_slice(ARTNET_HEADER);
        // Append the opcode of this enum
        result
            .write_u16::<LittleEndian>(opcode)
            .map_err(Error::CursorEof)?;

        result.extend_from_slice(&data);

        Ok(result)
    }

    /// Convert a byte buffer to a command.
    pub fn from_buffer(buffer: &[u8]) -> Result<ArtCommand> {
        const MIN_BUFFER_LENGTH: usize = 10;

        if buffer.len() < MIN_BUFFER_LENGTH {
            return Err(Error::MessageTooShort {
                message: buffer.to_vec(),
                min_len: MIN_BUFFER_LENGTH,
            });
        }

        if !buffer.starts_with(ARTNET_HEADER) {
            return Err(Error::InvalidArtnetHeader(buffer.to_vec()));
        }

        let opcode = LittleEndian::read_u16(&buffer[8..10]);
        let remaining = &buffer[10..];

        ArtCommand::opcode_to_enum(opcode, remaining)
    }

    fn opcode_to_enum(code: u16, data: &[u8]) -> Result<ArtCommand> {
        Ok(match code {
            OPCODE_POLL => ArtCommand::Poll(
                Poll::from(data).map_err(|e| Error::OpcodeError("Poll", Box::new(e)))?,
            ),
            OPCODE_POLL_REPLY => {
                // Deployed gear regularly leaves off the trailing fields, so
                // anything carrying at least the MAC is zero-extended.
                let reply = if (POLL_REPLY_MIN_LENGTH..POLL_REPLY_LENGTH).contains(&data.len()) {
                    let mut padded = vec![0; POLL_REPLY_LENGTH];
                    padded[..data.len()].copy_from_slice(data);
                    PollReply::from(&padded)
                } else {
                    PollReply::from(data)
                };
                ArtCommand::PollReply(Box::new(
                    reply.map_err(|e| Error::OpcodeError("PollReply", Box::new(e)))?,
                ))
            }
            OPCODE_DMX => {
                let mut output =
                    Output::from(data).map_err(|e| Error::OpcodeError("Output", Box::new(e)))?;
                output
                    .apply_declared_length()
                    .map_err(|e| Error::OpcodeError("Output", Box::new(e)))?;
                ArtCommand::Output(output)
            }
            opcode => ArtCommand::Unknown {
                opcode,
                payload: data.to_vec(),
            },
        })
    }

    fn get_opcode(&self) -> Result<(u16, Vec<u8>)> {
        Ok(match self {
            ArtCommand::Poll(poll) => (OPCODE_POLL, poll.to_bytes()?),
            ArtCommand::PollReply(reply) => (OPCODE_POLL_REPLY, reply.to_bytes()?),
            ArtCommand::Output(output) => (OPCODE_DMX, output.to_bytes()?),
            ArtCommand::Unknown { opcode, payload } => (*opcode, payload.clone()),
        })
    }
}
