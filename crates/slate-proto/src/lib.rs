//! Wire protocol for the slate whiteboard broker.
//!
//! Every message exchanged between a client and the broker is a tagged enum
//! ([`ClientEvent`] inbound, [`ServerEvent`] outbound) serialized as CBOR and
//! length-prefixed on the wire. Payload shape is validated at decode time:
//! room codes are checked by the [`RoomCode`] newtype, drawing geometry by
//! [`DrawingOperation::validate`]. Anything that fails validation fails the
//! connection, not the process.
//!
//! We chose CBOR over alternatives because it's self-describing (field names
//! embedded), compact, and doesn't need code generation.

mod codec;
mod errors;
mod events;
mod op;
mod types;

pub use codec::{MAX_EVENT_SIZE, PREFIX_LEN, decode, encode, frame_len};
pub use errors::{ProtocolError, Result};
pub use events::{ClientEvent, ServerEvent};
pub use op::{DrawingOperation, OpKind, UpsertKey};
pub use types::{MembershipStatus, Point, RoomCode, RoomMember, RoomSnapshot, UserId};

/// ALPN protocol identifier negotiated during the TLS handshake.
pub const ALPN_PROTOCOL: &[u8] = b"slate/1";
