//! Wire protocol: binary framing, message types, and the codec between them

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{decode, encode, Decodable, DecodedMessage, Encodable};
pub use frame::{Frame, FrameCodec, FrameType, FRAME_HEADER_SIZE, MAX_FRAME_SIZE};
pub use messages::*;
