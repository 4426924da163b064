use thiserror::Error;

pub mod events;
pub mod packet;
pub mod payload;

pub use events::{InboundEvent, OutboundEvent};
pub use packet::{EnginePacket, OpenInfo, SocketPacket, parse_engine_packet, parse_socket_packet};
pub use payload::{
    ChooseMoviePayload, ErrorCode, ErrorPayload, JoinRoomPayload, RoomRef, SendMessagePayload,
    TokenRefreshedPayload, is_auth_error_message, is_public_room_code, room_id_of,
};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid packet format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown packet type: {0}")]
    UnknownPacketType(char),

    #[error("Unsupported packet: {0}")]
    Unsupported(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Empty packet")]
    EmptyPacket,
}
