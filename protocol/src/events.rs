use std::fmt;
use std::str::FromStr;

use crate::ParseError;

/// Events the client emits to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboundEvent {
    CreateRoom,
    JoinRoom,
    LeaveRoom,
    ChooseMovie,
    GetRoom,
    GetMyRooms,
    SendMessage,
}

impl OutboundEvent {
    pub const ALL: [OutboundEvent; 7] = [
        Self::CreateRoom,
        Self::JoinRoom,
        Self::LeaveRoom,
        Self::ChooseMovie,
        Self::GetRoom,
        Self::GetMyRooms,
        Self::SendMessage,
    ];

    /// Wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRoom => "createRoom",
            Self::JoinRoom => "joinRoom",
            Self::LeaveRoom => "leaveRoom",
            Self::ChooseMovie => "chooseMovie",
            Self::GetRoom => "getRoom",
            Self::GetMyRooms => "getMyRooms",
            Self::SendMessage => "sendMessage",
        }
    }
}

impl fmt::Display for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboundEvent {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ParseError::UnknownEvent(s.to_string()))
    }
}

/// Events delivered to the client, either by the transport itself
/// (`connect`, `disconnect`, `connect_error`) or pushed by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEvent {
    Connect,
    Disconnect,
    ConnectError,
    Error,
    TokenRefreshed,
    RoomCreated,
    JoinedRoom,
    LeftRoom,
    RoomUpdate,
    RoomData,
    MyRooms,
    ChatHistory,
    NewMessage,
}

impl InboundEvent {
    pub const ALL: [InboundEvent; 13] = [
        Self::Connect,
        Self::Disconnect,
        Self::ConnectError,
        Self::Error,
        Self::TokenRefreshed,
        Self::RoomCreated,
        Self::JoinedRoom,
        Self::LeftRoom,
        Self::RoomUpdate,
        Self::RoomData,
        Self::MyRooms,
        Self::ChatHistory,
        Self::NewMessage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::ConnectError => "connect_error",
            Self::Error => "error",
            Self::TokenRefreshed => "tokenRefreshed",
            Self::RoomCreated => "roomCreated",
            Self::JoinedRoom => "joinedRoom",
            Self::LeftRoom => "leftRoom",
            Self::RoomUpdate => "roomUpdate",
            Self::RoomData => "roomData",
            Self::MyRooms => "myRooms",
            Self::ChatHistory => "chatHistory",
            Self::NewMessage => "newMessage",
        }
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboundEvent {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ParseError::UnknownEvent(s.to_string()))
    }
}
