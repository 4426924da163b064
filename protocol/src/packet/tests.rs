#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{EnginePacket, SocketPacket, parse_engine_packet, parse_socket_packet};

    #[test]
    fn test_parse_open() {
        let frame = r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;
        let EnginePacket::Open(info) = parse_engine_packet(frame).unwrap() else {
            panic!("expected open packet");
        };

        assert_eq!(info.sid, "lv_VI97HAXpY6yYWAAAC");
        assert_eq!(info.ping_interval, 25000);
        assert_eq!(info.ping_timeout, 20000);
        assert_eq!(info.max_payload, Some(1_000_000));
    }

    #[test]
    fn test_parse_open_invalid() {
        assert!(parse_engine_packet("0").is_err());
        assert!(parse_engine_packet("0{not json").is_err());
    }

    #[test]
    fn test_parse_ping() {
        assert_eq!(parse_engine_packet("2").unwrap(), EnginePacket::Ping);
        assert_eq!(parse_engine_packet("2probe").unwrap(), EnginePacket::Ping);
        assert_eq!(EnginePacket::Pong.to_wire_format(), "3");
    }

    #[test]
    fn test_parse_connect_ack() {
        let packet = parse_engine_packet(r#"40{"sid":"wZX3oN0bSVIhsaknAAAI"}"#).unwrap();

        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Connect {
                namespace: "/".to_string(),
                data: Some(json!({"sid": "wZX3oN0bSVIhsaknAAAI"})),
            })
        );
    }

    #[test]
    fn test_parse_connect_error() {
        let packet = parse_socket_packet(r#"4{"message":"Unauthorized","data":{"code":"UNAUTHORIZED"}}"#).unwrap();

        let SocketPacket::ConnectError { namespace, data } = packet else {
            panic!("expected connect error");
        };
        assert_eq!(namespace, "/");
        assert_eq!(data.unwrap()["message"], "Unauthorized");
    }

    #[test]
    fn test_parse_event() {
        let packet =
            parse_engine_packet(r#"42["newMessage",{"roomId":"r1","message":"hi | there"}]"#).unwrap();

        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/".to_string(),
                name: "newMessage".to_string(),
                args: vec![json!({"roomId": "r1", "message": "hi | there"})],
            })
        );
    }

    #[test]
    fn test_parse_namespaced_event_with_ack_id() {
        let packet = parse_socket_packet(r#"2/rooms,12["roomUpdate",{"id":"r1"}]"#).unwrap();

        let SocketPacket::Event { namespace, name, args } = packet else {
            panic!("expected event");
        };
        assert_eq!(namespace, "/rooms");
        assert_eq!(name, "roomUpdate");
        assert_eq!(args, vec![json!({"id": "r1"})]);
    }

    #[test]
    fn test_parse_server_disconnect() {
        assert_eq!(
            parse_socket_packet("1/rooms,").unwrap(),
            SocketPacket::Disconnect {
                namespace: "/rooms".to_string()
            }
        );
        assert_eq!(
            parse_socket_packet("1").unwrap(),
            SocketPacket::Disconnect {
                namespace: "/".to_string()
            }
        );
    }

    #[test]
    fn test_parse_event_invalid() {
        assert!(parse_socket_packet("2").is_err());
        assert!(parse_socket_packet("2[]").is_err());
        assert!(parse_socket_packet("2[42]").is_err());
        assert!(parse_socket_packet(r#"2{"name":"x"}"#).is_err());
    }

    #[test]
    fn test_parse_unsupported() {
        assert!(parse_socket_packet(r#"3["ok"]"#).is_err());
        assert!(parse_socket_packet(r#"51-["upload",{"_placeholder":true,"num":0}]"#).is_err());
        assert!(parse_engine_packet("").is_err());
        assert!(parse_engine_packet("9").is_err());
    }

    #[test]
    fn test_encode_connect_with_auth() {
        let packet = SocketPacket::Connect {
            namespace: "/".to_string(),
            data: Some(json!({"token": "abc"})),
        };
        assert_eq!(
            EnginePacket::Message(packet).to_wire_format(),
            r#"40{"token":"abc"}"#
        );

        let packet = SocketPacket::Connect {
            namespace: "/rooms".to_string(),
            data: None,
        };
        assert_eq!(packet.to_wire_format(), "0/rooms,");
    }

    #[test]
    fn test_encode_event() {
        let packet = SocketPacket::event(
            "/",
            "joinRoom",
            Some(json!({"publicCode": "123456", "userId": "user-1"})),
        );
        let wire = EnginePacket::Message(packet.clone()).to_wire_format();

        assert!(wire.starts_with(r#"42["joinRoom","#));
        assert_eq!(parse_engine_packet(&wire).unwrap(), EnginePacket::Message(packet));
    }

    #[test]
    fn test_encode_event_without_payload() {
        let packet = SocketPacket::event("/", "getMyRooms", None);
        assert_eq!(packet.to_wire_format(), r#"2["getMyRooms"]"#);
    }
}
