#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::DecodeError;
    use crate::packet::{Packet, PacketType};
    use crate::parser::{decode_text, encode, Parser};
    use crate::transport::Frame;
    use crate::value::Value;

    fn text(frame: &Frame) -> &str {
        match frame {
            Frame::Text(text) => text,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_connect_with_auth() {
        let packet = decode_text(r#"0{"token":"abc"}"#).unwrap();

        assert_eq!(packet.kind, PacketType::Connect);
        assert_eq!(packet.namespace, "/");
        assert_eq!(packet.ack_id, None);
        assert_eq!(
            packet.data.unwrap().get("token").and_then(Value::as_str),
            Some("abc")
        );
    }

    #[test]
    fn test_decode_namespace_and_ack_id() {
        let packet = decode_text(r#"2/chat,42["msg","hi"]"#).unwrap();

        assert_eq!(packet.kind, PacketType::Event);
        assert_eq!(packet.namespace, "/chat");
        assert_eq!(packet.ack_id, Some(42));
        assert_eq!(packet.event_name(), Some("msg"));
        assert_eq!(packet.event_args(), &[Value::from("hi")]);
    }

    #[test]
    fn test_decode_namespace_without_trailing_comma() {
        let packet = decode_text("1/admin").unwrap();

        assert_eq!(packet.kind, PacketType::Disconnect);
        assert_eq!(packet.namespace, "/admin");
        assert!(packet.data.is_none());
    }

    #[test]
    fn test_decode_multi_digit_ack_id() {
        let packet = decode_text(r#"31234567[true]"#).unwrap();

        assert_eq!(packet.kind, PacketType::Ack);
        assert_eq!(packet.ack_id, Some(1_234_567));
        assert_eq!(packet.data, Some(Value::Array(vec![Value::Bool(true)])));
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(decode_text(""), Err(DecodeError::EmptyFrame)));
        assert!(matches!(decode_text("9[]"), Err(DecodeError::InvalidType('9'))));
        assert!(matches!(
            decode_text(r#"51["x"]"#),
            Err(DecodeError::UnterminatedAttachments)
        ));
        assert!(matches!(
            decode_text(r#"5x-["x"]"#),
            Err(DecodeError::InvalidAttachments(_))
        ));
        assert!(matches!(decode_text("2[oops"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode_text("399999999999999999999999[]"),
            Err(DecodeError::InvalidAckId(_))
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_payload_shapes() {
        assert!(matches!(
            decode_text(r#"2{"not":"an array"}"#),
            Err(DecodeError::InvalidPayload(PacketType::Event))
        ));
        assert!(matches!(
            decode_text("2[1,2]"),
            Err(DecodeError::InvalidPayload(PacketType::Event))
        ));
        assert!(matches!(
            decode_text(r#"0"nope""#),
            Err(DecodeError::InvalidPayload(PacketType::Connect))
        ));
        assert!(matches!(
            decode_text("1[]"),
            Err(DecodeError::InvalidPayload(PacketType::Disconnect))
        ));
        assert!(matches!(
            decode_text("3"),
            Err(DecodeError::InvalidPayload(PacketType::Ack))
        ));
    }

    #[test]
    fn test_encode_event_on_main_namespace() {
        let packet = Packet::event("/", "ping", vec![Value::from(1)]);
        let frames = encode(&packet).unwrap();

        assert_eq!(frames, vec![Frame::Text(r#"2["ping",1]"#.into())]);
    }

    #[test]
    fn test_encode_ack_with_namespace() {
        let packet = Packet::ack("/chat", 7, vec![Value::from(5)]);
        let frames = encode(&packet).unwrap();

        assert_eq!(frames, vec![Frame::Text("3/chat,7[5]".into())]);
    }

    #[test]
    fn test_encode_promotes_binary_event() {
        let packet = Packet::event(
            "/",
            "upload",
            vec![Value::from("a.bin"), Value::binary(vec![1, 2, 3])],
        );
        let frames = encode(&packet).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(
            text(&frames[0]),
            r#"51-["upload","a.bin",{"_placeholder":true,"num":0}]"#
        );
        assert_eq!(frames[1], Frame::Binary(vec![1, 2, 3]));
    }

    #[test]
    fn test_encode_extracts_nested_binaries_depth_first() {
        let data = Value::object([
            ("a", Value::binary(vec![0])),
            (
                "b",
                Value::Array(vec![Value::binary(vec![1]), Value::binary(vec![2])]),
            ),
        ]);
        let packet = Packet::ack("/", 3, vec![data]);
        let frames = encode(&packet).unwrap();

        assert_eq!(
            text(&frames[0]),
            concat!(
                r#"63-3[{"a":{"_placeholder":true,"num":0},"#,
                r#""b":[{"_placeholder":true,"num":1},{"_placeholder":true,"num":2}]}]"#
            )
        );
        assert_eq!(
            &frames[1..],
            &[
                Frame::Binary(vec![0]),
                Frame::Binary(vec![1]),
                Frame::Binary(vec![2])
            ]
        );
    }

    #[test]
    fn test_binary_event_waits_for_all_attachments() {
        let mut parser = Parser::default();
        let header = r#"52-/files,9["save",{"_placeholder":true,"num":1},{"_placeholder":true,"num":0}]"#;

        assert!(parser.decode(Frame::Text(header.into())).unwrap().is_none());
        assert_eq!(parser.missing_attachments(), 2);
        assert!(parser.decode(Frame::Binary(vec![0xaa])).unwrap().is_none());
        assert_eq!(parser.missing_attachments(), 1);

        let packet = parser
            .decode(Frame::Binary(vec![0xbb]))
            .unwrap()
            .expect("packet complete after the last attachment");

        assert_eq!(packet.kind, PacketType::BinaryEvent);
        assert_eq!(packet.namespace, "/files");
        assert_eq!(packet.ack_id, Some(9));
        assert_eq!(
            packet.event_args(),
            &[Value::binary(vec![0xbb]), Value::binary(vec![0xaa])]
        );
        assert_eq!(parser.missing_attachments(), 0);
    }

    #[test]
    fn test_round_trip_through_encoder_and_parser() {
        let packets = [
            Packet::connect("/", "abc"),
            Packet::disconnect("/chat"),
            Packet::connect_error("/nope", "Invalid namespace"),
            Packet::event("/chat", "msg", vec![Value::from("hi"), Value::from(2.5)]).with_ack_id(12),
            Packet::ack("/", 4, vec![Value::Null, Value::from(json!({"ok": true}))]),
        ];

        for packet in packets {
            let mut parser = Parser::default();
            let mut decoded = None;
            for frame in encode(&packet).unwrap() {
                decoded = parser.decode(frame).unwrap();
            }
            assert_eq!(decoded.as_ref(), Some(&packet));
        }
    }

    #[test]
    fn test_round_trip_with_attachments() {
        let packet = Packet::event(
            "/",
            "upload",
            vec![Value::object([("data", Value::binary(vec![9, 8, 7]))])],
        );
        let mut parser = Parser::default();
        let mut decoded = None;
        for frame in encode(&packet).unwrap() {
            decoded = parser.decode(frame).unwrap();
        }

        let decoded = decoded.unwrap();
        assert_eq!(decoded.kind, PacketType::BinaryEvent);
        assert_eq!(decoded.attachments, 1);
        assert_eq!(decoded.data, packet.data);
    }

    #[test]
    fn test_unexpected_frames_are_errors() {
        let mut parser = Parser::default();
        assert!(matches!(
            parser.decode(Frame::Binary(vec![1])),
            Err(DecodeError::UnexpectedBinary)
        ));

        let header = r#"51-["x",{"_placeholder":true,"num":0}]"#;
        parser.decode(Frame::Text(header.into())).unwrap();
        assert!(matches!(
            parser.decode(Frame::Text(r#"2["y"]"#.into())),
            Err(DecodeError::UnexpectedText { missing: 1 })
        ));
    }

    #[test]
    fn test_placeholder_errors() {
        let cases = [
            (
                r#"51-["x",{"_placeholder":true,"num":3}]"#,
                "bad",
            ),
            (
                r#"51-["x",{"_placeholder":true}]"#,
                "malformed",
            ),
            (
                r#"52-["x",{"_placeholder":true,"num":0},{"_placeholder":true,"num":0}]"#,
                "duplicate",
            ),
            (r#"51-["x"]"#, "unused"),
        ];

        for (header, case) in cases {
            let mut parser = Parser::default();
            let declared = if header.starts_with("52") { 2 } else { 1 };
            assert!(parser.decode(Frame::Text(header.into())).unwrap().is_none());
            let mut result = Ok(None);
            for _ in 0..declared {
                result = parser.decode(Frame::Binary(vec![0]));
            }
            let err = result.expect_err(case);
            let ok = match case {
                "bad" => matches!(err, DecodeError::BadPlaceholder { num: 3, count: 1 }),
                "malformed" => matches!(err, DecodeError::MalformedPlaceholder),
                "duplicate" => matches!(err, DecodeError::DuplicatePlaceholder(0)),
                _ => matches!(err, DecodeError::UnusedAttachment(0)),
            };
            assert!(ok, "{case}: {err:?}");
        }
    }

    #[test]
    fn test_attachment_limit() {
        let mut parser = Parser::new(2);
        assert!(matches!(
            parser.decode(Frame::Text(r#"53-["x"]"#.into())),
            Err(DecodeError::TooManyAttachments { declared: 3, max: 2 })
        ));
    }
}
