fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use medlink_protocol::{ClientAction, Discriminator, Frame, FrameError};

    /// Returns the path to a fixtures subdirectory.
    fn fixtures_dir(kind: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("fixtures")
            .join(kind)
    }

    fn read_fixture(kind: &str, name: &str) -> String {
        let path = fixtures_dir(kind).join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Every fixture file in `kind`, sorted by name.
    fn fixtures(kind: &str) -> Vec<(String, String)> {
        let mut names: Vec<String> = fs::read_dir(fixtures_dir(kind))
            .unwrap_or_else(|e| panic!("missing fixtures/{kind}: {e}"))
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert!(!names.is_empty(), "fixtures/{kind} is empty");
        names
            .into_iter()
            .map(|name| {
                let body = read_fixture(kind, &name);
                (name, body)
            })
            .collect()
    }

    /// Parses a fixture as a frame, re-serializes it, and compares the JSON
    /// values.
    fn roundtrip_frame(name: &str, text: &str) -> Frame {
        let frame = Frame::parse(text).unwrap_or_else(|e| panic!("failed to parse {name}: {e}"));
        let original: serde_json::Value = serde_json::from_str(text).unwrap();
        let reserialized: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(original, reserialized, "roundtrip mismatch for {name}");
        assert_eq!(serde_json::to_value(&frame).unwrap(), original);
        frame
    }

    #[test]
    fn server_events_parse_with_type_discriminator() {
        for (name, text) in fixtures("events") {
            let frame = roundtrip_frame(&name, &text);
            assert!(
                matches!(frame.discriminator(), Discriminator::Type(_)),
                "{name} should be a server event"
            );
            assert_eq!(format!("{}.json", frame.kind()), name);
        }
    }

    #[test]
    fn client_actions_parse_with_action_discriminator() {
        for (name, text) in fixtures("actions") {
            let frame = roundtrip_frame(&name, &text);
            assert!(
                matches!(frame.discriminator(), Discriminator::Action(_)),
                "{name} should be a client action"
            );
            let action: ClientAction = frame
                .parse_as()
                .unwrap_or_else(|e| panic!("{name} is not a known client action: {e}"));
            let typed = serde_json::to_value(&action).unwrap();
            let original: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(typed, original, "typed roundtrip mismatch for {name}");
        }
    }

    #[test]
    fn ping_fixture_matches_heartbeat_frame() {
        let fixture: serde_json::Value =
            serde_json::from_str(&read_fixture("actions", "ping.json")).unwrap();
        let heartbeat: serde_json::Value =
            serde_json::from_str(&ClientAction::ping_json()).unwrap();
        assert_eq!(fixture, heartbeat);
    }

    #[test]
    fn send_message_fixture_fields() {
        let frame = Frame::parse(&read_fixture("actions", "send_message.json")).unwrap();
        assert_eq!(
            frame.parse_as::<ClientAction>().unwrap(),
            ClientAction::SendMessage {
                conversation_id: 12,
                body: "On my way".into(),
            }
        );
    }

    #[test]
    fn new_message_nested_payload_is_preserved() {
        let frame = Frame::parse(&read_fixture("events", "new_message.json")).unwrap();
        let sender = &frame.get("message").unwrap()["sender"];
        assert_eq!(sender["name"], "Dr. Okafor");
        assert_eq!(frame.get("conversation_id").unwrap(), 12);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        for (name, text) in fixtures("malformed") {
            let err = Frame::parse(&text).expect_err(&format!("{name} should not parse"));
            let expected_kind = match name.as_str() {
                "not_json.txt" => matches!(err, FrameError::Malformed(_)),
                "array.txt" => matches!(err, FrameError::NotAnObject),
                _ => matches!(err, FrameError::MissingDiscriminator),
            };
            assert!(expected_kind, "{name}: unexpected error {err:?}");
        }
    }
}
