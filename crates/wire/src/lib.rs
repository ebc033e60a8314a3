// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! netorch-wire: transport-agnostic DTOs for the external API (spec §6)
//! and the length-prefixed JSON framing an HTTP/WebSocket adapter would
//! use to carry them. The socket adapter itself is out of scope.

mod request;
mod response;
mod types;
mod wire;

pub use netorch_core::ProgressEvent;
pub use request::Request;
pub use response::{ErrorKind, Response};
pub use types::{FileEntry, FileKind, SubscriptionSnapshot};
pub use wire::{decode, encode, read_message, read_request, write_message, write_response, ProtocolError};

#[cfg(test)]
mod request_tests {
    use super::*;
    use netorch_core::{ConnectionMode, DeviceId};

    #[test]
    fn jobs_create_round_trips_through_json() {
        let req = Request::JobsCreate {
            device_ids: vec![DeviceId::new()],
            commands: vec!["show ospf neighbor".to_string()],
            batch_size: 5,
            devices_per_hour: 100,
            connection_mode: ConnectionMode::Parallel,
        };
        let encoded = encode(&req).expect("encode failed");
        let decoded: Request = decode(&encoded).expect("decode failed");
        assert_eq!(req, decoded);
    }

    #[test]
    fn jobs_latest_has_no_payload() {
        let encoded = encode(&Request::JobsLatest).expect("encode failed");
        let json_str = std::str::from_utf8(&encoded).unwrap();
        assert!(json_str.contains("\"JobsLatest\""));
    }
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[test]
    fn error_response_round_trips() {
        let resp = Response::Error { kind: ErrorKind::JumphostProbe, message: "probe timed out".to_string() };
        let encoded = encode(&resp).expect("encode failed");
        let decoded: Response = decode(&encoded).expect("decode failed");
        match decoded {
            Response::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::JumphostProbe);
                assert_eq!(message, "probe timed out");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn job_not_found_serializes_as_none() {
        let resp = Response::Job { job: None };
        let encoded = encode(&resp).expect("encode failed");
        let json_str = std::str::from_utf8(&encoded).unwrap();
        assert!(json_str.contains("\"job\":null"));
    }
}
