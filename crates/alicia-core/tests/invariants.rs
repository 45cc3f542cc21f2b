//! Property tests for the envelope routing/correlation invariants that
//! every component built on top of `Envelope`/`Routing` depends on.

use alicia_core::{Destination, Envelope, MessageType, Payload, Routing};
use proptest::prelude::*;

proptest! {
    /// For every request, a response built via `Envelope::response_to`
    /// carries a `correlation_id` equal to the request's `message_id`.
    #[test]
    fn response_correlation_id_always_matches_request_message_id(source in "[a-z]{1,12}", body in any::<u8>()) {
        let request = Envelope::new(
            source.clone(),
            Destination::Broadcast,
            MessageType::Request,
            Payload::json(serde_json::json!({ "n": body })),
        );
        let response = Envelope::response_to(&request, source, Payload::json(serde_json::json!(null)));
        prop_assert_eq!(response.correlation_id, request.message_id);
    }

    /// `hops` strictly increases along any routed chain, and once it
    /// reaches `max_hops` the routing is reported as a loop and stays one
    /// on any further advance.
    #[test]
    fn hops_strictly_increase_and_loop_is_detected_at_max_hops(max_hops in 1u32..32, advances in 0usize..40) {
        let mut routing = Routing { hops: 0, max_hops, route: Vec::new() };
        let mut last_hops = routing.hops;
        let mut ever_looped = false;

        for i in 0..advances {
            if routing.is_loop() {
                ever_looped = true;
                break;
            }
            routing = routing.advance(format!("hop{i}"));
            prop_assert!(routing.hops > last_hops);
            last_hops = routing.hops;
        }

        if advances as u32 >= max_hops {
            prop_assert!(ever_looped || routing.hops >= max_hops);
        }
    }
}
