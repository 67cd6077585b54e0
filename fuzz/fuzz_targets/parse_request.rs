#![no_main]

use ember_core::api::{CommentRequest, ViewRequest, VoteRequest};
use ember_core::model::{ItemId, VoteDirection};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(req) = serde_json::from_slice::<VoteRequest>(data) {
        if let Ok(id) = ItemId::parse(&req.item_id) {
            assert!(id.as_str().starts_with("it-"));
            assert_eq!(ItemId::parse(id.as_str()).ok(), Some(id));
        }
        if let Ok(direction) = req.direction.parse::<VoteDirection>() {
            assert_eq!(direction.as_str().parse::<VoteDirection>().ok(), Some(direction));
        }
    }
    let _ = serde_json::from_slice::<ViewRequest>(data);
    let _ = serde_json::from_slice::<CommentRequest>(data);
});
