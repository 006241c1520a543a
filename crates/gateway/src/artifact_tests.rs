// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn digest_round_trips_through_cid() {
    let digest = [0xabu8; 32];
    let cid = digest_to_cid(&digest);
    assert!(cid.starts_with("Qm"), "sha2-256 CIDv0 should start with Qm, got {cid}");
    assert_eq!(cid_to_digest(&cid).unwrap(), digest);
}

#[test]
fn rejects_wrong_prefix_and_length() {
    // Valid base58, wrong payload size.
    let short = bs58::encode([1u8; 10]).into_string();
    assert!(matches!(cid_to_digest(&short), Err(GatewayError::Decode(_))));

    // 34 bytes but not a sha2-256 multihash.
    let mut bytes = vec![0x11, 0x20];
    bytes.extend_from_slice(&[2u8; 32]);
    let wrong_prefix = bs58::encode(bytes).into_string();
    assert!(matches!(cid_to_digest(&wrong_prefix), Err(GatewayError::Decode(_))));

    assert!(matches!(cid_to_digest("0OIl"), Err(GatewayError::Decode(_))));
}

proptest! {
    #[test]
    fn any_digest_round_trips(digest in proptest::array::uniform32(any::<u8>())) {
        let cid = digest_to_cid(&digest);
        prop_assert_eq!(cid_to_digest(&cid).unwrap(), digest);
    }
}
