// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ed25519_dalek::Verifier;
use yare::parameterized;

fn job_account_bytes(state: u8, node: Option<[u8; 32]>, result: Option<[u8; 32]>) -> Vec<u8> {
    let mut bytes = vec![0u8; JOB_ACCOUNT_LEN];
    bytes[OFFSET_STATE] = state;
    if let Some(node) = node {
        bytes[OFFSET_NODE..OFFSET_NODE + 32].copy_from_slice(&node);
    }
    if let Some(result) = result {
        bytes[OFFSET_RESULT..OFFSET_RESULT + 32].copy_from_slice(&result);
    }
    bytes
}

#[parameterized(
    queued = { 0, JobState::Queued },
    running = { 1, JobState::Running },
    completed = { 2, JobState::Completed },
    stopped = { 3, JobState::Stopped },
    cancelled = { 4, JobState::Cancelled },
)]
fn parses_state_byte(byte: u8, expected: JobState) {
    let account = parse_job_account(&job_account_bytes(byte, None, None)).unwrap();
    assert_eq!(account.state, expected);
}

#[test]
fn rejects_short_or_unknown_accounts() {
    assert!(matches!(parse_job_account(&[0u8; 10]), Err(GatewayError::Decode(_))));
    assert!(matches!(
        parse_job_account(&job_account_bytes(9, None, None)),
        Err(GatewayError::Decode(_))
    ));
}

#[test]
fn zeroed_fields_read_as_unset() {
    let account = parse_job_account(&job_account_bytes(1, None, None)).unwrap();
    assert_eq!(account.node, None);
    assert_eq!(account.result, None);

    let with_node = parse_job_account(&job_account_bytes(1, Some([5u8; 32]), Some([6u8; 32])))
        .unwrap();
    assert_eq!(with_node.node, Some([5u8; 32]));
    assert_eq!(with_node.result, Some([6u8; 32]));
}

#[parameterized(
    queued_is_starting = { JobState::Queued, DeploymentStatus::Starting },
    running_is_running = { JobState::Running, DeploymentStatus::Running },
    completed_is_stopped = { JobState::Completed, DeploymentStatus::Stopped },
    cancelled_is_stopped = { JobState::Cancelled, DeploymentStatus::Stopped },
)]
fn maps_job_state_to_deployment_status(state: JobState, expected: DeploymentStatus) {
    assert_eq!(deployment_status_for(state), expected);
}

#[parameterized(
    zero = { 0, &[0x00] },
    one = { 1, &[0x01] },
    max_one_byte = { 0x7f, &[0x7f] },
    two_bytes = { 0x80, &[0x80, 0x01] },
    larger = { 0x3fff, &[0xff, 0x7f] },
    three_bytes = { 0x4000, &[0x80, 0x80, 0x01] },
)]
fn compact_len_encoding(n: u16, expected: &[u8]) {
    assert_eq!(compact_len(n), expected);
}

#[test]
fn legacy_tx_layout_and_signatures() {
    let payer = SigningKey::from_bytes(&[1u8; 32]);
    let job = SigningKey::from_bytes(&[2u8; 32]);
    let keys = vec![
        job.verifying_key().to_bytes(),
        payer.verifying_key().to_bytes(),
        [3u8; 32], // market
        [4u8; 32], // program
    ];
    let data = vec![IX_POST, 0, 0, 0, 0];
    let encoded = encode_legacy_tx(TxParts {
        keys: &keys,
        num_signers: 2,
        num_readonly_unsigned: 1,
        blockhash: [9u8; 32],
        program_index: 3,
        account_indices: &[0, 1, 2],
        data: &data,
        signers: &[&job, &payer],
    })
    .unwrap();

    use base64::Engine as _;
    let tx = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();

    // 2 signatures, compact-length-prefixed.
    assert_eq!(tx[0], 2);
    let sig_end = 1 + 2 * 64;
    let message = &tx[sig_end..];

    // Header: 2 signers, 0 readonly signed, 1 readonly unsigned.
    assert_eq!(&message[..3], &[2, 0, 1]);
    // Key table: 4 keys, the job account first.
    assert_eq!(message[3], 4);
    assert_eq!(&message[4..36], job.verifying_key().as_bytes());

    // Both signatures verify over the serialized message.
    let sig1 = ed25519_dalek::Signature::from_bytes(tx[1..65].try_into().unwrap());
    job.verifying_key().verify(message, &sig1).unwrap();
    let sig2 = ed25519_dalek::Signature::from_bytes(tx[65..129].try_into().unwrap());
    payer.verifying_key().verify(message, &sig2).unwrap();
}

#[test]
fn tx_encoding_rejects_signer_mismatch() {
    let payer = SigningKey::from_bytes(&[1u8; 32]);
    let result = encode_legacy_tx(TxParts {
        keys: &[payer.verifying_key().to_bytes()],
        num_signers: 2,
        num_readonly_unsigned: 0,
        blockhash: [0u8; 32],
        program_index: 0,
        account_indices: &[0],
        data: &[],
        signers: &[&payer],
    });
    assert!(matches!(result, Err(GatewayError::Decode(_))));
}

#[test]
fn token_amount_extraction() {
    let entry = serde_json::json!({
        "account": { "data": { "parsed": { "info": { "tokenAmount": { "uiAmount": 12.5 } } } } }
    });
    assert_eq!(parsed_token_amount(&entry), 12.5);
    assert_eq!(parsed_token_amount(&serde_json::json!({})), 0.0);
}
