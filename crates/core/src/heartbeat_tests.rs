// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn ready_heartbeat_shape() {
    let hb = HeartbeatEvent::ready(
        &DeploymentId::new("d1"),
        ResourceSpec { gpu: 2, vcpu: 8, ram_gb: 32 },
        Some("https://svc".into()),
    );
    let json = serde_json::to_value(&hb).unwrap();
    assert_eq!(json["provider"], "nosana");
    assert_eq!(json["provider_instance_id"], "d1");
    assert_eq!(json["state"], "ready");
    assert_eq!(json["health_score"], 100);
    assert_eq!(json["gpu_allocated"], 2);
    assert_eq!(json["expose_url"], "https://svc");
    assert!(json.get("old_provider_instance_id").is_none());
}

#[test]
fn terminated_heartbeat_zeroes_resources() {
    let hb = HeartbeatEvent::terminated(&DeploymentId::new("d1"));
    let json = serde_json::to_value(&hb).unwrap();
    assert_eq!(json["state"], "terminated");
    assert_eq!(json["gpu_allocated"], 0);
    assert_eq!(json["vcpu_allocated"], 0);
    assert_eq!(json["ram_gb_allocated"], 0);
}

#[test]
fn provisioning_links_predecessor() {
    let hb = HeartbeatEvent::provisioning(
        &DeploymentId::new("d2"),
        ResourceSpec::default(),
        &DeploymentId::new("d1"),
    );
    let json = serde_json::to_value(&hb).unwrap();
    assert_eq!(json["state"], "provisioning");
    assert_eq!(json["health_score"], 50);
    assert_eq!(json["old_provider_instance_id"], "d1");
}
