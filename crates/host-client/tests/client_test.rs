//! HTTP client tests against a local mock server

use host_client::{
    HostControlClient, HostControlTrait, HostError, RebootMode, WipeDescriptor, WipeMethod,
    WipeRequest,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MACHINE_ID: &str = "4c4c4544-0039-4410-8030-b4c04f4d4e31";

#[tokio::test]
async fn test_system_information() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/system/information"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uuid": MACHINE_ID,
            "manufacturer": "Dell Inc.",
            "productName": "PowerEdge R640",
            "serialNumber": "9D0BM42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HostControlClient::new(server.uri()).unwrap();
    let info = client.system_information().await.unwrap();

    assert_eq!(info.uuid.to_string(), MACHINE_ID);
    assert_eq!(info.product_name, "PowerEdge R640");
}

#[tokio::test]
async fn test_requests_carry_machine_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/reboot"))
        .and(header("machine-id", MACHINE_ID))
        .and(body_json(json!({"mode": "POWER_CYCLE"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HostControlClient::new(server.uri())
        .unwrap()
        .with_machine_id(MACHINE_ID)
        .unwrap();

    client.reboot(RebootMode::PowerCycle).await.unwrap();
}

#[tokio::test]
async fn test_list_disks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/block/disks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "disks": [
                {"id": "sda", "size": 480103981056u64, "model": "SSDSC2KB480G8", "transport": "sata"},
                {"id": "sr0", "size": 1073741312u64, "cdrom": true}
            ]
        })))
        .mount(&server)
        .await;

    let client = HostControlClient::new(server.uri()).unwrap();
    let disks = client.list_disks().await.unwrap();

    assert_eq!(disks.len(), 2);
    assert!(disks[0].is_wipeable());
    assert!(!disks[1].is_wipeable());
}

#[tokio::test]
async fn test_wipe_sends_batched_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/block/wipe"))
        .and(body_json(json!({
            "devices": [
                {"device": "sda", "method": "FAST", "skipVolumeCheck": true},
                {"device": "nvme0n1", "method": "FAST", "skipVolumeCheck": true}
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HostControlClient::new(server.uri()).unwrap();
    let request = WipeRequest {
        devices: ["sda", "nvme0n1"]
            .into_iter()
            .map(|device| WipeDescriptor {
                device: device.to_string(),
                method: WipeMethod::Fast,
                skip_volume_check: true,
            })
            .collect(),
    };

    client.wipe_block_devices(&request).await.unwrap();
}

#[tokio::test]
async fn test_error_status_keeps_downstream_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/reboot"))
        .respond_with(ResponseTemplate::new(409).set_body_string("reboot already in progress\n"))
        .mount(&server)
        .await;

    let client = HostControlClient::new(server.uri()).unwrap();
    let err = client.reboot(RebootMode::Default).await.unwrap_err();

    match err {
        HostError::Api {
            status, message, ..
        } => {
            assert_eq!(status, 409);
            assert_eq!(message, "reboot already in progress");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_control_plane_is_unavailable() {
    // Nothing listens on the discard port
    let client = HostControlClient::new("http://127.0.0.1:9").unwrap();
    let err = client.version().await.unwrap_err();
    assert!(err.is_unavailable(), "unexpected error: {err}");
}
