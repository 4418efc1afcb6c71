//! Unit tests for the agent service

#[cfg(test)]
mod tests {
    use crate::coalesce::CallContext;
    use crate::rpc::*;
    use crate::service::wipe_request;
    use crate::test_utils::*;
    use host_client::{RebootMode, WipeMethod};
    use ipmi_client::{MockBmc, Privilege};
    use std::time::Duration;

    fn get_request(check_username: &str) -> GetPowerManagementRequest {
        GetPowerManagementRequest {
            ipmi: Some(IpmiQuery {
                check_username: check_username.to_string(),
            }),
        }
    }

    fn set_request(username: &str, password: &str) -> SetPowerManagementRequest {
        SetPowerManagementRequest {
            ipmi: Some(IpmiCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_hello() {
        let service = create_test_service(&create_test_host(), &create_test_bmc(), false);
        let response = service
            .hello(&CallContext::default(), HelloRequest {})
            .await
            .unwrap();
        assert_eq!(response, HelloResponse {});
    }

    #[tokio::test]
    async fn test_get_power_management_reads_bmc() {
        let bmc = create_test_bmc();
        let service = create_test_service(&create_test_host(), &bmc, false);

        let response = service
            .get_power_management(&CallContext::default(), get_request("admin"))
            .await
            .unwrap();

        assert_eq!(
            response.ipmi,
            Some(IpmiPowerManagement {
                address: "192.168.1.50".to_string(),
                port: 623,
                user_exists: true,
            })
        );
        assert_eq!(response.api, None);
        assert_eq!(bmc.opens(), 1);
        assert_eq!(bmc.closes(), 1);
    }

    #[tokio::test]
    async fn test_get_power_management_reports_missing_user() {
        let service = create_test_service(&create_test_host(), &create_test_bmc(), false);

        let response = service
            .get_power_management(&CallContext::default(), get_request("metal"))
            .await
            .unwrap();

        assert!(!response.ipmi.unwrap().user_exists);
    }

    #[tokio::test]
    async fn test_test_mode_never_touches_bmc() {
        let bmc = create_test_bmc();
        let service = create_test_service(&create_test_host(), &bmc, true);
        let ctx = CallContext::default();

        let response = service
            .get_power_management(&ctx, get_request("metal"))
            .await
            .unwrap();
        service
            .set_power_management(&ctx, set_request("metal", "pw"))
            .await
            .unwrap();

        assert_eq!(response.api, Some(ApiPowerManagement {}));
        assert_eq!(response.ipmi, None);
        assert_eq!(bmc.opens(), 0);
    }

    #[tokio::test]
    async fn test_set_power_management_provisions_account() {
        let bmc = create_test_bmc();
        let service = create_test_service(&create_test_host(), &bmc, false);

        service
            .set_power_management(&CallContext::default(), set_request("metal", "s3cret"))
            .await
            .unwrap();

        // slot 2 holds "admin", slot 3 is the first unresolvable slot
        let user = bmc.user(3).unwrap();
        assert_eq!(user.name, "metal");
        assert_eq!(user.password, "s3cret");
        assert!(user.enabled);
        assert_eq!(user.privilege, Some(Privilege::Administrator));
        assert_eq!(bmc.closes(), bmc.opens());
    }

    #[tokio::test]
    async fn test_set_power_management_failure_is_internal_and_closes_channel() {
        let bmc = MockBmc::new(3).with_user(2, "a").with_user(3, "b");
        let service = create_test_service(&create_test_host(), &bmc, false);

        let err = service
            .set_power_management(&CallContext::default(), set_request("metal", "pw"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "internal");
        assert!(err.to_string().contains("no slot available"), "{err}");
        assert_eq!(bmc.opens(), 1);
        assert_eq!(bmc.closes(), 1);
    }

    #[tokio::test]
    async fn test_bmc_unavailable_is_internal() {
        let bmc = create_test_bmc().fail_open();
        let service = create_test_service(&create_test_host(), &bmc, false);

        let err = service
            .get_power_management(&CallContext::default(), get_request("admin"))
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Internal(_)));
        assert!(err.to_string().starts_with("error creating ipmi client"));
    }

    #[tokio::test]
    async fn test_concurrent_identical_set_calls_write_once() {
        let bmc = create_test_bmc().with_latency(Duration::from_millis(5));
        let service = create_test_service(&create_test_host(), &bmc, false);
        let ctx = CallContext::default();

        let (a, b) = tokio::join!(
            service.set_power_management(&ctx, set_request("metal", "pw")),
            service.set_power_management(&ctx, set_request("metal", "pw")),
        );

        assert_eq!(a, b);
        assert!(a.is_ok());
        assert_eq!(bmc.opens(), 1);
        // name, password, access, enable
        assert_eq!(bmc.writes(), 4);
    }

    #[tokio::test]
    async fn test_concurrent_different_set_calls_are_not_coalesced() {
        let bmc = create_test_bmc().with_latency(Duration::from_millis(5));
        let service = create_test_service(&create_test_host(), &bmc, false);
        let ctx = CallContext::default();

        let calls = futures::future::join_all(vec![
            service.set_power_management(&ctx, set_request("metal", "one")),
            service.set_power_management(&ctx, set_request("metal", "two")),
        ])
        .await;

        assert!(calls.iter().all(Result::is_ok));
        assert_eq!(bmc.opens(), 2);
    }

    #[tokio::test]
    async fn test_reboot_power_cycles() {
        let host = create_test_host();
        let service = create_test_service(&host, &create_test_bmc(), false);

        service
            .reboot(&CallContext::default(), RebootRequest {})
            .await
            .unwrap();

        assert_eq!(host.reboots(), vec![RebootMode::PowerCycle]);
    }

    #[tokio::test]
    async fn test_reboot_propagates_host_error() {
        let host = create_test_host();
        host.fail_with(500, "machined is shutting down");
        let service = create_test_service(&host, &create_test_bmc(), false);

        let err = service
            .reboot(&CallContext::default(), RebootRequest {})
            .await
            .unwrap_err();

        assert_eq!(err, RpcError::Internal("machined is shutting down".to_string()));
    }

    #[tokio::test]
    async fn test_wipe_disks_skips_readonly_and_cdrom() {
        let host = create_test_host();
        host.add_disk(create_test_disk("sda", false, false));
        host.add_disk(create_test_disk("sdb", true, false));
        host.add_disk(create_test_disk("sr0", false, true));
        host.add_disk(create_test_disk("nvme0n1", false, false));
        let service = create_test_service(&host, &create_test_bmc(), false);

        service
            .wipe_disks(&CallContext::default(), WipeDisksRequest { zeroes: true })
            .await
            .unwrap();

        let wipes = host.wipes();
        assert_eq!(wipes.len(), 1);
        let devices: Vec<_> = wipes[0].devices.iter().map(|d| d.device.as_str()).collect();
        assert_eq!(devices, vec!["sda", "nvme0n1"]);
        assert!(
            wipes[0]
                .devices
                .iter()
                .all(|d| d.method == WipeMethod::Zeroes && d.skip_volume_check)
        );
    }

    #[tokio::test]
    async fn test_wipe_disks_names_failed_step() {
        let host = create_test_host();
        host.fail_with(500, "disk inventory broken");
        let service = create_test_service(&host, &create_test_bmc(), false);

        let err = service
            .wipe_disks(&CallContext::default(), WipeDisksRequest { zeroes: true })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RpcError::Internal("failed to list disks: disk inventory broken".to_string())
        );
        assert!(host.wipes().is_empty());
    }

    #[tokio::test]
    async fn test_wipe_disks_keeps_unavailable_code() {
        let host = create_test_host();
        host.fail_with(503, "machined restarting");
        let service = create_test_service(&host, &create_test_bmc(), false);

        let err = service
            .wipe_disks(&CallContext::default(), WipeDisksRequest { zeroes: false })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "unavailable");
        assert!(err.to_string().starts_with("failed to list disks: "), "{err}");
    }

    #[test]
    fn test_wipe_request_fast() {
        let disks = vec![create_test_disk("sda", false, false)];
        let request = wipe_request(&disks, WipeMethod::Fast);
        assert_eq!(request.devices[0].method, WipeMethod::Fast);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded_is_distinct_from_internal() {
        let bmc = create_test_bmc().with_latency(Duration::from_secs(5));
        let service = create_test_service(&create_test_host(), &bmc, false);
        let ctx = CallContext::default().with_timeout(Duration::from_millis(100));

        let err = service
            .get_power_management(&ctx, get_request("admin"))
            .await
            .unwrap_err();

        assert_eq!(err, RpcError::DeadlineExceeded);
    }
}
