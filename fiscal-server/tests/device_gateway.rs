//! 设备网关：心跳、证书状态与签名前置条件

mod common;

use common::*;
use fiscal_server::audit::DeviceAuditAction;
use fiscal_server::device::{DeviceError, SoftwareProfile};
use fiscal_server::ledger::LedgerError;
use shared::error::{AppError, ErrorCode, UserAction};
use shared::fiscal::{CertificateStatus, ConnectionState, MemoryStatus};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[tokio::test]
async fn heartbeat_on_healthy_device_keeps_connection() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    let gateway = ctx.state.devices.get("REG-1").unwrap();

    let status = gateway.heartbeat().await.unwrap();
    assert_eq!(status.connection_state, ConnectionState::Connected);
    assert!(status.can_create_invoices);

    let latest = &ctx.state.audit.recent("REG-1", 1).unwrap()[0];
    assert_eq!(latest.action, DeviceAuditAction::Heartbeat);
    assert!(latest.success);
}

#[tokio::test]
async fn heartbeat_failure_moves_device_to_error() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    let gateway = ctx.state.devices.get("REG-1").unwrap();

    ctx.driver.set_offline("SN-1", true);
    let err = gateway.heartbeat().await.unwrap_err();
    assert!(matches!(err, DeviceError::Unavailable { .. }));

    let status = gateway.status();
    assert_eq!(status.connection_state, ConnectionState::Error);
    assert!(!status.can_create_invoices);
    assert!(status.error_message.is_some());

    let latest = &ctx.state.audit.recent("REG-1", 1).unwrap()[0];
    assert_eq!(latest.action, DeviceAuditAction::Heartbeat);
    assert!(!latest.success);

    let result = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "tx-1", "10"))
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::Device(DeviceError::Unavailable { .. }))
    ));
    assert!(ctx.state.ledger.chain_head("REG-1").unwrap().is_none());
}

#[tokio::test]
async fn heartbeat_on_disconnected_device_is_a_no_op() {
    let ctx = context();
    ctx.state
        .devices
        .provision(provision_request("REG-1", "SN-1", false))
        .unwrap();
    let gateway = ctx.state.devices.get("REG-1").unwrap();

    let status = gateway.heartbeat().await.unwrap();
    assert_eq!(status.connection_state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn expiring_certificate_blocks_signing_until_renewed() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    let gateway = ctx.state.devices.get("REG-1").unwrap();
    let now = shared::util::now_millis();

    ctx.driver.set_certificate_expiry("SN-1", Some(now + 5 * DAY_MS));
    let status = gateway.heartbeat().await.unwrap();
    assert_eq!(status.certificate_status, CertificateStatus::Expiring);
    assert!(!status.can_create_invoices);

    let err = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "tx-1", "10"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Device(DeviceError::CertificateNotValid {
            status: CertificateStatus::Expiring,
            ..
        })
    ));
    let app: AppError = err.into();
    assert_eq!(app.code, ErrorCode::CertificateNotValid);
    assert_eq!(app.user_action(), UserAction::ServiceDevice);
    assert!(ctx.state.ledger.chain_head("REG-1").unwrap().is_none());

    ctx.driver.set_certificate_expiry("SN-1", Some(now + 365 * DAY_MS));
    let status = gateway.heartbeat().await.unwrap();
    assert_eq!(status.certificate_status, CertificateStatus::Valid);

    let record = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "tx-1", "10"))
        .await
        .unwrap();
    assert_eq!(record.signature_counter, 1);
}

#[tokio::test]
async fn expired_certificate_reports_certificate_expired() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    let gateway = ctx.state.devices.get("REG-1").unwrap();

    ctx.driver
        .set_certificate_expiry("SN-1", Some(shared::util::now_millis() - DAY_MS));
    let status = gateway.heartbeat().await.unwrap();
    assert_eq!(status.certificate_status, CertificateStatus::Expired);

    let result = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "tx-1", "10"))
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::Device(DeviceError::CertificateExpired(_)))
    ));
}

#[tokio::test]
async fn full_signature_memory_is_reported_as_memory_full() {
    let ctx = context();
    ctx.driver.add_device(
        "SN-1",
        SoftwareProfile {
            key: b"memory-test-key".to_vec(),
            certificate_expires_at: Some(shared::util::now_millis() + 365 * DAY_MS),
            memory_capacity: 2,
        },
    );
    connected_register(&ctx, "REG-1", "SN-1").await;
    let ledger = &ctx.state.ledger;

    ledger.create_signed_record(sale("REG-1", "tx-1", "10")).await.unwrap();
    ledger.create_signed_record(sale("REG-1", "tx-2", "10")).await.unwrap();

    let err = ledger
        .create_signed_record(sale("REG-1", "tx-3", "10"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Device(DeviceError::MemoryFull(_))));
    let app: AppError = err.into();
    assert_eq!(app.user_action(), UserAction::ServiceDevice);

    let status = ctx.state.devices.get("REG-1").unwrap().status();
    assert_eq!(status.memory_status, MemoryStatus::Full);
    assert_eq!(status.connection_state, ConnectionState::Connected);
    assert_eq!(ledger.chain_head("REG-1").unwrap().unwrap().counter, 2);
}
