//! 签名链：并发、红冲、跨收银机隔离、重启恢复、设备审计链

mod common;

use std::sync::Arc;

use common::*;
use fiscal_server::device::SoftwareDriver;
use fiscal_server::ledger::LedgerError;
use fiscal_server::{FiscalStorage, ServerState};
use shared::fiscal::{ConnectionState, GENESIS_SIGNATURE, PeriodType};

#[tokio::test]
async fn concurrent_signing_yields_gap_free_valid_chain() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;

    let mut handles = Vec::new();
    for i in 0..25 {
        let ledger = ctx.state.ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .create_signed_record(sale("REG-1", &format!("tx-{i}"), "1.10"))
                .await
        }));
    }
    let mut counters = Vec::new();
    for handle in handles {
        counters.push(handle.await.unwrap().unwrap().signature_counter);
    }
    counters.sort_unstable();
    assert_eq!(counters, (1..=25).collect::<Vec<u64>>());

    let verification = ctx.state.ledger.verify_chain("REG-1", 1, u64::MAX).unwrap();
    assert!(verification.valid);
    assert_eq!(verification.checked, 25);
    assert!(ctx.state.ledger.active_conflict("REG-1").unwrap().is_none());
}

#[tokio::test]
async fn duplicate_correlation_id_does_not_advance_counter() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;

    let first = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "order-42", "12.00"))
        .await
        .unwrap();
    let again = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "order-42", "12.00"))
        .await
        .unwrap();

    assert_eq!(first, again);
    assert_eq!(first.previous_signature_value, GENESIS_SIGNATURE);
    assert_eq!(ctx.state.ledger.chain_head("REG-1").unwrap().unwrap().counter, 1);
}

#[tokio::test]
async fn credit_note_references_invoice_without_touching_it() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    let ledger = &ctx.state.ledger;

    let original = ledger
        .create_signed_record(sale("REG-1", "tx-1", "30"))
        .await
        .unwrap();
    let refund = ledger
        .create_signed_record(credit_note("REG-1", "refund-1", &original.id, "-10"))
        .await
        .unwrap();

    assert_eq!(refund.signature_counter, 2);
    assert_eq!(
        refund.credit_note.as_ref().unwrap().original_invoice_id,
        original.id
    );
    assert_eq!(ledger.get_record(&original.id).unwrap(), original);

    let too_large = ledger
        .create_signed_record(credit_note("REG-1", "refund-2", &original.id, "-31"))
        .await;
    assert!(matches!(too_large, Err(LedgerError::Validation(_))));

    let missing = ledger
        .create_signed_record(credit_note("REG-1", "refund-3", "no-such-record", "-1"))
        .await;
    assert!(matches!(missing, Err(LedgerError::OriginalInvoiceInvalid(_))));

    // 结账记录不是发票
    let closing = ctx
        .state
        .closing
        .perform_closing("REG-1", PeriodType::Daily)
        .await
        .unwrap();
    let closing_record = closing.signed_record_id.unwrap();
    let on_closing = ledger
        .create_signed_record(credit_note("REG-1", "refund-4", &closing_record, "-1"))
        .await;
    assert!(matches!(on_closing, Err(LedgerError::OriginalInvoiceInvalid(_))));

    assert_eq!(ledger.chain_head("REG-1").unwrap().unwrap().counter, 3);
}

#[tokio::test]
async fn repeated_credit_notes_cannot_exceed_original_invoice() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    let ledger = &ctx.state.ledger;

    let original = ledger
        .create_signed_record(sale("REG-1", "tx-1", "20"))
        .await
        .unwrap();
    ledger
        .create_signed_record(credit_note("REG-1", "refund-1", &original.id, "-15"))
        .await
        .unwrap();

    let second = ledger
        .create_signed_record(credit_note("REG-1", "refund-2", &original.id, "-15"))
        .await;
    assert!(matches!(second, Err(LedgerError::Validation(_))));

    ledger
        .create_signed_record(credit_note("REG-1", "refund-3", &original.id, "-5"))
        .await
        .unwrap();
    let over_by_a_cent = ledger
        .create_signed_record(credit_note("REG-1", "refund-4", &original.id, "-0.01"))
        .await;
    assert!(matches!(over_by_a_cent, Err(LedgerError::Validation(_))));

    assert_eq!(ledger.chain_head("REG-1").unwrap().unwrap().counter, 3);
    assert_eq!(
        ctx.state.storage.credited_total(&original.id).unwrap(),
        d("20")
    );
}

#[tokio::test]
async fn registers_keep_independent_chains() {
    let ctx = context();
    connected_register(&ctx, "REG-1", "SN-1").await;
    connected_register(&ctx, "REG-2", "SN-2").await;
    let ledger = &ctx.state.ledger;

    let a1 = ledger.create_signed_record(sale("REG-1", "a-1", "1")).await.unwrap();
    let b1 = ledger.create_signed_record(sale("REG-2", "b-1", "2")).await.unwrap();
    let a2 = ledger.create_signed_record(sale("REG-1", "a-2", "3")).await.unwrap();

    assert_eq!(a1.signature_counter, 1);
    assert_eq!(b1.signature_counter, 1);
    assert_eq!(b1.previous_signature_value, GENESIS_SIGNATURE);
    assert_eq!(a2.signature_counter, 2);
    assert_eq!(a2.previous_signature_value, a1.signature_value);

    // 用另一台收银机的发票红冲
    let cross = ledger
        .create_signed_record(credit_note("REG-2", "b-refund", &a1.id, "-1"))
        .await;
    assert!(matches!(cross, Err(LedgerError::OriginalInvoiceInvalid(_))));
}

#[tokio::test]
async fn device_audit_chain_survives_mixed_outcomes() {
    let ctx = context();
    ctx.state
        .devices
        .provision(provision_request("REG-1", "SN-1", true))
        .unwrap();
    let gateway = ctx.state.devices.get("REG-1").unwrap();

    // 未连接时签名失败
    let disconnected = ctx
        .state
        .ledger
        .create_signed_record(sale("REG-1", "tx-0", "1"))
        .await;
    assert!(disconnected.is_err());

    // 错误的序列号
    assert!(gateway.connect("SN-OTHER").await.is_err());

    gateway.connect("SN-1").await.unwrap();
    ctx.state
        .ledger
        .create_signed_record(sale("REG-1", "tx-1", "1"))
        .await
        .unwrap();
    ctx.driver.set_offline("SN-1", true);
    assert!(gateway.heartbeat().await.is_err());
    ctx.driver.set_offline("SN-1", false);
    gateway.connect("SN-1").await.unwrap();
    gateway.disconnect().await.unwrap();

    let verification = ctx.state.audit.verify_chain().unwrap();
    assert!(verification.chain_intact);
    assert!(verification.breaks.is_empty());
    assert!(verification.total_entries >= 7);

    let recent = ctx.state.audit.recent("REG-1", 100).unwrap();
    assert!(recent.iter().any(|e| !e.success));
    assert!(recent.iter().any(|e| e.success));
}

#[tokio::test]
async fn chain_and_devices_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fiscal.redb");

    let last = {
        let driver = Arc::new(SoftwareDriver::auto_provisioning());
        let state = ServerState::build(
            test_config(),
            FiscalStorage::open(&path).unwrap(),
            driver,
            Arc::new(ScriptedClient::default()),
        )
        .unwrap();
        state
            .devices
            .provision(provision_request("REG-1", "SN-1", true))
            .unwrap();
        state.devices.get("REG-1").unwrap().connect("SN-1").await.unwrap();
        state
            .ledger
            .create_signed_record(sale("REG-1", "tx-1", "1"))
            .await
            .unwrap();
        state
            .ledger
            .create_signed_record(sale("REG-1", "tx-2", "2"))
            .await
            .unwrap()
    };

    let state = ServerState::build(
        test_config(),
        FiscalStorage::open(&path).unwrap(),
        Arc::new(SoftwareDriver::auto_provisioning()),
        Arc::new(ScriptedClient::default()),
    )
    .unwrap();

    let gateway = state.devices.get("REG-1").unwrap();
    assert_eq!(gateway.status().connection_state, ConnectionState::Disconnected);

    let head = state.ledger.chain_head("REG-1").unwrap().unwrap();
    assert_eq!(head.counter, 2);
    assert_eq!(head.signature_value, last.signature_value);

    gateway.connect("SN-1").await.unwrap();
    let next = state
        .ledger
        .create_signed_record(sale("REG-1", "tx-3", "3"))
        .await
        .unwrap();
    assert_eq!(next.signature_counter, 3);
    assert_eq!(next.previous_signature_value, last.signature_value);
    assert!(state.ledger.verify_chain("REG-1", 1, u64::MAX).unwrap().valid);
}
