//! 集成测试公共设施：内存存储 + 软件驱动 + 脚本化税务局

#![allow(dead_code)]

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use fiscal_server::compliance::{
    AuthorityRequest, AuthorityResponse, ClientError, TaxAuthorityClient,
};
use fiscal_server::device::SoftwareDriver;
use fiscal_server::{Config, FiscalStorage, ServerState};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use shared::fiscal::{
    CreateRecordRequest, CreditNoteRef, ProvisionDeviceRequest, RecordType, TaxAuthorityCredentials,
    TaxTotals,
};

/// 按顺序返回预设结果，耗尽后返回 200
#[derive(Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<AuthorityResponse, ClientError>>>,
    calls: Mutex<Vec<AuthorityRequest>>,
}

impl ScriptedClient {
    pub fn push_status(&self, status: u16, body: &str) {
        self.script.lock().push_back(Ok(AuthorityResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_error(&self, error: ClientError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<AuthorityRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TaxAuthorityClient for ScriptedClient {
    async fn submit(
        &self,
        request: &AuthorityRequest,
        _credentials: &TaxAuthorityCredentials,
    ) -> Result<AuthorityResponse, ClientError> {
        self.calls.lock().push(request.clone());
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| {
            Ok(AuthorityResponse {
                status: 200,
                body: r#"{"status":"accepted"}"#.to_string(),
            })
        })
    }
}

pub struct TestContext {
    pub state: ServerState,
    pub driver: Arc<SoftwareDriver>,
    pub client: Arc<ScriptedClient>,
}

pub fn test_config() -> Config {
    let mut config = Config::with_overrides("/tmp/fiscal-server-test", 0);
    config.timezone = chrono_tz::Europe::Vienna;
    config.submission_max_attempts = 3;
    config.submission_base_delay_secs = 5;
    config.submission_max_delay_secs = 300;
    config.auto_closing_enabled = false;
    config
}

/// 内存存储上的完整服务状态（未开通任何设备）
pub fn context() -> TestContext {
    context_with(test_config())
}

pub fn context_with(config: Config) -> TestContext {
    let driver = Arc::new(SoftwareDriver::auto_provisioning());
    let client = Arc::new(ScriptedClient::default());
    let state = ServerState::build(
        config,
        FiscalStorage::open_in_memory().unwrap(),
        driver.clone(),
        client.clone(),
    )
    .unwrap();
    TestContext {
        state,
        driver,
        client,
    }
}

pub fn provision_request(register_id: &str, serial: &str, reporting: bool) -> ProvisionDeviceRequest {
    ProvisionDeviceRequest {
        serial_number: serial.into(),
        cash_register_id: register_id.into(),
        device_type: "software".into(),
        vendor_id: String::new(),
        product_id: String::new(),
        timeout_seconds: 1,
        kassen_id: format!("KASSE-{register_id}"),
        tax_authority: TaxAuthorityCredentials {
            enabled: reporting,
            participant_id: "P-100".into(),
            user_id: "user".into(),
            pin: "secret".into(),
        },
    }
}

/// 开通并连接一台设备（启用申报）
pub async fn connected_register(ctx: &TestContext, register_id: &str, serial: &str) {
    ctx.state
        .devices
        .provision(provision_request(register_id, serial, true))
        .unwrap();
    ctx.state
        .devices
        .get(register_id)
        .unwrap()
        .connect(serial)
        .await
        .unwrap();
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn sale(register_id: &str, correlation: &str, normal: &str) -> CreateRecordRequest {
    CreateRecordRequest {
        cash_register_id: register_id.into(),
        record_type: RecordType::Sale,
        totals: TaxTotals {
            normal: d(normal),
            ..Default::default()
        },
        correlation_id: correlation.into(),
        credit_note: None,
    }
}

pub fn credit_note(
    register_id: &str,
    correlation: &str,
    original: &str,
    normal: &str,
) -> CreateRecordRequest {
    CreateRecordRequest {
        cash_register_id: register_id.into(),
        record_type: RecordType::CreditNote,
        totals: TaxTotals {
            normal: d(normal),
            ..Default::default()
        },
        correlation_id: correlation.into(),
        credit_note: Some(CreditNoteRef {
            original_invoice_id: original.into(),
            reason_code: "RETURN".into(),
            reason_text: Some("customer return".into()),
        }),
    }
}

/// 远超任何退避时间的"现在"
pub fn far_future() -> i64 {
    shared::util::now_millis() + 24 * 60 * 60 * 1000
}
