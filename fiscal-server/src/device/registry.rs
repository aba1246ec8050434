//! 设备网关注册表：每台收银机一个网关

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use shared::fiscal::{ConnectionState, FiscalDeviceStatus, ProvisionDeviceRequest};
use tracing::info;

use super::driver::FiscalDriver;
use super::error::{DeviceError, DeviceResult};
use super::gateway::FiscalDeviceGateway;
use crate::audit::{DeviceAuditAction, DeviceAuditLog};
use crate::storage::FiscalStorage;

#[derive(Clone)]
pub struct DeviceRegistry {
    gateways: Arc<DashMap<String, Arc<FiscalDeviceGateway>>>,
    driver: Arc<dyn FiscalDriver>,
    storage: FiscalStorage,
    audit: DeviceAuditLog,
    cert_warning_days: u32,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("gateways", &self.gateways.len())
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    /// 加载已开通的设备
    ///
    /// 进程重启后硬件连接已不存在，持久化的 Connected/Connecting 状态重置为 Disconnected。
    pub fn load(
        storage: FiscalStorage,
        driver: Arc<dyn FiscalDriver>,
        audit: DeviceAuditLog,
        cert_warning_days: u32,
    ) -> DeviceResult<Self> {
        let registry = Self {
            gateways: Arc::new(DashMap::new()),
            driver,
            storage,
            audit,
            cert_warning_days,
        };

        for mut device in registry.storage.list_devices()? {
            if matches!(
                device.connection_state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                device.connection_state = ConnectionState::Disconnected;
                registry.storage.put_device(&device)?;
            }
            registry.insert_gateway(device);
        }

        info!(devices = registry.gateways.len(), "Fiscal device registry loaded");
        Ok(registry)
    }

    fn build_gateway(&self, device: shared::fiscal::FiscalDevice) -> Arc<FiscalDeviceGateway> {
        Arc::new(FiscalDeviceGateway::new(
            device,
            self.driver.clone(),
            self.storage.clone(),
            self.audit.clone(),
            self.cert_warning_days,
        ))
    }

    fn insert_gateway(&self, device: shared::fiscal::FiscalDevice) {
        let gateway = self.build_gateway(device);
        self.gateways
            .insert(gateway.register_id().to_string(), gateway);
    }

    /// 开通设备（同一收银机重复开通同一序列号是幂等的）
    pub fn provision(&self, req: ProvisionDeviceRequest) -> DeviceResult<FiscalDeviceStatus> {
        if req.serial_number.trim().is_empty() || req.cash_register_id.trim().is_empty() {
            return Err(DeviceError::Invalid(
                "serial_number and cash_register_id are required".to_string(),
            ));
        }
        if req.kassen_id.trim().is_empty() {
            return Err(DeviceError::Invalid("kassen_id is required".to_string()));
        }

        // 持有条目锁直到网关插入，同一收银机的并发开通串行化
        let slot = match self.gateways.entry(req.cash_register_id.clone()) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.device().serial_number == req.serial_number {
                    return Ok(existing.status());
                }
                return Err(DeviceError::AlreadyProvisioned(req.cash_register_id.clone()));
            }
            Entry::Vacant(slot) => slot,
        };

        let device = req.into_device(shared::util::now_millis());
        match self.storage.put_device(&device) {
            Ok(()) => {}
            Err(crate::storage::StorageError::SerialAlreadyBound {
                serial,
                register_id,
            }) => return Err(DeviceError::NotBound { serial, register_id }),
            Err(e) => return Err(e.into()),
        }
        self.audit.record(
            &device.cash_register_id,
            &device.serial_number,
            DeviceAuditAction::Provision,
            true,
            Some(format!("kassen_id={}", device.kassen_id)),
        )?;

        info!(
            register_id = %device.cash_register_id,
            serial = %device.serial_number,
            "Fiscal device provisioned"
        );
        let gateway = self.build_gateway(device);
        slot.insert(gateway.clone());
        Ok(gateway.status())
    }

    /// 收银机的网关
    pub fn get(&self, register_id: &str) -> DeviceResult<Arc<FiscalDeviceGateway>> {
        self.gateways
            .get(register_id)
            .map(|g| g.value().clone())
            .ok_or_else(|| DeviceError::NotProvisioned(register_id.to_string()))
    }

    pub fn all(&self) -> Vec<Arc<FiscalDeviceGateway>> {
        self.gateways.iter().map(|g| g.value().clone()).collect()
    }

    pub fn register_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.gateways.iter().map(|g| g.key().clone()).collect();
        ids.sort();
        ids
    }
}
