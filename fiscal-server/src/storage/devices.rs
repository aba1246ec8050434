//! 设备表

use super::{DEVICES_TABLE, DEVICE_SERIALS_TABLE, FiscalStorage, StorageError, StorageResult};
use redb::{ReadableDatabase, ReadableTable};
use shared::fiscal::FiscalDevice;

impl FiscalStorage {
    /// 保存设备（开通或状态变更）
    ///
    /// 序列号只能绑定一台收银机。
    pub fn put_device(&self, device: &FiscalDevice) -> StorageResult<()> {
        let txn = self.db.begin_write()?;
        {
            let mut serials = txn.open_table(DEVICE_SERIALS_TABLE)?;
            let bound = serials
                .get(device.serial_number.as_str())?
                .map(|g| g.value().to_string());
            if let Some(register_id) = bound
                && register_id != device.cash_register_id
            {
                return Err(StorageError::SerialAlreadyBound {
                    serial: device.serial_number.clone(),
                    register_id,
                });
            }

            let mut devices = txn.open_table(DEVICES_TABLE)?;
            // 收银机换绑新设备时释放旧序列号
            let previous = match devices.get(device.cash_register_id.as_str())? {
                Some(value) => Some(serde_json::from_slice::<FiscalDevice>(value.value())?),
                None => None,
            };
            if let Some(prev) = previous
                && prev.serial_number != device.serial_number
            {
                serials.remove(prev.serial_number.as_str())?;
            }

            let value = serde_json::to_vec(device)?;
            devices.insert(device.cash_register_id.as_str(), value.as_slice())?;
            serials.insert(
                device.serial_number.as_str(),
                device.cash_register_id.as_str(),
            )?;
        }
        txn.commit()?;
        Ok(())
    }

    /// 按收银机获取设备
    pub fn get_device(&self, register_id: &str) -> StorageResult<Option<FiscalDevice>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES_TABLE)?;
        match table.get(register_id)? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// 序列号绑定的收银机
    pub fn find_register_by_serial(&self, serial: &str) -> StorageResult<Option<String>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICE_SERIALS_TABLE)?;
        Ok(table.get(serial)?.map(|g| g.value().to_string()))
    }

    /// 所有已开通设备
    pub fn list_devices(&self) -> StorageResult<Vec<FiscalDevice>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICES_TABLE)?;

        let mut devices = Vec::new();
        for result in table.iter()? {
            let (_key, value) = result?;
            devices.push(serde_json::from_slice(value.value())?);
        }
        Ok(devices)
    }
}
