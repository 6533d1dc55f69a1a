use uuid::Uuid;

const ROOT_UUID: Uuid = Uuid::from_u128(0x6c3f_9a1e_52d4_4b0f_9e27_d1a0_84c5_f3b2);

/// Stable id of this machine, derived from its host name.
pub fn calculate_machine_id(device_name: &str) -> Uuid {
    Uuid::new_v5(&ROOT_UUID, device_name.as_bytes())
}

pub fn local_device_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
