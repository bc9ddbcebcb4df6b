//! Raw advertisement (AD structure) parsing.

use crate::config::BLE_MAX_ADV_SERVICES;
use heapless::{String, Vec};

const AD_INCOMPLETE_UUID16: u8 = 0x02;
const AD_COMPLETE_UUID16: u8 = 0x03;
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;

/// Iterate `(ad_type, payload)` pairs, stopping at the first malformed
/// length byte.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let payload = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, payload))
    })
}

/// Collect every 16-bit service UUID from complete and incomplete lists.
pub fn service_uuids(data: &[u8]) -> Vec<u16, BLE_MAX_ADV_SERVICES> {
    let mut uuids = Vec::new();
    for (ad_type, payload) in ad_structures(data) {
        if ad_type == AD_INCOMPLETE_UUID16 || ad_type == AD_COMPLETE_UUID16 {
            for chunk in payload.chunks_exact(2) {
                if uuids.push(u16::from_le_bytes([chunk[0], chunk[1]])).is_err() {
                    return uuids;
                }
            }
        }
    }
    uuids
}

/// Check if raw advertisement data lists the given 16-bit service UUID.
pub fn contains_service_uuid(data: &[u8], uuid: u16) -> bool {
    let needle = uuid.to_le_bytes();
    ad_structures(data).any(|(ad_type, payload)| {
        (ad_type == AD_INCOMPLETE_UUID16 || ad_type == AD_COMPLETE_UUID16)
            && payload.chunks_exact(2).any(|chunk| chunk == needle)
    })
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    let mut name = String::new();
    match ad_structures(data).find(|(t, _)| *t == AD_SHORT_NAME || *t == AD_COMPLETE_NAME) {
        Some((_, name_bytes)) => {
            for &b in name_bytes {
                if name.push(b as char).is_err() {
                    break;
                }
            }
        }
        None => {
            let _ = name.push_str("Unknown");
        }
    }
    name
}
