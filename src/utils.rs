//! Id generation for workflow records

use bech32::Bech32m;
use uuid7::uuid7;

pub const TRANSFER_HRP: &str = "transfer_";
pub const APPEAL_HRP: &str = "appeal_";

// construct a unique id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Time-ordered key; the canonical uuid7 string sorts by creation time.
pub fn new_ordered_key() -> String {
    uuid7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let transfer = new_uuid_to_bech32(TRANSFER_HRP).unwrap();
        let appeal = new_uuid_to_bech32(APPEAL_HRP).unwrap();

        assert!(transfer.starts_with("transfer_1"));
        assert!(appeal.starts_with("appeal_1"));
        assert_ne!(transfer, new_uuid_to_bech32(TRANSFER_HRP).unwrap());
    }

    #[test]
    fn empty_hrp_is_rejected() {
        assert!(new_uuid_to_bech32("").is_err());
    }

    #[test]
    fn ordered_keys_sort_by_creation() {
        let keys: Vec<String> = (0..32).map(|_| new_ordered_key()).collect();
        let mut sorted = keys.clone();
        sorted.sort();

        assert_eq!(keys, sorted);
    }
}
