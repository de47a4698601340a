//! Affinity routing: ordering key → partition.
//!
//! The router is a pure function of `(key, partition count)`. Given the same
//! key and the same partition list it always returns the same partition, in
//! every process and on every platform. That is the whole ordering guarantee
//! on the producer side: all messages of one order land on one partition and
//! the broker keeps them in submission order.
//!
//! ## Key Handling
//!
//! - **Numeric keys** are used directly: `|v| mod n` (see [`SignNormalization`])
//! - **Byte keys** are hashed with SipHash-2-4 under fixed zero keys, then
//!   reduced `mod n`
//!
//! Changing the partition count remaps keys. That is a topic-level event the
//! router does not try to hide.
//!
//! ## Examples
//!
//! ```
//! use partline_client::AffinityRouter;
//! use partline_core::{OrderingKey, Topic};
//!
//! let topic = Topic::new("orders", 4);
//! let router = AffinityRouter::default();
//!
//! let first = router.select(topic.partitions(), &OrderingKey::from(1001_i64)).unwrap();
//! let again = router.select(topic.partitions(), &OrderingKey::from(1001_i64)).unwrap();
//! assert_eq!(first, again);
//! assert_eq!(first.index(), 1);
//! ```

use crate::error::{ClientError, Result};
use partline_core::{OrderingKey, Partition};
use serde::{Deserialize, Serialize};
use siphasher::sip::SipHasher;
use std::hash::Hasher;

/// How negative numeric keys are made non-negative before the modulo.
///
/// Both policies agree on every non-negative key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignNormalization {
    /// `v.unsigned_abs()`. Defined for `i64::MIN`.
    #[default]
    Absolute,
    /// Clear the sign bit.
    MaskSignBit,
}

impl SignNormalization {
    fn apply(self, v: i64) -> u64 {
        match self {
            SignNormalization::Absolute => v.unsigned_abs(),
            SignNormalization::MaskSignBit => (v as u64) & (i64::MAX as u64),
        }
    }
}

/// Maps an ordering key to one of a topic's partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AffinityRouter {
    sign: SignNormalization,
}

impl AffinityRouter {
    pub fn new(sign: SignNormalization) -> Self {
        Self { sign }
    }

    pub fn sign_normalization(&self) -> SignNormalization {
        self.sign
    }

    /// Partition index for `key` among `partition_count` partitions.
    ///
    /// # Errors
    ///
    /// `NoPartitionsAvailable` when `partition_count` is zero.
    pub fn index_for(&self, key: &OrderingKey, partition_count: u32) -> Result<u32> {
        if partition_count == 0 {
            return Err(ClientError::NoPartitionsAvailable(String::new()));
        }
        Ok((self.routing_value(key) % u64::from(partition_count)) as u32)
    }

    /// Pick the partition for `key` out of `partitions`.
    ///
    /// # Errors
    ///
    /// `NoPartitionsAvailable` when `partitions` is empty. There is no
    /// default partition.
    pub fn select(&self, partitions: &[Partition], key: &OrderingKey) -> Result<Partition> {
        if partitions.is_empty() {
            return Err(ClientError::NoPartitionsAvailable(String::new()));
        }
        let idx = (self.routing_value(key) % partitions.len() as u64) as usize;
        Ok(partitions[idx].clone())
    }

    fn routing_value(&self, key: &OrderingKey) -> u64 {
        match key {
            OrderingKey::Numeric(v) => self.sign.apply(*v),
            OrderingKey::Bytes(b) => {
                let mut hasher = SipHasher::new();
                hasher.write(b);
                hasher.finish()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partline_core::Topic;

    #[test]
    fn test_numeric_key_is_value_mod_n() {
        let router = AffinityRouter::default();
        assert_eq!(router.index_for(&1001_i64.into(), 4).unwrap(), 1);
        assert_eq!(router.index_for(&1002_i64.into(), 4).unwrap(), 2);
        assert_eq!(router.index_for(&0_i64.into(), 4).unwrap(), 0);
        assert_eq!(router.index_for(&7_i64.into(), 1).unwrap(), 0);
    }

    #[test]
    fn test_zero_partitions_fails() {
        let router = AffinityRouter::default();
        assert!(matches!(
            router.index_for(&1_i64.into(), 0),
            Err(ClientError::NoPartitionsAvailable(_))
        ));
        assert!(matches!(
            router.select(&[], &"k".into()),
            Err(ClientError::NoPartitionsAvailable(_))
        ));
    }

    #[test]
    fn test_negative_keys() {
        let abs = AffinityRouter::new(SignNormalization::Absolute);
        let mask = AffinityRouter::new(SignNormalization::MaskSignBit);

        assert_eq!(abs.index_for(&(-5_i64).into(), 4).unwrap(), 1);
        assert_eq!(abs.index_for(&i64::MIN.into(), 3).unwrap(), {
            (i64::MIN.unsigned_abs() % 3) as u32
        });
        assert_eq!(mask.index_for(&(-1_i64).into(), 2).unwrap(), 1);

        for v in [0_i64, 1, 42, 1_000_003, i64::MAX] {
            assert_eq!(
                abs.index_for(&v.into(), 7).unwrap(),
                mask.index_for(&v.into(), 7).unwrap()
            );
        }
    }

    #[test]
    fn test_byte_keys_are_stable() {
        let router = AffinityRouter::default();
        let a = router.index_for(&"order-15103111039".into(), 16).unwrap();
        for _ in 0..10 {
            assert_eq!(router.index_for(&"order-15103111039".into(), 16).unwrap(), a);
        }
        // String and Vec<u8> keys with the same bytes route identically.
        assert_eq!(
            router.index_for(&b"order-15103111039".to_vec().into(), 16).unwrap(),
            a
        );
    }

    #[test]
    fn test_select_matches_index_for() {
        let topic = Topic::new("orders", 5);
        let router = AffinityRouter::default();
        for v in 0..50_i64 {
            let key = OrderingKey::from(v);
            let p = router.select(topic.partitions(), &key).unwrap();
            assert_eq!(p.index(), router.index_for(&key, 5).unwrap());
            assert_eq!(p.topic(), "orders");
        }
    }
}
