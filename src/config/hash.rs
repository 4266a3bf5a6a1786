//! Attribute fingerprinting for change detection.
//!
//! This module provides deterministic hashing of declared resource
//! attributes to detect changes between runs and enable idempotent
//! operations. Values are fed to the hasher with type tags so that, for
//! example, the string `"${a.b}"` and a typed reference to `a.b` never
//! collide.

use sha2::{Digest, Sha256};

use crate::graph::{AttrValue, Resource};

/// Hasher for computing declaration fingerprints.
#[derive(Debug, Default)]
pub struct Fingerprinter;

// Type tags for unambiguous value encoding.
const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_LIST: u8 = 5;
const TAG_MAP: u8 = 6;
const TAG_REF: u8 = 7;

impl Fingerprinter {
    /// Creates a new fingerprinter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a declared resource.
    ///
    /// Covers the kind and attributes; the id is the lookup key and the
    /// dependency list does not affect the provisioned object itself.
    #[must_use]
    pub fn fingerprint_resource(&self, resource: &Resource) -> String {
        let mut hasher = Sha256::new();

        hasher.update(resource.kind.to_string().as_bytes());
        hasher.update([0xff]);
        for (key, value) in &resource.attributes {
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key.as_bytes());
            Self::feed_value(&mut hasher, value);
        }

        hex::encode(hasher.finalize())
    }

    /// Computes the fingerprint of an entire declaration set, in
    /// declaration order.
    #[must_use]
    pub fn fingerprint_all<'a>(
        &self,
        resources: impl IntoIterator<Item = &'a Resource>,
    ) -> String {
        let mut hasher = Sha256::new();
        for resource in resources {
            hasher.update((resource.id.len() as u64).to_be_bytes());
            hasher.update(resource.id.as_bytes());
            hasher.update(self.fingerprint_resource(resource).as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Feeds a single attribute value into the hasher.
    fn feed_value(hasher: &mut Sha256, value: &AttrValue) {
        match value {
            AttrValue::Null => hasher.update([TAG_NULL]),
            AttrValue::Bool(b) => {
                hasher.update([TAG_BOOL]);
                hasher.update([u8::from(*b)]);
            }
            AttrValue::Int(i) => {
                hasher.update([TAG_INT]);
                hasher.update(i.to_be_bytes());
            }
            AttrValue::Float(f) => {
                hasher.update([TAG_FLOAT]);
                hasher.update(f.to_be_bytes());
            }
            AttrValue::String(s) => {
                hasher.update([TAG_STRING]);
                hasher.update((s.len() as u64).to_be_bytes());
                hasher.update(s.as_bytes());
            }
            AttrValue::List(items) => {
                hasher.update([TAG_LIST]);
                hasher.update((items.len() as u64).to_be_bytes());
                for item in items {
                    Self::feed_value(hasher, item);
                }
            }
            AttrValue::Map(map) => {
                hasher.update([TAG_MAP]);
                hasher.update((map.len() as u64).to_be_bytes());
                // BTreeMap iteration is already key-sorted.
                for (key, val) in map {
                    hasher.update((key.len() as u64).to_be_bytes());
                    hasher.update(key.as_bytes());
                    Self::feed_value(hasher, val);
                }
            }
            AttrValue::Ref(reference) => {
                hasher.update([TAG_REF]);
                hasher.update((reference.target.len() as u64).to_be_bytes());
                hasher.update(reference.target.as_bytes());
                hasher.update((reference.attribute.len() as u64).to_be_bytes());
                hasher.update(reference.attribute.as_bytes());
            }
        }
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two fingerprints for equality.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        // Constant-time comparison
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}
