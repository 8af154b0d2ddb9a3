//! Samples, their identities, and the feature store they live in.
//!
//! A [`Sample`] is a content identity plus a bag of named features computed
//! elsewhere (PE parsing, signature matching, fuzzy hashing). The index
//! backends only read the features they need: `ctph.digest` for the
//! fuzzy-hash index, a numeric vector for PDCI.

mod store;

pub use store::{SampleStore, SqliteSampleStore};

use crate::error::{IndexError, Result};
use crate::vectorize::SparseRow;
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Feature name under which the CTPH digest is stored.
pub const CTPH_DIGEST_FEATURE: &str = "ctph.digest";

/// Content identity of a sample: an uppercase hex digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleId(String);

impl SampleId {
    /// Accept a precomputed hex digest, normalizing it to uppercase.
    pub fn new(hex_digest: impl AsRef<str>) -> Result<Self> {
        let s = hex_digest.as_ref().trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(IndexError::InvalidIdentity(s.to_string()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// SHA-256 of the content, uppercase hex.
    pub fn of_content(content: &[u8]) -> Self {
        Self(hex::encode_upper(Sha256::digest(content)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    Text(String),
    Int(i64),
    Float(f64),
    Vector(Vec<f32>),
    Sparse(SparseRow),
    List(Vec<String>),
}

/// A sample: identity plus named features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    id: SampleId,
    features: BTreeMap<String, FeatureValue>,
}

impl Sample {
    pub fn new(id: SampleId) -> Self {
        Self {
            id,
            features: BTreeMap::new(),
        }
    }

    /// New sample identified by the SHA-256 of `content`.
    pub fn from_content(content: &[u8]) -> Self {
        Self::new(SampleId::of_content(content))
    }

    pub fn id(&self) -> &SampleId {
        &self.id
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// Text feature, if present and textual.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        match self.features.get(name) {
            Some(FeatureValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Insert or replace a feature.
    pub fn add(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.features.insert(name.into(), value);
    }

    /// Builder form of [`Sample::add`].
    pub fn with(mut self, name: impl Into<String>, value: FeatureValue) -> Self {
        self.add(name, value);
        self
    }

    pub fn features(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.features.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Text feature or a `MissingFeature` error.
    pub(crate) fn require_text(&self, name: &str) -> Result<&str> {
        self.get_text(name).ok_or_else(|| IndexError::MissingFeature {
            identity: self.id.to_string(),
            feature: name.to_string(),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_uppercase_sha256() {
        let id = SampleId::of_content(b"abc");
        assert_eq!(
            id.as_str(),
            "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
        );
    }

    #[test]
    fn precomputed_identity_is_normalized() {
        let id = SampleId::new("deadBEEF").unwrap();
        assert_eq!(id.as_str(), "DEADBEEF");
        assert!(matches!(
            SampleId::new("not-hex"),
            Err(IndexError::InvalidIdentity(_))
        ));
        assert!(SampleId::new("").is_err());
    }

    #[test]
    fn features_survive_serialization() {
        let sample = Sample::from_content(b"MZ\x90\x00")
            .with(CTPH_DIGEST_FEATURE, FeatureValue::Text("3:abc:def".into()))
            .with("vector", FeatureValue::Vector(vec![0.5, 1.5]))
            .with("imports", FeatureValue::List(vec!["kernel32.dll".into()]))
            .with("size", FeatureValue::Int(4));

        let bytes = sample.serialize().unwrap();
        let back = Sample::deserialize(&bytes).unwrap();
        assert_eq!(back, sample);
        assert_eq!(back.get_text(CTPH_DIGEST_FEATURE), Some("3:abc:def"));
    }

    #[test]
    fn stored_sparse_row_out_of_range_is_rejected() {
        // wire-compatible stand-in that skips SparseRow's checks
        #[derive(Serialize)]
        #[allow(dead_code)]
        enum Unchecked {
            Text(String),
            Int(i64),
            Float(f64),
            Vector(Vec<f32>),
            Sparse(usize, Vec<u32>, Vec<f32>),
        }

        let id = SampleId::of_content(b"sparse");
        let mut features = BTreeMap::new();
        features.insert("vector".to_string(), Unchecked::Sparse(3, vec![7], vec![1.0]));
        let bytes = postcard::to_allocvec(&(id, features)).unwrap();

        assert!(matches!(
            Sample::deserialize(&bytes),
            Err(IndexError::Serialization(_))
        ));
    }

    #[test]
    fn missing_text_feature_is_reported() {
        let sample = Sample::from_content(b"x").with("size", FeatureValue::Int(1));
        let err = sample.require_text("size").unwrap_err();
        assert!(matches!(err, IndexError::MissingFeature { .. }));
    }
}
