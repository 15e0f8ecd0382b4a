//! Stable identity for samples.
//!
//! A fingerprint is computed from the canonical form
//! `kind|name[|k1=v1;k2=v2...]` with label keys in lexical order. The value
//! and the histogram bucket definition are not part of it, so two `hl`
//! samples that differ only in bucket layout share one series.
//!
//! The algorithm is a strategy chosen once at startup and injected into the
//! collector.

use crate::core::{Sample, TallyError};
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use smallvec::SmallVec;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

const PARTS_SEPARATOR: &[u8] = b"|";
const LABELS_SEPARATOR: &[u8] = b";";
const KEY_VALUE_SEPARATOR: &[u8] = b"=";

/// Byte fingerprint of a series. Equal fingerprints mean the same series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(SmallVec<[u8; 16]>);

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(SmallVec::from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Maps a sample's identity fields to a fingerprint.
///
/// Implementations must be pure: the same kind, name and label set always
/// produce the same bytes, whatever order the labels were inserted in.
pub trait Fingerprinter: Send + Sync {
    /// Compute the fingerprint of a sample
    fn fingerprint(&self, sample: &Sample) -> Fingerprint;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Feeds the canonical form of `sample` to `write`, chunk by chunk.
fn write_canonical(sample: &Sample, mut write: impl FnMut(&[u8])) {
    write(sample.kind.symbol().as_bytes());
    write(PARTS_SEPARATOR);
    write(sample.name.as_bytes());

    if sample.labels.is_empty() {
        return;
    }
    write(PARTS_SEPARATOR);

    for (i, (key, value)) in sample.sorted_labels().into_iter().enumerate() {
        if i > 0 {
            write(LABELS_SEPARATOR);
        }
        write(key.as_bytes());
        write(KEY_VALUE_SEPARATOR);
        write(value.as_bytes());
    }
}

/// FNV-1a 64-bit streaming hash, the high-throughput default.
///
/// Output is the 64-bit state in little-endian order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FnvFingerprinter;

impl Fingerprinter for FnvFingerprinter {
    fn fingerprint(&self, sample: &Sample) -> Fingerprint {
        let mut hasher = FnvHasher::default();
        write_canonical(sample, |bytes| hasher.write(bytes));
        Fingerprint::from_bytes(&hasher.finish().to_le_bytes())
    }

    fn name(&self) -> &'static str {
        "fnv"
    }
}

/// SHA-256 of the canonical form truncated to 128 bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint(&self, sample: &Sample) -> Fingerprint {
        let mut hasher = Sha256::new();
        write_canonical(sample, |bytes| hasher.update(bytes));
        let digest = hasher.finalize();
        Fingerprint::from_bytes(&digest[..16])
    }

    fn name(&self) -> &'static str {
        "sha256"
    }
}

/// Named fingerprint algorithm selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HasherKind {
    /// FNV-1a 64
    #[default]
    #[serde(alias = "prom")]
    Fnv,
    /// SHA-256 truncated to 128 bits
    Sha256,
}

impl HasherKind {
    /// Instantiate the strategy
    pub fn build(self) -> Arc<dyn Fingerprinter> {
        match self {
            HasherKind::Fnv => Arc::new(FnvFingerprinter),
            HasherKind::Sha256 => Arc::new(Sha256Fingerprinter),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HasherKind::Fnv => "fnv",
            HasherKind::Sha256 => "sha256",
        }
    }
}

impl std::str::FromStr for HasherKind {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            // "prom" is the name the FNV variant is known by in older deployments
            "fnv" | "prom" => Ok(HasherKind::Fnv),
            "sha256" => Ok(HasherKind::Sha256),
            other => Err(TallyError::config(format!("Unknown hashing implementation: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HistogramDef, Labels, SampleKind};

    const OFFSET_BASIS: u64 = 14695981039346656037;
    const PRIME: u64 = 1099511628211;

    fn reference_fnv(input: &str) -> [u8; 8] {
        let mut h = OFFSET_BASIS;
        for byte in input.bytes() {
            h ^= u64::from(byte);
            h = h.wrapping_mul(PRIME);
        }
        h.to_le_bytes()
    }

    fn labelled(pairs: &[(&str, &str)]) -> Sample {
        let labels: Labels = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Sample::new("name_of_1_metric_total", SampleKind::Counter, labels, 1.0)
    }

    #[test]
    fn test_fnv_matches_reference_on_canonical_form() {
        let sample = labelled(&[("service", "srvA1"), ("host", "hostA")]);
        let fp = FnvFingerprinter.fingerprint(&sample);

        let expected = reference_fnv("c|name_of_1_metric_total|host=hostA;service=srvA1");
        assert_eq!(fp.as_bytes(), &expected);
    }

    #[test]
    fn test_no_labels_omits_trailing_separator() {
        let sample = Sample::gauge("name_of_3_metric", 7.3);
        let fp = FnvFingerprinter.fingerprint(&sample);
        assert_eq!(fp.as_bytes(), &reference_fnv("g|name_of_3_metric"));
    }

    #[test]
    fn test_label_order_does_not_matter() {
        let a = labelled(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let b = labelled(&[("c", "3"), ("a", "1"), ("b", "2")]);

        for strategy in [HasherKind::Fnv.build(), HasherKind::Sha256.build()] {
            assert_eq!(strategy.fingerprint(&a), strategy.fingerprint(&b), "{}", strategy.name());
        }
    }

    #[test]
    fn test_value_is_excluded() {
        let mut a = labelled(&[("a", "1")]);
        let b = a.clone();
        a.value = 99.0;
        assert_eq!(FnvFingerprinter.fingerprint(&a), FnvFingerprinter.fingerprint(&b));
        assert_eq!(Sha256Fingerprinter.fingerprint(&a), Sha256Fingerprinter.fingerprint(&b));
    }

    #[test]
    fn test_kind_name_and_labels_are_included() {
        let base = labelled(&[("a", "1")]);

        let mut other_kind = base.clone();
        other_kind.kind = SampleKind::Gauge;
        let mut other_name = base.clone();
        other_name.name = "other".to_string();
        let other_label = labelled(&[("a", "2")]);

        for strategy in [HasherKind::Fnv.build(), HasherKind::Sha256.build()] {
            let fp = strategy.fingerprint(&base);
            assert_ne!(fp, strategy.fingerprint(&other_kind));
            assert_ne!(fp, strategy.fingerprint(&other_name));
            assert_ne!(fp, strategy.fingerprint(&other_label));
        }
    }

    #[test]
    fn test_histogram_def_is_not_part_of_identity() {
        let a = Sample::histogram_linear("duration_ms", HistogramDef::new("3.3", "2.0", "5"), 1.0);
        let b = Sample::histogram_linear("duration_ms", HistogramDef::new("0", "10", "3"), 1.0);
        assert_eq!(FnvFingerprinter.fingerprint(&a), FnvFingerprinter.fingerprint(&b));
    }

    #[test]
    fn test_fingerprint_lengths() {
        let sample = labelled(&[]);
        assert_eq!(FnvFingerprinter.fingerprint(&sample).len(), 8);
        assert_eq!(Sha256Fingerprinter.fingerprint(&sample).len(), 16);
        assert_eq!(FnvFingerprinter.fingerprint(&sample).to_string().len(), 16);
    }

    #[test]
    fn test_hasher_kind_from_str() {
        assert_eq!("fnv".parse::<HasherKind>().unwrap(), HasherKind::Fnv);
        assert_eq!("prom".parse::<HasherKind>().unwrap(), HasherKind::Fnv);
        assert_eq!("SHA256".parse::<HasherKind>().unwrap(), HasherKind::Sha256);
        assert!("md4".parse::<HasherKind>().is_err());
    }
}
