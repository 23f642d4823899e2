#![forbid(unsafe_code)]

mod cache;

pub use cache::{ResultCache, fingerprint};

use crate::dataset::DataSet;
use crate::error::Error;
use crate::evidence::{Evidence, EvidenceField};
use rustc_hash::FxHashMap;

/// The opaque detection call. The engine composes any implementation of
/// this seam; the matching algorithm itself is an external concern.
pub trait Detector: Send + Sync {
    fn detect(
        &self,
        dataset: &DataSet,
        evidence: &[Evidence],
    ) -> Result<FxHashMap<String, String>, Error>;
}

/// Default detector: runs the data set's pattern automaton over the
/// evidence values, headers first. Deliberately simple; it exists so the
/// engine is usable out of the box, not to compete with a real matcher.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringDetector;

impl Detector for SubstringDetector {
    fn detect(
        &self,
        dataset: &DataSet,
        evidence: &[Evidence],
    ) -> Result<FxHashMap<String, String>, Error> {
        if evidence.is_empty() {
            return Err(Error::DetectionFailed("no evidence supplied".into()));
        }

        let mut haystack = String::new();
        for field in [EvidenceField::Header, EvidenceField::Query] {
            for item in evidence.iter().filter(|e| e.field == field) {
                if !haystack.is_empty() {
                    haystack.push('\n');
                }
                haystack.push_str(&item.value);
            }
        }

        Ok(dataset.lookup(&haystack).unwrap_or_default())
    }
}

/// A completed detection. Owns its property values, copied out of the data
/// set before the resource handle was released, so it may be kept or sent
/// across tasks without pinning any data generation.
#[derive(Debug, Clone)]
pub struct DeviceMatch {
    generation: u64,
    values: FxHashMap<String, String>,
}

impl DeviceMatch {
    pub(crate) fn new(generation: u64, values: FxHashMap<String, String>) -> Self {
        Self { generation, values }
    }

    /// Data generation the match was derived from.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn value(&self, property: &str) -> Option<&str> {
        self.values.get(property).map(String::as_str)
    }

    pub fn has_value(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    /// Property names in deterministic order.
    pub fn properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.values.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "uascope-data/1\n\
iPhone\tIsMobile=True;DeviceType=SmartPhone\n\
x86\tDeviceType=Desktop\n";

    fn dataset() -> DataSet {
        DataSet::parse(SAMPLE.as_bytes(), &[]).unwrap()
    }

    #[test]
    fn detects_from_header_evidence() {
        let evidence = vec![Evidence::header(
            "user-agent",
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)",
        )];
        let values = SubstringDetector.detect(&dataset(), &evidence).unwrap();
        assert_eq!(values.get("IsMobile").map(String::as_str), Some("True"));
    }

    #[test]
    fn query_evidence_participates() {
        let evidence = vec![Evidence::query("arch", "x86")];
        let values = SubstringDetector.detect(&dataset(), &evidence).unwrap();
        assert_eq!(values.get("DeviceType").map(String::as_str), Some("Desktop"));
    }

    #[test]
    fn empty_evidence_is_a_detection_failure() {
        let err = SubstringDetector.detect(&dataset(), &[]).unwrap_err();
        assert!(matches!(err, Error::DetectionFailed(_)));
    }

    #[test]
    fn no_match_without_fallback_yields_empty_values() {
        let evidence = vec![Evidence::header("user-agent", "curl/8.0")];
        let values = SubstringDetector.detect(&dataset(), &evidence).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn device_match_accessors() {
        let mut values = FxHashMap::default();
        values.insert("IsMobile".to_string(), "True".to_string());
        let m = DeviceMatch::new(3, values);

        assert_eq!(m.generation(), 3);
        assert_eq!(m.value("IsMobile"), Some("True"));
        assert!(m.has_value("IsMobile"));
        assert!(!m.has_value("BrowserName"));
        assert_eq!(m.properties(), vec!["IsMobile"]);
    }
}
