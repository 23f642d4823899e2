#![forbid(unsafe_code)]

use crate::error::Error;
use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use rustc_hash::FxHashMap;

/// First line every data file must carry. Anything else is rejected before
/// the payload can reach the resource manager.
pub const DATA_MAGIC: &str = "uascope-data/1";

/// Pattern reserved for the fallback rule whose properties apply when no
/// other pattern matches the evidence.
const FALLBACK_PATTERN: &str = "*";

/// One detection rule: a pattern matched against the evidence and the
/// property values reported when it wins.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: String,
    pub properties: Vec<(String, String)>,
}

/// The in-memory representation of one loaded data file generation. Built
/// once at load time and never mutated afterwards; detection only reads.
pub struct DataSet {
    rules: Vec<Rule>,
    fallback: Vec<(String, String)>,
    matcher: AhoCorasick,
}

impl DataSet {
    /// Parse and validate a raw payload. `properties`, when non-empty,
    /// restricts which property names survive parsing.
    pub fn parse(raw: &[u8], properties: &[String]) -> Result<Self, Error> {
        if raw.is_empty() {
            return Err(Error::InvalidPayload("payload is empty".into()));
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::InvalidPayload("payload is not valid UTF-8".into()))?;

        let mut lines = text.lines();
        match lines.next().map(str::trim) {
            Some(DATA_MAGIC) => {}
            _ => {
                return Err(Error::InvalidPayload(format!(
                    "missing '{DATA_MAGIC}' header"
                )));
            }
        }

        let mut rules = Vec::new();
        let mut fallback = Vec::new();
        for (index, line) in lines.enumerate() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (pattern, props) = line.split_once('\t').ok_or_else(|| {
                Error::InvalidPayload(format!("rule on line {} has no properties", index + 2))
            })?;
            let parsed = parse_properties(props, properties)
                .map_err(|reason| Error::InvalidPayload(format!("line {}: {reason}", index + 2)))?;
            if parsed.is_empty() {
                // Every property filtered out by the restriction list.
                continue;
            }
            if pattern == FALLBACK_PATTERN {
                fallback = parsed;
            } else {
                rules.push(Rule {
                    pattern: pattern.to_string(),
                    properties: parsed,
                });
            }
        }

        if rules.is_empty() && fallback.is_empty() {
            return Err(Error::InvalidPayload("data file contains no rules".into()));
        }

        let matcher = AhoCorasickBuilder::new()
            .ascii_case_insensitive(true)
            .build(rules.iter().map(|rule| rule.pattern.as_str()))
            .map_err(|err| Error::InvalidPayload(format!("pattern compilation failed: {err}")))?;

        Ok(Self {
            rules,
            fallback,
            matcher,
        })
    }

    /// Properties for the longest pattern occurring in `haystack`, layered
    /// over the fallback properties. `None` when nothing matches and no
    /// fallback rule exists.
    pub fn lookup(&self, haystack: &str) -> Option<FxHashMap<String, String>> {
        let winner = self
            .matcher
            .find_overlapping_iter(haystack)
            .max_by_key(|m| m.len());

        if winner.is_none() && self.fallback.is_empty() {
            return None;
        }

        let mut values: FxHashMap<String, String> = self
            .fallback
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(m) = winner {
            for (key, value) in &self.rules[m.pattern().as_usize()].properties {
                values.insert(key.clone(), value.clone());
            }
        }
        Some(values)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl std::fmt::Debug for DataSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSet")
            .field("rules", &self.rules.len())
            .field("has_fallback", &!self.fallback.is_empty())
            .finish()
    }
}

/// Hex blake3 digest of a raw payload; the identity used for idempotent
/// swap detection.
pub fn checksum(raw: &[u8]) -> String {
    blake3::hash(raw).to_hex().to_string()
}

/// Parse `Key=Value;Key=Value`, keeping only restricted properties when a
/// restriction list is given. An empty result after restriction is fine
/// (the rule is skipped); a list with no well-formed property at all is a
/// payload error.
fn parse_properties(
    props: &str,
    restriction: &[String],
) -> Result<Vec<(String, String)>, String> {
    let mut properties = Vec::new();
    let mut seen = 0usize;
    for part in props.split(';') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| format!("property '{part}' is not Key=Value"))?;
        seen += 1;
        if !restriction.is_empty() && !restriction.iter().any(|p| p == key) {
            continue;
        }
        properties.push((key.to_string(), value.to_string()));
    }
    if seen == 0 {
        return Err("rule has no properties".into());
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "uascope-data/1\n\
# comment line\n\
iPhone\tIsMobile=True;DeviceType=SmartPhone;BrowserName=Safari\n\
Windows NT\tIsMobile=False;DeviceType=Desktop\n\
*\tIsMobile=Unknown;DeviceType=Unknown\n";

    #[test]
    fn parses_rules_and_fallback() {
        let dataset = DataSet::parse(SAMPLE.as_bytes(), &[]).unwrap();
        assert_eq!(dataset.rule_count(), 2);

        let values = dataset
            .lookup("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)")
            .unwrap();
        assert_eq!(values.get("IsMobile").map(String::as_str), Some("True"));
        assert_eq!(
            values.get("DeviceType").map(String::as_str),
            Some("SmartPhone")
        );
    }

    #[test]
    fn fallback_applies_when_nothing_matches() {
        let dataset = DataSet::parse(SAMPLE.as_bytes(), &[]).unwrap();
        let values = dataset.lookup("curl/8.0").unwrap();
        assert_eq!(values.get("IsMobile").map(String::as_str), Some("Unknown"));
    }

    #[test]
    fn longest_pattern_wins() {
        let data = "uascope-data/1\n\
Mac\tDeviceType=Desktop\n\
Macintosh\tDeviceType=Workstation\n";
        let dataset = DataSet::parse(data.as_bytes(), &[]).unwrap();
        let values = dataset.lookup("Mozilla/5.0 (Macintosh; Intel)").unwrap();
        assert_eq!(
            values.get("DeviceType").map(String::as_str),
            Some("Workstation")
        );
    }

    #[test]
    fn property_restriction_drops_other_keys() {
        let restriction = vec!["IsMobile".to_string()];
        let dataset = DataSet::parse(SAMPLE.as_bytes(), &restriction).unwrap();
        let values = dataset.lookup("iPhone").unwrap();
        assert!(values.contains_key("IsMobile"));
        assert!(!values.contains_key("DeviceType"));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(
            DataSet::parse(b"", &[]),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_missing_magic() {
        assert!(matches!(
            DataSet::parse(b"not-a-data-file\niPhone\tIsMobile=True\n", &[]),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn rejects_rule_without_properties() {
        let data = "uascope-data/1\niPhone\n";
        assert!(matches!(
            DataSet::parse(data.as_bytes(), &[]),
            Err(Error::InvalidPayload(_))
        ));
    }

    #[test]
    fn checksum_is_stable_and_content_sensitive() {
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
    }
}
