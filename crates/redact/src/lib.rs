//! Size-bounded field redaction.
//!
//! The truncator walks a payload depth-first and replaces oversize string
//! values with a bounded prefix plus a sentinel, either because the field
//! name is on the configured list or because the string is both huge and
//! base64-shaped. Structure is never altered: the redacted payload has
//! exactly the same set of paths as the original, and only terminal string
//! values change.

use serde_json::Value;

use hookforge_config::TruncateConfig;
use hookforge_core::{
    RedactTag, Redaction, RedactionReport, TRUNCATION_SENTINEL,
};

/// Strings beyond `auto_threshold()` that look like base64 are truncated
/// regardless of field name.
const AUTO_THRESHOLD_FACTOR: usize = 10;

/// Minimum length for the base64 shape heuristic to fire.
const BASE64_MIN_LEN: usize = 20;

pub struct Truncator {
    max_length: usize,
    /// Lower-cased name fragments matched against the final path segment.
    fields: Vec<String>,
}

impl Truncator {
    pub fn new(cfg: &TruncateConfig) -> Self {
        Self {
            max_length: cfg.max_length,
            fields: cfg.fields.iter().map(|f| f.to_lowercase()).collect(),
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn auto_threshold(&self) -> usize {
        self.max_length * AUTO_THRESHOLD_FACTOR
    }

    /// Redact a payload, returning the rewritten value and the report of
    /// every truncation applied.
    pub fn redact(&self, payload: &Value) -> (Value, RedactionReport) {
        let mut report = RedactionReport::default();
        let redacted = self.walk(payload, "", &mut report);
        (redacted, report)
    }

    fn walk(
        &self,
        value: &Value,
        path: &str,
        report: &mut RedactionReport,
    ) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, child) in map {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{path}.{key}")
                    };
                    out.insert(
                        key.clone(),
                        self.walk(child, &child_path, report),
                    );
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        self.walk(item, &format!("{path}[{i}]"), report)
                    })
                    .collect(),
            ),
            Value::String(s) => self.visit_string(s, path, report),
            other => other.clone(),
        }
    }

    fn visit_string(
        &self,
        s: &str,
        path: &str,
        report: &mut RedactionReport,
    ) -> Value {
        let chars = s.chars().count();

        let by_name =
            chars > self.max_length && self.name_matches(path);
        let by_shape =
            chars > self.auto_threshold() && looks_like_base64(s);

        if !by_name && !by_shape {
            return Value::String(s.to_string());
        }

        let kept: String = s.chars().take(self.max_length).collect();
        let redacted = format!("{kept}{TRUNCATION_SENTINEL}");
        report.push(Redaction {
            path: path.to_string(),
            original_length: chars,
            redacted_length: redacted.chars().count(),
            tag: classify_string(s),
        });
        Value::String(redacted)
    }

    /// Does the final path segment (array indices stripped) contain any of
    /// the configured name fragments?
    fn name_matches(&self, path: &str) -> bool {
        let segment = trailing_segment(path).to_lowercase();
        self.fields.iter().any(|f| segment.contains(f.as_str()))
    }
}

/// Final segment of a dotted path with trailing `[idx]` suffixes removed.
fn trailing_segment(path: &str) -> &str {
    let last = path.rsplit('.').next().unwrap_or(path);
    match last.find('[') {
        Some(pos) => &last[..pos],
        None => last,
    }
}

/// Shape heuristic: long enough, a multiple of four, and drawn entirely from
/// the base64 alphabet with optional `=` padding at the end.
pub fn looks_like_base64(s: &str) -> bool {
    let len = s.len();
    if len < BASE64_MIN_LEN || len % 4 != 0 {
        return false;
    }
    let trimmed = s.trim_end_matches('=');
    if s.len() - trimmed.len() > 2 || trimmed.is_empty() {
        return false;
    }
    trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
}

/// Tag the probable content of a string that is about to be truncated.
fn classify_string(s: &str) -> RedactTag {
    if looks_like_base64(s) {
        return RedactTag::Base64;
    }
    if parses_as_json_container(s) {
        return RedactTag::Json;
    }
    RedactTag::Text
}

/// Does the string, considered alone, parse to a JSON object or array?
fn parses_as_json_container(s: &str) -> bool {
    let trimmed = s.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return false;
    }
    matches!(
        serde_json::from_str::<Value>(s),
        Ok(Value::Object(_)) | Ok(Value::Array(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn truncator() -> Truncator {
        Truncator::new(&TruncateConfig::default())
    }

    fn base64_blob(len: usize) -> String {
        // Multiple of 4 by construction when len is
        "ABCD".repeat(len / 4)
    }

    fn paths_of(value: &Value) -> Vec<String> {
        fn collect(v: &Value, path: &str, out: &mut Vec<String>) {
            out.push(path.to_string());
            match v {
                Value::Object(m) => {
                    for (k, c) in m {
                        let p = if path.is_empty() {
                            k.clone()
                        } else {
                            format!("{path}.{k}")
                        };
                        collect(c, &p, out);
                    }
                }
                Value::Array(items) => {
                    for (i, c) in items.iter().enumerate() {
                        collect(c, &format!("{path}[{i}]"), out);
                    }
                }
                _ => {}
            }
        }
        let mut out = Vec::new();
        collect(value, "", &mut out);
        out.sort();
        out
    }

    #[test]
    fn short_strings_in_listed_fields_are_untouched() {
        let payload = json!({ "image": "tiny" });
        let (redacted, report) = truncator().redact(&payload);
        assert_eq!(redacted, payload);
        assert!(report.is_empty());
    }

    #[test]
    fn long_listed_field_is_truncated() {
        let blob = base64_blob(20_000);
        let payload = json!({ "image": blob });
        let (redacted, report) = truncator().redact(&payload);

        let value = redacted["image"].as_str().unwrap();
        assert!(value.ends_with(TRUNCATION_SENTINEL));
        assert_eq!(value.chars().count(), 100 + TRUNCATION_SENTINEL.len());

        let r = report.get("image").unwrap();
        assert_eq!(r.original_length, 20_000);
        assert_eq!(r.tag, RedactTag::Base64);
    }

    #[test]
    fn listed_name_matches_as_substring_of_trailing_segment() {
        let blob = "x".repeat(501); // not base64-shaped (len % 4 != 0)
        let payload = json!({ "media": { "profileThumbnailUrl": blob } });
        let (redacted, report) = truncator().redact(&payload);

        assert!(redacted["media"]["profileThumbnailUrl"]
            .as_str()
            .unwrap()
            .ends_with(TRUNCATION_SENTINEL));
        assert_eq!(
            report.get("media.profileThumbnailUrl").unwrap().tag,
            RedactTag::Text
        );
    }

    #[test]
    fn unlisted_field_at_boundary_lengths_is_untouched() {
        let at_max = "x".repeat(100);
        let over_max = "y".repeat(101);
        let payload = json!({ "note": at_max, "memo": over_max });
        let (redacted, report) = truncator().redact(&payload);
        assert_eq!(redacted, payload);
        assert!(report.is_empty());
    }

    #[test]
    fn huge_base64_truncates_regardless_of_name() {
        let blob = base64_blob(1004); // > 10 * max_length, base64-shaped
        let payload = json!({ "anything": blob });
        let (redacted, report) = truncator().redact(&payload);

        assert!(redacted["anything"]
            .as_str()
            .unwrap()
            .ends_with(TRUNCATION_SENTINEL));
        assert_eq!(report.get("anything").unwrap().tag, RedactTag::Base64);
    }

    #[test]
    fn huge_non_base64_is_untouched_when_unlisted() {
        let text = "hello world! ".repeat(100); // spaces break the alphabet
        let payload = json!({ "anything": text });
        let (redacted, report) = truncator().redact(&payload);
        assert_eq!(redacted, payload);
        assert!(report.is_empty());
    }

    #[test]
    fn json_payload_in_listed_field_gets_json_tag() {
        let embedded =
            format!("{{\"inner\": \"{}\"}}", "z".repeat(200));
        let payload = json!({ "data": embedded });
        let (_, report) = truncator().redact(&payload);
        assert_eq!(report.get("data").unwrap().tag, RedactTag::Json);
    }

    #[test]
    fn structure_is_preserved() {
        let payload = json!({
            "a": { "image": base64_blob(2000), "n": 7 },
            "list": [ { "thumbnail": base64_blob(2000) }, 1, true, null ]
        });
        let (redacted, _) = truncator().redact(&payload);
        assert_eq!(paths_of(&payload), paths_of(&redacted));
        assert_eq!(redacted["a"]["n"], json!(7));
        assert_eq!(redacted["list"][1], json!(1));
        assert_eq!(redacted["list"][2], json!(true));
        assert_eq!(redacted["list"][3], json!(null));
    }

    #[test]
    fn redaction_is_idempotent() {
        let payload = json!({
            "image": base64_blob(20_000),
            "data": "q".repeat(333),
            "nested": [ { "base64Audio": base64_blob(4000) } ]
        });
        let t = truncator();
        let (once, _) = t.redact(&payload);
        let (twice, report) = t.redact(&once);
        assert_eq!(once, twice);
        // Second pass re-reports the already-short strings or not at all;
        // either way the values are fixed points.
        let _ = report;
    }

    #[test]
    fn array_indices_are_stripped_before_name_matching() {
        let payload = json!({ "images": ["ok", "p".repeat(150)] });
        let (redacted, report) = truncator().redact(&payload);
        assert!(redacted["images"][1]
            .as_str()
            .unwrap()
            .ends_with(TRUNCATION_SENTINEL));
        assert!(report.contains("images[1]"));
        assert_eq!(redacted["images"][0], json!("ok"));
    }

    #[test]
    fn base64_heuristic_edges() {
        assert!(looks_like_base64(&"ABCD".repeat(5)));
        assert!(looks_like_base64(&format!("{}==", "A".repeat(18))));
        assert!(!looks_like_base64("short"));
        assert!(!looks_like_base64(&"ABC".repeat(7))); // not a multiple of 4
        assert!(!looks_like_base64(&format!("{} {}", "A".repeat(10), "B".repeat(9))));
        assert!(!looks_like_base64(&"=".repeat(24)));
    }
}
