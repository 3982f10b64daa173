//! Event-kind and identifier sanitization.
//!
//! Event kinds double as filesystem paths (`/` becomes a subdirectory) and as
//! the seed for generated type identifiers, so both forms have to be safe:
//! path segments may only contain alphanumerics and underscores, and type
//! identifiers must be valid in the artifact language.

/// Sanitize a single kind segment: every non-alphanumeric byte becomes `_`.
///
/// An empty (or all-invalid) segment collapses to `"_"` so that the joined
/// kind never produces an empty path component.
pub fn sanitize_segment(segment: &str) -> String {
    let out: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

/// Sanitize a full event kind, preserving `/` as the hierarchy separator.
pub fn sanitize_kind(kind: &str) -> String {
    kind.split('/')
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Pascal-case a string: split on non-alphanumerics, capitalize each word.
///
/// `messages_image` becomes `MessagesImage`; `z-api` becomes `ZApi`.
pub fn pascal_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut upper_next = true;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if upper_next {
                out.extend(c.to_uppercase());
                upper_next = false;
            } else {
                out.push(c);
            }
        } else {
            upper_next = true;
        }
    }
    out
}
