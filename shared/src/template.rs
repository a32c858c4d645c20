//! Agreement template rendering
//!
//! Template bodies contain `{{placeholder}}` markers (whitespace inside the
//! braces is ignored). Only the names in [`KNOWN_PLACEHOLDERS`] are allowed.

use std::collections::HashMap;
use thiserror::Error;

/// Placeholders an agreement can fill
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "agreement_number",
    "driver_name",
    "driver_email",
    "driver_licence_number",
    "vehicle_registration",
    "vehicle_make",
    "vehicle_model",
    "start_date",
    "end_date",
    "weekly_rate",
    "deposit",
    "today",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    #[error("empty placeholder at byte {0}")]
    Empty(usize),

    #[error("unknown placeholder: {0}")]
    Unknown(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Placeholder(&'a str),
}

fn parse(body: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = body;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        let after_open = &rest[start + 2..];
        let end = after_open
            .find("}}")
            .ok_or(TemplateError::Unclosed(offset + start))?;
        let name = after_open[..end].trim();
        if name.is_empty() {
            return Err(TemplateError::Empty(offset + start));
        }
        segments.push(Segment::Placeholder(name));
        let consumed = start + 2 + end + 2;
        offset += consumed;
        rest = &rest[consumed..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Distinct placeholder names in order of first appearance
pub fn placeholders(body: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for segment in parse(body)? {
        if let Segment::Placeholder(name) = segment {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Check that a template parses and uses only known placeholders
pub fn validate_template(body: &str) -> Result<(), TemplateError> {
    for name in placeholders(body)? {
        if !KNOWN_PLACEHOLDERS.contains(&name.as_str()) {
            return Err(TemplateError::Unknown(name));
        }
    }
    Ok(())
}

/// Substitute placeholder values. Placeholders without a value render as
/// an empty string.
pub fn render(body: &str, values: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(body.len());
    for segment in parse(body)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Placeholder(name) => {
                if let Some(value) = values.get(name) {
                    out.push_str(value);
                }
            }
        }
    }
    Ok(out)
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_values() {
        let mut values = HashMap::new();
        values.insert("driver_name", "Jane Doe".to_string());
        values.insert("vehicle_registration", "AB12CDE".to_string());
        let out = render(
            "Hirer: {{driver_name}} / Vehicle: {{ vehicle_registration }}.",
            &values,
        )
        .unwrap();
        assert_eq!(out, "Hirer: Jane Doe / Vehicle: AB12CDE.");
    }

    #[test]
    fn test_render_missing_value_is_empty() {
        let out = render("Deposit: {{deposit}}", &HashMap::new()).unwrap();
        assert_eq!(out, "Deposit: ");
    }

    #[test]
    fn test_placeholders_distinct_in_order() {
        let names = placeholders("{{today}} {{driver_name}} {{today}}").unwrap();
        assert_eq!(names, vec!["today", "driver_name"]);
    }

    #[test]
    fn test_validate_rejects_unknown_and_malformed() {
        assert_eq!(
            validate_template("{{driver_nmae}}"),
            Err(TemplateError::Unknown("driver_nmae".to_string()))
        );
        assert_eq!(validate_template("Hi {{driver_name"), Err(TemplateError::Unclosed(3)));
        assert_eq!(validate_template("{{  }}"), Err(TemplateError::Empty(0)));
        assert!(validate_template("Plain text with } and { braces").is_ok());
    }

    #[test]
    fn test_unicode_text_is_preserved() {
        let mut values = HashMap::new();
        values.insert("driver_name", "Zoë".to_string());
        let out = render("Café · {{driver_name}} ✓", &values).unwrap();
        assert_eq!(out, "Café · Zoë ✓");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<b>Tom & \"Jerry\"</b>"),
            "&lt;b&gt;Tom &amp; &quot;Jerry&quot;&lt;/b&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }
}
