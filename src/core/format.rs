//! Input classification by filename suffix
//!
//! The same rules are emitted into the generated harness, so what a transform
//! sees at run time matches what [`classify`] returns here.

use serde_json::Value;
use std::path::Path;

/// How an input artifact is presented to a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// `.json`: parsed into a structured value
    Json,
    /// `.csv`: split into rows on `\n`, then fields on `,` (no quoting)
    Csv,
    /// `.txt`: split into lines on `\n`
    Lines,
    /// Anything else: the raw text
    Raw,
}

impl InputFormat {
    /// Classify by the (case-insensitive) suffix of `filename`
    pub fn from_filename(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("json") => InputFormat::Json,
            Some("csv") => InputFormat::Csv,
            Some("txt") => InputFormat::Lines,
            _ => InputFormat::Raw,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InputFormat::Json => "json",
            InputFormat::Csv => "csv",
            InputFormat::Lines => "lines",
            InputFormat::Raw => "raw",
        }
    }
}

/// The value a transform receives: the classified data plus the raw text
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedInput {
    pub format: InputFormat,
    pub raw: String,
    pub data: Value,
}

/// Classify `raw` according to `format`
///
/// A structured input that fails to parse degrades to the raw text.
pub fn classify(format: InputFormat, raw: &str) -> ClassifiedInput {
    let data = match format {
        InputFormat::Json => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
        InputFormat::Csv => Value::Array(
            raw.split('\n')
                .map(|line| Value::Array(line.split(',').map(|f| Value::String(f.to_string())).collect()))
                .collect(),
        ),
        InputFormat::Lines => Value::Array(raw.split('\n').map(|l| Value::String(l.to_string())).collect()),
        InputFormat::Raw => Value::String(raw.to_string()),
    };

    ClassifiedInput {
        format,
        raw: raw.to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_from_suffix() {
        assert_eq!(InputFormat::from_filename("data.json"), InputFormat::Json);
        assert_eq!(InputFormat::from_filename("DATA.JSON"), InputFormat::Json);
        assert_eq!(InputFormat::from_filename("rows.csv"), InputFormat::Csv);
        assert_eq!(InputFormat::from_filename("notes.txt"), InputFormat::Lines);
        assert_eq!(InputFormat::from_filename("blob.bin"), InputFormat::Raw);
        assert_eq!(InputFormat::from_filename("README"), InputFormat::Raw);
    }

    #[test]
    fn test_json_is_parsed() {
        let input = classify(InputFormat::Json, r#"{"a": 1}"#);
        assert_eq!(input.data, json!({"a": 1}));
        assert_eq!(input.raw, r#"{"a": 1}"#);
    }

    #[test]
    fn test_malformed_json_degrades_to_raw() {
        let input = classify(InputFormat::Json, "{not json");
        assert_eq!(input.data, json!("{not json"));
    }

    #[test]
    fn test_csv_is_split_without_quoting() {
        let input = classify(InputFormat::Csv, "a,b\n\"x,y\",z");
        assert_eq!(input.data, json!([["a", "b"], ["\"x", "y\"", "z"]]));
    }

    #[test]
    fn test_trailing_newline_keeps_empty_row() {
        let input = classify(InputFormat::Csv, "a,b\n");
        assert_eq!(input.data, json!([["a", "b"], [""]]));
    }

    #[test]
    fn test_text_is_split_into_lines() {
        let input = classify(InputFormat::Lines, "one\ntwo");
        assert_eq!(input.data, json!(["one", "two"]));
    }

    #[test]
    fn test_unknown_suffix_keeps_raw_text() {
        let input = classify(InputFormat::from_filename("x.yaml"), "a: 1");
        assert_eq!(input.data, json!("a: 1"));
    }
}
