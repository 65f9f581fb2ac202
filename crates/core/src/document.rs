//! Normalized recognition result (`analyzeResult` schema).
//!
//! Layout-style services already answer in this shape and are stored as they
//! come back. Reading is lenient: only `analyzeResult.readResults` is
//! required, and unknown fields at every level are kept. Services that answer
//! with a flat list of recognized regions are converted by
//! [`normalize_regions`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    pub analyze_result: AnalyzeResult,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub read_results: Vec<ReadResult>,
    #[serde(default)]
    pub page_results: Vec<PageResult>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResult {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub angle: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub lines: Vec<TextLine>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    #[serde(default)]
    pub bounding_box: Vec<f64>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub page: u32,
    #[serde(default)]
    pub tables: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OcrDocument {
    pub fn line_count(&self) -> usize {
        self.analyze_result
            .read_results
            .iter()
            .map(|r| r.lines.len())
            .sum()
    }

    /// Recognized text, one line per entry, pages in order.
    pub fn text(&self) -> String {
        self.analyze_result
            .read_results
            .iter()
            .flat_map(|r| r.lines.iter().map(|l| l.text.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A cached result is usable when it carries `analyzeResult.readResults`.
pub fn is_valid_ocr_format(value: &Value) -> bool {
    value
        .get("analyzeResult")
        .and_then(|a| a.get("readResults"))
        .map(|r| !r.is_null() && r != &Value::Bool(false))
        .unwrap_or(false)
}

/// Flat answer of region-list services.
#[derive(Debug, Clone, Deserialize)]
pub struct RegionResponse {
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub results: Vec<RecognizedRegion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognizedRegion {
    /// Corner points as `[x, y]` pairs.
    pub text_region: Vec<Vec<f64>>,
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RegionResponse {
    pub fn is_success(&self) -> bool {
        self.msg.eq_ignore_ascii_case("success")
    }
}

/// Converts a region-list answer into a single-page `analyzeResult` document.
pub fn normalize_regions(resp: RegionResponse, api_version: &str) -> OcrDocument {
    let lines = resp
        .results
        .into_iter()
        .map(|region| TextLine {
            bounding_box: region.text_region.into_iter().flatten().collect(),
            text: region.text,
            confidence: region.confidence,
            extra: Map::new(),
        })
        .collect();
    OcrDocument {
        code: resp.code,
        msg: Some(resp.msg),
        analyze_result: AnalyzeResult {
            version: Some(api_version.to_string()),
            read_results: vec![ReadResult {
                page: 1,
                angle: 0.0,
                width: resp.width,
                height: resp.height,
                unit: "pixel".to_string(),
                lines,
                extra: Map::new(),
            }],
            page_results: vec![PageResult {
                page: 1,
                tables: Vec::new(),
                extra: Map::new(),
            }],
            extra: Map::new(),
        },
        extra: Map::new(),
    }
}

/// Serializes with four-space indentation, the layout sidecars are written in.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
