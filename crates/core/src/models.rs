use serde::{Deserialize, Serialize};

/// Suffix of the label sidecar stored next to an asset.
pub const LABEL_FILE_EXTENSION: &str = ".labels.json";
/// Suffix of the cached recognition result stored next to an asset.
pub const OCR_FILE_EXTENSION: &str = ".ocr.json";

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetType {
    Unknown,
    Image,
    Video,
    VideoFrame,
    TFRecord,
    PDF,
    TIFF,
}

impl AssetType {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" => AssetType::Image,
            "tif" | "tiff" => AssetType::TIFF,
            "pdf" => AssetType::PDF,
            "mp4" | "mov" | "avi" | "m4v" | "mpg" | "wmv" => AssetType::Video,
            "tfrecord" => AssetType::TFRecord,
            _ => AssetType::Unknown,
        }
    }

    /// Only images, TIFFs and PDFs can be labeled.
    pub fn is_supported(self) -> bool {
        matches!(self, AssetType::Image | AssetType::TIFF | AssetType::PDF)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetState {
    NotVisited,
    Visited,
    Tagged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LabelingState {
    ManuallyLabeled,
    AutoLabeled,
    AutoLabeledAndAdjusted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub path: String,
    pub format: String,
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub state: AssetState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeling_state: Option<LabelingState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl Asset {
    /// Builds an unvisited asset for the object at `key`, reachable at `url`.
    pub fn from_file_path(url: &str, key: &str) -> Self {
        let name = decode_key(key);
        let format = extension(&name).to_lowercase();
        Self {
            id: blake3::hash(url.as_bytes()).to_hex().to_string(),
            asset_type: AssetType::from_extension(&format),
            name,
            path: url.to_string(),
            format,
            state: AssetState::NotVisited,
            labeling_state: None,
            schema: None,
        }
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        let mime = match self.format.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            "pdf" => "application/pdf",
            _ => return None,
        };
        Some(mime)
    }
}

/// Contents of a label sidecar. Only the schema and labeling state are
/// interpreted; everything else rides along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelData {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeling_state: Option<LabelingState>,
    #[serde(default)]
    pub labels: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Percent-decodes a storage key, leaving it as-is when it is not valid UTF-8 once decoded.
pub fn decode_key(key: &str) -> String {
    urlencoding::decode(key)
        .map(|k| k.into_owned())
        .unwrap_or_else(|_| key.to_string())
}

pub fn label_file_name(asset_name: &str) -> String {
    decode_key(&format!("{}{}", asset_name, LABEL_FILE_EXTENSION))
}

pub fn ocr_file_name(asset_name: &str) -> String {
    decode_key(&format!("{}{}", asset_name, OCR_FILE_EXTENSION))
}

fn extension(name: &str) -> &str {
    let file = name.rsplit('/').next().unwrap_or(name);
    let file = file.split(['?', '#']).next().unwrap_or(file);
    match file.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => "",
    }
}
