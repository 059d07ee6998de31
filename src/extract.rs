//! Text extraction for knowledge-base files.
//!
//! Turns one file into one or more [`SourceItem`]s:
//! - `.md` / `.txt`: the file body as-is.
//! - `.pdf`: text via `pdf-extract`; a `Title, Author, Year.pdf` file name
//!   becomes title/author/year metadata.
//! - `.json`: an array of resource records, each flattened into one item.
//!   Cultural records become `Cultural Element: … Region: … Description: …
//!   Examples: …`; paper summaries (`synthesized_output`) are flattened from
//!   their name, keywords, extracted elements, and response guidance.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::Path;

use crate::models::SourceItem;

const DEFAULT_PDF_YEAR: &str = "2024";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("invalid resource JSON: {0}")]
    Json(String),
}

/// Extensions the index builder picks up.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["md", "txt", "pdf", "json"];

/// Extract all items from the file at `path`. `relative_path` identifies the
/// file inside the indexed directory and becomes the item's `source_id`.
pub fn extract_file(
    path: &Path,
    relative_path: &str,
    updated_at: DateTime<Utc>,
) -> Result<Vec<SourceItem>, ExtractError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    match ext.as_str() {
        "md" | "txt" => {
            let body = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
            let metadata = json!({ "source": relative_path, "title": file_name });
            Ok(vec![item(relative_path, Some(file_name), updated_at, body, metadata)])
        }
        "pdf" => {
            let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
            let body = pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string()))?;
            let meta = parse_pdf_filename(&file_name);
            let metadata = json!({
                "source": relative_path,
                "title": meta.title,
                "author": meta.author,
                "year": meta.year,
            });
            Ok(vec![item(relative_path, Some(meta.title), updated_at, body, metadata)])
        }
        "json" => {
            let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
            extract_resource_json(&content, relative_path, updated_at)
        }
        other => Err(ExtractError::Unsupported(other.to_string())),
    }
}

/// Title/author/year parsed from a PDF file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfMeta {
    pub title: String,
    pub author: Option<String>,
    pub year: String,
}

/// Parses `Title, Author, Year.pdf`. Missing or non-numeric years default
/// to 2024.
pub fn parse_pdf_filename(file_name: &str) -> PdfMeta {
    let base = file_name
        .strip_suffix(".pdf")
        .or_else(|| file_name.strip_suffix(".PDF"))
        .unwrap_or(file_name);
    let parts: Vec<&str> = base.split(',').map(str::trim).collect();

    let title = parts
        .first()
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let author = parts
        .get(1)
        .filter(|a| !a.is_empty())
        .map(|a| a.to_string());
    let year = parts
        .get(2)
        .filter(|y| !y.is_empty() && y.chars().all(|c| c.is_ascii_digit()))
        .map(|y| y.to_string())
        .unwrap_or_else(|| DEFAULT_PDF_YEAR.to_string());

    PdfMeta {
        title,
        author,
        year,
    }
}

/// Flattens a JSON array of resource records into items. Records that
/// flatten to empty text are skipped.
pub fn extract_resource_json(
    content: &str,
    relative_path: &str,
    updated_at: DateTime<Utc>,
) -> Result<Vec<SourceItem>, ExtractError> {
    let records: Vec<Value> =
        serde_json::from_str(content).map_err(|e| ExtractError::Json(e.to_string()))?;

    let mut items = Vec::new();
    for (i, record) in records.iter().enumerate() {
        let source_id = format!("{}#{}", relative_path, i);
        let flattened = if record.get("synthesized_output").is_some() {
            flatten_value_resource(record).map(|(title, body)| {
                let metadata = json!({
                    "source": relative_path,
                    "title": title,
                    "pdf_filename": record.get("pdf_filename").and_then(Value::as_str).unwrap_or("unknown_filename.pdf"),
                });
                (Some(title), body, metadata)
            })
        } else {
            let name = str_field(record, "cultural_element_name");
            let metadata = json!({
                "source": relative_path,
                "title": name,
                "cultural_id": record.get("cultural_id").cloned().unwrap_or(Value::Null),
                "cultural_element_name": name,
            });
            Some((Some(name.to_string()), flatten_cultural(record), metadata))
        };

        match flattened {
            Some((title, body, metadata)) if !body.trim().is_empty() => {
                items.push(item(&source_id, title, updated_at, body.trim().to_string(), metadata));
            }
            _ => tracing::warn!(source_id = %source_id, "skipping resource record with no text"),
        }
    }

    Ok(items)
}

fn flatten_cultural(record: &Value) -> String {
    let examples: Vec<&str> = record
        .get("examples")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    format!(
        "Cultural Element: {}. Region: {}. Description: {}. Examples: {}",
        str_field(record, "cultural_element_name"),
        str_field(record, "region"),
        str_field(record, "description"),
        examples.join(", ")
    )
}

fn flatten_value_resource(record: &Value) -> Option<(String, String)> {
    let data = record.get("synthesized_output")?;
    let title = str_field(data, "paper_name").to_string();
    let mut text = title.clone();

    let keywords: Vec<&str> = data
        .get("keywords")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if !keywords.is_empty() {
        text.push(' ');
        text.push_str(&keywords.join(", "));
    }

    if let Some(groups) = data
        .get("extracted_sociocultural_elements_from_paper")
        .and_then(Value::as_object)
    {
        for elements in groups.values() {
            let entries: Vec<&Value> = match elements {
                Value::Object(map) => map.values().collect(),
                Value::Array(list) => list.iter().collect(),
                _ => Vec::new(),
            };
            for entry in entries {
                for key in ["concept", "name", "description"] {
                    let value = str_field(entry, key);
                    if !value.is_empty() {
                        text.push(' ');
                        text.push_str(value);
                    }
                }
            }
        }
    }

    let guidance_key =
        "conclusion_of_how_collected_information_from_resource_would_inform_generating_a_response_for_user_if_any";
    if let Some(guidance) = data.get(guidance_key).and_then(Value::as_array) {
        for entry in guidance {
            let value = str_field(entry, "llm_response_guidance");
            if !value.is_empty() {
                text.push(' ');
                text.push_str(value);
            }
        }
    }

    Some((title, text))
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("")
}

fn item(
    source_id: &str,
    title: Option<String>,
    updated_at: DateTime<Utc>,
    body: String,
    metadata: Value,
) -> SourceItem {
    SourceItem {
        source: "knowledge".to_string(),
        source_id: source_id.to_string(),
        title,
        updated_at,
        body,
        metadata_json: metadata.to_string(),
    }
}

fn io_error(path: &Path, err: std::io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
