//! Inline input decoding: turns an input payload into the initial dataframe.
//!
//! Supported media types are `text` (one `line` column), `csv` (delimiter and
//! header controlled by payload options), and `json` (a list of objects whose
//! keys are unioned into columns). When the media type is absent the decoder
//! probes JSON first, then a CSV heuristic, then falls back to text.
//!
//! CSV cells decode as strings — there is no type inference; the `cast` step
//! is the only typing path. Empty CSV cells decode to null.

use encoding_rs::Encoding;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::frame::DataFrame;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Csv,
    Json,
}

/// Payload `data`: inline text or an already-parsed list of JSON rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputData {
    Text(String),
    Rows(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputOptions {
    pub delimiter: String,
    pub has_header: bool,
    pub encoding: String,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            delimiter: ",".to_string(),
            has_header: true,
            encoding: "utf8".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InputPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<InputData>,
    #[serde(default)]
    pub options: InputOptions,
}

impl InputPayload {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            media_type: Some(MediaType::Text),
            data: Some(InputData::Text(data.into())),
            options: InputOptions::default(),
        }
    }

    pub fn csv(data: impl Into<String>) -> Self {
        Self {
            media_type: Some(MediaType::Csv),
            data: Some(InputData::Text(data.into())),
            options: InputOptions::default(),
        }
    }

    pub fn json(rows: Vec<serde_json::Value>) -> Self {
        Self {
            media_type: Some(MediaType::Json),
            data: Some(InputData::Rows(rows)),
            options: InputOptions::default(),
        }
    }
}

/// Decodes a payload into the initial dataframe.
pub fn decode(payload: &InputPayload) -> Result<DataFrame, InputError> {
    let data = payload
        .data
        .as_ref()
        .ok_or_else(|| InputError::new("input requires a 'data' field"))?;

    match payload.media_type {
        Some(MediaType::Text) => match data {
            InputData::Text(text) => Ok(decode_text(text)),
            InputData::Rows(_) => Err(InputError::new("text input requires 'data' as string")),
        },
        Some(MediaType::Csv) => match data {
            InputData::Text(text) => decode_csv(text, &payload.options),
            InputData::Rows(_) => Err(InputError::new(
                "csv input requires 'data' as string (CSV content)",
            )),
        },
        Some(MediaType::Json) => match data {
            InputData::Rows(rows) => decode_json(rows),
            InputData::Text(_) => Err(InputError::new("json input requires 'data' as list of objects")),
        },
        None => match data {
            InputData::Rows(rows) => decode_json(rows),
            InputData::Text(text) => Ok(auto_detect(text)),
        },
    }
}

fn decode_text(data: &str) -> DataFrame {
    // str::lines drops the trailing empty line from a final newline and
    // tolerates \r\n endings, matching the documented text contract.
    let lines: Vec<Value> = data
        .lines()
        .map(|line| Value::String(line.to_string()))
        .collect();
    debug!("decoded text input: {} line(s)", lines.len());
    DataFrame::from_pairs(vec![("line".to_string(), lines)])
        .expect("single-column frame upholds invariants")
}

fn decode_csv(data: &str, options: &InputOptions) -> Result<DataFrame, InputError> {
    let delimiter = resolve_delimiter(&options.delimiter)?;
    resolve_encoding(&options.encoding)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false)
        .from_reader(data.as_bytes());

    let mut records = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result
            .map_err(|err| InputError::new(format!("invalid CSV at line {}: {err}", line + 1)))?;
        records.push(record);
    }
    if records.is_empty() {
        return Err(InputError::new("csv input contains no rows"));
    }

    let (names, data_rows) = if options.has_header {
        let header = records.remove(0);
        let names: Vec<String> = header.iter().map(|field| field.to_string()).collect();
        (names, records)
    } else {
        let width = records[0].len();
        let names = (1..=width).map(|i| format!("column_{i}")).collect();
        (names, records)
    };

    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(data_rows.len()); names.len()];
    for record in &data_rows {
        for (idx, field) in record.iter().enumerate() {
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::String(field.to_string())
            };
            columns[idx].push(value);
        }
    }

    debug!(
        "decoded csv input: {} column(s), {} row(s)",
        names.len(),
        data_rows.len()
    );
    DataFrame::from_pairs(names.into_iter().zip(columns).collect())
        .map_err(|err| InputError::new(format!("invalid CSV header: {err}")))
}

fn decode_json(rows: &[serde_json::Value]) -> Result<DataFrame, InputError> {
    let mut names: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(rows.len());
    for (idx, row) in rows.iter().enumerate() {
        let object = row.as_object().ok_or_else(|| {
            InputError::new(format!("json input requires a list of objects (element {idx} is not an object)"))
        })?;
        for key in object.keys() {
            if !names.iter().any(|name| name == key) {
                names.push(key.clone());
            }
        }
        objects.push(object);
    }

    let columns = names
        .iter()
        .map(|name| {
            objects
                .iter()
                .map(|object| object.get(name).map_or(Value::Null, Value::from_json))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    debug!(
        "decoded json input: {} column(s), {} row(s)",
        names.len(),
        objects.len()
    );
    DataFrame::from_pairs(names.into_iter().zip(columns).collect())
        .map_err(|err| InputError::new(format!("invalid json columns: {err}")))
}

fn auto_detect(data: &str) -> DataFrame {
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data)
        && let Some(rows) = parsed.as_array()
        && rows.first().is_none_or(serde_json::Value::is_object)
        && let Ok(frame) = decode_json(rows)
    {
        debug!("auto-detected json input");
        return frame;
    }
    if data.contains([',', '\t', ';', '|'])
        && let Ok(frame) = decode_csv(data, &InputOptions::default())
        && frame.width() >= 1
    {
        debug!("auto-detected csv input");
        return frame;
    }
    debug!("auto-detect fell back to text input");
    decode_text(data)
}

fn resolve_delimiter(delimiter: &str) -> Result<u8, InputError> {
    let bytes = delimiter.as_bytes();
    if bytes.len() != 1 {
        return Err(InputError::new(format!(
            "delimiter must be a single character, got '{delimiter}'"
        )));
    }
    Ok(bytes[0])
}

fn resolve_encoding(label: &str) -> Result<&'static Encoding, InputError> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| InputError::new(format!("unknown encoding '{label}'")))
}
