//! Catalog loading: multivector rows joined with canonical names.
//!
//! The multivector CSV holds one row per searchable text variant
//! (`policy_item_id, text, section, language`). The optional cards CSV maps
//! `policy_item_id` to a `canonical` name. Every multivector row is kept;
//! rows without a card get an empty canonical name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

const ID_COL: &str = "policy_item_id";
const TEXT_COL: &str = "text";
const SECTION_COL: &str = "section";
const LANGUAGE_COL: &str = "language";
const CANONICAL_COL: &str = "canonical";

/// Errors raised while reading catalog sources.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    #[error("catalog source not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: &'static str },
}

/// One row of the multivector source, as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub policy_item_id: String,
    pub text: String,
    pub section: String,
    pub language: String,
}

/// A searchable text variant enriched with its entity's canonical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub policy_item_id: String,
    pub text: String,
    pub section: String,
    pub language: String,
    #[serde(default)]
    pub canonical: String,
}

impl CatalogRecord {
    fn from_row(row: &CatalogRow, canonical: Option<&String>) -> Self {
        Self {
            policy_item_id: row.policy_item_id.clone(),
            text: row.text.clone(),
            section: row.section.clone(),
            language: row.language.clone(),
            canonical: canonical.cloned().unwrap_or_default(),
        }
    }
}

/// Load the multivector rows and the enriched record set.
///
/// A missing `cards_path` (or a path that does not exist) leaves every
/// canonical name empty.
pub fn load(
    multivector_path: &Path,
    cards_path: Option<&Path>,
) -> Result<(Vec<CatalogRow>, Vec<CatalogRecord>), DataLoadError> {
    let now = Instant::now();

    let rows = read_multivectors(multivector_path)?;

    let canonical_names = match cards_path {
        Some(path) if path.exists() => read_canonical_names(path)?,
        Some(path) => {
            log::warn!(
                "cards file {} not found, canonical names will be empty",
                path.display()
            );
            HashMap::new()
        }
        None => HashMap::new(),
    };

    let records: Vec<CatalogRecord> = rows
        .iter()
        .map(|row| CatalogRecord::from_row(row, canonical_names.get(&row.policy_item_id)))
        .collect();

    log::info!(
        "loaded {} catalog rows ({} canonical names) in {:?}",
        records.len(),
        canonical_names.len(),
        now.elapsed()
    );

    Ok((rows, records))
}

fn read_multivectors(path: &Path) -> Result<Vec<CatalogRow>, DataLoadError> {
    let mut reader = open(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let id_idx = column(&headers, path, ID_COL)?;
    let text_idx = column(&headers, path, TEXT_COL)?;
    let section_idx = headers.iter().position(|h| h.trim() == SECTION_COL);
    let language_idx = headers.iter().position(|h| h.trim() == LANGUAGE_COL);

    let mut rows = vec![];
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let field = |idx: Option<usize>| {
            idx.and_then(|idx| record.get(idx))
                .unwrap_or_default()
                .to_string()
        };

        rows.push(CatalogRow {
            policy_item_id: field(Some(id_idx)),
            text: field(Some(text_idx)),
            section: field(section_idx),
            language: field(language_idx),
        });
    }

    Ok(rows)
}

/// `policy_item_id -> canonical`, first occurrence wins.
fn read_canonical_names(path: &Path) -> Result<HashMap<String, String>, DataLoadError> {
    let mut reader = open(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?.clone();

    let id_idx = column(&headers, path, ID_COL)?;
    let canonical_idx = column(&headers, path, CANONICAL_COL)?;

    let mut names = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let id = record.get(id_idx).unwrap_or_default();
        let canonical = record.get(canonical_idx).unwrap_or_default();

        names
            .entry(id.to_string())
            .or_insert_with(|| canonical.to_string());
    }

    Ok(names)
}

fn open(path: &Path) -> Result<csv::Reader<std::fs::File>, DataLoadError> {
    if !path.exists() {
        return Err(DataLoadError::NotFound(path.to_path_buf()));
    }
    csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))
}

fn column(
    headers: &csv::StringRecord,
    path: &Path,
    name: &'static str,
) -> Result<usize, DataLoadError> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| DataLoadError::MissingColumn {
            path: path.to_path_buf(),
            column: name,
        })
}

fn csv_error(path: &Path, source: csv::Error) -> DataLoadError {
    DataLoadError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_left_join_with_cards() {
        let tmp = tempfile::tempdir().unwrap();
        let mv = write_file(
            tmp.path(),
            "multivectors.csv",
            "policy_item_id,text,section,language\n\
             123,Vitamin C,CANON_EN,en\n\
             123,Acidum ascorbicum,CANON_LAT,la\n\
             456,Chia seeds,CANON_EN,en\n",
        );
        let cards = write_file(
            tmp.path(),
            "cards.csv",
            "policy_item_id,canonical,status\n\
             123,Ascorbic acid,authorised\n\
             123,Something else,authorised\n",
        );

        let (rows, records) = load(&mv, Some(&cards)).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].canonical, "Ascorbic acid");
        assert_eq!(records[1].canonical, "Ascorbic acid");
        assert_eq!(records[1].section, "CANON_LAT");
        assert_eq!(records[2].canonical, "");
        assert_eq!(records[2].policy_item_id, "456");
    }

    #[test]
    fn test_missing_cards_file_degrades() {
        let tmp = tempfile::tempdir().unwrap();
        let mv = write_file(
            tmp.path(),
            "multivectors.csv",
            "policy_item_id,text,section,language\n007,Vitamin C,CANON_EN,en\n",
        );

        let (_, records) = load(&mv, Some(&tmp.path().join("absent.csv"))).unwrap();
        assert_eq!(records[0].canonical, "");
        // ids are strings, leading zeros survive
        assert_eq!(records[0].policy_item_id, "007");

        let (_, records) = load(&mv, None).unwrap();
        assert_eq!(records[0].canonical, "");
    }

    #[test]
    fn test_column_order_is_free() {
        let tmp = tempfile::tempdir().unwrap();
        let mv = write_file(
            tmp.path(),
            "multivectors.csv",
            "language,text,extra,policy_item_id,section\nen,\"Salt, iodised\",x,9,COMMON_EN\n",
        );

        let (rows, _) = load(&mv, None).unwrap();
        assert_eq!(
            rows[0],
            CatalogRow {
                policy_item_id: "9".to_string(),
                text: "Salt, iodised".to_string(),
                section: "COMMON_EN".to_string(),
                language: "en".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_multivector_file() {
        let tmp = tempfile::tempdir().unwrap();
        let result = load(&tmp.path().join("nope.csv"), None);
        assert!(matches!(result, Err(DataLoadError::NotFound(_))));
    }

    #[test]
    fn test_missing_mandatory_column() {
        let tmp = tempfile::tempdir().unwrap();
        let mv = write_file(tmp.path(), "multivectors.csv", "policy_item_id,section\n1,CANON_EN\n");

        let result = load(&mv, None);
        assert!(matches!(
            result,
            Err(DataLoadError::MissingColumn { column: "text", .. })
        ));
    }

    #[test]
    fn test_malformed_row() {
        let tmp = tempfile::tempdir().unwrap();
        let mv = write_file(
            tmp.path(),
            "multivectors.csv",
            "policy_item_id,text,section,language\n1,Vitamin C,CANON_EN,en\n2,broken\n",
        );

        let result = load(&mv, None);
        assert!(matches!(result, Err(DataLoadError::Csv { .. })));
    }

    #[test]
    fn test_empty_catalog() {
        let tmp = tempfile::tempdir().unwrap();
        let mv = write_file(tmp.path(), "multivectors.csv", "policy_item_id,text,section,language\n");

        let (rows, records) = load(&mv, None).unwrap();
        assert!(rows.is_empty());
        assert!(records.is_empty());
    }
}
