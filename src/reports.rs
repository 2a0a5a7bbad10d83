//! Lost and found reports and the files they are loaded from.
//!
//! Reports come either as a JSON array or as a CSV file with a header row:
//!
//! ```text
//! id,kind,title,description,image_url,location,user_id,created_at
//! ```
//!
//! Column order in CSV files is free, `kind` may be omitted when the whole
//! file is known to hold one kind of report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Lost,
    Found,
}

impl Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportKind::Lost => write!(f, "lost"),
            ReportKind::Found => write!(f, "found"),
        }
    }
}

impl FromStr for ReportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lost" => Ok(ReportKind::Lost),
            "found" => Ok(ReportKind::Found),
            other => Err(format!("unknown report kind '{other}'")),
        }
    }
}

/// A user-submitted item report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: u64,
    pub kind: ReportKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(id: u64, kind: ReportKind, title: &str, description: &str) -> Self {
        Self {
            id,
            kind,
            title: title.to_string(),
            description: description.to_string(),
            image_url: None,
            location: None,
            user_id: None,
            created_at: None,
        }
    }

    pub fn lost(id: u64, title: &str, description: &str) -> Self {
        Self::new(id, ReportKind::Lost, title, description)
    }

    pub fn found(id: u64, title: &str, description: &str) -> Self {
        Self::new(id, ReportKind::Found, title, description)
    }

    pub fn with_image(mut self, image_url: &str) -> Self {
        self.image_url = Some(image_url.to_string());
        self
    }

    /// Title and description joined by a space, trimmed.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.description)
            .trim()
            .to_string()
    }

    /// Image reference, if the report has a non-blank one.
    pub fn image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed json in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("malformed csv in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("report #{id} has no kind and none is implied by the file")]
    MissingKind { id: u64 },

    #[error("report #{id} is a {actual} report, expected {expected}")]
    KindMismatch {
        id: u64,
        expected: ReportKind,
        actual: ReportKind,
    },

    #[error("{kind} report id {id} appears more than once")]
    DuplicateId { kind: ReportKind, id: u64 },
}

/// Report as found in a file, before the kind is resolved.
#[derive(Debug, Deserialize)]
struct RawReport {
    id: u64,
    #[serde(default, alias = "type")]
    kind: Option<ReportKind>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl RawReport {
    fn resolve(self, implied: Option<ReportKind>) -> Result<Report, ReportError> {
        let kind = match (self.kind, implied) {
            (Some(actual), Some(expected)) if actual != expected => {
                return Err(ReportError::KindMismatch {
                    id: self.id,
                    expected,
                    actual,
                })
            }
            (Some(kind), _) | (None, Some(kind)) => kind,
            (None, None) => return Err(ReportError::MissingKind { id: self.id }),
        };

        Ok(Report {
            id: self.id,
            kind,
            title: self.title,
            description: self.description.unwrap_or_default(),
            image_url: non_blank(self.image_url),
            location: non_blank(self.location),
            user_id: non_blank(self.user_id),
            created_at: self.created_at,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load reports from a JSON or CSV file.
///
/// `implied` is the kind of every report in the file, when known. Reports
/// without an explicit kind take it, reports with a different one are
/// rejected.
pub fn load_reports(path: &Path, implied: Option<ReportKind>) -> Result<Vec<Report>, ReportError> {
    let content = std::fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw = if is_json(path, &content) {
        serde_json::from_str::<Vec<RawReport>>(&content).map_err(|source| ReportError::Json {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        parse_csv(&content).map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })?
    };

    let mut seen = HashSet::new();
    let mut reports = Vec::with_capacity(raw.len());
    for raw in raw {
        // lost and found ids are separate sequences
        let report = raw.resolve(implied)?;
        if !seen.insert((report.kind, report.id)) {
            return Err(ReportError::DuplicateId {
                kind: report.kind,
                id: report.id,
            });
        }
        reports.push(report);
    }

    log::debug!("loaded {} reports from {}", reports.len(), path.display());

    Ok(reports)
}

fn is_json(path: &Path, content: &str) -> bool {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => true,
        Some(ext) if ext.eq_ignore_ascii_case("csv") => false,
        _ => content.trim_start().starts_with('['),
    }
}

fn parse_csv(content: &str) -> Result<Vec<RawReport>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    reader.deserialize().collect()
}

/// Split a mixed collection into (lost, found), keeping order.
pub fn partition(reports: Vec<Report>) -> (Vec<Report>, Vec<Report>) {
    reports
        .into_iter()
        .partition(|report| report.kind == ReportKind::Lost)
}
