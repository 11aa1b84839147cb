//! CSV report artifact: one row per matched job, rewritten wholesale on every save.

use crate::types::{JobAnalysis, JobRecord};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

pub const REQUIREMENTS_CELL_MAX: usize = 3000;

const BASE_HEADERS: [&str; 10] = [
    "Priority",
    "Match %",
    "Company",
    "Role",
    "Location",
    "Work Mode",
    "Date",
    "Source",
    "URL",
    "Requirements",
];
const STATUS_HEADER: &str = "Application Status";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no report found in {0}")]
    NotFound(String),
}

/// Lifecycle stage encoded in the report filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Running,
    Final,
    Filled,
}

impl ReportKind {
    pub fn tag(&self) -> &'static str {
        match self {
            ReportKind::Running => "RUNNING",
            ReportKind::Final => "FINAL",
            ReportKind::Filled => "FILLED",
        }
    }
}

/// `<dir>/report_<KIND>_<dd_mm_YYYY_HH_MM>.csv`
pub fn report_path(dir: &Path, kind: ReportKind, stamp: &str) -> PathBuf {
    dir.join(format!("report_{}_{}.csv", kind.tag(), stamp))
}

pub fn report_stamp() -> String {
    chrono::Local::now().format("%d_%m_%Y_%H_%M").to_string()
}

/// Most relevant report in `dir`: FILLED, then FINAL, then RUNNING; newest by mtime within a kind.
pub fn latest_report(dir: &Path) -> Result<PathBuf, ReportError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ReportError::NotFound(dir.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut candidates: Vec<(PathBuf, SystemTime)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_csv = path.extension().map(|e| e == "csv").unwrap_or(false);
        if !is_csv {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((path, modified));
    }

    for kind in [ReportKind::Filled, ReportKind::Final, ReportKind::Running] {
        let prefix = format!("report_{}_", kind.tag());
        let newest = candidates
            .iter()
            .filter(|(p, _)| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix))
                    .unwrap_or(false)
            })
            .max_by_key(|(_, modified)| *modified);
        if let Some((path, _)) = newest {
            return Ok(path.clone());
        }
    }
    Err(ReportError::NotFound(dir.display().to_string()))
}

fn lenient_u8<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let cleaned = raw.trim().trim_end_matches('%').trim();
    Ok(cleaned
        .parse::<f64>()
        .map(|v| v.clamp(0.0, 255.0) as u8)
        .unwrap_or(0))
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ReportRow {
    #[serde(rename = "Priority", default, deserialize_with = "lenient_u8")]
    pub priority: u8,
    #[serde(rename = "Match %", default, deserialize_with = "lenient_u8")]
    pub match_percentage: u8,
    #[serde(rename = "Company", default)]
    pub company: String,
    #[serde(rename = "Role", default)]
    pub role: String,
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "Work Mode", default)]
    pub work_mode: String,
    #[serde(rename = "Date", default)]
    pub date: String,
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(
        rename = "URL",
        alias = "Link",
        alias = "LINK",
        alias = "Job Link",
        default
    )]
    pub url: String,
    #[serde(rename = "Requirements", default)]
    pub requirements: String,
    #[serde(rename = "Application Status", default)]
    pub application_status: Option<String>,
}

impl ReportRow {
    /// `role` is what the row is filed under: the posting's title, or the searched role
    /// when no title could be read.
    pub fn from_match(record: &JobRecord, role: &str, analysis: &JobAnalysis, source: &str) -> Self {
        let requirements = if record.requirements_excerpt.is_empty() {
            analysis.analysis.as_str()
        } else {
            record.requirements_excerpt.as_str()
        };
        Self {
            priority: analysis.priority_score,
            match_percentage: analysis.match_percentage,
            company: record.company.clone(),
            role: role.to_string(),
            location: record.location.clone(),
            work_mode: record.work_mode.to_string(),
            date: record.posted_age.clone(),
            source: source.to_string(),
            url: record.url.clone(),
            requirements: requirements_cell(requirements),
            application_status: None,
        }
    }

    fn to_record(&self, with_status: bool) -> Vec<String> {
        let mut fields = vec![
            self.priority.to_string(),
            format!("{}%", self.match_percentage),
            self.company.clone(),
            self.role.clone(),
            self.location.clone(),
            self.work_mode.clone(),
            self.date.clone(),
            self.source.clone(),
            self.url.clone(),
            requirements_cell(&self.requirements),
        ];
        if with_status {
            fields.push(self.application_status.clone().unwrap_or_default());
        }
        fields
    }
}

/// Single-line cell capped at [`REQUIREMENTS_CELL_MAX`] chars.
pub fn requirements_cell(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
        .chars()
        .take(REQUIREMENTS_CELL_MAX)
        .collect()
}

/// Rows bound to a file. `save` replaces the file through a temp file + rename.
#[derive(Debug, Clone)]
pub struct Report {
    pub path: PathBuf,
    pub rows: Vec<ReportRow>,
}

impl Report {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Vec::new(),
        }
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let path = path.into();
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize::<ReportRow>() {
            rows.push(row?);
        }
        Ok(Self { path, rows })
    }

    pub fn save(&self) -> Result<(), ReportError> {
        write_rows(&self.path, &self.rows)
    }
}

pub fn write_rows(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let with_status = rows.iter().any(|r| r.application_status.is_some());
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        let mut headers: Vec<&str> = BASE_HEADERS.to_vec();
        if with_status {
            headers.push(STATUS_HEADER);
        }
        writer.write_record(&headers)?;
        for row in rows {
            writer.write_record(row.to_record(with_status))?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
