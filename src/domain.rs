use std::collections::HashSet;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RELATIVE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][A-Za-z]+/[A-Za-z0-9\-.]{1,64}(/_history/[A-Za-z0-9\-.]{1,64})?$").unwrap()
});

// FHIR resource reference such as `DocumentReference/D1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Relative,
    Absolute,
    Contained,
    Other,
}

impl Reference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn kind(&self) -> ReferenceKind {
        if self.0.starts_with('#') {
            return ReferenceKind::Contained;
        }
        if self.0.starts_with("http://") || self.0.starts_with("https://") {
            return ReferenceKind::Absolute;
        }
        if RELATIVE_REFERENCE.is_match(&self.0) {
            ReferenceKind::Relative
        } else {
            ReferenceKind::Other
        }
    }
}

pub fn short_id(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

#[derive(Debug, Default, Clone)]
pub struct OrderedRefs {
    items: Vec<String>,
    seen: HashSet<String>,
}

impl OrderedRefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: &str) -> bool {
        if self.seen.contains(reference) {
            return false;
        }
        self.seen.insert(reference.to_string());
        self.items.push(reference.to_string());
        true
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub patient_ref: Option<String>,
    pub analysis_id: Option<String>,
    pub analysis_date: Option<String>,
    pub specimen_refs: Vec<String>,
    pub genomic_build: Option<String>,
    pub studied_region_refs: Vec<String>,
    pub change_type_labels: Vec<Option<String>>,
    pub file_refs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub document_id: Option<String>,
    pub title: Option<String>,
    pub file_url: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientIdentifier {
    pub system: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Option<String>,
    pub name: String,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub identifiers: Vec<PatientIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatientOutcome {
    Resolved(PatientSummary),
    Failed { error: String, reference: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum FileOutcome {
    DownloadFailed { document: DocumentInfo, error: String },
    Failed { error: String },
    // local_path is absent when the document had no attachment URL
    Fetched {
        document: DocumentInfo,
        local_path: Option<Utf8PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFile {
    pub reference: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

impl ResolvedFile {
    pub fn fetched(
        reference: impl Into<String>,
        document: DocumentInfo,
        local_path: Option<Utf8PathBuf>,
    ) -> Self {
        Self {
            reference: reference.into(),
            outcome: FileOutcome::Fetched {
                document,
                local_path,
            },
        }
    }

    pub fn download_failed(
        reference: impl Into<String>,
        document: DocumentInfo,
        error: impl Into<String>,
    ) -> Self {
        Self {
            reference: reference.into(),
            outcome: FileOutcome::DownloadFailed {
                document,
                error: error.into(),
            },
        }
    }

    pub fn failed(reference: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            outcome: FileOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            FileOutcome::Fetched { .. } => None,
            FileOutcome::DownloadFailed { error, .. } | FileOutcome::Failed { error } => {
                Some(error.as_str())
            }
        }
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        match &self.outcome {
            FileOutcome::Fetched { document, .. } | FileOutcome::DownloadFailed { document, .. } => {
                Some(document)
            }
            FileOutcome::Failed { .. } => None,
        }
    }

    pub fn local_path(&self) -> Option<&Utf8PathBuf> {
        match &self.outcome {
            FileOutcome::Fetched { local_path, .. } => local_path.as_ref(),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub metadata: AnalysisRecord,
    pub files: Vec<ResolvedFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyFetchResult {
    pub patient: Option<PatientOutcome>,
    pub analyses: Vec<AnalysisResult>,
    pub downloaded_paths: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFile {
    pub document_reference: String,
    pub local_path: Option<Utf8PathBuf>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAnalysis {
    pub patient_id: Option<String>,
    pub analysis_id: Option<String>,
    pub analysis_date: Option<String>,
    pub specimen_id: Vec<String>,
    pub genomic_build: Option<String>,
    pub studied_region: Vec<String>,
    pub change_type: Vec<Option<String>>,
    pub vcf_files: Vec<NormalizedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedDocument {
    pub patient_id: Option<String>,
    pub patient: Option<PatientOutcome>,
    pub analyses: Vec<NormalizedAnalysis>,
}
