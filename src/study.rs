use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{AnalysisRecord, OrderedRefs, Reference, ReferenceKind};
use crate::error::KiraError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedStudy {
    pub analyses: Vec<AnalysisRecord>,
}

impl ParsedStudy {
    pub fn from_document(document: &Value) -> Result<Self, KiraError> {
        Ok(Self {
            analyses: parse(document)?,
        })
    }

    pub fn with_api_link(mut self, api_link: &str) -> Self {
        let base = api_link.trim_end_matches('/');
        for analysis in &mut self.analyses {
            for file_ref in &mut analysis.file_refs {
                let reference = Reference::new(file_ref.as_str());
                if matches!(reference.kind(), ReferenceKind::Relative | ReferenceKind::Other) {
                    *file_ref = format!("{base}/{file_ref}");
                }
            }
        }
        self
    }
}

pub fn load_study(path: &Path) -> Result<Value, KiraError> {
    let content =
        fs::read_to_string(path).map_err(|_| KiraError::StudyRead(path.to_path_buf()))?;
    let document: Value = serde_json::from_str(&content)
        .map_err(|err| KiraError::MalformedInput(format!("{}: {err}", path.display())))?;
    if let Some(resource_type) = document.get("resourceType").and_then(Value::as_str) {
        if resource_type != "GenomicStudy" {
            warn!(resource_type, "input is not a GenomicStudy resource");
        }
    }
    Ok(document)
}

pub fn parse(document: &Value) -> Result<Vec<AnalysisRecord>, KiraError> {
    if !document.is_object() {
        return Err(KiraError::MalformedInput(
            "study document is not a JSON object".to_string(),
        ));
    }

    let patient_ref = subject_reference(document)?;
    let entries = match document.get("analysis") {
        None | Some(Value::Null) => &[][..],
        Some(Value::Array(items)) => items.as_slice(),
        Some(_) => {
            return Err(KiraError::MalformedInput(
                "`analysis` must be an array".to_string(),
            ));
        }
    };

    let analyses = entries
        .iter()
        .map(|entry| parse_analysis(entry, patient_ref.as_deref()))
        .collect::<Vec<_>>();
    debug!(count = analyses.len(), "parsed analyses");
    Ok(analyses)
}

fn subject_reference(document: &Value) -> Result<Option<String>, KiraError> {
    let Some(subject) = document.get("subject") else {
        return Ok(None);
    };
    match subject.get("reference") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(KiraError::MalformedInput(format!(
            "subject.reference must be a string, got {other}"
        ))),
    }
}

fn parse_analysis(entry: &Value, patient_ref: Option<&str>) -> AnalysisRecord {
    let analysis_id = array_field(entry, "identifier")
        .iter()
        .find_map(|identifier| non_empty_str(identifier, "value"))
        .map(str::to_string);

    let specimen_refs = array_field(entry, "specimen")
        .iter()
        .filter_map(reference_of)
        .map(str::to_string)
        .collect();

    let studied_region_refs = array_field(entry, "regionsStudied")
        .iter()
        .filter_map(reference_of)
        .map(str::to_string)
        .collect();

    let change_type_labels = array_field(entry, "changeType")
        .iter()
        .filter_map(|change_type| array_field(change_type, "coding").first())
        .map(|coding| {
            coding
                .get("display")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();

    let mut file_refs = OrderedRefs::new();
    for key in ["output", "input"] {
        for item in array_field(entry, key) {
            if let Some(reference) = item.get("file").and_then(reference_of) {
                file_refs.insert(reference);
            }
        }
    }

    AnalysisRecord {
        patient_ref: patient_ref.map(str::to_string),
        analysis_id,
        analysis_date: non_empty_str(entry, "date").map(str::to_string),
        specimen_refs,
        genomic_build: genomic_build(entry),
        studied_region_refs,
        change_type_labels,
        file_refs: file_refs.into_vec(),
    }
}

fn genomic_build(entry: &Value) -> Option<String> {
    let coding = entry
        .get("genomeBuild")
        .map(|build| array_field(build, "coding"))
        .and_then(|codings| codings.first())?;
    non_empty_str(coding, "display")
        .or_else(|| non_empty_str(coding, "code"))
        .map(str::to_string)
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

fn reference_of(value: &Value) -> Option<&str> {
    non_empty_str(value, "reference")
}
