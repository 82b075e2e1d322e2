use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::FhirClient;
use crate::domain::{
    AnalysisRecord, AnalysisResult, PatientOutcome, ResolvedFile, StudyFetchResult,
};
use crate::error::KiraError;
use crate::study;

pub struct StudyPipeline<C: FhirClient> {
    client: C,
    output_dir: Utf8PathBuf,
}

impl<C: FhirClient> StudyPipeline<C> {
    pub fn new(client: C, output_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn process_study(&self, document: &Value) -> Result<StudyFetchResult, KiraError> {
        let analyses = study::parse(document)?;
        Ok(self.process(&analyses))
    }

    pub fn process(&self, analyses: &[AnalysisRecord]) -> StudyFetchResult {
        let mut result = StudyFetchResult {
            patient: self.resolve_patient(analyses),
            ..StudyFetchResult::default()
        };

        for analysis in analyses {
            info!(
                analysis = analysis.analysis_id.as_deref().unwrap_or("<none>"),
                files = analysis.file_refs.len(),
                "processing analysis"
            );
            let files = analysis
                .file_refs
                .iter()
                .map(|reference| self.fetch_file(analysis, reference))
                .collect::<Vec<_>>();
            result
                .downloaded_paths
                .extend(files.iter().filter_map(|file| file.local_path().cloned()));
            result.analyses.push(AnalysisResult {
                metadata: analysis.clone(),
                files,
            });
        }

        info!(
            analyses = result.analyses.len(),
            downloaded = result.downloaded_paths.len(),
            "study processed"
        );
        result
    }

    fn resolve_patient(&self, analyses: &[AnalysisRecord]) -> Option<PatientOutcome> {
        let reference = analyses.first()?.patient_ref.as_deref()?;
        match self.client.resolve_patient(reference) {
            Ok(patient) => Some(PatientOutcome::Resolved(patient)),
            Err(err) => {
                warn!(reference, error = %err, "patient lookup failed");
                Some(PatientOutcome::Failed {
                    error: err.to_string(),
                    reference: reference.to_string(),
                })
            }
        }
    }

    fn fetch_file(&self, analysis: &AnalysisRecord, reference: &str) -> ResolvedFile {
        let document = match self.client.resolve_document_reference(reference) {
            Ok(document) => document,
            Err(err) => {
                warn!(reference, error = %err, "document reference lookup failed");
                return ResolvedFile::failed(reference, err.to_string());
            }
        };

        let Some(file_url) = document.file_url.clone() else {
            return ResolvedFile::fetched(reference, document, None);
        };

        let downloaded = self
            .download_dir(analysis)
            .and_then(|dir| self.client.download(&file_url, &dir, None));
        match downloaded {
            Ok(path) => ResolvedFile::fetched(reference, document, Some(path)),
            Err(err) => {
                warn!(reference, %file_url, error = %err, "download failed");
                ResolvedFile::download_failed(reference, document, err.to_string())
            }
        }
    }

    fn download_dir(&self, analysis: &AnalysisRecord) -> Result<Utf8PathBuf, KiraError> {
        let analysis_id = analysis.analysis_id.as_deref().ok_or_else(|| {
            KiraError::InvalidState(
                "analysis has no identifier to name its download directory".to_string(),
            )
        })?;
        // the id becomes a single directory under output_dir, nothing else
        let mut components = Utf8Path::new(analysis_id).components();
        match (components.next(), components.next()) {
            (Some(Utf8Component::Normal(name)), None) if !name.contains(['/', '\\']) => {
                Ok(self.output_dir.join(name))
            }
            _ => Err(KiraError::InvalidState(format!(
                "analysis identifier {analysis_id:?} is not usable as a directory name"
            ))),
        }
    }
}
