use crate::domain::{
    AnalysisResult, NormalizedAnalysis, NormalizedDocument, NormalizedFile, StudyFetchResult,
    short_id,
};
use crate::error::KiraError;

pub fn normalize(result: &StudyFetchResult) -> Result<NormalizedDocument, KiraError> {
    let analyses = result
        .analyses
        .iter()
        .map(normalize_analysis)
        .collect::<Result<Vec<_>, KiraError>>()?;

    let patient_id = result
        .analyses
        .first()
        .and_then(|analysis| analysis.metadata.patient_ref.as_deref())
        .map(|reference| short_id(reference).to_string());

    Ok(NormalizedDocument {
        patient_id,
        patient: result.patient.clone(),
        analyses,
    })
}

fn normalize_analysis(analysis: &AnalysisResult) -> Result<NormalizedAnalysis, KiraError> {
    let meta = &analysis.metadata;
    let needs_directory = analysis
        .files
        .iter()
        .any(|file| file.document().is_some_and(|doc| doc.file_url.is_some()));
    if meta.analysis_id.is_none() && needs_directory {
        return Err(KiraError::InvalidState(
            "analysis without identifier has downloadable files".to_string(),
        ));
    }

    let vcf_files = analysis
        .files
        .iter()
        .filter(|file| file.is_success())
        .map(|file| NormalizedFile {
            document_reference: short_id(&file.reference).to_string(),
            local_path: file.local_path().cloned(),
            content_type: file.document().and_then(|doc| doc.content_type.clone()),
        })
        .collect();

    Ok(NormalizedAnalysis {
        patient_id: meta
            .patient_ref
            .as_deref()
            .map(|reference| short_id(reference).to_string()),
        analysis_id: meta.analysis_id.clone(),
        analysis_date: meta.analysis_date.clone(),
        specimen_id: shorten_all(&meta.specimen_refs),
        genomic_build: meta.genomic_build.clone(),
        studied_region: shorten_all(&meta.studied_region_refs),
        change_type: meta.change_type_labels.clone(),
        vcf_files,
    })
}

fn shorten_all(references: &[String]) -> Vec<String> {
    references
        .iter()
        .map(|reference| short_id(reference).to_string())
        .collect()
}
