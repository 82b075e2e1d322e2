use std::fs;
use std::io::{self, Read, Write};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::debug;

use crate::domain::{DocumentInfo, PatientIdentifier, PatientSummary, Reference, ReferenceKind};
use crate::error::KiraError;

pub const FHIR_JSON: &str = "application/fhir+json";
pub const DOWNLOAD_CHUNK_SIZE: usize = 8192;

pub trait FhirClient: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<Value, KiraError>;

    fn download(
        &self,
        file_url: &str,
        destination_dir: &Utf8Path,
        filename: Option<&str>,
    ) -> Result<Utf8PathBuf, KiraError>;

    fn resolve_document_reference(&self, reference: &str) -> Result<DocumentInfo, KiraError> {
        let resource = self.resolve(reference)?;
        Ok(DocumentInfo::from_resource(&resource))
    }

    fn resolve_patient(&self, reference: &str) -> Result<PatientSummary, KiraError> {
        let resource = self.resolve(reference)?;
        Ok(PatientSummary::from_resource(&resource))
    }
}

#[derive(Clone)]
pub struct FhirHttpClient {
    client: Client,
    base_url: String,
}

impl FhirHttpClient {
    pub fn new(
        base_url: &str,
        auth_token: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<Self, KiraError> {
        let base_url = normalize_base_url(base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-gs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| KiraError::InvalidState(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(FHIR_JSON));
        if let Some(token) = auth_token.map(str::trim).filter(|token| !token.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                KiraError::InvalidState("auth token is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|err| KiraError::Transport {
            reference: base_url.clone(),
            message: err.to_string(),
        })?;

        Ok(Self { client, base_url })
    }

    fn resource_url(&self, reference: &str) -> Result<String, KiraError> {
        let parsed = Reference::new(reference);
        match parsed.kind() {
            ReferenceKind::Absolute => Ok(reference.to_string()),
            ReferenceKind::Contained => Err(KiraError::InvalidState(format!(
                "contained reference {reference} cannot be resolved remotely"
            ))),
            ReferenceKind::Relative | ReferenceKind::Other => {
                Ok(format!("{}/{}", self.base_url, reference.trim_start_matches('/')))
            }
        }
    }

    fn attachment_url(&self, file_url: &str) -> Result<Url, KiraError> {
        match Url::parse(file_url) {
            Ok(url) => Ok(url),
            Err(_) => Url::parse(&format!("{}/", self.base_url))
                .and_then(|base| base.join(file_url.trim_start_matches('/')))
                .map_err(|err| KiraError::Transport {
                    reference: file_url.to_string(),
                    message: err.to_string(),
                }),
        }
    }

    fn handle_status(response: Response, reference: &str) -> Result<Response, KiraError> {
        if response.status().is_success() {
            return Ok(response);
        }
        Err(KiraError::Remote {
            status: response.status().as_u16(),
            reference: reference.to_string(),
        })
    }
}

impl FhirClient for FhirHttpClient {
    fn resolve(&self, reference: &str) -> Result<Value, KiraError> {
        let url = self.resource_url(reference)?;
        debug!(%url, "resolving reference");
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| transport_error(reference, err))?;
        let response = Self::handle_status(response, reference)?;
        response
            .json::<Value>()
            .map_err(|err| transport_error(reference, err))
    }

    fn download(
        &self,
        file_url: &str,
        destination_dir: &Utf8Path,
        filename: Option<&str>,
    ) -> Result<Utf8PathBuf, KiraError> {
        let filename = match filename {
            Some(name) => checked_file_name(name),
            None => file_name_from_url(file_url),
        }
        .ok_or_else(|| KiraError::Transport {
            reference: file_url.to_string(),
            message: "cannot derive a file name".to_string(),
        })?;
        let url = self.attachment_url(file_url)?;

        fs::create_dir_all(destination_dir.as_std_path())
            .map_err(|err| io_error(file_url, err))?;
        let destination = destination_dir.join(&filename);

        debug!(%url, %destination, "downloading attachment");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| transport_error(file_url, err))?;
        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            if matches!(code, 401 | 403) {
                return Err(KiraError::Remote {
                    status: code,
                    reference: file_url.to_string(),
                });
            }
            return Err(KiraError::Transport {
                reference: file_url.to_string(),
                message: format!("HTTP status {code}"),
            });
        }

        let expected = response.content_length();
        // Dropping the temp file on any early return removes the partial body.
        let mut temp = tempfile::Builder::new()
            .prefix(".kira-gs-")
            .suffix(".part")
            .tempfile_in(destination_dir.as_std_path())
            .map_err(|err| io_error(file_url, err))?;
        let written = copy_chunked(&mut response, temp.as_file_mut())
            .map_err(|err| io_error(file_url, err))?;
        if let Some(expected) = expected.filter(|expected| *expected != written) {
            return Err(KiraError::Transport {
                reference: file_url.to_string(),
                message: format!("body ended after {written} of {expected} bytes"),
            });
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| io_error(file_url, err))?;
        temp.persist(destination.as_std_path())
            .map_err(|err| io_error(file_url, err.error))?;

        debug!(%destination, bytes = written, "download complete");
        Ok(destination)
    }
}

pub fn file_name_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    checked_file_name(segment)
}

fn checked_file_name(name: &str) -> Option<String> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return None;
    }
    Some(name.to_string())
}

pub fn copy_chunked<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> io::Result<u64> {
    let mut buffer = [0u8; DOWNLOAD_CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buffer[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}

pub fn normalize_base_url(base_url: &str) -> Result<String, KiraError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(KiraError::InvalidBaseUrl(base_url.to_string()));
    }
    let parsed =
        Url::parse(trimmed).map_err(|err| KiraError::InvalidBaseUrl(format!("{base_url}: {err}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(KiraError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(trimmed.to_string())
}

fn transport_error(reference: &str, err: reqwest::Error) -> KiraError {
    KiraError::Transport {
        reference: reference.to_string(),
        message: err.to_string(),
    }
}

fn io_error(reference: &str, err: io::Error) -> KiraError {
    KiraError::Transport {
        reference: reference.to_string(),
        message: err.to_string(),
    }
}

impl DocumentInfo {
    pub fn from_resource(resource: &Value) -> Self {
        let document_id = string_field(resource, "id");
        let title = string_field(resource, "description")
            .filter(|description| !description.is_empty())
            .or_else(|| document_id.clone());
        let attachment = resource
            .get("content")
            .and_then(Value::as_array)
            .and_then(|content| content.first())
            .and_then(|content| content.get("attachment"));

        Self {
            document_id,
            title,
            file_url: attachment.and_then(|value| string_field(value, "url")),
            content_type: attachment.and_then(|value| string_field(value, "contentType")),
        }
    }
}

impl PatientSummary {
    pub fn from_resource(resource: &Value) -> Self {
        let name = resource
            .get("name")
            .and_then(Value::as_array)
            .and_then(|names| names.first())
            .map(|name| {
                let given = name
                    .get("given")
                    .and_then(Value::as_array)
                    .map(|tokens| tokens.iter().filter_map(Value::as_str).collect::<Vec<_>>())
                    .unwrap_or_default()
                    .join(" ");
                let family = name.get("family").and_then(Value::as_str).unwrap_or("");
                format!("{given} {family}").trim().to_string()
            })
            .unwrap_or_default();

        let identifiers = resource
            .get("identifier")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| PatientIdentifier {
                        system: string_field(item, "system"),
                        value: string_field(item, "value"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: string_field(resource, "id"),
            name,
            birth_date: string_field(resource, "birthDate"),
            gender: string_field(resource, "gender"),
            identifiers,
        }
    }
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn file_name_strips_query_and_fragment() {
        assert_eq!(
            file_name_from_url("https://x/files/f.vcf?token=abc").as_deref(),
            Some("f.vcf")
        );
        assert_eq!(
            file_name_from_url("https://x/files/f.vcf.gz#part").as_deref(),
            Some("f.vcf.gz")
        );
        assert_eq!(file_name_from_url("Binary/42").as_deref(), Some("42"));
        assert_eq!(file_name_from_url("https://x/files/"), None);
        assert_eq!(file_name_from_url("https://x/.."), None);
    }

    #[test]
    fn base_url_trailing_slash_stripped() {
        assert_eq!(
            normalize_base_url("https://fhir.example.org/r5/").unwrap(),
            "https://fhir.example.org/r5"
        );
        assert_matches!(normalize_base_url("  "), Err(KiraError::InvalidBaseUrl(_)));
        assert_matches!(
            normalize_base_url("ftp://fhir.example.org"),
            Err(KiraError::InvalidBaseUrl(_))
        );
    }

    #[test]
    fn resource_urls() {
        let client = FhirHttpClient::new("https://fhir.example.org/r5/", None, None).unwrap();
        assert_eq!(
            client.resource_url("Patient/1").unwrap(),
            "https://fhir.example.org/r5/Patient/1"
        );
        assert_eq!(
            client.resource_url("https://other.org/Patient/2").unwrap(),
            "https://other.org/Patient/2"
        );
        assert_matches!(
            client.resource_url("#contained"),
            Err(KiraError::InvalidState(_))
        );
        assert_eq!(
            client.attachment_url("Binary/42").unwrap().as_str(),
            "https://fhir.example.org/r5/Binary/42"
        );
    }

    #[test]
    fn copy_chunked_copies_everything() {
        let payload = vec![7u8; DOWNLOAD_CHUNK_SIZE * 2 + 17];
        let mut reader = io::Cursor::new(payload.clone());
        let mut sink = Vec::new();
        let written = copy_chunked(&mut reader, &mut sink).unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(sink, payload);
    }

    #[test]
    fn document_info_falls_back_to_id() {
        let info = DocumentInfo::from_resource(&json!({"id": "D1"}));
        assert_eq!(info.title.as_deref(), Some("D1"));
        assert_eq!(info.file_url, None);
        assert_eq!(info.content_type, None);
    }

    #[test]
    fn patient_name_joins_given_and_family() {
        let patient = PatientSummary::from_resource(&json!({
            "id": "1",
            "name": [{"given": ["Jo", "Ann"], "family": "Doe"}, {"family": "Ignored"}],
            "identifier": [{"system": "urn:mrn", "value": "123"}, {"value": "x"}]
        }));
        assert_eq!(patient.name, "Jo Ann Doe");
        assert_eq!(patient.identifiers.len(), 2);
        assert_eq!(patient.identifiers[1].system, None);

        let nameless = PatientSummary::from_resource(&json!({"id": "2"}));
        assert_eq!(nameless.name, "");

        let family_only = PatientSummary::from_resource(&json!({"name": [{"family": "Doe"}]}));
        assert_eq!(family_only.name, "Doe");
    }
}
