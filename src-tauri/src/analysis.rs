use serde::{Deserialize, Serialize};

use crate::{error::ShellError, perception::Perception};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SentimentLabel {
    #[serde(alias = "Positivo", alias = "Positive")]
    Positive,
    #[serde(alias = "Negativo", alias = "Negative")]
    Negative,
    #[serde(alias = "Neutro", alias = "Neutral")]
    Neutral,
}

/// Scores returned by `/analyze/text` and `/analyze/file`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResult {
    pub label: SentimentLabel,
    pub compound: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<f64>,
}

/// Error body the backend sends with 4xx responses.
#[derive(Debug, Deserialize)]
pub struct BackendErrorBody {
    pub error: String,
}

/// Form fields as typed by the user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    pub contact: String,
    pub company: String,
    pub perception: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMetadata {
    pub contact: String,
    pub company: String,
    pub perception: Perception,
}

impl AnalysisMetadata {
    pub fn validate(&self) -> Result<ValidatedMetadata, ShellError> {
        let contact = self.contact.trim();
        let company = self.company.trim();
        let mut missing = Vec::new();
        if contact.is_empty() {
            missing.push("contact");
        }
        if company.is_empty() {
            missing.push("company");
        }
        if !missing.is_empty() {
            return Err(ShellError::InvalidInput(format!(
                "{} required",
                missing.join(" and ")
            )));
        }
        let perception = self
            .perception
            .parse::<Perception>()
            .map_err(|err| ShellError::InvalidInput(err.to_string()))?;

        Ok(ValidatedMetadata {
            contact: contact.to_string(),
            company: company.to_string(),
            perception,
        })
    }
}

/// JSON body of `POST /analyze/text`.
#[derive(Debug, Serialize)]
pub struct TextAnalysisRequest<'a> {
    pub text: &'a str,
    pub contact: &'a str,
    pub company: &'a str,
    pub perception: Perception,
}

impl<'a> TextAnalysisRequest<'a> {
    pub fn new(text: &'a str, metadata: &'a ValidatedMetadata) -> Self {
        Self {
            text,
            contact: &metadata.contact,
            company: &metadata.company,
            perception: metadata.perception,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Csv,
    Xlsx,
}

impl BatchFormat {
    pub fn from_file_name(name: &str) -> Self {
        if name.to_ascii_lowercase().ends_with(".csv") {
            BatchFormat::Csv
        } else {
            BatchFormat::Xlsx
        }
    }

    pub fn download_name(self) -> &'static str {
        match self {
            BatchFormat::Csv => "resultado.csv",
            BatchFormat::Xlsx => "resultado.xlsx",
        }
    }
}

/// Transformed batch file returned by `/analyze/batch`.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(contact: &str, company: &str, perception: &str) -> AnalysisMetadata {
        AnalysisMetadata {
            contact: contact.into(),
            company: company.into(),
            perception: perception.into(),
        }
    }

    #[test]
    fn backend_result_with_portuguese_label() {
        let body = r#"{"neg":0.0,"neu":0.4,"pos":0.6,"compound":0.7269,"label":"Positivo"}"#;
        let result: AnalysisResult = serde_json::from_str(body).unwrap();
        assert_eq!(result.label, SentimentLabel::Positive);
        assert_eq!(result.compound, 0.7269);
        assert_eq!(result.pos, Some(0.6));
    }

    #[test]
    fn minimal_result_and_english_labels() {
        let result: AnalysisResult =
            serde_json::from_str(r#"{"label":"Neutral","compound":0.0}"#).unwrap();
        assert_eq!(result.label, SentimentLabel::Neutral);
        assert_eq!(result.neg, None);

        let result: AnalysisResult =
            serde_json::from_str(r#"{"label":"Negativo","compound":-0.4}"#).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["label"], "negative");
        assert!(json.get("neg").is_none());
    }

    #[test]
    fn validation_requires_contact_and_company() {
        let err = metadata(" ", "", "0").validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid input: contact and company required");
    }

    #[test]
    fn validation_checks_perception_range() {
        assert!(metadata("Ana", "Acme", "1.5").validate().is_err());
        assert!(metadata("Ana", "Acme", "").validate().is_err());
        let valid = metadata(" Ana ", "Acme", "-0.25").validate().unwrap();
        assert_eq!(valid.contact, "Ana");
        assert_eq!(valid.perception.value(), -0.25);
    }

    #[test]
    fn text_request_body_shape() {
        let valid = metadata("Ana", "Acme", "0.5").validate().unwrap();
        let body = serde_json::to_value(TextAnalysisRequest::new("ótimo serviço", &valid)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "text": "ótimo serviço",
                "contact": "Ana",
                "company": "Acme",
                "perception": 0.5
            })
        );
    }

    #[test]
    fn batch_download_names() {
        assert_eq!(BatchFormat::from_file_name("clientes.CSV"), BatchFormat::Csv);
        assert_eq!(
            BatchFormat::from_file_name("clientes.xlsx").download_name(),
            "resultado.xlsx"
        );
        assert_eq!(BatchFormat::Csv.download_name(), "resultado.csv");
    }
}
