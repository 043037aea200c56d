//! Key naming conventions for the document bucket.
//!
//! # Key Schema
//!
//! ```text
//! TEMPLATE/{client}/Templates/{template}[/{subfolder}]/*.typ   # Templates
//! TEMPLATE/{client}/Images/*                                    # Shared images
//! TEMPLATE/{client}/Data/data.json                              # Row data
//! {output_prefix}{safe_key}.pdf                                 # Generated documents
//! {output_prefix}pdf_links.xlsx                                 # Run report
//! ```

use serde::{Deserialize, Serialize};

/// Root folder holding one sub-folder per client.
pub const CLIENT_ROOT: &str = "TEMPLATE/";
/// File name of the run report under the output prefix.
pub const REPORT_FILE_NAME: &str = "pdf_links.xlsx";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Resolved storage locations for one run.
///
/// Produced once by the selection step and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub template_prefix: String,
    pub image_prefix: String,
    pub data_key: String,
    pub output_prefix: String,
}

impl Selection {
    /// Compose the standard client layout.
    ///
    /// `subfolder` of `None` or `""` selects the template folder itself.
    pub fn for_client(
        client: &str,
        template: &str,
        subfolder: Option<&str>,
        output_prefix: &str,
    ) -> Self {
        let client = client.trim_matches('/');
        let template = template.trim_matches('/');
        let template_prefix = match subfolder.map(|s| s.trim_matches('/')) {
            Some(sub) if !sub.is_empty() => {
                format!("{CLIENT_ROOT}{client}/Templates/{template}/{sub}/")
            }
            _ => format!("{CLIENT_ROOT}{client}/Templates/{template}/"),
        };
        Self {
            template_prefix,
            image_prefix: format!("{CLIENT_ROOT}{client}/Images/"),
            data_key: format!("{CLIENT_ROOT}{client}/Data/data.json"),
            output_prefix: normalize_prefix(output_prefix),
        }
    }

    /// Key of the generated document for a sanitized row key.
    pub fn document_key(&self, safe_key: &str) -> String {
        document_key(&self.output_prefix, safe_key)
    }

    pub fn report_key(&self) -> String {
        format!("{}{}", self.output_prefix, REPORT_FILE_NAME)
    }
}

/// `{prefix}{safe_key}.pdf`
pub fn document_key(output_prefix: &str, safe_key: &str) -> String {
    format!("{output_prefix}{safe_key}.pdf")
}

/// Ensure a non-empty prefix ends with exactly one `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Keys ending in `/` are folder placeholders, not content.
pub fn is_directory_marker(key: &str) -> bool {
    key.ends_with('/')
}

/// Last path segment of a key.
pub fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Public URL scheme for stored objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlStyle {
    /// `https://{bucket}.s3.{region}.amazonaws.com/{key}`
    VirtualHosted { bucket: String, region: String },
    /// `{base}/{key}`
    Base(String),
}

impl UrlStyle {
    pub fn url_for(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        match self {
            UrlStyle::VirtualHosted { bucket, region } => {
                format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
            }
            UrlStyle::Base(base) => format!("{}/{}", base.trim_end_matches('/'), key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_without_subfolder() {
        let s = Selection::for_client("acme", "notice", None, "out/2024");
        assert_eq!(s.template_prefix, "TEMPLATE/acme/Templates/notice/");
        assert_eq!(s.image_prefix, "TEMPLATE/acme/Images/");
        assert_eq!(s.data_key, "TEMPLATE/acme/Data/data.json");
        assert_eq!(s.output_prefix, "out/2024/");
        assert_eq!(s.report_key(), "out/2024/pdf_links.xlsx");
    }

    #[test]
    fn selection_with_subfolder() {
        let s = Selection::for_client("acme", "notice", Some("fr"), "out/");
        assert_eq!(s.template_prefix, "TEMPLATE/acme/Templates/notice/fr/");
        assert_eq!(s.output_prefix, "out/");
        assert_eq!(
            Selection::for_client("acme", "notice", Some(""), "out").template_prefix,
            "TEMPLATE/acme/Templates/notice/"
        );
    }

    #[test]
    fn document_key_is_prefix_plus_safe_key() {
        let s = Selection::for_client("c", "t", None, "runs/a");
        assert_eq!(s.document_key("INV-1"), "runs/a/INV-1.pdf");
        assert_eq!(document_key("", "x"), "x.pdf");
    }

    #[test]
    fn normalize_prefix_variants() {
        assert_eq!(normalize_prefix(""), "");
        assert_eq!(normalize_prefix("a"), "a/");
        assert_eq!(normalize_prefix("a//"), "a/");
    }

    #[test]
    fn markers_and_basenames() {
        assert!(is_directory_marker("TEMPLATE/acme/Images/"));
        assert!(!is_directory_marker("TEMPLATE/acme/Images/logo.png"));
        assert_eq!(basename("TEMPLATE/acme/Images/logo.png"), "logo.png");
        assert_eq!(basename("flat"), "flat");
    }

    #[test]
    fn url_styles() {
        let vh = UrlStyle::VirtualHosted {
            bucket: "docs".into(),
            region: "eu-west-1".into(),
        };
        assert_eq!(
            vh.url_for("out/a.pdf"),
            "https://docs.s3.eu-west-1.amazonaws.com/out/a.pdf"
        );
        let base = UrlStyle::Base("https://cdn.example.com/".into());
        assert_eq!(base.url_for("out/a.pdf"), "https://cdn.example.com/out/a.pdf");
    }
}
