use std::path::Path;

use crate::model::DocumentFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Classification {
    /// File name carries the exclusion token (standard-terms boilerplate).
    Excluded,
    Unsupported,
    Supported(DocumentFormat),
}

/// Applies the exclusion rule, then maps the extension to a format.
/// An empty exclusion token disables the rule.
pub fn classify(path: &Path, exclude_token: &str) -> Classification {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let token = exclude_token.trim().to_lowercase();
    if !token.is_empty() && file_name.contains(&token) {
        return Classification::Excluded;
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("pdf") => Classification::Supported(DocumentFormat::Pdf),
        Some("docx") => Classification::Supported(DocumentFormat::Docx),
        Some("doc") => Classification::Supported(DocumentFormat::Doc),
        _ => Classification::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_case_insensitively() {
        assert_eq!(
            classify(Path::new("RC.PDF"), "cps"),
            Classification::Supported(DocumentFormat::Pdf)
        );
        assert_eq!(
            classify(Path::new("bpu.Docx"), "cps"),
            Classification::Supported(DocumentFormat::Docx)
        );
        assert_eq!(
            classify(Path::new("avis.doc"), "cps"),
            Classification::Supported(DocumentFormat::Doc)
        );
        assert_eq!(
            classify(Path::new("plans.dwg"), "cps"),
            Classification::Unsupported
        );
        assert_eq!(classify(Path::new("README"), "cps"), Classification::Unsupported);
    }

    #[test]
    fn exclusion_token_wins_before_format() {
        assert_eq!(
            classify(Path::new("dce/CPS_lot1.pdf"), "cps"),
            Classification::Excluded
        );
        assert_eq!(
            classify(Path::new("annexe_cps.dwg"), "CPS"),
            Classification::Excluded
        );
    }

    #[test]
    fn exclusion_matches_file_name_only() {
        assert_eq!(
            classify(Path::new("cps_bundle/RC.pdf"), "cps"),
            Classification::Supported(DocumentFormat::Pdf)
        );
    }

    #[test]
    fn empty_token_disables_exclusion() {
        assert_eq!(
            classify(Path::new("CPS.pdf"), ""),
            Classification::Supported(DocumentFormat::Pdf)
        );
    }
}
