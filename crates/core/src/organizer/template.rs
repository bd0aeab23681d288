//! Library folder template rendering.

use std::path::PathBuf;

use thiserror::Error;

use crate::request::Audiobook;

/// Default library folder layout.
pub const DEFAULT_TEMPLATE: &str = "{author}/{title} {asin}";

/// Maximum length of one rendered path component.
const MAX_COMPONENT_LEN: usize = 200;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("Template produced an empty path")]
    EmptyPath,

    #[error("Required token {0} is empty")]
    MissingToken(&'static str),
}

/// Token values available to the folder template.
#[derive(Debug, Clone, Default)]
pub struct FolderTokens {
    pub author: String,
    pub title: String,
    pub asin: Option<String>,
    pub year: Option<i32>,
    pub series: Option<String>,
    pub series_part: Option<String>,
    pub narrator: Option<String>,
}

impl From<&Audiobook> for FolderTokens {
    fn from(audiobook: &Audiobook) -> Self {
        Self {
            author: audiobook.author.clone(),
            title: audiobook.title.clone(),
            asin: audiobook.asin.clone(),
            year: audiobook.year,
            series: audiobook.series.clone(),
            series_part: audiobook.series_part.clone(),
            narrator: audiobook.narrator.clone(),
        }
    }
}

/// Sanitize one path component: strip filesystem-hostile characters,
/// collapse whitespace, trim, cap the length.
pub fn sanitize_component(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();

    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_COMPONENT_LEN).collect()
}

/// Render a template into a relative library path.
///
/// `{author}` and `{title}` are required; `{asin}`, `{year}`, `{series}`,
/// `{seriesPart}` and `{narrator}` render as empty when unknown.
pub fn render_folder(template: &str, tokens: &FolderTokens) -> Result<PathBuf, TemplateError> {
    if tokens.author.trim().is_empty() {
        return Err(TemplateError::MissingToken("{author}"));
    }
    if tokens.title.trim().is_empty() {
        return Err(TemplateError::MissingToken("{title}"));
    }

    let year = tokens.year.map(|y| y.to_string()).unwrap_or_default();
    let mut path = PathBuf::new();
    let mut components = 0;

    for segment in template.split('/') {
        let expanded = segment
            .replace("{author}", &tokens.author)
            .replace("{title}", &tokens.title)
            .replace("{asin}", tokens.asin.as_deref().unwrap_or(""))
            .replace("{year}", &year)
            .replace("{series}", tokens.series.as_deref().unwrap_or(""))
            .replace("{seriesPart}", tokens.series_part.as_deref().unwrap_or(""))
            .replace("{narrator}", tokens.narrator.as_deref().unwrap_or(""));

        let component = sanitize_component(&expanded);
        if !component.is_empty() {
            path.push(component);
            components += 1;
        }
    }

    if components == 0 {
        return Err(TemplateError::EmptyPath);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> FolderTokens {
        FolderTokens {
            author: "Patrick Rothfuss".to_string(),
            title: "The Name of the Wind".to_string(),
            asin: Some("B0036I54I6".to_string()),
            year: Some(2007),
            series: Some("The Kingkiller Chronicle".to_string()),
            series_part: Some("1".to_string()),
            narrator: Some("Nick Podehl".to_string()),
        }
    }

    #[test]
    fn test_default_template() {
        let path = render_folder(DEFAULT_TEMPLATE, &tokens()).unwrap();
        assert_eq!(
            path,
            PathBuf::from("Patrick Rothfuss/The Name of the Wind B0036I54I6")
        );
    }

    #[test]
    fn test_missing_asin_leaves_clean_component() {
        let mut tokens = tokens();
        tokens.asin = None;
        let path = render_folder(DEFAULT_TEMPLATE, &tokens).unwrap();
        assert_eq!(path, PathBuf::from("Patrick Rothfuss/The Name of the Wind"));
    }

    #[test]
    fn test_extended_template() {
        let path = render_folder("{author}/{series}/{title} ({year})", &tokens()).unwrap();
        assert_eq!(
            path,
            PathBuf::from(
                "Patrick Rothfuss/The Kingkiller Chronicle/The Name of the Wind (2007)"
            )
        );
    }

    #[test]
    fn test_sanitize_strips_hostile_characters() {
        assert_eq!(sanitize_component("AC/DC: Back?"), "ACDC Back");
        assert_eq!(sanitize_component("a<b>c\"d|e*f\\g"), "abcdefg");
    }

    #[test]
    fn test_sanitize_collapses_whitespace() {
        assert_eq!(sanitize_component("  too   many\tspaces  "), "too many spaces");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_component(&long).len(), 200);
    }

    #[test]
    fn test_requires_author_and_title() {
        let mut missing_author = tokens();
        missing_author.author = "  ".to_string();
        assert_eq!(
            render_folder(DEFAULT_TEMPLATE, &missing_author),
            Err(TemplateError::MissingToken("{author}"))
        );

        let mut missing_title = tokens();
        missing_title.title = String::new();
        assert_eq!(
            render_folder(DEFAULT_TEMPLATE, &missing_title),
            Err(TemplateError::MissingToken("{title}"))
        );
    }

    #[test]
    fn test_slash_inside_token_cannot_escape() {
        let mut tokens = tokens();
        tokens.author = "../escape".to_string();
        let path = render_folder(DEFAULT_TEMPLATE, &tokens).unwrap();
        assert_eq!(
            path.components().next().unwrap().as_os_str(),
            "..escape"
        );
    }
}
