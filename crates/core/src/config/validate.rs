use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Checks the parts serde cannot express:
/// - download/media dirs are non-empty and distinct
/// - the folder template carries the required tokens
/// - indexer ids and names are unique
/// - at most one path mapping per download client
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.paths.download_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "paths.download_dir cannot be empty".to_string(),
        ));
    }
    if config.paths.media_dir.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "paths.media_dir cannot be empty".to_string(),
        ));
    }
    if config.paths.download_dir == config.paths.media_dir {
        return Err(ConfigError::ValidationError(
            "paths.download_dir and paths.media_dir must differ".to_string(),
        ));
    }

    let template = &config.paths.folder_template;
    for token in ["{author}", "{title}"] {
        if !template.contains(token) {
            return Err(ConfigError::ValidationError(format!(
                "paths.folder_template must contain {token}"
            )));
        }
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    for indexer in &config.indexers {
        if !ids.insert(indexer.id) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate indexer id {}",
                indexer.id
            )));
        }
        if !names.insert(indexer.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate indexer name {}",
                indexer.name
            )));
        }
    }

    let mut clients = HashSet::new();
    for mapping in &config.path_mappings {
        if !clients.insert(mapping.client) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate path mapping for client {}",
                mapping.client.as_str()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[paths]
download_dir = "/downloads"
media_dir = "/media"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_same_dirs_fails() {
        let mut config = base_config();
        config.paths.media_dir = config.paths.download_dir.clone();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_template_without_author_fails() {
        let mut config = base_config();
        config.paths.folder_template = "{title}".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_indexer_id_fails() {
        let config = load_config_from_str(
            r#"
[paths]
download_dir = "/downloads"
media_dir = "/media"

[[indexers]]
id = 1
name = "a"

[[indexers]]
id = 1
name = "b"
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
