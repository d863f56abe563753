//! INI file configuration adapter.
//!
//! Section and key names are case-sensitive so block ids keep their case.

use crate::domain::error::BlockscanError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

#[derive(Debug)]
pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BlockscanError> {
        let path = path.as_ref();
        let mut config = Ini::new_cs();
        config
            .load(path)
            .map_err(|reason| BlockscanError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, BlockscanError> {
        let mut config = Ini::new_cs();
        config
            .read(content.to_string())
            .map_err(|reason| BlockscanError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.trim().to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_deref()
            .and_then(Self::parse_bool)
            .unwrap_or(default)
    }

    fn sections(&self) -> Vec<String> {
        let mut sections = self.config.sections();
        sections.sort();
        sections
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .config
            .get_map_ref()
            .get(section)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn reads_strings_and_bools() {
        let adapter = FileConfigAdapter::from_string(
            "[detector]\nforward_fill = no\nspot_fallback = on\n\n[data]\ndir = /tmp/stocks\n",
        )
        .unwrap();
        assert!(!adapter.get_bool("detector", "forward_fill", true));
        assert!(adapter.get_bool("detector", "spot_fallback", false));
        assert_eq!(
            adapter.get_string("data", "dir"),
            Some("/tmp/stocks".to_string())
        );
    }

    #[test]
    fn defaults_for_missing_or_malformed() {
        let adapter = FileConfigAdapter::from_string("[data]\nflag = maybe\n").unwrap();
        assert_eq!(adapter.get_string("data", "missing"), None);
        assert_eq!(adapter.get_string("nope", "key"), None);
        assert!(adapter.get_bool("data", "flag", true));
        assert!(!adapter.get_bool("data", "flag", false));
        assert!(adapter.get_bool("data", "absent", true));
    }

    #[test]
    fn expression_values_keep_comparison_operators() {
        let adapter = FileConfigAdapter::from_string(
            "[node Block1 entry]\nsurge = current.close >= prev.close * 1.1\n",
        )
        .unwrap();
        assert_eq!(
            adapter.get_string("node Block1 entry", "surge"),
            Some("current.close >= prev.close * 1.1".to_string())
        );
    }

    #[test]
    fn lists_sections_and_keys_sorted() {
        let adapter =
            FileConfigAdapter::from_string("[b]\nz = 1\na = 2\n\n[a]\nk = v\n").unwrap();
        let sections = adapter.sections();
        assert!(sections.contains(&"a".to_string()));
        assert!(sections.contains(&"b".to_string()));
        assert_eq!(adapter.keys("b"), ["a", "z"]);
        assert!(adapter.keys("missing").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[data]\ndir = ./stocks\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(adapter.get_string("data", "dir"), Some("./stocks".to_string()));
    }

    #[test]
    fn from_file_missing_is_config_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(matches!(result, Err(BlockscanError::ConfigParse { .. })));
    }
}
