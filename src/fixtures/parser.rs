use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{ShowError, ShowResult};
use crate::fixtures::catalog::FixtureCatalog;
use crate::fixtures::models::Fixture;

/// A definition file holds either one fixture object or a list of them.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<Fixture>),
    One(Box<Fixture>),
}

pub fn parse_definition(path: &Path) -> ShowResult<Vec<Fixture>> {
    let content = fs::read_to_string(path)
        .map_err(|e| ShowError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    parse_definitions_str(&content)
        .map_err(|e| ShowError::Serialization(format!("{}: {}", path.display(), e)))
}

pub fn parse_definitions_str(content: &str) -> ShowResult<Vec<Fixture>> {
    let parsed: DefinitionFile = serde_json::from_str(content)?;
    Ok(match parsed {
        DefinitionFile::Many(list) => list,
        DefinitionFile::One(fixture) => vec![*fixture],
    })
}

/// Load a catalog from one definition file, or from every `*.json` file
/// under a directory (sorted by path so load order is stable).
pub fn load_catalog(root: &Path) -> ShowResult<FixtureCatalog> {
    if root.is_file() {
        return FixtureCatalog::from_fixtures(parse_definition(root)?);
    }

    let mut paths: Vec<_> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut fixtures = Vec::new();
    for path in paths {
        fixtures.extend(parse_definition(&path)?);
    }
    log::info!(
        "[fixtures] loaded {} fixture(s) from {}",
        fixtures.len(),
        root.display()
    );
    FixtureCatalog::from_fixtures(fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAR: &str = r#"{
        "id": "par1",
        "channels": [
            {"number": 0, "name": "dimmer"},
            {"number": 1, "name": "red", "default": 10}
        ],
        "actions": {
            "flash": {"params": [{"name": "level", "type": "integer", "min": 0, "max": 255, "default": 255}]}
        }
    }"#;

    #[test]
    fn single_and_list_files_parse() {
        assert_eq!(parse_definitions_str(PAR).unwrap().len(), 1);
        let list = format!("[{}, {}]", PAR, PAR.replace("par1", "par2"));
        let fixtures = parse_definitions_str(&list).unwrap();
        assert_eq!(fixtures.len(), 2);
        assert_eq!(fixtures[1].channels[1].default, 10);
        assert_eq!(fixtures[1].channels[1].max, 255);
    }

    #[test]
    fn directory_catalog_walks_nested_json() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("acme");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("par1.json"), PAR).unwrap();
        std::fs::write(dir.path().join("par2.json"), PAR.replace("par1", "par2")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = load_catalog(dir.path()).unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("par1").unwrap().action("flash").is_some());
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_catalog(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
