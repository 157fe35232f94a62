use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::ProgramBlock;

/// Project description read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    #[serde(default)]
    pub blocks: Vec<ProgramBlock>,
}

fn default_overwrite() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration '{}'.", path.display()))?;
    let config = parse_config(&raw)
        .with_context(|| format!("Invalid configuration '{}'.", path.display()))?;
    Ok(config)
}

pub fn parse_config(raw: &str) -> Result<ProjectConfig> {
    let config: ProjectConfig = serde_json::from_str(raw)?;
    validate(&config)?;
    Ok(config)
}

/// Rejects blocks without a name and blocks sharing a name with another
/// block of the same kind.
pub fn validate(config: &ProjectConfig) -> Result<()> {
    let mut seen = HashSet::new();
    for (index, block) in config.blocks.iter().enumerate() {
        if block.name.trim().is_empty() {
            bail!("Block #{} has an empty name.", index + 1);
        }
        if !seen.insert((block.kind(), block.name.as_str())) {
            bail!("Duplicate {} '{}'.", block.kind(), block.name);
        }
    }
    Ok(())
}

impl ProjectConfig {
    /// Blocks selected by name; all blocks when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<ProgramBlock>> {
        if names.is_empty() {
            return Ok(self.blocks.clone());
        }
        names
            .iter()
            .map(|name| {
                self.blocks
                    .iter()
                    .find(|block| &block.name == name)
                    .cloned()
                    .with_context(|| format!("No block named '{}' in configuration.", name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProgramBlockKind, SectionName};

    const SAMPLE: &str = r#"{
        "blocks": [
            {
                "type": "GlobalDB",
                "name": "Settings",
                "number": 0,
                "sections": [
                    { "name": "Static", "members": [
                        { "name": "Speed", "datatype": "Int", "start_value": "10" }
                    ] }
                ],
                "attributes": { "MemoryLayout": "Optimized" }
            },
            { "type": "FB", "name": "Motor_Ctrl", "number": 10 }
        ]
    }"#;

    #[test]
    fn parses_defaults() {
        let config = parse_config(SAMPLE).expect("valid config");
        assert!(config.overwrite);
        assert_eq!(config.blocks.len(), 2);
        let settings = &config.blocks[0];
        assert_eq!(settings.kind(), ProgramBlockKind::GlobalDataBlock);
        assert_eq!(settings.sections[0].name, SectionName::Static);
        let speed = &settings.sections[0].members[0];
        assert!(speed.retain);
        assert_eq!(speed.start_value, "10");
        assert_eq!(config.blocks[1].programming_language, "FBD");
    }

    #[test]
    fn rejects_duplicate_names_per_kind() {
        let raw = r#"{ "blocks": [
            { "type": "FB", "name": "Motor" },
            { "type": "FB", "name": "Motor" }
        ] }"#;
        let err = parse_config(raw).unwrap_err();
        assert!(err.to_string().contains("Duplicate function block 'Motor'"));
    }

    #[test]
    fn same_name_different_kind_is_allowed() {
        let raw = r#"{ "blocks": [
            { "type": "FB", "name": "Motor" },
            { "type": "PlcStruct", "name": "Motor" }
        ] }"#;
        assert!(parse_config(raw).is_ok());
    }

    #[test]
    fn rejects_empty_names() {
        let raw = r#"{ "blocks": [ { "type": "FC", "name": " " } ] }"#;
        assert!(parse_config(raw).is_err());
    }

    #[test]
    fn selects_blocks_by_name() {
        let config = parse_config(SAMPLE).expect("valid config");
        let picked = config
            .select(&["Motor_Ctrl".to_string()])
            .expect("selected");
        assert_eq!(picked.len(), 1);
        assert!(config.select(&["Missing".to_string()]).is_err());
    }

    #[test]
    fn load_reports_path() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("project.json");
        fs::write(&path, "{ not json").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("project.json"));
    }
}
