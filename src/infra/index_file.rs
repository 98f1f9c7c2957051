//! JSON index definitions.
//!
//! ```json
//! {"indexes": [
//!   {"type": "regex", "name": "id", "regex": "^id=(\\d+)", "numeric": true, "unique": true},
//!   {"type": "field", "name": "host", "delimiter": " ", "fieldNum": 3},
//!   {"type": "pipe", "name": "words", "command": "tr -s ' ' '\\n'", "delimiter": " "}
//! ]}
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::core::builder::IndexDefinition;
use crate::core::tokenizer::{ExternalTokenizer, FieldTokenizer, RegexTokenizer, Tokenizer};

#[derive(Debug, Deserialize)]
pub struct IndexFile
{
    pub indexes: Vec<IndexSpec>,
}

/// One declared index: common flags plus the tokenizer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSpec
{
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub numeric: bool,

    #[serde(default)]
    pub unique: bool,

    /// Request a sparse build; any sparse index makes the whole build sparse.
    #[serde(default)]
    pub sparse: bool,

    #[serde(default, rename = "indexLines")]
    pub index_lines: bool,

    #[serde(flatten)]
    pub kind: TokenizerSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TokenizerSpec
{
    Regex
    {
        regex: String,
        #[serde(default)]
        capture: Option<usize>,
        #[serde(default)]
        template: Option<String>,
    },
    Field
    {
        delimiter: String,
        #[serde(rename = "fieldNum")]
        field_num: usize,
    },
    Pipe
    {
        command: String,
        delimiter: String,
    },
}

pub fn default_name() -> String
{
    "default".to_string()
}

impl IndexFile
{
    pub fn load(path: &Path) -> Result<Self>
    {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read index definitions {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid index definitions in {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self>
    {
        let file: IndexFile = serde_json::from_str(text)?;
        if file
            .indexes
            .is_empty()
        {
            bail!("no indexes declared");
        }
        Ok(file)
    }
}

impl IndexSpec
{
    /// Build the definition and a ready tokenizer; pipe commands are spawned here.
    pub fn instantiate(&self) -> Result<(IndexDefinition, Tokenizer)>
    {
        let def = IndexDefinition::new(&self.name)
            .numeric(self.numeric)
            .unique(self.unique)
            .index_line(self.index_lines);

        let tokenizer: Tokenizer = match &self.kind
        {
            TokenizerSpec::Regex { regex, capture, template } =>
            {
                let t = match (capture, template)
                {
                    (Some(_), Some(_)) => bail!("index '{}': use either capture or template", self.name),
                    (Some(group), None) => RegexTokenizer::with_capture(regex, *group),
                    (None, Some(template)) => RegexTokenizer::with_template(regex, template),
                    (None, None) => RegexTokenizer::new(regex),
                };
                t.with_context(|| format!("index '{}'", self.name))?
                    .into()
            }
            TokenizerSpec::Field { delimiter, field_num } =>
            {
                if delimiter.is_empty() || *field_num == 0
                {
                    bail!("index '{}': fields need a delimiter and a 1-based fieldNum", self.name);
                }
                FieldTokenizer::new(delimiter.as_bytes(), *field_num).into()
            }
            TokenizerSpec::Pipe { command, delimiter } => ExternalTokenizer::spawn(command, delimiter.as_bytes())
                .with_context(|| format!("index '{}': failed to start '{command}'", self.name))?
                .into(),
        };
        Ok((def, tokenizer))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn parses_all_kinds()
    {
        let file = IndexFile::parse(
            r#"{"indexes": [
                {"type": "regex", "name": "id", "regex": "^(\\d+)", "numeric": true, "unique": true},
                {"type": "field", "delimiter": ",", "fieldNum": 2, "indexLines": true},
                {"type": "pipe", "name": "p", "command": "cat", "delimiter": " ", "sparse": true}
            ]}"#,
        )
        .unwrap();

        assert_eq!(file.indexes.len(), 3);
        assert!(file.indexes[0].numeric && file.indexes[0].unique);
        assert_eq!(file.indexes[1].name, "default");
        assert!(file.indexes[1].index_lines);
        assert!(matches!(file.indexes[1].kind, TokenizerSpec::Field { field_num: 2, .. }));
        assert!(file.indexes[2].sparse);
    }

    #[test]
    fn rejects_unknown_type_and_empty_list()
    {
        assert!(IndexFile::parse(r#"{"indexes": [{"type": "magic"}]}"#).is_err());
        assert!(IndexFile::parse(r#"{"indexes": []}"#).is_err());
        assert!(IndexFile::parse("not json").is_err());
    }

    #[test]
    fn instantiates_regex_with_template()
    {
        let spec = IndexSpec {
            name: "pair".into(),
            numeric: false,
            unique: false,
            sparse: false,
            index_lines: false,
            kind: TokenizerSpec::Regex {
                regex: r"(\w+)=(\w+)".into(),
                capture: None,
                template: Some("{1}:{2}".into()),
            },
        };
        let (def, tokenizer) = spec
            .instantiate()
            .unwrap();
        assert_eq!(def.name, "pair");
        assert_eq!(tokenizer.describe(), r"(\w+)=(\w+) => {1}:{2}");
    }

    #[test]
    fn rejects_capture_and_template_together()
    {
        let spec = IndexSpec {
            name: "x".into(),
            numeric: false,
            unique: false,
            sparse: false,
            index_lines: false,
            kind: TokenizerSpec::Regex {
                regex: "(a)".into(),
                capture: Some(1),
                template: Some("{1}".into()),
            },
        };
        assert!(spec.instantiate().is_err());
    }
}
