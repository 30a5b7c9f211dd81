//! Query templates with declared, versioned result schemas.
//!
//! A template file carries the SPARQL text plus the list of output fields the
//! query promises to bind. The fetch layer projects every binding onto that
//! schema instead of trusting whatever variables a response happens to carry.

use crate::error::{FetchError, TemplateError};
use crate::sparql::Binding;
use crate::table::Record;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Placeholders understood by the offset-paginated driver.
pub const LIMIT: &str = "limit";
pub const OFFSET: &str = "offset";
/// Placeholders understood by the key-batched driver.
pub const QID_LIST: &str = "qid_list";
pub const SRC_COLUMN_NAME: &str = "src_column_name";

fn default_version() -> u32 {
    1
}

/// One declared output variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// The fields a template's results must conform to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSchema {
    pub name: String,
    pub version: u32,
    pub fields: Vec<FieldSpec>,
}

impl ResultSchema {
    /// Project one binding onto the schema.
    ///
    /// The record holds exactly the declared fields in declared order.
    /// Undeclared variables are dropped and empty literals become nulls; a
    /// missing required field is an error.
    pub fn project(&self, index: usize, binding: &Binding) -> Result<Record, FetchError> {
        let mut record = Record::new();
        for field in &self.fields {
            let value = binding
                .get(&field.name)
                .map(|v| v.value.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            if value.is_none() && field.required {
                return Err(FetchError::Schema {
                    schema: format!("{}@v{}", self.name, self.version),
                    index,
                    field: field.name.clone(),
                });
            }
            record.insert(field.name.clone(), value);
        }
        Ok(record)
    }

    pub fn project_all(&self, bindings: &[Binding]) -> Result<Vec<Record>, FetchError> {
        bindings
            .iter()
            .enumerate()
            .map(|(i, b)| self.project(i, b))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

fn parse_segments(template: &str, text: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                literal.push('{');
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, ch)) => name.push(ch),
                        None => {
                            return Err(TemplateError::UnbalancedBrace {
                                template: template.to_string(),
                                position: pos,
                            });
                        }
                    }
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Placeholder(name.trim().to_string()));
            }
            '}' => {
                return Err(TemplateError::UnbalancedBrace {
                    template: template.to_string(),
                    position: pos,
                });
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// A query text with `{placeholder}` slots and its result schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    /// Designated key column used for deduplication at finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub query: String,
    pub fields: Vec<FieldSpec>,
}

impl QueryTemplate {
    pub fn from_toml_str(content: &str) -> Result<Self, TemplateError> {
        let template: QueryTemplate =
            toml::from_str(content).map_err(|e| TemplateError::Parse {
                message: e.to_string(),
            })?;
        template.validate()?;
        Ok(template)
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path).map_err(|e| TemplateError::Parse {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&content)
    }

    /// Check that the text parses and the key column is declared.
    pub fn validate(&self) -> Result<(), TemplateError> {
        parse_segments(&self.name, &self.query)?;
        if self.fields.is_empty() {
            return Err(TemplateError::Parse {
                message: format!("template '{}' declares no fields", self.name),
            });
        }
        if let Some(key) = &self.key {
            self.require_field(key)?;
        }
        Ok(())
    }

    /// Error unless `field` is part of the declared schema.
    pub fn require_field(&self, field: &str) -> Result<(), TemplateError> {
        if self.fields.iter().any(|f| f.name == field) {
            Ok(())
        } else {
            Err(TemplateError::MissingField {
                template: self.name.clone(),
                field: field.to_string(),
            })
        }
    }

    pub fn schema(&self) -> ResultSchema {
        ResultSchema {
            name: self.name.clone(),
            version: self.version,
            fields: self.fields.clone(),
        }
    }

    /// Names of all placeholders in the query text, in order of appearance.
    pub fn placeholders(&self) -> Result<Vec<String>, TemplateError> {
        Ok(parse_segments(&self.name, &self.query)?
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect())
    }

    /// Substitute every placeholder from `params`.
    pub fn render(&self, params: &[(&str, &str)]) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(self.query.len());
        for segment in parse_segments(&self.name, &self.query)? {
            match segment {
                Segment::Literal(text) => out.push_str(&text),
                Segment::Placeholder(name) => {
                    let (_, value) = params.iter().find(|(k, _)| *k == name).ok_or_else(|| {
                        TemplateError::UnknownPlaceholder {
                            template: self.name.clone(),
                            name: name.clone(),
                        }
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }

    /// Render one page for the offset-paginated driver.
    pub fn render_page(&self, limit: u64, offset: u64) -> Result<String, TemplateError> {
        let limit = limit.to_string();
        let offset = offset.to_string();
        self.render(&[(LIMIT, &limit), (OFFSET, &offset)])
    }

    /// Render one key batch for the key-batched driver.
    ///
    /// Ids are prefixed with `id_prefix` and joined by spaces, e.g.
    /// `wd:Q1 wd:Q2`.
    pub fn render_batch(
        &self,
        ids: &[String],
        id_prefix: &str,
        src_column: &str,
    ) -> Result<String, TemplateError> {
        let list = ids
            .iter()
            .map(|id| format!("{id_prefix}{id}"))
            .collect::<Vec<_>>()
            .join(" ");
        self.render(&[(QID_LIST, &list), (SRC_COLUMN_NAME, src_column)])
    }
}
