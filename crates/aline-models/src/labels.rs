//! Label mapping: classifier output index to human-readable name.
//!
//! The mapping file is plain text with one `<name> <id>` entry per line.
//! Ids must cover `0..n-1` exactly once and names must be unique.

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ModelError, ModelResult};

/// Total mapping from label id `0..len-1` to a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMapping {
    names: Vec<String>,
}

impl LabelMapping {
    /// Build a mapping from names ordered by id.
    pub fn from_names<I, S>(names: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(ModelError::LabelMapping("mapping is empty".to_string()));
        }

        let mut seen = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if let Some(previous) = seen.insert(name.as_str(), id) {
                return Err(ModelError::LabelMapping(format!(
                    "name '{}' used by ids {} and {}",
                    name, previous, id
                )));
            }
        }

        Ok(Self { names })
    }

    /// Parse the `<name> <id>` text format.
    pub fn parse(text: &str) -> ModelResult<Self> {
        let mut by_id: HashMap<usize, String> = HashMap::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let [name, id] = fields.as_slice() else {
                return Err(ModelError::label_line(
                    line_no,
                    format!("expected '<name> <id>', got '{}'", line),
                ));
            };

            let id: usize = id
                .parse()
                .map_err(|_| ModelError::label_line(line_no, format!("invalid id '{}'", id)))?;

            if by_id.insert(id, (*name).to_string()).is_some() {
                return Err(ModelError::label_line(line_no, format!("duplicate id {}", id)));
            }
        }

        let mut names = Vec::with_capacity(by_id.len());
        for id in 0..by_id.len() {
            match by_id.remove(&id) {
                Some(name) => names.push(name),
                None => {
                    return Err(ModelError::LabelMapping(format!(
                        "ids are not contiguous: missing id {}",
                        id
                    )))
                }
            }
        }

        Self::from_names(names)
    }

    /// Load and parse a mapping file.
    pub fn from_file(path: impl AsRef<Path>) -> ModelResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Name for a label id.
    pub fn get(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Number of labels.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether a name belongs to this mapping.
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Iterate `(id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(id, n)| (id, n.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unordered_lines() {
        let mapping = LabelMapping::parse("Basketball 1\nApplyEyeMakeup 0\n\nArchery 2\n").unwrap();
        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping.get(0), Some("ApplyEyeMakeup"));
        assert_eq!(mapping.get(1), Some("Basketball"));
        assert_eq!(mapping.get(2), Some("Archery"));
        assert_eq!(mapping.get(3), None);
    }

    #[test]
    fn test_rejects_gap() {
        let err = LabelMapping::parse("A 0\nB 2\n").unwrap_err();
        assert!(err.to_string().contains("missing id 1"));
    }

    #[test]
    fn test_rejects_duplicate_id() {
        let err = LabelMapping::parse("A 0\nB 0\n").unwrap_err();
        assert!(matches!(err, ModelError::LabelLine { line: 2, .. }));
    }

    #[test]
    fn test_rejects_duplicate_name() {
        assert!(LabelMapping::parse("A 0\nA 1\n").is_err());
    }

    #[test]
    fn test_rejects_malformed_line() {
        let err = LabelMapping::parse("A 0\nB\n").unwrap_err();
        assert!(matches!(err, ModelError::LabelLine { line: 2, .. }));

        let err = LabelMapping::parse("A zero\n").unwrap_err();
        assert!(err.to_string().contains("invalid id"));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(LabelMapping::parse("\n\n").is_err());
    }
}
