use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One person known under a tracker login and a chat handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedName {
    pub github: String,
    pub slack: String,
}

/// Bidirectional alias table between tracker logins and chat handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkedNames(pub Vec<LinkedName>);

impl LinkedNames {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Translate chat handles to tracker logins; unknown names pass through.
    pub fn to_primary_names(&self, names: &[String]) -> Vec<String> {
        let table: HashMap<&str, &str> = self
            .0
            .iter()
            .map(|n| (n.slack.as_str(), n.github.as_str()))
            .collect();
        translate(&table, names)
    }

    /// Translate tracker logins to chat handles; unknown names pass through.
    pub fn to_alias_names(&self, names: &[String]) -> Vec<String> {
        let table: HashMap<&str, &str> = self
            .0
            .iter()
            .map(|n| (n.github.as_str(), n.slack.as_str()))
            .collect();
        translate(&table, names)
    }

    /// Every ambiguity in the table, one message each.
    pub fn check_syntax(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut github: HashMap<&str, usize> = HashMap::new();
        let mut slack: HashMap<&str, usize> = HashMap::new();

        for (i, n) in self.0.iter().enumerate() {
            if let Some(j) = github.get(n.github.as_str()) {
                errors.push(format!(
                    "'{}' is found in both linkedNames[{j}].github and linkedNames[{i}].github",
                    n.github
                ));
            } else {
                github.insert(&n.github, i);
            }
            if let Some(j) = slack.get(n.slack.as_str()) {
                errors.push(format!(
                    "'{}' is found in both linkedNames[{j}].slack and linkedNames[{i}].slack",
                    n.slack
                ));
            } else {
                slack.insert(&n.slack, i);
            }
        }

        let mut crossed: Vec<(&str, usize, usize)> = github
            .iter()
            .filter_map(|(name, &i)| match slack.get(name) {
                Some(&j) if j != i => Some((*name, i, j)),
                _ => None,
            })
            .collect();
        crossed.sort();
        for (name, i, j) in crossed {
            errors.push(format!(
                "'{name}' is found in both linkedNames[{i}].github and linkedNames[{j}].slack"
            ));
        }
        errors
    }
}

fn translate(table: &HashMap<&str, &str>, names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|n| table.get(n.as_str()).map_or_else(|| n.clone(), |v| v.to_string()))
        .collect()
}
