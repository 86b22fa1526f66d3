use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::ManifestError;

pub const LATEST: &str = "latest";

// Quotes break the manifest; comparison and marker syntax would change the
// meaning of the `name==version` specifier handed to pip.
const FORBIDDEN_VERSION_CHARS: &[char] = &['\'', '"', '=', '<', '>', '!', '~', ';', ','];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: String,
    pub author: String,
    pub description: String,
    pub license: String,
}

impl ProjectMetadata {
    /// Key/value pairs in the order they are written to the `[project]` section.
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("name", self.name.as_str()),
            ("author", self.author.as_str()),
            ("description", self.description.as_str()),
            ("license", self.license.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionToken {
    Latest,
    Exact(String),
}

impl VersionToken {
    pub fn parse(value: &str) -> Result<Self, ManifestError> {
        let trimmed = value.trim();
        if trimmed == LATEST {
            return Ok(Self::Latest);
        }
        if trimmed.is_empty()
            || trimmed
                .chars()
                .any(|ch| ch.is_whitespace() || FORBIDDEN_VERSION_CHARS.contains(&ch))
        {
            return Err(ManifestError::InvalidVersion(value.to_string()));
        }
        Ok(Self::Exact(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Latest => LATEST,
            Self::Exact(version) => version,
        }
    }

}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for VersionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub version: VersionToken,
}

impl PackageSpec {
    pub fn latest(name: &str) -> Result<Self, ManifestError> {
        validate_package_name(name)?;
        Ok(Self {
            name: name.to_string(),
            version: VersionToken::Latest,
        })
    }

    /// Parses `name` or `name==version`.
    pub fn parse(request: &str) -> Result<Self, ManifestError> {
        let request = request.trim();
        let Some((name, version)) = request.split_once("==") else {
            return Self::latest(request);
        };
        let name = name.trim();
        validate_package_name(name)?;
        Ok(Self {
            name: name.to_string(),
            version: VersionToken::parse(version)?,
        })
    }

    /// The exact specifier handed to the installer.
    pub fn specifier(&self) -> String {
        format!("{}=={}", self.name, self.version)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=={}", self.name, self.version)
    }
}

pub fn validate_package_name(name: &str) -> Result<(), ManifestError> {
    if name.is_empty() {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "must not be empty",
        ));
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-'))
    {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "only ASCII letters, digits, '.', '_' and '-' are allowed",
        ));
    }
    let starts = name.chars().next().is_some_and(|ch| ch.is_ascii_alphanumeric());
    let ends = name
        .chars()
        .next_back()
        .is_some_and(|ch| ch.is_ascii_alphanumeric());
    if !starts || !ends {
        return Err(ManifestError::InvalidName(
            name.to_string(),
            "must start and end with a letter or digit",
        ));
    }
    Ok(())
}

/// Declared packages keyed by name. Iteration is in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PackageSet {
    entries: BTreeMap<String, VersionToken>,
}

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites; returns the previous token if the name was present.
    pub fn insert(&mut self, spec: PackageSpec) -> Option<VersionToken> {
        self.entries.insert(spec.name, spec.version)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn reset_to_latest(&mut self) {
        for version in self.entries.values_mut() {
            *version = VersionToken::Latest;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VersionToken)> {
        self.entries
            .iter()
            .map(|(name, version)| (name.as_str(), version))
    }

    pub fn specs(&self) -> Vec<PackageSpec> {
        self.entries
            .iter()
            .map(|(name, version)| PackageSpec {
                name: name.clone(),
                version: version.clone(),
            })
            .collect()
    }
}
