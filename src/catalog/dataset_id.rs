//! Dataset identifiers.
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::lang::LanguageTag;

/// Stable `(group, name, version, languages)` key of a corpus.
///
/// Its text form is `Group-name-version-l1[-l2]`, e.g. `Statmt-news_commentary-16-deu-eng`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetId {
    group: String,
    name: String,
    version: String,
    langs: Vec<LanguageTag>,
}

fn check_part(kind: &str, value: &str) -> Result<(), Error> {
    if value.is_empty() || value.contains(['-', ' ', '/', '*']) {
        return Err(Error::CatalogLookup(format!(
            "invalid dataset {kind} {value:?}: must be non-empty and free of '-', ' ', '/', '*'"
        )));
    }
    Ok(())
}

impl DatasetId {
    pub fn new(
        group: &str,
        name: &str,
        version: &str,
        langs: &[LanguageTag],
    ) -> Result<Self, Error> {
        check_part("group", group)?;
        check_part("name", name)?;
        if name.contains('.') {
            return Err(Error::CatalogLookup(format!(
                "invalid dataset name {name:?}: '.' is not allowed"
            )));
        }
        check_part("version", version)?;
        if langs.is_empty() || langs.len() > 2 {
            return Err(Error::CatalogLookup(format!(
                "dataset {group}-{name}-{version} has {} languages; expected 1 or 2",
                langs.len()
            )));
        }
        Ok(Self {
            group: group.to_string(),
            name: name.to_string(),
            version: version.to_string(),
            langs: langs.to_vec(),
        })
    }

    /// Parses the `Group-name-version-l1[-l2]` form.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let parts: Vec<&str> = s.trim().split('-').collect();
        if parts.len() != 4 && parts.len() != 5 {
            return Err(Error::CatalogLookup(format!(
                "{s:?} is not a dataset id; expected Group-name-version-lang1[-lang2]"
            )));
        }
        let langs = parts[3..]
            .iter()
            .map(|l| LanguageTag::parse(l))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parts[0], parts[1], parts[2], &langs)
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn langs(&self) -> &[LanguageTag] {
        &self.langs
    }

    pub fn is_bitext(&self) -> bool {
        self.langs.len() == 2
    }

    /// Language pair, if this is a bitext.
    pub fn pair(&self) -> Option<(LanguageTag, LanguageTag)> {
        match self.langs.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    }

    /// Same id with the languages in reverse order.
    pub fn reversed(&self) -> Self {
        let mut rev = self.clone();
        rev.langs.reverse();
        rev
    }

    /// Languages joined with `_`, as used in default file names.
    pub fn lang_str(&self) -> String {
        self.langs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.group, self.name, self.version)?;
        for lang in &self.langs {
            write!(f, "-{lang}")?;
        }
        Ok(())
    }
}

impl FromStr for DatasetId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DatasetId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DatasetId> for String {
    fn from(did: DatasetId) -> Self {
        did.to_string()
    }
}
