//! Language tags.
//!
//! Identifiers like `en`, `en-GB`, `kn_Knda_IN` or `English` are normalized into a
//! [LanguageTag]: an ISO 639-3 language, an optional script (suppressed when it is the
//! language's default one) and an optional region.
//!
//! This is not full BCP47: at most 3 subtags are supported (language, script, region).
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use lazy_static::lazy_static;
use log::debug;
use serde::{Deserialize, Serialize};

mod registry;

pub use registry::{lookup_language, LangInfo, MULTILINGUAL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LangTagError {
    /// The tag string could not be parsed.
    InvalidTag { tag: String, reason: String },
    /// Both direct and swapped matches hold, so the source/target sides can't be decided.
    AmbiguousSwap { requested: String, candidate: String },
    /// A pair made of two multilingual placeholders.
    MultilingualBothSides { pair: String },
}

impl fmt::Display for LangTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LangTagError::InvalidTag { tag, reason } => {
                write!(f, "invalid language tag {tag:?}: {reason}")
            }
            LangTagError::AmbiguousSwap {
                requested,
                candidate,
            } => write!(
                f,
                "ambiguous language match between {requested} and {candidate}: both orders are compatible"
            ),
            LangTagError::MultilingualBothSides { pair } => {
                write!(f, "{pair}: both sides are the multilingual placeholder")
            }
        }
    }
}

impl std::error::Error for LangTagError {}

/// Normalized `(language, script, region)` triple.
///
/// Equality and hashing work on the canonical form, where the language's default script is suppressed:
/// `en-Latn-GB` and `en-GB` are the same tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag {
    language: &'static str,
    script: Option<&'static str>,
    region: Option<&'static str>,
}

lazy_static! {
    // tags recur heavily across catalogs, parsing is memoized.
    static ref PARSED: RwLock<HashMap<String, Result<LanguageTag, LangTagError>>> =
        RwLock::new(HashMap::new());
}

impl LanguageTag {
    /// Parses and normalizes a language identifier (memoized).
    pub fn parse(tag: &str) -> Result<Self, LangTagError> {
        if let Ok(cache) = PARSED.read() {
            if let Some(res) = cache.get(tag) {
                return res.clone();
            }
        }
        let res = Self::parse_uncached(tag);
        if let Ok(mut cache) = PARSED.write() {
            cache.insert(tag.to_string(), res.clone());
        }
        res
    }

    fn parse_uncached(tag: &str) -> Result<Self, LangTagError> {
        let invalid = |reason: String| LangTagError::InvalidTag {
            tag: tag.to_string(),
            reason,
        };
        let normalized = tag.trim().replace('_', "-");
        if normalized.is_empty() {
            return Err(invalid("empty tag".to_string()));
        }
        let parts: Vec<&str> = normalized.split('-').collect();
        if parts.len() > 3 {
            return Err(invalid(format!(
                "{} subtags given, at most 3 (language, script, region) are supported",
                parts.len()
            )));
        }

        let info = registry::lookup_language(parts[0])
            .ok_or_else(|| invalid(format!("unknown language {:?}", parts[0])))?;

        let mut script = None;
        let mut region = None;
        if let Some(part) = parts.get(1) {
            if let Some(s) = registry::lookup_script(part) {
                script = Some(s);
            } else if let Some(r) = registry::lookup_region(part) {
                region = Some(r);
            } else {
                return Err(invalid(format!("{part:?} is neither a script nor a region")));
            }
        }
        if let Some(part) = parts.get(2) {
            if script.is_none() {
                return Err(invalid(format!(
                    "{part:?} follows a region; expected language-script-region"
                )));
            }
            region = Some(
                registry::lookup_region(part)
                    .ok_or_else(|| invalid(format!("unknown region {part:?}")))?,
            );
        }

        if script.is_some() && script == info.default_script {
            script = None;
        }

        let parsed = LanguageTag {
            language: info.code3,
            script,
            region,
        };
        debug!("parsed language tag {tag:?} as {parsed}");
        Ok(parsed)
    }

    /// ISO 639-3 code.
    pub fn language(&self) -> &'static str {
        self.language
    }

    /// Script, if it differs from the language's default.
    pub fn script(&self) -> Option<&'static str> {
        self.script
    }

    pub fn region(&self) -> Option<&'static str> {
        self.region
    }

    /// Script in effect, falling back to the language's default.
    pub fn effective_script(&self) -> Option<&'static str> {
        self.script.or_else(|| {
            registry::LANGS
                .get(self.language)
                .and_then(|info| info.default_script)
        })
    }

    pub fn is_multilingual(&self) -> bool {
        self.language == MULTILINGUAL
    }

    /// Same language, same script, and regions not in conflict.
    pub fn is_compatible(&self, other: &LanguageTag) -> bool {
        if self == other {
            return true;
        }
        if self.language != other.language || self.effective_script() != other.effective_script()
        {
            return false;
        }
        !matches!((self.region, other.region), (Some(a), Some(b)) if a != b)
    }
}

impl fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.language)?;
        if let Some(script) = self.script {
            write!(f, "_{script}")?;
        }
        if let Some(region) = self.region {
            write!(f, "_{region}")?;
        }
        Ok(())
    }
}

impl FromStr for LanguageTag {
    type Err = LangTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = LangTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.to_string()
    }
}

/// Parses a `xxx-yyy` language pair, as given on the command line.
pub fn parse_pair(s: &str) -> Result<(LanguageTag, LanguageTag), LangTagError> {
    let parts: Vec<&str> = s.split('-').collect();
    match parts.as_slice() {
        [a, b] => Ok((LanguageTag::parse(a)?, LanguageTag::parse(b)?)),
        _ => Err(LangTagError::InvalidTag {
            tag: s.to_string(),
            reason: "expected a pair of form \"xxx-yyy\", e.g. \"deu-eng\"".to_string(),
        }),
    }
}

/// Compatibility where the multilingual placeholder matches anything.
fn matches(a: &LanguageTag, b: &LanguageTag) -> bool {
    a.is_multilingual() || b.is_multilingual() || a.is_compatible(b)
}

/// Checks whether `candidate` can serve `requested`, and whether its sides are swapped.
///
/// Returns `(compatible, swapped)`. When both orders match the pairs are ambiguous and an
/// error is returned: picking either side silently could misalign source and target.
pub fn check_compat_swap(
    requested: &(LanguageTag, LanguageTag),
    candidate: &(LanguageTag, LanguageTag),
) -> Result<(bool, bool), LangTagError> {
    for pair in [requested, candidate] {
        if pair.0.is_multilingual() && pair.1.is_multilingual() {
            return Err(LangTagError::MultilingualBothSides {
                pair: format!("{}-{}", pair.0, pair.1),
            });
        }
    }
    let (a, b) = requested;
    let (aa, bb) = candidate;
    let direct = matches(a, aa) && matches(b, bb);
    let swapped = matches(a, bb) && matches(b, aa);
    if direct && swapped {
        return Err(LangTagError::AmbiguousSwap {
            requested: format!("{a}-{b}"),
            candidate: format!("{aa}-{bb}"),
        });
    }
    Ok((direct || swapped, swapped))
}
