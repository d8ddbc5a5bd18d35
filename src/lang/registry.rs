/*! Language, script and region registries.

Languages are keyed by their ISO 639-3 code and carry their ISO 639-1 code (if any),
English reference name and default script. The ISO 639-3, ISO 15924 and ISO 3166-1 tables are
embedded from `data/`. Tags whose script equals the default have it suppressed.
!*/
use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

/// Placeholder for multilingual sources (e.g. one side of a many-to-one bitext).
pub const MULTILINGUAL: &str = "mul";

#[derive(Debug)]
pub struct LangInfo {
    pub code3: &'static str,
    pub code2: Option<&'static str>,
    /// ISO 639-2/B code, where it differs from the 639-3 one (e.g. `ger`).
    pub code2b: Option<&'static str>,
    pub name: &'static str,
    pub is_macro: bool,
    pub default_script: Option<&'static str>,
}

const ISO639_3: &str = include_str!("data/iso639_3.tsv");
const ISO15924: &str = include_str!("data/iso15924.tsv");
const ISO3166: &str = include_str!("data/iso3166.tsv");
const DEFAULT_SCRIPTS: &str = include_str!("data/default_scripts.tsv");

/// Non-standard codes seen in the wild, mapped to ISO 639-3.
const CUSTOM_ALIASES: &[(&str, &str)] = &[
    ("ns", "nso"),
    ("sz", "szl"),
    ("tz", "zgh"),
    ("zz", "zza"),
    ("cb", "ckb"),
    ("cx", "bsb"),
    ("in", "ind"),
    ("iw", "heb"),
    ("jp", "jpn"),
    ("jap", "jpn"),
    ("daf", "dnj"),
];

/// Rows of a tab-separated table, header skipped.
/// Fields borrow from the embedded table, hence no csv reader here.
fn rows(table: &'static str) -> impl Iterator<Item = Vec<&'static str>> {
    table
        .lines()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split('\t').collect())
}

fn non_empty(s: &'static str) -> Option<&'static str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn first_column(table: &'static str) -> HashSet<&'static str> {
    rows(table).filter_map(|r| r.first().copied()).collect()
}

lazy_static! {
    pub static ref LANGS: HashMap<&'static str, LangInfo> = {
        let scripts: HashMap<&'static str, &'static str> = rows(DEFAULT_SCRIPTS)
            .filter_map(|r| match r.as_slice() {
                [code3, script] => Some((*code3, *script)),
                _ => None,
            })
            .collect();
        rows(ISO639_3)
            .filter_map(|r| match r.as_slice() {
                [code3, code2b, code2, scope, _kind, name] => Some((
                    *code3,
                    LangInfo {
                        code3: *code3,
                        code2: non_empty(code2),
                        code2b: non_empty(code2b),
                        name: *name,
                        is_macro: *scope == "M",
                        default_script: scripts.get(code3).copied(),
                    },
                )),
                _ => None,
            })
            .collect()
    };

    static ref CODE2_TO_3: HashMap<&'static str, &'static str> = LANGS
        .values()
        .filter_map(|info| Some((info.code2?, info.code3)))
        .collect();

    static ref CODE2B_TO_3: HashMap<&'static str, &'static str> = LANGS
        .values()
        .filter_map(|info| Some((info.code2b?, info.code3)))
        .collect();

    /// Reference names, plus their short forms: `nepali (individual)` and `nepali`.
    /// A short form shared by several languages goes to the macrolanguage.
    static ref NAME_TO_3: HashMap<String, &'static str> = {
        let mut infos: Vec<&LangInfo> = LANGS.values().collect();
        infos.sort_by_key(|i| (!i.is_macro, i.code2.is_none(), i.code3));
        let mut names = HashMap::new();
        for info in &infos {
            names.entry(info.name.to_lowercase()).or_insert(info.code3);
        }
        for info in &infos {
            let name = info.name.to_lowercase();
            if let Some(short) = name.strip_suffix(" language)") {
                names.entry(format!("{short})")).or_insert(info.code3);
            }
            if let Some((base, _)) = name.split_once(" (") {
                names.entry(base.to_string()).or_insert(info.code3);
            }
        }
        names
    };

    static ref ALIAS_TO_3: HashMap<&'static str, &'static str> =
        CUSTOM_ALIASES.iter().copied().collect();

    pub static ref SCRIPT_CODES: HashSet<&'static str> = first_column(ISO15924);
    pub static ref REGION_CODES: HashSet<&'static str> = first_column(ISO3166);
}

/// Resolves a language code (ISO 639-3, 639-1 or 639-2/B), an English name or a known alias
/// into its registry entry. Lookup is case-insensitive.
pub fn lookup_language(code: &str) -> Option<&'static LangInfo> {
    let code = code.trim().to_lowercase();
    LANGS
        .get(code.as_str())
        .or_else(|| CODE2_TO_3.get(code.as_str()).and_then(|c| LANGS.get(c)))
        .or_else(|| CODE2B_TO_3.get(code.as_str()).and_then(|c| LANGS.get(c)))
        .or_else(|| NAME_TO_3.get(&code).and_then(|c| LANGS.get(c)))
        .or_else(|| ALIAS_TO_3.get(code.as_str()).and_then(|c| LANGS.get(c)))
}

/// Returns the canonical script code if `code` is a known script (case-insensitive).
pub fn lookup_script(code: &str) -> Option<&'static str> {
    if code.len() != 4 {
        return None;
    }
    let mut titled = String::with_capacity(4);
    for (i, c) in code.chars().enumerate() {
        if i == 0 {
            titled.extend(c.to_uppercase());
        } else {
            titled.extend(c.to_lowercase());
        }
    }
    SCRIPT_CODES.get(titled.as_str()).copied()
}

/// Returns the canonical region code if `code` is a known 2-letter region (case-insensitive).
pub fn lookup_region(code: &str) -> Option<&'static str> {
    if code.len() != 2 {
        return None;
    }
    REGION_CODES.get(code.to_uppercase().as_str()).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_codes() {
        assert_eq!(lookup_language("en").map(|l| l.code3), Some("eng"));
        assert_eq!(lookup_language("ENG").map(|l| l.code3), Some("eng"));
        assert_eq!(lookup_language("kannada").map(|l| l.code3), Some("kan"));
        assert_eq!(lookup_language("iw").map(|l| l.code3), Some("heb"));
        assert!(lookup_language("xx").is_none());
    }

    #[test]
    fn test_script_region() {
        assert_eq!(lookup_script("latn"), Some("Latn"));
        assert_eq!(lookup_script("LATN"), Some("Latn"));
        assert_eq!(lookup_script("GB"), None);
        assert_eq!(lookup_region("gb"), Some("GB"));
        assert_eq!(lookup_region("UK"), None);
    }

    #[test]
    fn test_full_tables() {
        assert!(LANGS.len() > 7800);
        assert!(SCRIPT_CODES.len() > 150);
        assert!(REGION_CODES.len() > 240);
        assert_eq!(LANGS.len(), ISO639_3.lines().count() - 1);
        assert_eq!(lookup_language("npi").map(|l| l.code3), Some("npi"));
        assert_eq!(lookup_language("ady").map(|l| l.name), Some("Adyghe"));
        assert_eq!(lookup_script("Tale"), Some("Tale"));
        assert_eq!(lookup_region("xk"), Some("XK"));
    }

    #[test]
    fn test_lookup_names() {
        assert_eq!(lookup_language("Nepali (individual)").map(|l| l.code3), Some("npi"));
        assert_eq!(
            lookup_language("Nepali (individual language)").map(|l| l.code3),
            Some("npi")
        );
        assert_eq!(lookup_language("nepali").map(|l| l.code3), Some("nep"));
        assert_eq!(lookup_language("konkani").map(|l| l.code3), Some("kok"));
        assert_eq!(lookup_language("Modern Greek").map(|l| l.code3), Some("ell"));
        assert_eq!(lookup_language("ger").map(|l| l.code3), Some("deu"));
        assert_eq!(lookup_language("ne").map(|l| l.code3), Some("nep"));
    }

    #[test]
    fn test_default_scripts_are_known() {
        for (code3, script) in rows(DEFAULT_SCRIPTS).map(|r| (r[0], r[1])) {
            assert!(LANGS.contains_key(code3), "{} is not a language", code3);
            assert!(SCRIPT_CODES.contains(script), "{} has {}", code3, script);
        }
        assert_eq!(LANGS["kan"].default_script, Some("Knda"));
        assert_eq!(LANGS["npi"].default_script, None);
    }
}
