#![forbid(unsafe_code)]

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Version, VersionError};

fn range_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // An unprefixed first version counts as an inclusive minimum.
        Regex::new(r"^(?:(>=|>)?\s*([^\s<>=]+))?\s*(?:(<=|<)\s*([^\s<>=]+))?$")
            .expect("range pattern compiles")
    })
}

/// A version requirement, as written in call sites, policies and resolution
/// requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    Exact(Version),
    /// `^V`: at least `V`, below the next major.
    Caret(Version),
    /// `~V`: at least `V`, below the next minor.
    Tilde(Version),
    Range {
        min: Option<Version>,
        max: Option<Version>,
        min_inclusive: bool,
        max_inclusive: bool,
    },
    /// Highest registered version; resolved by the registry.
    Latest,
    /// Any version without a prerelease tag.
    Stable,
    Any,
}

impl Constraint {
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let text = input.trim();
        match text {
            "latest" | "*" => return Ok(Constraint::Latest),
            "stable" | "stable-only" => return Ok(Constraint::Stable),
            "any" | "all-versions" => return Ok(Constraint::Any),
            _ => {}
        }

        if let Some(rest) = text.strip_prefix('^') {
            return Ok(Constraint::Caret(Version::parse(rest)?));
        }
        if let Some(rest) = text.strip_prefix('~') {
            return Ok(Constraint::Tilde(Version::parse(rest)?));
        }
        if let Ok(v) = Version::parse(text) {
            return Ok(Constraint::Exact(v));
        }

        let caps = range_pattern()
            .captures(text)
            .filter(|c| c.get(2).is_some() || c.get(4).is_some())
            .ok_or_else(|| VersionError::InvalidConstraint(input.to_string()))?;

        let min = caps.get(2).map(|m| Version::parse(m.as_str())).transpose()?;
        let max = caps.get(4).map(|m| Version::parse(m.as_str())).transpose()?;
        let min_inclusive = caps.get(1).map(|m| m.as_str()) != Some(">");
        let max_inclusive = caps.get(3).map(|m| m.as_str()) == Some("<=");
        Ok(Constraint::Range {
            min,
            max,
            min_inclusive,
            max_inclusive,
        })
    }

    pub fn satisfied_by(&self, v: &Version) -> bool {
        match self {
            Constraint::Exact(want) => v == want,
            Constraint::Caret(base) => v >= base && *v < base.next_major(),
            Constraint::Tilde(base) => v >= base && *v < base.next_minor(),
            Constraint::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => {
                if let Some(min) = min {
                    let ok = if *min_inclusive { v >= min } else { v > min };
                    if !ok {
                        return false;
                    }
                }
                if let Some(max) = max {
                    let ok = if *max_inclusive { v <= max } else { v < max };
                    if !ok {
                        return false;
                    }
                }
                true
            }
            Constraint::Latest => true,
            Constraint::Stable => !v.is_prerelease(),
            Constraint::Any => true,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Exact(v) => write!(f, "{v}"),
            Constraint::Caret(v) => write!(f, "^{v}"),
            Constraint::Tilde(v) => write!(f, "~{v}"),
            Constraint::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => {
                let mut wrote = false;
                if let Some(min) = min {
                    write!(f, "{}{min}", if *min_inclusive { ">=" } else { ">" })?;
                    wrote = true;
                }
                if let Some(max) = max {
                    if wrote {
                        write!(f, " ")?;
                    }
                    write!(f, "{}{max}", if *max_inclusive { "<=" } else { "<" })?;
                }
                Ok(())
            }
            Constraint::Latest => write!(f, "latest"),
            Constraint::Stable => write!(f, "stable"),
            Constraint::Any => write!(f, "any"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn named_constraints() {
        assert_eq!(Constraint::parse("latest").unwrap(), Constraint::Latest);
        assert_eq!(Constraint::parse("*").unwrap(), Constraint::Latest);
        assert_eq!(Constraint::parse("stable").unwrap(), Constraint::Stable);
        assert_eq!(
            Constraint::parse("stable-only").unwrap(),
            Constraint::Stable
        );
        assert_eq!(Constraint::parse("any").unwrap(), Constraint::Any);
        assert_eq!(Constraint::parse("all-versions").unwrap(), Constraint::Any);
    }

    #[test]
    fn caret_accepts_up_to_next_major() {
        let c = Constraint::parse("^1.2.3").unwrap();
        assert!(c.satisfied_by(&v("1.2.3")));
        assert!(c.satisfied_by(&v("1.9.0")));
        assert!(!c.satisfied_by(&v("2.0.0")));
        assert!(!c.satisfied_by(&v("1.2.2")));
    }

    #[test]
    fn tilde_accepts_up_to_next_minor() {
        let c = Constraint::parse("~1.2.3").unwrap();
        assert!(c.satisfied_by(&v("1.2.9")));
        assert!(!c.satisfied_by(&v("1.3.0")));
    }

    #[test]
    fn bare_version_is_exact() {
        let c = Constraint::parse("1.2.3").unwrap();
        assert_eq!(c, Constraint::Exact(v("1.2.3")));
        assert!(c.satisfied_by(&v("1.2.3")));
        assert!(!c.satisfied_by(&v("1.2.4")));
    }

    #[test]
    fn range_expressions() {
        let c = Constraint::parse(">=1.0.0 <2.0.0").unwrap();
        assert!(c.satisfied_by(&v("1.0.0")));
        assert!(c.satisfied_by(&v("1.9.9")));
        assert!(!c.satisfied_by(&v("2.0.0")));

        let c = Constraint::parse(">1.0.0").unwrap();
        assert!(!c.satisfied_by(&v("1.0.0")));
        assert!(c.satisfied_by(&v("1.0.1")));

        let c = Constraint::parse("<=2.0.0").unwrap();
        assert!(c.satisfied_by(&v("2.0.0")));
        assert!(!c.satisfied_by(&v("2.0.1")));
    }

    #[test]
    fn stable_excludes_prereleases() {
        let c = Constraint::Stable;
        assert!(c.satisfied_by(&v("1.0.0")));
        assert!(!c.satisfied_by(&v("1.0.0-beta")));
    }

    #[test]
    fn invalid_constraints_are_rejected() {
        assert!(Constraint::parse("not a constraint").is_err());
        assert!(Constraint::parse("^garbage").is_err());
    }
}
