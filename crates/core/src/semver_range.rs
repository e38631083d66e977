//! npm-style semver ranges.
//!
//! Target app versions are written the way mobile release tooling writes
//! them: `1.2.3`, `1.2.x`, `~1.2`, `^1.0.0`, `>=1.0.0 <2.0.0`, `1.0 - 1.4`,
//! `*`, and `||` alternatives of any of these. Each alternative desugars to a
//! set of primitive comparators that must all hold.

use crate::error::{Error, Result};
use semver::{Prerelease, Version};

/// Operators that may be separated from their version by whitespace.
const OPERATOR_CHARS: &[char] = &['>', '<', '=', '~', '^'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    /// A comparator no version satisfies.
    fn never() -> Self {
        Self::new(Op::Lt, Version::new(0, 0, 0))
    }

    fn matches(&self, v: &Version) -> bool {
        match self.op {
            Op::Eq => *v == self.version,
            Op::Gt => *v > self.version,
            Op::Gte => *v >= self.version,
            Op::Lt => *v < self.version,
            Op::Lte => *v <= self.version,
        }
    }
}

/// A parsed version range: a disjunction of comparator sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Range {
    sets: Vec<Vec<Comparator>>,
}

impl Range {
    /// Parse a range expression.
    pub fn parse(input: &str) -> Result<Self> {
        let mut sets = Vec::new();
        for alternative in input.split("||") {
            let alternative = normalize(alternative);
            let set = match alternative.split_once(" - ") {
                Some((low, high)) => hyphen(low, high)?,
                None => {
                    let mut comparators = Vec::new();
                    for token in alternative.split_whitespace() {
                        comparators.extend(parse_comparator(token)?);
                    }
                    comparators
                }
            };
            sets.push(set);
        }
        Ok(Self { sets })
    }

    /// Check whether a concrete version lies within the range.
    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set_matches(set, version))
    }

    /// The lowest version that satisfies the range, if any does.
    pub fn min_version(&self) -> Option<Version> {
        let zero = Version::new(0, 0, 0);
        if self.satisfies(&zero) {
            return Some(zero);
        }

        let mut best: Option<Version> = None;
        for set in &self.sets {
            let mut set_min: Option<Version> = None;
            for comparator in set {
                let candidate = match comparator.op {
                    Op::Eq | Op::Gte => comparator.version.clone(),
                    Op::Gt => match bump_for_gt(&comparator.version) {
                        Some(next) => next,
                        None => {
                            set_min = None;
                            break;
                        }
                    },
                    Op::Lt | Op::Lte => continue,
                };
                if set_min.as_ref().is_none_or(|current| candidate > *current) {
                    set_min = Some(candidate);
                }
            }
            if let Some(candidate) = set_min
                && set_matches(set, &candidate)
                && best.as_ref().is_none_or(|current| candidate < *current)
            {
                best = Some(candidate);
            }
        }
        best
    }
}

impl std::str::FromStr for Range {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Extract the first `major[.minor[.patch]]` run from arbitrary text.
///
/// `"v2"` becomes `2.0.0`, `"1.4.2-beta"` becomes `1.4.2`, `"build 7.1"`
/// becomes `7.1.0`.
pub fn coerce(input: &str) -> Option<Version> {
    let bytes = input.as_bytes();
    let start = bytes.iter().position(u8::is_ascii_digit)?;

    let mut parts = [0u64; 3];
    let mut idx = start;
    for (n, part) in parts.iter_mut().enumerate() {
        if n > 0 {
            if bytes.get(idx) != Some(&b'.')
                || !bytes.get(idx + 1).is_some_and(u8::is_ascii_digit)
            {
                break;
            }
            idx += 1;
        }
        let end = bytes[idx..]
            .iter()
            .position(|b| !b.is_ascii_digit())
            .map_or(bytes.len(), |p| idx + p);
        *part = input[idx..end].parse().ok()?;
        idx = end;
    }

    Some(Version::new(parts[0], parts[1], parts[2]))
}

/// Canonical spelling of a range, suitable for use as a storage key segment.
///
/// Collapses whitespace runs, trims, and joins operators to their version
/// (`">= 5.7.0  <= 5.7.4"` becomes `">=5.7.0 <=5.7.4"`) while keeping the
/// single space that separates comparators.
pub fn normalize(range: &str) -> String {
    let mut out = String::with_capacity(range.len());
    for token in range.split_whitespace() {
        let joins_operator = out.ends_with(OPERATOR_CHARS)
            && token.starts_with(|c: char| c.is_ascii_digit());
        if !out.is_empty() && !joins_operator {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

/// Whether a range string is the match-everything wildcard.
pub fn is_wildcard(range: &str) -> bool {
    matches!(range.trim(), "*" | "x" | "X")
}

/// Whether a range string names exactly one version.
pub fn is_exact(range: &str) -> bool {
    let normalized = normalize(range);
    let trimmed = normalized.strip_prefix('=').unwrap_or(&normalized);
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).is_ok()
}

fn set_matches(set: &[Comparator], version: &Version) -> bool {
    if !set.iter().all(|c| c.matches(version)) {
        return false;
    }
    if version.pre.is_empty() {
        return true;
    }
    // Prereleases only match when a comparator opts into the same release line.
    set.iter().any(|c| {
        !c.version.pre.is_empty()
            && c.version.major == version.major
            && c.version.minor == version.minor
            && c.version.patch == version.patch
    })
}

/// The smallest version above `version`; `None` past the last patch.
fn bump_for_gt(version: &Version) -> Option<Version> {
    let mut next = version.clone();
    if next.pre.is_empty() {
        next.patch = next.patch.checked_add(1)?;
    } else {
        next.pre = Prerelease::new(&format!("{}.0", version.pre))
            .unwrap_or_else(|_| version.pre.clone());
    }
    Some(next)
}

/// A possibly incomplete version: `1`, `1.2`, `1.x`, `1.2.3-rc.1`.
#[derive(Debug, Default)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let input = input.strip_prefix(['v', 'V']).unwrap_or(input);
        let input = input.split_once('+').map_or(input, |(core, _build)| core);
        if input.is_empty() {
            return Ok(Self::default());
        }

        let (core, pre) = match input.split_once('-') {
            Some((core, pre)) => (
                core,
                Prerelease::new(pre).map_err(|e| Error::InvalidVersion(format!("{input}: {e}")))?,
            ),
            None => (input, Prerelease::EMPTY),
        };

        let mut numbers = [None; 3];
        let mut wildcard_seen = false;
        let mut count = 0;
        for (slot, part) in numbers.iter_mut().zip(core.split('.')) {
            count += 1;
            if wildcard_seen || matches!(part, "x" | "X" | "*") {
                wildcard_seen = true;
                continue;
            }
            let value = part.parse::<u64>().map_err(|_| {
                Error::InvalidVersion(format!("invalid version component {part:?} in {input:?}"))
            })?;
            *slot = Some(value);
        }
        if core.split('.').count() > 3 || count == 0 {
            return Err(Error::InvalidVersion(input.to_string()));
        }

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
        })
    }

    /// Fill missing components with zero, keeping the prerelease only for full versions.
    fn floor(&self) -> Version {
        let mut v = Version::new(
            self.major.unwrap_or(0),
            self.minor.unwrap_or(0),
            self.patch.unwrap_or(0),
        );
        if self.patch.is_some() {
            v.pre = self.pre.clone();
        }
        v
    }

    fn full(&self) -> Option<Version> {
        let mut v = Version::new(self.major?, self.minor?, self.patch?);
        v.pre = self.pre.clone();
        Some(v)
    }
}

fn parse_comparator(token: &str) -> Result<Vec<Comparator>> {
    const OPERATORS: [&str; 8] = [">=", "<=", "~>", ">", "<", "=", "~", "^"];
    let (op, rest) = OPERATORS
        .iter()
        .find_map(|op| token.strip_prefix(op).map(|rest| (*op, rest)))
        .unwrap_or(("", token));
    let partial = Partial::parse(rest)?;

    Ok(match op {
        "" | "=" => x_range(&partial)?,
        "~" | "~>" => tilde(&partial)?,
        "^" => caret(&partial)?,
        ">" => greater_than(&partial)?,
        ">=" => match partial.major {
            None => Vec::new(),
            Some(_) => vec![Comparator::new(Op::Gte, partial.floor())],
        },
        "<" => match partial.major {
            None => vec![Comparator::never()],
            Some(_) => vec![Comparator::new(Op::Lt, partial.floor())],
        },
        _ => less_or_equal(&partial)?,
    })
}

fn bounded(low: Version, high: Version) -> Vec<Comparator> {
    vec![Comparator::new(Op::Gte, low), Comparator::new(Op::Lt, high)]
}

/// Next value of a version component, for exclusive upper bounds.
fn next(component: u64) -> Result<u64> {
    component
        .checked_add(1)
        .ok_or_else(|| Error::InvalidVersion(format!("version component {component} is too large")))
}

fn x_range(p: &Partial) -> Result<Vec<Comparator>> {
    Ok(match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(major), None, _) => {
            bounded(Version::new(major, 0, 0), Version::new(next(major)?, 0, 0))
        }
        (Some(major), Some(minor), None) => bounded(
            Version::new(major, minor, 0),
            Version::new(major, next(minor)?, 0),
        ),
        (Some(_), Some(_), Some(_)) => p
            .full()
            .map(|v| vec![Comparator::new(Op::Eq, v)])
            .unwrap_or_default(),
    })
}

fn tilde(p: &Partial) -> Result<Vec<Comparator>> {
    Ok(match (p.major, p.minor) {
        (None, _) => Vec::new(),
        (Some(major), None) => {
            bounded(Version::new(major, 0, 0), Version::new(next(major)?, 0, 0))
        }
        (Some(major), Some(minor)) => bounded(p.floor(), Version::new(major, next(minor)?, 0)),
    })
}

fn caret(p: &Partial) -> Result<Vec<Comparator>> {
    Ok(match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(major), None, _) => {
            bounded(Version::new(major, 0, 0), Version::new(next(major)?, 0, 0))
        }
        (Some(0), Some(minor), None) => {
            bounded(Version::new(0, minor, 0), Version::new(0, next(minor)?, 0))
        }
        (Some(major), Some(minor), None) => {
            bounded(Version::new(major, minor, 0), Version::new(next(major)?, 0, 0))
        }
        (Some(0), Some(0), Some(patch)) => bounded(p.floor(), Version::new(0, 0, next(patch)?)),
        (Some(0), Some(minor), Some(_)) => bounded(p.floor(), Version::new(0, next(minor)?, 0)),
        (Some(major), Some(_), Some(_)) => bounded(p.floor(), Version::new(next(major)?, 0, 0)),
    })
}

fn greater_than(p: &Partial) -> Result<Vec<Comparator>> {
    Ok(match (p.major, p.minor, p.patch) {
        (None, _, _) => vec![Comparator::never()],
        (Some(major), None, _) => vec![Comparator::new(Op::Gte, Version::new(next(major)?, 0, 0))],
        (Some(major), Some(minor), None) => {
            vec![Comparator::new(Op::Gte, Version::new(major, next(minor)?, 0))]
        }
        (Some(_), Some(_), Some(_)) => vec![Comparator::new(Op::Gt, p.floor())],
    })
}

fn less_or_equal(p: &Partial) -> Result<Vec<Comparator>> {
    Ok(match (p.major, p.minor, p.patch) {
        (None, _, _) => Vec::new(),
        (Some(major), None, _) => vec![Comparator::new(Op::Lt, Version::new(next(major)?, 0, 0))],
        (Some(major), Some(minor), None) => {
            vec![Comparator::new(Op::Lt, Version::new(major, next(minor)?, 0))]
        }
        (Some(_), Some(_), Some(_)) => vec![Comparator::new(Op::Lte, p.floor())],
    })
}

fn hyphen(low: &str, high: &str) -> Result<Vec<Comparator>> {
    let low = Partial::parse(low)?;
    let high = Partial::parse(high)?;

    let mut set = Vec::new();
    if low.major.is_some() {
        set.push(Comparator::new(Op::Gte, low.floor()));
    }
    set.extend(less_or_equal(&high)?);
    Ok(set)
}
