//! Multi-component numeric-with-tail version ordering, the same comparison
//! the original project's `core/version.c` uses to decide
//! no-downgrading/no-reinstalling/check-max-version policy.

use std::cmp::Ordering;

/// One dot-separated component: a leading unsigned integer plus whatever
/// non-numeric tail follows it (e.g. `"3-rc1"` -> `(3, "-rc1")`).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Component {
    number: u64,
    tail: String,
}

impl Component {
    fn parse(s: &str) -> Option<Component> {
        let digit_count = s.chars().take_while(|c| c.is_ascii_digit()).count();
        if digit_count == 0 {
            return None;
        }
        let number: u64 = s[..digit_count].parse().ok()?;
        Some(Component {
            number,
            tail: s[digit_count..].to_string(),
        })
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number).then_with(|| self.tail.cmp(&other.tail))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed version string: up to four dot-separated components, missing
/// components treated as zero. When the very first component has no
/// leading digits, comparison falls back to whole-string lexicographic
/// ordering (this is how pre-release tags like `"unstable"` still order
/// deterministically against each other).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Version {
    Numeric([Component; 4]),
    Opaque(String),
}

const ZERO: Component = Component { number: 0, tail: String::new() };

impl Version {
    pub fn parse(s: &str) -> Version {
        let mut parts = s.splitn(4, '.');
        let first = parts.next().unwrap_or("");
        let Some(first) = Component::parse(first) else {
            return Version::Opaque(s.to_string());
        };
        let mut components = [ZERO, ZERO, ZERO, ZERO];
        components[0] = first;
        for (slot, part) in components[1..].iter_mut().zip(parts) {
            *slot = Component::parse(part).unwrap_or_else(|| ZERO);
        }
        Version::Numeric(components)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Version::Numeric(a), Version::Numeric(b)) => a.cmp(b),
            (Version::Opaque(a), Version::Opaque(b)) => a.cmp(b),
            // A numeric version and an opaque one never arise from the same
            // field in practice; fall back to comparing their original text.
            (Version::Opaque(a), Version::Numeric(_)) => a.as_str().cmp(other.as_str_lossy().as_str()),
            (Version::Numeric(_), Version::Opaque(b)) => self.as_str_lossy().as_str().cmp(b.as_str()),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    fn as_str_lossy(&self) -> String {
        match self {
            Version::Opaque(s) => s.clone(),
            Version::Numeric(components) => components
                .iter()
                .map(|c| format!("{}{}", c.number, c.tail))
                .collect::<Vec<_>>()
                .join("."),
        }
    }
}
