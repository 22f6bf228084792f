//! Multi-part naming conventions and fragment classification.
//!
//! A fragment is recognized from its file name alone. Four conventions are
//! supported, tried in a fixed priority order so a name matching both a
//! format-specific rule and the generic numeric rule resolves to the specific one:
//!
//! 1. `archive.zip.001`, `archive.7z.002`, `archive.tar.003` (split numbering)
//! 2. `archive.part1.rar`, `archive.part02.zip`, `archive.part1.7z` (volumes)
//! 3. `archive.z01` (z-style split)
//! 4. `archive.001` (bare numeric suffix)
//!
//! Nothing here touches the filesystem.

use crate::types::{ContainerHint, FragmentDescriptor};
use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Which naming convention a fragment follows
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Convention {
    /// `name.7z.001`
    SplitNumbered,
    /// `name.part1.rar`
    Volume,
    /// `name.z01`
    ZSplit,
    /// `name.001`
    Numbered,
}

/// Naming-convention patterns in priority order.
///
/// Group 1 is the logical id, group 2 the digits that give the ordinal.
const FRAGMENT_PATTERNS: [(Convention, &str); 4] = [
    (Convention::SplitNumbered, r"^(.+)\.(?:zip|rar|7z|tar|gz|bz2)\.(\d+)$"),
    (Convention::Volume, r"^(.+)\.part(\d+)\.(?:rar|zip|7z)$"),
    (Convention::ZSplit, r"^(.+)\.z(\d+)$"),
    (Convention::Numbered, r"^(.+)\.(\d{3})$"),
];

static PATTERNS: LazyLock<Vec<(Convention, Regex)>> = LazyLock::new(|| {
    FRAGMENT_PATTERNS
        .iter()
        .filter_map(|(convention, pattern)| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map(|regex| (*convention, regex))
                .map_err(|e| tracing::error!(pattern, error = %e, "invalid fragment pattern"))
                .ok()
        })
        .collect()
});

/// Classify a file name as a fragment of a multi-part archive.
///
/// Returns `None` when the name matches none of the supported conventions.
///
/// # Examples
///
/// ```
/// use partjoin::classifier::classify;
/// use partjoin::types::ContainerHint;
///
/// let d = classify("movie.part2.rar").unwrap();
/// assert_eq!(d.logical_id, "movie");
/// assert_eq!(d.ordinal, 2);
/// assert_eq!(d.container, ContainerHint::Rar);
/// assert!(!d.is_canonical_first);
///
/// assert!(classify("notes.txt").is_none());
/// ```
#[must_use]
pub fn classify(file_name: &str) -> Option<FragmentDescriptor> {
    let (convention, caps) = PATTERNS
        .iter()
        .find_map(|(convention, pattern)| pattern.captures(file_name).map(|c| (*convention, c)))?;

    let logical_id = caps.get(1)?.as_str().to_string();
    let digits = caps.get(2)?.as_str();
    let Ok(ordinal) = digits.parse::<u32>() else {
        tracing::debug!(file = file_name, digits, "fragment number out of range");
        return None;
    };

    let lower = file_name.to_lowercase();
    let container = container_of(&lower, convention);
    let is_canonical_first = canonical_first(&lower, convention, container, ordinal);

    Some(FragmentDescriptor {
        logical_id,
        ordinal,
        container,
        is_canonical_first,
        file_name: file_name.to_string(),
    })
}

/// Whether a file name matches any supported fragment convention.
#[must_use]
pub fn is_fragment(file_name: &str) -> bool {
    PATTERNS.iter().any(|(_, pattern)| pattern.is_match(file_name))
}

/// Check if a file name is the first volume of a `.partN.rar` / `.partN.7z` set.
///
/// Zero padding is accepted (`part1`, `part01`, `part001`). Split-numbered names
/// such as `archive.7z.001` are not volumes and return `false`.
#[must_use]
pub fn is_first_volume(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    let Some(stem) = lower
        .strip_suffix(".rar")
        .or_else(|| lower.strip_suffix(".7z"))
    else {
        return false;
    };
    let Some(part_idx) = stem.rfind(".part") else {
        return false;
    };
    let num_str = &stem[part_idx + 5..];
    !num_str.is_empty()
        && num_str.chars().all(|c| c.is_ascii_digit())
        && num_str.parse::<u32>().ok() == Some(1)
}

/// Whether the name ends in a dot followed by exactly three digits
fn has_three_digit_suffix(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    bytes.len() >= 4
        && bytes[bytes.len() - 4] == b'.'
        && bytes[bytes.len() - 3..].iter().all(u8::is_ascii_digit)
}

/// Format hint from the dot-separated extension tokens (`holiday.party.7z.001`
/// has the tokens `party`, `7z` and `001`)
fn container_of(lower: &str, convention: Convention) -> ContainerHint {
    if convention == Convention::ZSplit {
        return ContainerHint::ZSplit;
    }
    let has = |ext: &str| lower.split('.').skip(1).any(|token| token == ext);
    if has("rar") {
        ContainerHint::Rar
    } else if has("zip") {
        ContainerHint::Zip
    } else if has("7z") {
        ContainerHint::SevenZip
    } else if has_three_digit_suffix(lower) {
        ContainerHint::Numbered
    } else {
        ContainerHint::Unknown
    }
}

fn canonical_first(
    lower: &str,
    convention: Convention,
    container: ContainerHint,
    ordinal: u32,
) -> bool {
    match (convention, container) {
        (Convention::Volume, ContainerHint::Rar | ContainerHint::Zip) => ordinal == 1,
        (Convention::ZSplit, _) => lower.ends_with("z01"),
        _ => ordinal == 1 || lower.ends_with(".001"),
    }
}
