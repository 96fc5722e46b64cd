//! Canonical channel layouts recognised at load time.
//!
//! When the uploaded column names overlap one of these sets, the matrix is
//! reordered into the canonical order and absent channels are zero-filled.

use once_cell::sync::Lazy;

use crate::signal::color::Color;

#[derive(Clone, Debug)]
pub struct CanonicalChannel {
    /// Case-normalized identifier (upper case, no whitespace).
    pub id: &'static str,
    pub display: &'static str,
    pub color: Color,
}

#[derive(Clone, Debug)]
pub struct CanonicalSet {
    pub name: &'static str,
    pub channels: Vec<CanonicalChannel>,
}

impl CanonicalSet {
    pub fn position(&self, normalized: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.id == normalized)
    }

    fn matches(&self, normalized_names: &[String]) -> usize {
        normalized_names
            .iter()
            .filter(|n| self.position(n).is_some())
            .count()
    }
}

fn build(name: &'static str, entries: &[(&'static str, &'static str, &'static str)]) -> CanonicalSet {
    CanonicalSet {
        name,
        channels: entries
            .iter()
            .map(|&(id, display, hex)| CanonicalChannel {
                id,
                display,
                color: Color::from_hex(hex).unwrap_or(Color::LABEL),
            })
            .collect(),
    }
}

pub static ECG_12_LEAD: Lazy<CanonicalSet> = Lazy::new(|| {
    build(
        "ecg-12-lead",
        &[
            ("I", "I", "#007BFF"),
            ("II", "II", "#17A2B8"),
            ("III", "III", "#28A745"),
            ("AVR", "aVR", "#DC3545"),
            ("AVL", "aVL", "#FD7E14"),
            ("AVF", "aVF", "#6F42C1"),
            ("V1", "V1", "#E83E8C"),
            ("V2", "V2", "#20C997"),
            ("V3", "V3", "#6610F2"),
            ("V4", "V4", "#FFC107"),
            ("V5", "V5", "#343A40"),
            ("V6", "V6", "#6C757D"),
        ],
    )
});

pub static EEG_10_20: Lazy<CanonicalSet> = Lazy::new(|| {
    build(
        "eeg-10-20",
        &[
            ("FP1", "Fp1", "#E63946"),
            ("FP2", "Fp2", "#06D6A0"),
            ("F7", "F7", "#118AB2"),
            ("F3", "F3", "#FFD166"),
            ("FZ", "Fz", "#8338EC"),
            ("F4", "F4", "#06BCC1"),
            ("F8", "F8", "#F8961E"),
            ("T3", "T3", "#9B5DE5"),
            ("C3", "C3", "#118C4F"),
            ("CZ", "Cz", "#1D3557"),
            ("C4", "C4", "#B56576"),
            ("T4", "T4", "#6A4C93"),
            ("T5", "T5", "#00A8E8"),
            ("P3", "P3", "#EF476F"),
            ("PZ", "Pz", "#C77DFF"),
            ("P4", "P4", "#4CAF50"),
            ("T6", "T6", "#FFD23F"),
            ("O1", "O1", "#FF6B6B"),
            ("O2", "O2", "#3A86FF"),
        ],
    )
});

/// Upper-cases and strips whitespace, the form used for all channel ids.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Picks the canonical set with the most matching names, if any match at all.
pub fn best_match(normalized_names: &[String]) -> Option<&'static CanonicalSet> {
    [&*ECG_12_LEAD, &*EEG_10_20]
        .into_iter()
        .map(|set| (set.matches(normalized_names), set))
        .filter(|(hits, _)| *hits > 0)
        .max_by_key(|(hits, _)| *hits)
        .map(|(_, set)| set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_name(" a VR "), "AVR");
        assert_eq!(normalize_name("Fp1"), "FP1");
    }

    #[test]
    fn picks_the_set_with_most_hits() {
        let ecg: Vec<String> = ["II", "V1", "TIME"].iter().map(|s| s.to_string()).collect();
        assert_eq!(best_match(&ecg).map(|s| s.name), Some("ecg-12-lead"));
        let eeg: Vec<String> = ["FP1", "CZ", "O2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(best_match(&eeg).map(|s| s.name), Some("eeg-10-20"));
        let none: Vec<String> = vec!["FOO".into()];
        assert!(best_match(&none).is_none());
    }
}
