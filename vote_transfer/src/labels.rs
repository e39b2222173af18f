// Descriptive names for the groups found by the segmentation.
//
// Nothing in the estimation depends on these strings.

use crate::parties::Choice;

/// A centroid share above this value makes its choice dominant.
pub const DOMINANCE_THRESHOLD: f64 = 0.40;

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum LabelLanguage {
    English,
    Spanish,
}

impl LabelLanguage {
    /// Parses "en"/"english" or "es"/"spanish", case-insensitive.
    pub fn parse(s: &str) -> Option<LabelLanguage> {
        match s.to_lowercase().as_str() {
            "en" | "english" => Some(LabelLanguage::English),
            "es" | "spanish" => Some(LabelLanguage::Spanish),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LabelLanguage::English => "en",
            LabelLanguage::Spanish => "es",
        }
    }

    fn high_abstention(&self) -> &'static str {
        match self {
            LabelLanguage::English => "High Abstention",
            LabelLanguage::Spanish => "Alta Abstención",
        }
    }

    fn stronghold(&self) -> &'static str {
        match self {
            LabelLanguage::English => "Stronghold",
            LabelLanguage::Spanish => "Bastión",
        }
    }

    fn mixed(&self) -> &'static str {
        match self {
            LabelLanguage::English => "Mixed",
            LabelLanguage::Spanish => "Mixto",
        }
    }

    fn choice_name(&self, choice: Choice) -> String {
        match (self, choice) {
            (LabelLanguage::Spanish, Choice::Abstention) => "Abstención".to_string(),
            (_, c) => c.to_string(),
        }
    }
}

/// Sorts shares by decreasing value, ties by choice order.
pub fn rank_shares(shares: &[(Choice, f64)]) -> Vec<(Choice, f64)> {
    let mut ranked = shares.to_vec();
    ranked.sort_by(|(c1, v1), (c2, v2)| v2.total_cmp(v1).then_with(|| c1.cmp(c2)));
    ranked
}

/// The label of a centroid, given the share of each feature choice.
pub fn describe_centroid(shares: &[(Choice, f64)], language: LabelLanguage) -> String {
    let ranked = rank_shares(shares);
    match ranked.as_slice() {
        [] => language.mixed().to_string(),
        [(Choice::Abstention, v), ..] if *v > DOMINANCE_THRESHOLD => {
            language.high_abstention().to_string()
        }
        [(top, v), ..] if *v > DOMINANCE_THRESHOLD => {
            format!("{} {}", language.stronghold(), language.choice_name(*top))
        }
        [(top, _)] => format!("{} {}", language.mixed(), language.choice_name(*top)),
        [(top, _), (second, _), ..] => format!(
            "{} {}-{}",
            language.mixed(),
            language.choice_name(*top),
            language.choice_name(*second)
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parties::CanonicalParty;

    const PSOE: Choice = Choice::Party(CanonicalParty::Psoe);
    const PP: Choice = Choice::Party(CanonicalParty::Pp);
    const VOX: Choice = Choice::Party(CanonicalParty::Vox);

    #[test]
    fn dominant_abstention() {
        let shares = [(Choice::Abstention, 0.45), (PSOE, 0.30), (PP, 0.25)];
        assert_eq!(
            describe_centroid(&shares, LabelLanguage::English),
            "High Abstention"
        );
        assert_eq!(
            describe_centroid(&shares, LabelLanguage::Spanish),
            "Alta Abstención"
        );
    }

    #[test]
    fn stronghold_and_mixed() {
        let shares = [(Choice::Abstention, 0.30), (PSOE, 0.50), (PP, 0.20)];
        assert_eq!(
            describe_centroid(&shares, LabelLanguage::English),
            "Stronghold PSOE"
        );
        let shares = [(Choice::Abstention, 0.30), (PSOE, 0.25), (PP, 0.35)];
        assert_eq!(
            describe_centroid(&shares, LabelLanguage::English),
            "Mixed PP-Abstention"
        );
        assert_eq!(
            describe_centroid(&shares, LabelLanguage::Spanish),
            "Mixto PP-Abstención"
        );
    }

    #[test]
    fn threshold_is_strict() {
        let shares = [(PSOE, 0.40), (PP, 0.35), (Choice::Abstention, 0.25)];
        assert_eq!(
            describe_centroid(&shares, LabelLanguage::English),
            "Mixed PSOE-PP"
        );
    }

    #[test]
    fn ties_use_choice_order() {
        // Insertion order must not matter.
        let a = [(VOX, 0.3), (PP, 0.3), (PSOE, 0.3)];
        let b = [(PSOE, 0.3), (VOX, 0.3), (PP, 0.3)];
        assert_eq!(describe_centroid(&a, LabelLanguage::English), "Mixed PSOE-PP");
        assert_eq!(describe_centroid(&b, LabelLanguage::English), "Mixed PSOE-PP");
        let c = [(PP, 0.2), (Choice::Abstention, 0.2)];
        assert_eq!(
            describe_centroid(&c, LabelLanguage::English),
            "Mixed Abstention-PP"
        );
        assert_eq!(
            describe_centroid(&c, LabelLanguage::Spanish),
            "Mixto Abstención-PP"
        );
    }

    #[test]
    fn degenerate_centroids() {
        assert_eq!(describe_centroid(&[], LabelLanguage::English), "Mixed");
        assert_eq!(
            describe_centroid(&[(PP, 0.1)], LabelLanguage::English),
            "Mixed PP"
        );
    }

    #[test]
    fn parses_languages() {
        assert_eq!(LabelLanguage::parse("ES"), Some(LabelLanguage::Spanish));
        assert_eq!(LabelLanguage::parse("english"), Some(LabelLanguage::English));
        assert_eq!(LabelLanguage::parse("fr"), None);
    }
}
