// ********* Canonical parties **********

use std::fmt::Display;

/// The normalized codes that raw party labels are mapped to.
///
/// The declaration order is the stable ordering used everywhere a tie must be
/// broken (ranking centroid shares, ordering the rows and columns of a matrix).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum CanonicalParty {
    Psoe,
    Pp,
    Vox,
    Cs,
    Podemos,
    Iu,
    AdelanteAndalucia,
    AxSi,
    Pa,
    Ca,
    Na,
    Pcpa,
    Risa,
    Izar,
    Prao,
    PndeA,
    Other,
}

impl CanonicalParty {
    pub const ALL: [CanonicalParty; 17] = [
        CanonicalParty::Psoe,
        CanonicalParty::Pp,
        CanonicalParty::Vox,
        CanonicalParty::Cs,
        CanonicalParty::Podemos,
        CanonicalParty::Iu,
        CanonicalParty::AdelanteAndalucia,
        CanonicalParty::AxSi,
        CanonicalParty::Pa,
        CanonicalParty::Ca,
        CanonicalParty::Na,
        CanonicalParty::Pcpa,
        CanonicalParty::Risa,
        CanonicalParty::Izar,
        CanonicalParty::Prao,
        CanonicalParty::PndeA,
        CanonicalParty::Other,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            CanonicalParty::Psoe => "PSOE",
            CanonicalParty::Pp => "PP",
            CanonicalParty::Vox => "VOX",
            CanonicalParty::Cs => "Cs",
            CanonicalParty::Podemos => "Podemos",
            CanonicalParty::Iu => "IU",
            CanonicalParty::AdelanteAndalucia => "Adelante Andalucía",
            CanonicalParty::AxSi => "AxSi",
            CanonicalParty::Pa => "PA",
            CanonicalParty::Ca => "CA",
            CanonicalParty::Na => "NA",
            CanonicalParty::Pcpa => "PCPA",
            CanonicalParty::Risa => "RISA",
            CanonicalParty::Izar => "IZAR",
            CanonicalParty::Prao => "PRAO",
            CanonicalParty::PndeA => "PNdeA",
            CanonicalParty::Other => "Other",
        }
    }
}

impl Display for CanonicalParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// One column of a location vote vector: either a canonical party or the
/// abstention count of that location.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Choice {
    Abstention,
    Party(CanonicalParty),
}

impl Display for Choice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Choice::Abstention => f.write_str("Abstention"),
            Choice::Party(p) => p.fmt(f),
        }
    }
}

/// A test applied on the upper-cased, trimmed raw label.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Predicate {
    Contains(&'static str),
    Equals(&'static str),
}

impl Predicate {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            Predicate::Contains(s) => normalized.contains(*s),
            Predicate::Equals(s) => normalized == *s,
        }
    }
}

/// A rule of the party table. The rule matches if any of its predicates does.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct PartyRule {
    pub predicates: &'static [Predicate],
    pub party: CanonicalParty,
}

use Predicate::{Contains, Equals};

/// The party table, evaluated top to bottom. The first matching rule wins.
///
/// Regional parties come first so that they are never folded into a national
/// code. Short codes such as `AA`, `CS`, `IU` or `PP` are substring tests:
/// any label containing them maps to that code unless an earlier rule
/// matched.
pub const PARTY_RULES: &[PartyRule] = &[
    PartyRule {
        predicates: &[Contains("ADELANTE"), Contains("AA")],
        party: CanonicalParty::AdelanteAndalucia,
    },
    PartyRule {
        predicates: &[
            Contains("AXSI"),
            Contains("AXSÍ"),
            Contains("ANDALUCIA POR SI"),
            Contains("ANDALUCÍA POR SÍ"),
        ],
        party: CanonicalParty::AxSi,
    },
    PartyRule {
        predicates: &[Equals("PA"), Contains("PARTIDO ANDALUCISTA"), Equals("PSA")],
        party: CanonicalParty::Pa,
    },
    PartyRule {
        predicates: &[
            Equals("CA"),
            Contains("COALICION ANDALUCISTA"),
            Contains("COALICIÓN ANDALUCISTA"),
        ],
        party: CanonicalParty::Ca,
    },
    PartyRule {
        predicates: &[
            Equals("NA"),
            Contains("NACION ANDALUZA"),
            Contains("NACIÓN ANDALUZA"),
        ],
        party: CanonicalParty::Na,
    },
    PartyRule {
        predicates: &[Contains("PCPA")],
        party: CanonicalParty::Pcpa,
    },
    PartyRule {
        predicates: &[Contains("RISA")],
        party: CanonicalParty::Risa,
    },
    PartyRule {
        predicates: &[Contains("IZAR")],
        party: CanonicalParty::Izar,
    },
    PartyRule {
        predicates: &[Contains("PRAO")],
        party: CanonicalParty::Prao,
    },
    PartyRule {
        predicates: &[Contains("PNDEA")],
        party: CanonicalParty::PndeA,
    },
    PartyRule {
        predicates: &[Contains("PSOE")],
        party: CanonicalParty::Psoe,
    },
    PartyRule {
        predicates: &[Contains("PP"), Contains("POPULAR")],
        party: CanonicalParty::Pp,
    },
    PartyRule {
        predicates: &[Contains("VOX")],
        party: CanonicalParty::Vox,
    },
    PartyRule {
        predicates: &[Contains("CIUDADANOS"), Contains("CS")],
        party: CanonicalParty::Cs,
    },
    PartyRule {
        predicates: &[Contains("PODEMOS")],
        party: CanonicalParty::Podemos,
    },
    PartyRule {
        predicates: &[Contains("IULV"), Contains("IZQUIERDA UNIDA"), Contains("IU")],
        party: CanonicalParty::Iu,
    },
    // UPyD is explicitly kept out of the national codes.
    PartyRule {
        predicates: &[Contains("UPYD")],
        party: CanonicalParty::Other,
    },
];

fn normalize(label: &str) -> String {
    label.trim().to_uppercase()
}

/// The index in `PARTY_RULES` of the first rule matching this label, if any.
pub fn matching_rule(label: &str) -> Option<usize> {
    let normalized = normalize(label);
    if normalized.is_empty() {
        return None;
    }
    PARTY_RULES
        .iter()
        .position(|rule| rule.predicates.iter().any(|p| p.matches(&normalized)))
}

/// Maps a raw party label to its canonical code. Unknown labels map to `Other`.
pub fn canonical_party(label: &str) -> CanonicalParty {
    matching_rule(label)
        .map(|idx| PARTY_RULES[idx].party)
        .unwrap_or(CanonicalParty::Other)
}

/// Maps a ballot row to its canonical code, falling back to the representative
/// name when the party label is missing or blank.
pub fn canonicalize(party: Option<&str>, representative: Option<&str>) -> CanonicalParty {
    let present = |s: &&str| !s.trim().is_empty();
    match party.filter(present).or_else(|| representative.filter(present)) {
        Some(label) => canonical_party(label),
        None => CanonicalParty::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_national_parties() {
        assert_eq!(canonical_party("PSOE-A"), CanonicalParty::Psoe);
        assert_eq!(canonical_party("Partido Popular"), CanonicalParty::Pp);
        assert_eq!(canonical_party("PP"), CanonicalParty::Pp);
        assert_eq!(canonical_party("vox"), CanonicalParty::Vox);
        assert_eq!(
            canonical_party("Ciudadanos-Partido de la Ciudadanía"),
            CanonicalParty::Cs
        );
        assert_eq!(canonical_party("C's"), CanonicalParty::Other);
        assert_eq!(canonical_party("PODEMOS"), CanonicalParty::Podemos);
        assert_eq!(canonical_party("IULV-CA"), CanonicalParty::Iu);
        assert_eq!(canonical_party("UPyD"), CanonicalParty::Other);
    }

    #[test]
    fn regional_parties_are_kept_apart() {
        assert_eq!(
            canonical_party("Adelante Andalucía"),
            CanonicalParty::AdelanteAndalucia
        );
        assert_eq!(canonical_party("AxSí"), CanonicalParty::AxSi);
        assert_eq!(canonical_party("AXSI"), CanonicalParty::AxSi);
        assert_eq!(canonical_party("Andalucía por Sí"), CanonicalParty::AxSi);
        assert_eq!(canonical_party("PA"), CanonicalParty::Pa);
        assert_eq!(
            canonical_party("Partido Andalucista"),
            CanonicalParty::Pa
        );
        assert_eq!(canonical_party("psa"), CanonicalParty::Pa);
        assert_eq!(canonical_party(" CA "), CanonicalParty::Ca);
        assert_eq!(
            canonical_party("Coalición Andalucista"),
            CanonicalParty::Ca
        );
        assert_eq!(canonical_party("Nación Andaluza"), CanonicalParty::Na);
        assert_eq!(canonical_party("PCPA"), CanonicalParty::Pcpa);
        assert_eq!(canonical_party("PNdeA"), CanonicalParty::PndeA);
    }

    #[test]
    fn first_matching_rule_wins() {
        // Contains "AA" before any national rule is considered.
        assert_eq!(canonical_party("PSOE AA"), CanonicalParty::AdelanteAndalucia);
        // "PA" is an equality test, so it does not capture PCPA.
        assert_eq!(canonical_party("PCPA"), CanonicalParty::Pcpa);
        assert_eq!(matching_rule("PSOE"), Some(10));
        assert_eq!(matching_rule("Unknown list"), None);
    }

    #[test]
    fn canonicalization_is_total() {
        let inputs = [
            "", " ", "\t\n", "???", "ñ", "ÄÖÜ", "a", "123", "Dato no disponible",
            "🗳️", "P P", "\u{0}",
        ];
        for s in inputs.iter() {
            let p = canonical_party(s);
            assert!(CanonicalParty::ALL.contains(&p));
        }
        assert_eq!(canonicalize(None, None), CanonicalParty::Other);
        assert_eq!(canonicalize(Some(""), None), CanonicalParty::Other);
        assert_eq!(canonicalize(Some("  "), Some("")), CanonicalParty::Other);
    }

    #[test]
    fn falls_back_to_representative_name() {
        assert_eq!(canonicalize(None, Some("PSOE")), CanonicalParty::Psoe);
        assert_eq!(canonicalize(Some(""), Some("VOX")), CanonicalParty::Vox);
        assert_eq!(canonicalize(Some("PP"), Some("VOX")), CanonicalParty::Pp);
    }

    #[test]
    fn choices_are_ordered() {
        let mut v = vec![
            Choice::Party(CanonicalParty::Other),
            Choice::Party(CanonicalParty::Psoe),
            Choice::Abstention,
            Choice::Party(CanonicalParty::Pp),
        ];
        v.sort();
        assert_eq!(
            v,
            vec![
                Choice::Abstention,
                Choice::Party(CanonicalParty::Psoe),
                Choice::Party(CanonicalParty::Pp),
                Choice::Party(CanonicalParty::Other),
            ]
        );
        assert_eq!(Choice::Abstention.to_string(), "Abstention");
        assert_eq!(
            Choice::Party(CanonicalParty::AdelanteAndalucia).to_string(),
            "Adelante Andalucía"
        );
    }
}
