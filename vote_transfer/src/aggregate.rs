// Aggregation of raw ballot rows into per-location vote vectors, and the
// inner join of two elections.

use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Display;

use crate::config::*;
use crate::parties::canonicalize;

/// The municipality placeholder of province-level total rows.
pub const UNAVAILABLE_MUNICIPALITY: &str = "Dato no disponible";

/// Which rows of the dataset belong to one side of the analysis.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ElectionScope<'a> {
    pub election: &'a str,
    pub province: Option<&'a str>,
    pub municipality: Option<&'a str>,
}

impl<'a> ElectionScope<'a> {
    fn contains(&self, r: &BallotRecord) -> bool {
        r.election == self.election
            && self.province.map_or(true, |p| r.province == p)
            && self.municipality.map_or(true, |m| r.municipality == m)
    }
}

impl<'a> Display for ElectionScope<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "election {:?}", self.election)?;
        if let Some(p) = self.province {
            write!(f, ", province {:?}", p)?;
        }
        if let Some(m) = self.municipality {
            write!(f, ", municipality {:?}", m)?;
        }
        Ok(())
    }
}

/// True for rows that describe an actual location (not a province total).
pub fn is_location_row(r: &BallotRecord) -> bool {
    let m = r.municipality.trim();
    !m.is_empty() && m != UNAVAILABLE_MUNICIPALITY
}

/// The distinct election round identifiers, sorted.
pub fn available_elections(records: &[BallotRecord]) -> Vec<String> {
    let s: BTreeSet<&str> = records.iter().map(|r| r.election.as_str()).collect();
    s.into_iter().map(|e| e.to_string()).collect()
}

/// Sums the votes of one election per location and canonical party.
///
/// Census and abstention are summed over the distinct
/// (location, census, abstention, turnout) tuples: the per-party rows of a
/// single polling unit all repeat the same meta values.
pub fn aggregate_election(
    records: &[BallotRecord],
    scope: &ElectionScope,
) -> TransferResult<Vec<LocationVoteVector>> {
    let rows: Vec<&BallotRecord> = records
        .iter()
        .filter(|r| is_location_row(r) && scope.contains(r))
        .collect();
    debug!("aggregate_election: {} rows for {}", rows.len(), scope);
    if rows.is_empty() {
        return DataSnafu {
            scope: scope.to_string(),
        }
        .fail();
    }

    let mut votes: BTreeMap<LocationKey, BTreeMap<CanonicalParty, u64>> = BTreeMap::new();
    let mut units: HashSet<(&str, &str, u64, u64, u64)> = HashSet::new();
    let mut meta: BTreeMap<LocationKey, (u64, u64)> = BTreeMap::new();

    for r in rows.iter() {
        let key = LocationKey::new(&r.province, &r.municipality);
        let party = canonicalize(r.party.as_deref(), r.representative.as_deref());
        *votes
            .entry(key.clone())
            .or_default()
            .entry(party)
            .or_insert(0) += r.votes;

        let unit = (
            r.province.as_str(),
            r.municipality.as_str(),
            r.census,
            r.abstention,
            r.turnout,
        );
        let e = meta.entry(key).or_insert((0, 0));
        if units.insert(unit) {
            e.0 += r.census;
            e.1 += r.abstention;
        }
    }
    debug!(
        "aggregate_election: {} locations, {} distinct units",
        votes.len(),
        units.len()
    );

    let res = votes
        .into_iter()
        .map(|(key, votes)| {
            let (census, abstention) = meta.get(&key).cloned().unwrap_or((0, 0));
            LocationVoteVector {
                key,
                votes,
                census,
                abstention,
            }
        })
        .collect();
    Ok(res)
}

/// The inputs of the Aggregator.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct PairingRequest<'a> {
    pub start_election: &'a str,
    pub end_election: &'a str,
    pub province: Option<&'a str>,
    pub municipality: Option<&'a str>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Pairing {
    /// Sorted by location key.
    pub observations: Vec<PairedObservation>,
    pub report: JoinReport,
}

/// Joins the two elections on (province, municipality).
///
/// Locations present in only one of the elections are dropped and counted in
/// the report.
pub fn pair_elections(records: &[BallotRecord], req: &PairingRequest) -> TransferResult<Pairing> {
    let start_scope = ElectionScope {
        election: req.start_election,
        province: req.province,
        municipality: req.municipality,
    };
    let end_scope = ElectionScope {
        election: req.end_election,
        ..start_scope.clone()
    };
    let start = aggregate_election(records, &start_scope)?;
    let end = aggregate_election(records, &end_scope)?;

    let start_locations = start.len();
    let end_locations = end.len();
    let mut end_by_key: BTreeMap<LocationKey, LocationVoteVector> =
        end.into_iter().map(|v| (v.key.clone(), v)).collect();

    let mut observations: Vec<PairedObservation> = Vec::new();
    for s in start.into_iter() {
        if let Some(e) = end_by_key.remove(&s.key) {
            observations.push(PairedObservation {
                key: s.key.clone(),
                start: s,
                end: e,
            });
        } else {
            debug!("pair_elections: {} only in the start election", s.key);
        }
    }
    for k in end_by_key.keys() {
        debug!("pair_elections: {} only in the end election", k);
    }

    let report = JoinReport {
        start_locations,
        end_locations,
        retained: observations.len(),
        dropped_start_only: start_locations - observations.len(),
        dropped_end_only: end_by_key.len(),
    };
    info!(
        "pair_elections: retained {} locations; dropped {} start-only and {} end-only locations",
        report.retained, report.dropped_start_only, report.dropped_end_only
    );

    if observations.is_empty() {
        return DataSnafu {
            scope: format!(
                "locations common to {} and {}",
                start_scope, end_scope
            ),
        }
        .fail();
    }
    Ok(Pairing {
        observations,
        report,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rec(
        election: &str,
        province: &str,
        municipality: &str,
        party: &str,
        votes: u64,
        census: u64,
        abstention: u64,
    ) -> BallotRecord {
        BallotRecord {
            election: election.to_string(),
            province: province.to_string(),
            municipality: municipality.to_string(),
            party: Some(party.to_string()).filter(|s| !s.is_empty()),
            representative: None,
            votes,
            census,
            abstention,
            turnout: census - abstention,
        }
    }

    pub(crate) fn records() -> Vec<BallotRecord> {
        vec![
            rec("E1", "Sevilla", "Écija", "PSOE-A", 500, 1000, 300),
            rec("E1", "Sevilla", "Écija", "PP", 200, 1000, 300),
            rec("E1", "Sevilla", "Osuna", "PSOE-A", 300, 800, 200),
            rec("E1", "Sevilla", "Osuna", "PP", 300, 800, 200),
            rec("E1", "Cádiz", "Rota", "PP", 400, 900, 400),
            rec("E1", "Cádiz", "Rota", "VOX", 100, 900, 400),
            rec("E1", "Cádiz", "Ubrique", "PSOE-A", 10, 20, 10),
            rec("E1", "Cádiz", UNAVAILABLE_MUNICIPALITY, "PSOE-A", 9999, 99999, 0),
            rec("E2", "Sevilla", "Écija", "PSOE-A", 450, 1000, 350),
            rec("E2", "Sevilla", "Écija", "VOX", 200, 1000, 350),
            rec("E2", "Sevilla", "Osuna", "PP", 350, 810, 220),
            rec("E2", "Sevilla", "Osuna", "PSOE-A", 240, 810, 220),
            rec("E2", "Cádiz", "Rota", "PP", 300, 900, 450),
            rec("E2", "Cádiz", "Rota", "VOX", 150, 900, 450),
            rec("E2", "Cádiz", "Algar", "PP", 50, 100, 50),
        ]
    }

    #[test]
    fn aggregates_votes_per_party() {
        let scope = ElectionScope {
            election: "E1",
            province: None,
            municipality: None,
        };
        let v = aggregate_election(&records(), &scope).unwrap();
        // Sorted by key, placeholder row excluded.
        let keys: Vec<String> = v.iter().map(|l| l.key.to_string()).collect();
        assert_eq!(
            keys,
            vec!["Cádiz/Rota", "Cádiz/Ubrique", "Sevilla/Osuna", "Sevilla/Écija"]
        );
        let ecija = &v[3];
        assert_eq!(ecija.count(Choice::Party(CanonicalParty::Psoe)), 500);
        assert_eq!(ecija.count(Choice::Party(CanonicalParty::Pp)), 200);
        assert_eq!(ecija.count(Choice::Party(CanonicalParty::Vox)), 0);
        assert_eq!(ecija.census, 1000);
        assert_eq!(ecija.abstention, 300);
    }

    #[test]
    fn duplicated_meta_values_count_once() {
        // Two polling units in the same town, the first with three party rows.
        let rows = vec![
            rec("E1", "Huelva", "Moguer", "PSOE", 100, 500, 150),
            rec("E1", "Huelva", "Moguer", "PP", 120, 500, 150),
            rec("E1", "Huelva", "Moguer", "VOX", 30, 500, 150),
            rec("E1", "Huelva", "Moguer", "PSOE", 80, 400, 100),
            rec("E1", "Huelva", "Moguer", "PP", 90, 400, 100),
            // Same PSOE label twice in one unit: votes still add up.
            rec("E1", "Huelva", "Moguer", "PSOE", 5, 400, 100),
        ];
        let scope = ElectionScope {
            election: "E1",
            province: None,
            municipality: None,
        };
        let v = aggregate_election(&rows, &scope).unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].census, 900);
        assert_eq!(v[0].abstention, 250);
        assert_eq!(v[0].count(Choice::Party(CanonicalParty::Psoe)), 185);
        assert_eq!(v[0].count(Choice::Party(CanonicalParty::Pp)), 210);
        assert_eq!(v[0].count(Choice::Party(CanonicalParty::Vox)), 30);
    }

    #[test]
    fn inner_join_reports_dropped_locations() {
        let req = PairingRequest {
            start_election: "E1",
            end_election: "E2",
            province: None,
            municipality: None,
        };
        let p = pair_elections(&records(), &req).unwrap();
        let keys: Vec<String> = p.observations.iter().map(|o| o.key.to_string()).collect();
        assert_eq!(keys, vec!["Cádiz/Rota", "Sevilla/Osuna", "Sevilla/Écija"]);
        assert_eq!(
            p.report,
            JoinReport {
                start_locations: 4,
                end_locations: 4,
                retained: 3,
                dropped_start_only: 1,
                dropped_end_only: 1,
            }
        );
    }

    #[test]
    fn province_filter_keeps_exactly_common_locations() {
        let req = PairingRequest {
            start_election: "E1",
            end_election: "E2",
            province: Some("Cádiz"),
            municipality: None,
        };
        let p = pair_elections(&records(), &req).unwrap();
        let keys: BTreeSet<LocationKey> = p.observations.iter().map(|o| o.key.clone()).collect();

        let in_province = |e: &str| -> BTreeSet<LocationKey> {
            records()
                .iter()
                .filter(|r| r.election == e && r.province == "Cádiz" && is_location_row(r))
                .map(|r| LocationKey::new(&r.province, &r.municipality))
                .collect()
        };
        let expected: BTreeSet<LocationKey> = in_province("E1")
            .intersection(&in_province("E2"))
            .cloned()
            .collect();
        assert_eq!(keys, expected);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn filters_are_case_sensitive() {
        let req = PairingRequest {
            start_election: "E1",
            end_election: "E2",
            province: Some("cádiz"),
            municipality: None,
        };
        let err = pair_elections(&records(), &req).unwrap_err();
        match err {
            AnalysisError::Data { scope } => {
                assert!(scope.contains("E1"), "{}", scope);
                assert!(scope.contains("cádiz"), "{}", scope);
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn missing_election_is_a_data_error() {
        let req = PairingRequest {
            start_election: "E1",
            end_election: "E9",
            province: None,
            municipality: None,
        };
        assert!(matches!(
            pair_elections(&records(), &req),
            Err(AnalysisError::Data { .. })
        ));
    }

    #[test]
    fn empty_join_is_a_data_error() {
        let rows = vec![
            rec("E1", "A", "x", "PP", 1, 10, 2),
            rec("E2", "A", "y", "PP", 1, 10, 2),
        ];
        let req = PairingRequest {
            start_election: "E1",
            end_election: "E2",
            province: None,
            municipality: None,
        };
        assert!(matches!(
            pair_elections(&rows, &req),
            Err(AnalysisError::Data { .. })
        ));
    }

    #[test]
    fn lists_elections() {
        assert_eq!(available_elections(&records()), vec!["E1", "E2"]);
    }
}
