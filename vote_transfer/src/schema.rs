// Validation of tabular input rows into `BallotRecord`s.
//
// The readers (CSV, spreadsheets) only deliver the header and the cells of each
// row as strings; all the checks on the shape of the data happen here.

use log::debug;
use snafu::prelude::*;

use crate::config::*;

/// The header names of the input fields.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnNames {
    pub election: String,
    pub province: String,
    pub municipality: String,
    pub party: String,
    /// Optional in the input.
    pub representative: String,
    pub votes: String,
    pub census: String,
    pub abstention: String,
    pub turnout: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames {
            election: "Convocatoria".to_string(),
            province: "Provincia".to_string(),
            municipality: "Municipio".to_string(),
            party: "Partido".to_string(),
            representative: "nombre_representativo".to_string(),
            votes: "Votos".to_string(),
            census: "Censo".to_string(),
            abstention: "Abstención".to_string(),
            turnout: "Nº votantes".to_string(),
        }
    }
}

/// The positions of the fields in a validated header.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct RecordSchema {
    election: usize,
    province: usize,
    municipality: usize,
    party: usize,
    representative: Option<usize>,
    votes: usize,
    census: usize,
    abstention: usize,
    turnout: usize,
    names: ColumnNames,
}

fn find_column<S: AsRef<str>>(
    header: &[S],
    column: &str,
    field: &str,
) -> Result<usize, SchemaError> {
    header
        .iter()
        .position(|h| h.as_ref().trim_start_matches('\u{feff}').trim() == column)
        .context(MissingColumnSnafu { column, field })
}

impl RecordSchema {
    pub fn from_header<S: AsRef<str>>(
        header: &[S],
        names: &ColumnNames,
    ) -> Result<RecordSchema, SchemaError> {
        let schema = RecordSchema {
            election: find_column(header, &names.election, "election")?,
            province: find_column(header, &names.province, "province")?,
            municipality: find_column(header, &names.municipality, "municipality")?,
            party: find_column(header, &names.party, "party")?,
            representative: find_column(header, &names.representative, "representative").ok(),
            votes: find_column(header, &names.votes, "votes")?,
            census: find_column(header, &names.census, "census")?,
            abstention: find_column(header, &names.abstention, "abstention")?,
            turnout: find_column(header, &names.turnout, "turnout")?,
            names: names.clone(),
        };
        debug!("from_header: resolved schema {:?}", schema);
        Ok(schema)
    }

    fn width(&self) -> usize {
        [
            self.election,
            self.province,
            self.municipality,
            self.party,
            self.votes,
            self.census,
            self.abstention,
            self.turnout,
        ]
        .iter()
        .chain(self.representative.iter())
        .max()
        .map(|m| m + 1)
        .unwrap_or(0)
    }

    /// Builds a record out of the cells of one row.
    ///
    /// `lineno` is only used in error messages.
    pub fn parse_record<S: AsRef<str>>(
        &self,
        lineno: usize,
        fields: &[S],
    ) -> Result<BallotRecord, SchemaError> {
        let expected = self.width();
        ensure!(
            fields.len() >= expected,
            ShortRowSnafu {
                lineno,
                expected,
                found: fields.len()
            }
        );
        let text = |idx: usize| fields[idx].as_ref().trim().to_string();
        let optional = |idx: usize| Some(text(idx)).filter(|s| !s.is_empty());
        let count = |idx: usize, name: &String| parse_count(lineno, name, fields[idx].as_ref());
        Ok(BallotRecord {
            election: text(self.election),
            province: text(self.province),
            municipality: text(self.municipality),
            party: optional(self.party),
            representative: self.representative.and_then(optional),
            votes: count(self.votes, &self.names.votes)?,
            census: count(self.census, &self.names.census)?,
            abstention: count(self.abstention, &self.names.abstention)?,
            turnout: count(self.turnout, &self.names.turnout)?,
        })
    }
}

/// Reads a non-negative count. Integral decimals ("12.0") are accepted because
/// spreadsheet exports often write counts as floats. Empty cells count as 0.
pub fn parse_count(lineno: usize, field: &str, raw: &str) -> Result<u64, SchemaError> {
    let s = raw.trim();
    if s.is_empty() {
        return Ok(0);
    }
    if let Ok(x) = s.parse::<u64>() {
        return Ok(x);
    }
    match s.parse::<f64>() {
        Ok(x) if x.is_finite() && x >= 0.0 && x.fract() == 0.0 => Ok(x as u64),
        _ => InvalidFieldSnafu {
            lineno,
            field,
            value: s,
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        [
            "Convocatoria",
            "Provincia",
            "Municipio",
            "Partido",
            "nombre_representativo",
            "Votos",
            "Censo",
            "Abstención",
            "Nº votantes",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn parses_a_row() {
        let schema = RecordSchema::from_header(&header(), &ColumnNames::default()).unwrap();
        let row = [
            "Convocatoria 2015/03",
            "Sevilla",
            "Écija",
            "PSOE-A",
            "",
            "1200",
            "30000.0",
            "9000",
            "21000",
        ];
        let r = schema.parse_record(2, &row).unwrap();
        assert_eq!(r.election, "Convocatoria 2015/03");
        assert_eq!(r.municipality, "Écija");
        assert_eq!(r.party, Some("PSOE-A".to_string()));
        assert_eq!(r.representative, None);
        assert_eq!(r.votes, 1200);
        assert_eq!(r.census, 30000);
        assert_eq!(r.turnout, 21000);
    }

    #[test]
    fn missing_column() {
        let mut h = header();
        h.retain(|c| c != "Censo");
        let err = RecordSchema::from_header(&h, &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, SchemaError::MissingColumn { ref column, .. } if column == "Censo"));
    }

    #[test]
    fn representative_column_is_optional() {
        let mut h = header();
        h.retain(|c| c != "nombre_representativo");
        let schema = RecordSchema::from_header(&h, &ColumnNames::default()).unwrap();
        let row = ["E", "P", "M", "VOX", "3", "10", "2", "8"];
        let r = schema.parse_record(2, &row).unwrap();
        assert_eq!(r.representative, None);
        assert_eq!(r.votes, 3);
    }

    #[test]
    fn rejects_bad_rows() {
        let schema = RecordSchema::from_header(&header(), &ColumnNames::default()).unwrap();
        let short = ["E", "P", "M"];
        assert!(matches!(
            schema.parse_record(5, &short),
            Err(SchemaError::ShortRow { lineno: 5, .. })
        ));
        let bad = ["E", "P", "M", "PP", "", "many", "10", "2", "8"];
        assert!(matches!(
            schema.parse_record(6, &bad),
            Err(SchemaError::InvalidField { lineno: 6, .. })
        ));
        let negative = ["E", "P", "M", "PP", "", "-1", "10", "2", "8"];
        assert!(schema.parse_record(7, &negative).is_err());
    }

    #[test]
    fn counts() {
        assert_eq!(parse_count(1, "x", " 12 ").unwrap(), 12);
        assert_eq!(parse_count(1, "x", "12.0").unwrap(), 12);
        assert_eq!(parse_count(1, "x", "").unwrap(), 0);
        assert!(parse_count(1, "x", "12.5").is_err());
        assert!(parse_count(1, "x", "NaN").is_err());
    }
}
