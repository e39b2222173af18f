// Primitives for reading CSV files.

use crate::transfer::*;

/// Reads the ballot rows of a CSV file already loaded in memory.
///
/// `path` is only used in messages.
pub fn read_csv_records(
    content: &[u8],
    path: &str,
    names: &ColumnNames,
) -> CliResult<Vec<BallotRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);
    let header: Vec<String> = rdr
        .headers()
        .context(CsvOpenSnafu { path })?
        .iter()
        .map(|s| s.to_string())
        .collect();
    debug!("read_csv_records: header: {:?}", header);
    let schema = RecordSchema::from_header(&header, names).context(SchemaSnafu {})?;

    let mut res: Vec<BallotRecord> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let fields: Vec<&str> = line.iter().collect();
        let record = schema
            .parse_record(lineno, &fields)
            .context(SchemaSnafu {})?;
        res.push(record);
    }
    info!(
        "read_csv_records: {} rows read from {}",
        res.len(),
        simplify_file_name(path)
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Convocatoria,Provincia,Municipio,Partido,nombre_representativo,Votos,Censo,Abstención,Nº votantes\n";

    #[test]
    fn reads_rows() {
        let content = format!(
            "{}{}{}",
            HEADER,
            "2018,Sevilla,Écija,PSOE-A,,500,1000,300,700\n",
            "2018,Sevilla,Écija,,PP,200,1000,300,700\n"
        );
        let rows =
            read_csv_records(content.as_bytes(), "x.csv", &ColumnNames::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].municipality, "Écija");
        assert_eq!(rows[1].party, None);
        assert_eq!(rows[1].representative, Some("PP".to_string()));
        assert_eq!(
            canonicalize(rows[1].party.as_deref(), rows[1].representative.as_deref()),
            CanonicalParty::Pp
        );
    }

    #[test]
    fn reports_line_numbers() {
        let content = format!("{}{}", HEADER, "2018,Sevilla,Écija,PSOE-A,,five,1000,300,700\n");
        let err =
            read_csv_records(content.as_bytes(), "x.csv", &ColumnNames::default()).unwrap_err();
        match err {
            TransferCliError::Schema {
                source: SchemaError::InvalidField { lineno, .. },
            } => assert_eq!(lineno, 2),
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    fn missing_column() {
        let content = "Convocatoria,Provincia,Municipio\n2018,Sevilla,Écija\n";
        let err =
            read_csv_records(content.as_bytes(), "x.csv", &ColumnNames::default()).unwrap_err();
        assert!(matches!(
            err,
            TransferCliError::Schema {
                source: SchemaError::MissingColumn { .. }
            }
        ));
    }
}
