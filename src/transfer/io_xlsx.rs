use calamine::{open_workbook, DataType, Reader, Xlsx};

use crate::transfer::*;

fn get_range(path: &str, worksheet_name: Option<&str>) -> CliResult<calamine::Range<DataType>> {
    debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet_name);
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;

    // A worksheet name was provided, use it.
    if let Some(name) = worksheet_name {
        let wrange = workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path })?;
        Ok(wrange)
    } else {
        let all_worksheets = workbook.worksheets();
        match all_worksheets.as_slice() {
            [] => EmptyExcelSnafu { path }.fail(),
            [(name, wrange)] => {
                debug!("get_range: using the only worksheet {:?}", name);
                Ok(wrange.clone())
            }
            _ => whatever!(
                "{}: the file has several worksheets, excelWorksheetName must be provided",
                path
            ),
        }
    }
}

/// The text of a cell, as the schema expects it.
pub fn cell_to_string(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.clone(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::Empty => String::new(),
        other => format!("{:?}", other),
    }
}

pub fn read_xlsx_records(
    path: &str,
    worksheet_name: Option<&str>,
    names: &ColumnNames,
) -> CliResult<Vec<BallotRecord>> {
    let wrange = get_range(path, worksheet_name)?;
    let mut rows = wrange.rows();
    let header: Vec<String> = rows
        .next()
        .context(EmptyExcelSnafu { path })?
        .iter()
        .map(cell_to_string)
        .collect();
    debug!("read_xlsx_records: header: {:?}", header);
    let schema = RecordSchema::from_header(&header, names).context(SchemaSnafu {})?;

    let mut res: Vec<BallotRecord> = Vec::new();
    for (idx, row) in rows.enumerate() {
        let lineno = idx + 2;
        let fields: Vec<String> = row.iter().map(cell_to_string).collect();
        if fields.iter().all(|f| f.trim().is_empty()) {
            debug!("read_xlsx_records: skipping empty line {}", lineno);
            continue;
        }
        let record = schema
            .parse_record(lineno, &fields)
            .context(SchemaSnafu {})?;
        res.push(record);
    }
    info!(
        "read_xlsx_records: {} rows read from {}",
        res.len(),
        simplify_file_name(path)
    );
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells() {
        assert_eq!(cell_to_string(&DataType::String("PP".to_string())), "PP");
        assert_eq!(cell_to_string(&DataType::Int(12)), "12");
        assert_eq!(cell_to_string(&DataType::Float(1200.0)), "1200");
        assert_eq!(cell_to_string(&DataType::Empty), "");
        let raw = cell_to_string(&DataType::Float(1200.0));
        assert_eq!(parse_count(1, "votes", &raw).unwrap(), 1200);
    }

    #[test]
    fn missing_file() {
        let res = read_xlsx_records("/nonexistent/input.xlsx", None, &ColumnNames::default());
        assert!(matches!(res, Err(TransferCliError::OpeningExcel { .. })));
    }
}
