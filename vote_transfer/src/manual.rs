/*!

This is the long-form manual for `vote_transfer` and `vtransfer`.

## Input format

The input is a table with one row per ballot count: one party in one location
for one election round. The expected header names are:

| Column | Content |
|---|---|
| `Convocatoria` | the election round identifier |
| `Provincia` | the province |
| `Municipio` | the municipality |
| `Partido` | the raw party label |
| `nombre_representativo` | the representative name (optional column) |
| `Votos` | the votes of the party |
| `Censo` | the census of the polling unit |
| `Abstención` | the abstention of the polling unit |
| `Nº votantes` | the turnout of the polling unit |

The names can be changed with the `columns` section of the configuration.
Counts must be non-negative integers; integral decimals such as `120.0` are
accepted. Rows whose municipality is `Dato no disponible` (province totals)
are ignored.

Both CSV files (`csv` provider) and Excel spreadsheets (`xlsx` provider) are
supported. For spreadsheets, the worksheet is selected with
`excelWorksheetName`, or the single worksheet of the file is used.

## Party codes

Raw party labels are mapped to a fixed set of codes by an ordered table of
rules; the first rule that matches wins and unmatched labels become `Other`.
Andalusian regional parties (`Adelante Andalucía`, `AxSi`, `PA`, `CA`, `NA`,
`PCPA`, `RISA`, `IZAR`, `PRAO`, `PNdeA`) are tested before the national
ones (`PSOE`, `PP`, `VOX`, `Cs`, `Podemos`, `IU`). Most rules test for a
substring of the upper-cased label, so a label such as `PSOE AA` is
classified as `Adelante Andalucía`. See [crate::PARTY_RULES].

## Configuration

```json
{
  "input": {
    "filePath": "andalucia.csv",
    "provider": "csv"
  },
  "analysis": {
    "startElection": "2018",
    "endElection": "2022",
    "province": "Sevilla",
    "focusMunicipality": "Écija",
    "groupCount": 3,
    "seed": 42,
    "labelLanguage": "en"
  },
  "solver": {
    "maxIterations": 20000,
    "tolerance": 1e-9
  },
  "output": {
    "outputPath": "transfers.json"
  }
}
```

Relative paths are resolved against the directory of the configuration file.
All the values of the `analysis` section can be overridden on the command
line (`--start`, `--end`, `--province`, `--municipality`, `--focus`,
`--groups`, `--seed`, `--language`).

## Method

1. Both elections are summed per (province, municipality) and joined: only
   the locations present in both survive.
2. The locations are clustered with k-means on the census shares of the
   start election (abstention included), and every cluster is named after
   its dominant choices: `High Abstention`, `Stronghold X` or `Mixed X-Y`.
3. For every label, and for all the locations together (`Global`), the
   transfer matrix P minimizes the census-weighted squared error between the
   end shares and the start shares times P. Every row of P is a probability
   distribution over the destination choices.

## Output

The summary is a JSON document with the request (`config`), the join counts
(`join`), the warnings, one entry per group with its matrix and estimated
voter counts (`groups`), the labeled locations (`observations`) and the
focused location if one was requested (`focus`).

A focused municipality given without a province is looked up in the input, and
the training is restricted to its province.

Warnings do not stop the analysis:
* `reliability` fewer than 5 locations in the scope
* `underdetermined` a group has fewer locations than source choices
* `nonConvergence` the solver ran out of iterations; the matrix is its best iterate
* `groupOmitted` a group could not be estimated
* `groupCountReduced` fewer locations than requested groups

*/
