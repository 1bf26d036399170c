/*!

This is the long-form manual for `precinct_panel` and `panelbuild`.

## Pipeline

Each `(county, year)` workbook goes through three stages, independently of all the others:

* layout resolution: every sheet gets an office, a district and an orientation
* classification: every header is tagged with a candidate, a party and a vote type, and
  the vote-type columns are collapsed into one total per candidate and precinct
* merging: the candidate totals of all the sheets are folded into one record per precinct,
  with one slot per tracked office

Once all the units are processed, every cycle is linked to the previous tracked cycle
(incumbency and deltas), and the renewable projects are counted per precinct and per district.

Nothing in the data stops a run. Problems are written to the diagnostics table, and a unit
whose sheets disagree on a vote count is left out of the panel.

## Workbook layouts

The following layouts are recognized. The header may start anywhere in the first rows of
a sheet (6 by default).

### Candidates as columns

|          | Jack Hatch (D) | Terry Branstad (R) | Write-in |
|----------|----------------|--------------------|----------|
| Ward 1   | 400            | 600                | 2        |
| Ward 2   | 350            | 50                 | 0        |
| Total    | 750            | 650                | 2        |

The rows after a total row are ignored.

### Candidates over vote types

|          | Jack Hatch (D) |          |       | Terry Branstad (R) |          |       |
|----------|----------------|----------|-------|--------------------|----------|-------|
| Precinct | Election Day   | Absentee | Total | Election Day       | Absentee | Total |
| Ward 1   | 300            | 100      | 400   | 500                | 100      | 600   |

The candidate names span the vote-type columns below them. When a total column is present,
it is used as is and the other columns are only checked against it. Without a total, the
partial columns are added up.

### Candidates as rows

| Candidate Name | Party | Ward 1 | Ward 2 |
|----------------|-------|--------|--------|
| Jack Hatch     | DEM   | 400    | 350    |
| Terry Branstad | REP   | 600    | 50     |

A race column (`Race`, `Contest`, `Office`...) allows several contests on the same sheet.

### Table of contents

A sheet listing contests with a sheet name or a sheet number tells which sheet holds which
office. It takes precedence over the sheet names and over the titles found inside the sheets.

## Configuration

`panelbuild` reads a JSON configuration file. Relative paths are resolved from the directory
of the configuration file. All the lists of the `offices` and `classification` sections are
optional: missing lists fall back to the built-in defaults.

```text
{
  "outputSettings": {
    "outputDirectory": "out",
    "format": "csv",
    "nullToken": "NA"
  },
  "sources": {
    "counties": ["Polk", "Story"],
    "years": [2014, 2016, 2018],
    "workbookDirectory": "workbooks",
    "fileNamePattern": "{county}_{year}.xlsx",
    "fetchRetries": 2,
    "boundaryDirectory": "boundaries",
    "projectsFile": "projects.csv",
    "demographicsFile": "demographics.csv"
  },
  "offices": {
    "tracked": ["President", "US Senate", "Governor", "State Senate"],
    "aliases": { "Governor": ["governor", "gov"] },
    "districtOffice": "State Senate"
  },
  "classification": {
    "voteTypes": { "total": ["total votes", "total"], "absentee": ["absentee", "mail"] },
    "parties": { "D": ["dem", "democratic"], "R": ["rep", "gop"] },
    "precinctPrefixes": ["ward", "township"],
    "nameAffixes": ["jr", "sr", "dr"],
    "headerScanRows": 6
  },
  "maxWorkers": 4
}
```

The order of `tracked` fixes the order of the office columns in the output.

## Side inputs

* boundaries: `<boundaryDirectory>/precinct_<year>.geojson` and `district_<year>.geojson`,
  GeoJSON feature collections of polygons and multipolygons. Precinct features carry `county`
  and `id` properties, district features carry `office` and `id` (the district number).
* renewable projects: a CSV file with the columns
  `project_id,technology,capacity_mw,commissioned_year,latitude,longitude`. Projects without
  coordinates are reported as unmatched.
* demographics: a CSV file with the columns
  `district,year,avg_income,minority_share,population`.

All of them are optional. Without boundaries, every precinct that changed its name between
two cycles has no prior data and the overlay fields are null.

## Outputs

* `canonical.csv` (or `canonical.jsonl`): one row per precinct and cycle. Null fields are
  written with the null token in CSV and as `null` in JSON lines.
* `diagnostics.csv`: one row per anomaly, with the county, the year, the sheet, the stage and
  the kind of problem.
* `district_results.json`: candidate totals and shares per contest. A precinct split between
  two districts of an office counts in both, while its canonical row only shows the district
  with the most votes (the other one is listed as `SplitDistrictPrecinct` in the diagnostics).

 */
