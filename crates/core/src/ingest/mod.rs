use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use crate::{BlockRecord, BlockStore, DataConfig, Metrics, Result, VisualiserError};

/// Loads and validates a block store from a CSV file.
pub fn load_store(path: impl AsRef<Path>, data: &DataConfig) -> Result<BlockStore> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let records = read_records(BufReader::new(file), data)?;
    tracing::info!(path = %path.display(), rows = records.len(), "read simulation results");
    BlockStore::load(records)
}

/// Parses CSV rows into block records sorted by index.
///
/// The first non-blank line is the header. The configured index column
/// becomes the block index, the optional timestamp column becomes the record
/// timestamp, and every other column is read as a numeric metric. The
/// monotonicity and schema checks are left to [`BlockStore::load`].
///
/// Cells are split on every comma. Quotes around a whole cell are stripped,
/// but a quoted cell containing a comma is rejected with a parse error.
pub fn read_records(reader: impl BufRead, data: &DataConfig) -> Result<Vec<BlockRecord>> {
    let mut lines = reader
        .lines()
        .enumerate()
        .map(|(i, line)| line.map(|text| (i + 1, text)));

    let (header_line, header) = loop {
        match lines.next().transpose()? {
            Some((_, text)) if text.trim().is_empty() => continue,
            Some((number, text)) => break (number, split_row(&text, number)?),
            None => return Ok(Vec::new()),
        }
    };

    let columns = Columns::resolve(&header, header_line, data)?;
    let mut records = Vec::new();

    for line in lines {
        let (number, text) = line?;
        if text.trim().is_empty() {
            continue;
        }
        let cells = split_row(&text, number)?;
        if cells.len() != header.len() {
            return Err(VisualiserError::parse(
                number,
                format!("expected {} cells, found {}", header.len(), cells.len()),
            ));
        }
        records.push(columns.record(&header, &cells, number)?);
    }

    records.sort_by_key(|record| record.block_index);
    Ok(records)
}

/// Names from `required` that the store carries no metric for.
pub fn missing_metrics<'a>(store: &BlockStore, required: &[&'a str]) -> Vec<&'a str> {
    required
        .iter()
        .copied()
        .filter(|name| !store.metric_names().iter().any(|metric| metric == name))
        .collect()
}

struct Columns {
    index: usize,
    timestamp: Option<usize>,
}

impl Columns {
    fn resolve(header: &[String], line: usize, data: &DataConfig) -> Result<Self> {
        let find = |name: &str| header.iter().position(|column| column == name);

        let index = find(&data.index_column).ok_or_else(|| {
            VisualiserError::parse(line, format!("missing index column `{}`", data.index_column))
        })?;
        let timestamp = match &data.timestamp_column {
            Some(name) => Some(find(name).ok_or_else(|| {
                VisualiserError::parse(line, format!("missing timestamp column `{name}`"))
            })?),
            None => None,
        };

        Ok(Self { index, timestamp })
    }

    fn record(&self, header: &[String], cells: &[String], line: usize) -> Result<BlockRecord> {
        let block_index = parse_index(&cells[self.index], line)?;
        let timestamp = match self.timestamp {
            Some(column) => parse_number(&cells[column], &header[column], line)?,
            None => block_index as f64,
        };

        let mut metrics = Metrics::new();
        for (column, (name, cell)) in header.iter().zip(cells).enumerate() {
            if column == self.index || Some(column) == self.timestamp {
                continue;
            }
            metrics.insert(name.clone(), parse_number(cell, name, line)?);
        }

        Ok(BlockRecord::new(block_index, timestamp, metrics))
    }
}

fn split_row(text: &str, line: usize) -> Result<Vec<String>> {
    text.split(',')
        .map(|cell| {
            let cell = cell.trim();
            let opens = cell.starts_with('"');
            let closes = cell.len() > 1 && cell.ends_with('"');
            if opens != closes {
                return Err(VisualiserError::parse(
                    line,
                    "quoted cells may not contain commas",
                ));
            }
            Ok(cell.trim_matches('"').to_string())
        })
        .collect()
}

fn parse_number(cell: &str, column: &str, line: usize) -> Result<f64> {
    if cell.is_empty() {
        return Err(VisualiserError::parse(
            line,
            format!("empty value in column `{column}`"),
        ));
    }
    let value = cell.parse::<f64>().map_err(|_| {
        VisualiserError::parse(line, format!("non-numeric value `{cell}` in column `{column}`"))
    })?;
    if !value.is_finite() {
        return Err(VisualiserError::parse(
            line,
            format!("non-finite value `{cell}` in column `{column}`"),
        ));
    }
    Ok(value)
}

// Exported tables frequently write integral indices as `1000.0`.
fn parse_index(cell: &str, line: usize) -> Result<u64> {
    if let Ok(index) = cell.parse::<u64>() {
        return Ok(index);
    }
    match cell.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 && value.fract() == 0.0 => Ok(value as u64),
        _ => Err(VisualiserError::parse(
            line,
            format!("block index `{cell}` is not a non-negative integer"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn read(text: &str) -> Result<Vec<BlockRecord>> {
        read_records(Cursor::new(text), &DataConfig::default())
    }

    #[test]
    fn reads_and_sorts_rows() {
        let records = read(
            "block,exchange_rate,token_price\n\
             2000,1.5,0.25\n\
             \n\
             0,1.0,0.5\n\
             1000.0,1.25,0.75\n",
        )
        .unwrap();

        let indices: Vec<u64> = records.iter().map(|r| r.block_index).collect();
        assert_eq!(indices, vec![0, 1000, 2000]);
        assert_eq!(records[1].metrics["exchange_rate"], 1.25);
        assert_eq!(records[1].timestamp, 1000.0);
        assert!(!records[0].metrics.contains_key("block"));
    }

    #[test]
    fn uses_configured_timestamp_column() {
        let data = DataConfig {
            timestamp_column: Some("time".into()),
            ..DataConfig::default()
        };
        let records =
            read_records(Cursor::new("block,time,x\n0,12.5,1\n10,13.0,2\n"), &data).unwrap();
        assert_eq!(records[0].timestamp, 12.5);
        assert_eq!(records[0].metrics.keys().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn reports_line_numbers_for_bad_cells() {
        let err = read("block,x\n0,1\n5,abc\n").unwrap_err();
        match err {
            VisualiserError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            read("block,x\n0,1,2\n").unwrap_err(),
            VisualiserError::Parse { line: 2, .. }
        ));
        assert!(read("block,x\n-3,1\n").is_err());
        assert!(read("block,x\n1,\n").is_err());
    }

    #[test]
    fn strips_quotes_but_rejects_quoted_commas() {
        let records = read("\"block\",\"x\"\n\"0\",\"1.5\"\n").unwrap();
        assert_eq!(records[0].metrics["x"], 1.5);

        let err = read("block,x\n0,\"1,5\"\n").unwrap_err();
        match err {
            VisualiserError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("quoted"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(read("\"block,x\"\n0,1\n").is_err());
    }

    #[test]
    fn missing_index_column_is_an_error() {
        let err = read("height,x\n0,1\n").unwrap_err();
        assert!(format!("{err}").contains("block"));
    }

    #[test]
    fn empty_input_yields_no_records() {
        assert!(read("").unwrap().is_empty());
        assert!(read("block,x\n").unwrap().is_empty());
    }

    #[test]
    fn duplicate_blocks_fail_store_validation() {
        let records = read("block,x\n0,1\n0,2\n").unwrap();
        let err = BlockStore::load(records).unwrap_err();
        assert!(matches!(err, VisualiserError::NonMonotonicIndex { .. }));
    }

    #[test]
    fn lists_missing_metrics() {
        let store = BlockStore::load(read("block,x,y\n0,1,2\n").unwrap()).unwrap();
        assert_eq!(missing_metrics(&store, &["x", "z"]), vec!["z"]);
    }
}
