//! Format tables with a stupid API.
//!
//! Each row is a single tab-separated string; the first row is the header.
//! Columns are padded to the width of their widest cell across all rows.

/// Print a table of tab-separated rows to stdout, aligning columns.
pub fn format_table(rows: Vec<String>) {
	for line in format_table_to_string(rows) {
		println!("{}", line);
	}
}

/// Same as [`format_table`] but returns the formatted lines instead of printing them.
pub fn format_table_to_string(rows: Vec<String>) -> Vec<String> {
	let splitrows = rows
		.iter()
		.map(|row| row.split('\t').collect::<Vec<_>>())
		.collect::<Vec<_>>();

	let ncols = splitrows.iter().map(|row| row.len()).max().unwrap_or(0);

	let mut colwidth = vec![0; ncols];
	for row in splitrows.iter() {
		for (i, cell) in row.iter().enumerate() {
			colwidth[i] = std::cmp::max(colwidth[i], cell.chars().count());
		}
	}

	splitrows
		.iter()
		.map(|row| {
			row.iter()
				.enumerate()
				.map(|(i, cell)| {
					if i + 1 < row.len() {
						format!("{:width$}  ", cell, width = colwidth[i])
					} else {
						cell.to_string()
					}
				})
				.collect::<String>()
		})
		.collect::<Vec<_>>()
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn aligns_columns() {
		let rows = vec![
			"ID\tCapacity\tPartitions".to_string(),
			"1\t100\t64".to_string(),
			"22\t5000\t8".to_string(),
		];
		let out = format_table_to_string(rows);
		assert_eq!(out.len(), 3);
		// the ID column is padded to width 2 (widest cell is "22")
		assert!(out[0].starts_with("ID "));
		assert!(out[2].starts_with("22 "));
	}
}
