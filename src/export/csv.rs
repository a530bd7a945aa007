use std::io::Write;

use color_eyre::{Result, eyre::Context};
use csv::WriterBuilder;

use super::Sheet;

/// Writes the sheet with its header row.
pub fn write_sheet<W: Write>(sheet: &Sheet, writer: W) -> Result<()> {
    let mut csv_writer = WriterBuilder::new().has_headers(false).from_writer(writer);

    csv_writer
        .write_record(sheet.headers)
        .with_context(|| format!("Failed to write header of sheet {}", sheet.name))?;
    sheet.rows.iter().try_for_each(|row| {
        csv_writer
            .write_record(row)
            .with_context(|| format!("Failed to write row of sheet {}", sheet.name))
    })?;

    csv_writer.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_sheet_quotes_separators() {
        let sheet = Sheet {
            name: "active",
            headers: &["Code", "Customer"],
            rows: vec![vec!["B1".into(), "Co1, Co2".into()]],
        };

        let mut output = Vec::new();
        write_sheet(&sheet, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Code,Customer\nB1,\"Co1, Co2\"\n"
        );
    }
}
