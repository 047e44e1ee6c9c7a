use std::{io, io::Write, path::Path};

use anyhow::{Context, Result};

use crate::util::{file::buf_writer, map::PatchRecord};

const TABLE_HEADER: &str = "PCD Name                       Offset    Section Name";

/// Writes the patch table: one header line, then one fixed-width row per
/// record in encounter order. Lines are CRLF-terminated.
pub fn write_table<W>(writer: &mut W, records: &[PatchRecord]) -> io::Result<()>
where W: Write + ?Sized {
    write!(writer, "{TABLE_HEADER}\r\n")?;
    for record in records {
        write!(writer, "{:<30} 0x{:08X} {}\r\n", record.name, record.offset, record.section)?;
    }
    Ok(())
}

/// Writes the patch table to a file, in a single pass after all records are
/// resolved. Failure to create or write the destination is an error.
pub fn write_table_file<P>(path: P, records: &[PatchRecord]) -> Result<()>
where P: AsRef<Path> {
    let path = path.as_ref();
    let mut writer = buf_writer(path)?;
    write_table(&mut writer, records)
        .with_context(|| format!("Failed to write patch table to '{}'", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to flush patch table to '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, offset: u64, section: &str) -> PatchRecord {
        PatchRecord { name: name.to_string(), offset, section: section.to_string() }
    }

    fn render(records: &[PatchRecord]) -> String {
        let mut buf = Vec::new();
        write_table(&mut buf, records).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_table_format() {
        let out = render(&[record("PcdSerialBaudRate", 0x2050, ".data")]);
        assert_eq!(
            out,
            "PCD Name                       Offset    Section Name\r\n\
             PcdSerialBaudRate              0x00002050 .data\r\n"
        );
    }

    #[test]
    fn test_header_only_table() {
        let out = render(&[]);
        assert_eq!(out, "PCD Name                       Offset    Section Name\r\n");
    }

    #[test]
    fn test_encounter_order_and_duplicates_preserved() {
        let records =
            [record("Foo", 0x10, ".data"), record("Foo", 0x10, ".data"), record("Bar", 0x8, ".text")];
        let out = render(&records);
        let rows: Vec<&str> = out.lines().skip(1).collect();
        assert_eq!(rows, vec![
            "Foo                            0x00000010 .data",
            "Foo                            0x00000010 .data",
            "Bar                            0x00000008 .text",
        ]);
    }

    #[test]
    fn test_round_trip() {
        let records = [
            record("PcdSerialBaudRate", 0x2050, ".data"),
            record("PcdDebugPrintLevel", 0x3000, ".text"),
        ];
        let out = render(&records);
        let parsed: Vec<PatchRecord> = out
            .lines()
            .skip(1)
            .map(|row| {
                let name = row[..30].trim_end().to_string();
                let offset = u64::from_str_radix(&row[33..41], 16).unwrap();
                let section = row[42..].to_string();
                PatchRecord { name, offset, section }
            })
            .collect();
        assert_eq!(parsed, records);
    }

    #[test]
    fn test_idempotent_output() {
        let records = [record("Foo", 0x10, ".data")];
        assert_eq!(render(&records), render(&records));
    }
}
