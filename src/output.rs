//! Buffered TSV output for query results.
//!
//! Uses itoa for integer formatting and ryu for float formatting
//! to avoid allocation per value.

use crate::query::PivotTable;
use crate::tsv::Result;
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::sync::Arc;

/// Output buffer size (2 MB).
const DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Tab-separated writer for pivot tables, alias maps and plain lists.
pub struct TsvWriter<W: Write> {
    writer: BufWriter<W>,
    itoa_buf: itoa::Buffer,
    ryu_buf: ryu::Buffer,
}

impl<W: Write> TsvWriter<W> {
    /// Create a writer with the default 2 MB buffer.
    pub fn new(output: W) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, output)
    }

    /// Create a writer with the given buffer size.
    pub fn with_capacity(capacity: usize, output: W) -> Self {
        Self {
            writer: BufWriter::with_capacity(capacity, output),
            itoa_buf: itoa::Buffer::new(),
            ryu_buf: ryu::Buffer::new(),
        }
    }

    /// Write a string as-is.
    #[inline]
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.writer.write_all(s.as_bytes())?;
        Ok(())
    }

    /// Write a tab character.
    #[inline]
    pub fn write_tab(&mut self) -> Result<()> {
        self.writer.write_all(b"\t")?;
        Ok(())
    }

    /// Write a newline character.
    #[inline]
    pub fn write_newline(&mut self) -> Result<()> {
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write a float using ryu.
    #[inline]
    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.writer.write_all(self.ryu_buf.format(value).as_bytes())?;
        Ok(())
    }

    /// Write a count using itoa.
    #[inline]
    pub fn write_count(&mut self, value: usize) -> Result<()> {
        self.writer
            .write_all(self.itoa_buf.format(value).as_bytes())?;
        Ok(())
    }

    /// Write one value per line.
    pub fn write_list<'a, I>(&mut self, items: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for item in items {
            self.write_str(item)?;
            self.write_newline()?;
        }
        Ok(())
    }

    /// Write a `key<TAB>count` line.
    pub fn write_key_count(&mut self, key: &str, count: usize) -> Result<()> {
        self.write_str(key)?;
        self.write_tab()?;
        self.write_count(count)?;
        self.write_newline()
    }

    /// Write the original-to-alias mapping with a header line.
    pub fn write_aliases(&mut self, aliases: &BTreeMap<Arc<str>, Arc<str>>) -> Result<()> {
        self.write_str("original\talias\n")?;
        for (original, alias) in aliases {
            self.write_str(original)?;
            self.write_tab()?;
            self.write_str(alias)?;
            self.write_newline()?;
        }
        Ok(())
    }

    /// Write a pivot table: one row per series, one column per alias.
    pub fn write_pivot(&mut self, table: &PivotTable) -> Result<()> {
        self.write_str("series")?;
        for alias in &table.aliases {
            self.write_tab()?;
            self.write_str(alias)?;
        }
        self.write_newline()?;

        for (row, series) in table.series_ids.iter().enumerate() {
            self.write_str(series)?;
            for &value in table.row(row) {
                self.write_tab()?;
                self.write_f64(value)?;
            }
            self.write_newline()?;
        }
        Ok(())
    }

    /// Flush buffered output.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::store::RecordStore;

    fn render<F>(f: F) -> String
    where
        F: FnOnce(&mut TsvWriter<&mut Vec<u8>>) -> Result<()>,
    {
        let mut out = Vec::new();
        {
            let mut writer = TsvWriter::new(&mut out);
            f(&mut writer).unwrap();
            writer.flush().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_write_pivot() {
        let store = RecordStore::new(
            vec![
                Record::new("a.d", "a", "S1", 3.5, "G"),
                Record::new("b.d", "b", "S2", 2.0, "G"),
            ],
            BTreeMap::new(),
        );
        let table = store.pivot("G", &["S1", "S2"], &["a", "b"]);
        let text = render(|w| w.write_pivot(&table));
        assert_eq!(text, "series\ta\tb\nS1\t3.5\t0.0\nS2\t0.0\t2.0\n");
    }

    #[test]
    fn test_write_aliases() {
        let mut aliases: BTreeMap<Arc<str>, Arc<str>> = BTreeMap::new();
        aliases.insert(Arc::from("x/20240114_B_Slot1.d"), Arc::from("B"));
        aliases.insert(Arc::from("x/20240114_A_Slot1.d"), Arc::from("A"));
        let text = render(|w| w.write_aliases(&aliases));
        assert_eq!(
            text,
            "original\talias\nx/20240114_A_Slot1.d\tA\nx/20240114_B_Slot1.d\tB\n"
        );
    }

    #[test]
    fn test_write_list_and_counts() {
        let text = render(|w| {
            w.write_list(["GAPDH", "ACTB"])?;
            w.write_key_count("records", 42)
        });
        assert_eq!(text, "GAPDH\nACTB\nrecords\t42\n");
    }
}
