//! CSV output for per-unit memory usage
//!
//! One row per finished record, `unit,usage,real_usage` in MiB, largest
//! first.

use crate::memory::mb;
use crate::record::LoadRecord;

/// CSV row for a single unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvUnit {
    pub unit: String,
    pub usage_mb: u64,
    pub real_usage_mb: u64,
}

impl From<&LoadRecord> for CsvUnit {
    fn from(record: &LoadRecord) -> Self {
        Self {
            unit: record.unit.clone(),
            usage_mb: mb(record.usage()),
            real_usage_mb: mb(record.real_usage()),
        }
    }
}

/// CSV output formatter
#[derive(Debug, Default)]
pub struct CsvOutput {
    rows: Vec<CsvUnit>,
}

impl CsvOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from records already in report order
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a LoadRecord>,
    {
        Self {
            rows: records.into_iter().map(CsvUnit::from).collect(),
        }
    }

    pub fn add_row(&mut self, row: CsvUnit) {
        self.rows.push(row);
    }

    fn header() -> &'static str {
        "unit,usage,real_usage"
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str(Self::header());
        output.push('\n');

        for row in &self.rows {
            output.push_str(&format!(
                "{},{},{}\n",
                Self::escape_field(&row.unit),
                row.usage_mb,
                row.real_usage_mb
            ));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: u64 = 1024 * 1024;

    #[test]
    fn test_empty_has_header_only() {
        assert_eq!(CsvOutput::new().to_csv(), "unit,usage,real_usage\n");
    }

    #[test]
    fn test_rows_in_given_order() {
        let mut a = LoadRecord::new("pkgA", 100 * MB);
        a.memory_end = 170 * MB;
        a.memory_inner = 20 * MB;
        let mut b = LoadRecord::new("pkgA.sub", 140 * MB);
        b.memory_end = 160 * MB;

        let csv = CsvOutput::from_records([&a, &b]).to_csv();
        assert_eq!(csv, "unit,usage,real_usage\npkgA,70,50\npkgA.sub,20,20\n");
    }

    #[test]
    fn test_escapes_odd_names() {
        let mut out = CsvOutput::new();
        out.add_row(CsvUnit {
            unit: "a,\"b\"".to_string(),
            usage_mb: 1,
            real_usage_mb: 1,
        });
        assert!(out.to_csv().contains("\"a,\"\"b\"\"\",1,1"));
    }
}
