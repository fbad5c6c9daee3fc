// libs/billing-cell/src/services/numbering.rs
use regex::Regex;

/// Invoice number scheme: `INV-<year>-<sequence>`, sequence zero-padded to
/// three digits and growing past 999 unpadded. Uniqueness is scoped to the
/// tenant's active invoices, so a voided invoice's number can come back.
pub struct InvoiceNumbering {
    pattern: Regex,
}

impl InvoiceNumbering {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"^INV-(\d{4})-(\d{3,})$").expect("invoice number pattern is valid"),
        }
    }

    /// Year and sequence of a well-formed number, `None` otherwise.
    /// Malformed numbers are skipped rather than failing allocation.
    pub fn parse(&self, number: &str) -> Option<(i32, u32)> {
        let captures = self.pattern.captures(number)?;
        let year = captures.get(1)?.as_str().parse().ok()?;
        let sequence = captures.get(2)?.as_str().parse().ok()?;
        Some((year, sequence))
    }

    pub fn format(&self, year: i32, sequence: u32) -> String {
        format!("INV-{}-{:03}", year, sequence)
    }

    /// Next free number for the year: one past the highest sequence found
    /// among the given active numbers. Gaps are not reused; a freed number
    /// only comes back once nothing higher is active.
    pub fn next(&self, active_numbers: &[String], year: i32) -> String {
        let highest = active_numbers
            .iter()
            .filter_map(|n| self.parse(n))
            .filter(|(y, _)| *y == year)
            .map(|(_, sequence)| sequence)
            .max()
            .unwrap_or(0);

        self.format(year, highest + 1)
    }
}

impl Default for InvoiceNumbering {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_numbers() {
        let numbering = InvoiceNumbering::new();
        assert_eq!(numbering.parse("INV-2026-001"), Some((2026, 1)));
        assert_eq!(numbering.parse("INV-2026-042"), Some((2026, 42)));
        assert_eq!(numbering.parse("INV-2026-1000"), Some((2026, 1000)));
    }

    #[test]
    fn test_parse_rejects_malformed_numbers() {
        let numbering = InvoiceNumbering::new();
        assert_eq!(numbering.parse("INV-26-001"), None);
        assert_eq!(numbering.parse("INV-2026-01"), None);
        assert_eq!(numbering.parse("inv-2026-001"), None);
        assert_eq!(numbering.parse("INV-2026-001-extra"), None);
        assert_eq!(numbering.parse(""), None);
    }

    #[test]
    fn test_first_number_of_a_year() {
        let numbering = InvoiceNumbering::new();
        assert_eq!(numbering.next(&[], 2026), "INV-2026-001");
    }

    #[test]
    fn test_next_skips_other_years() {
        let numbering = InvoiceNumbering::new();
        let active = vec![
            "INV-2025-117".to_string(),
            "INV-2026-002".to_string(),
            "INV-2026-001".to_string(),
        ];
        assert_eq!(numbering.next(&active, 2026), "INV-2026-003");
        assert_eq!(numbering.next(&active, 2025), "INV-2025-118");
    }

    #[test]
    fn test_next_takes_highest_not_count() {
        // A voided invoice leaves a gap; allocation continues from the top.
        let numbering = InvoiceNumbering::new();
        let active = vec!["INV-2026-001".to_string(), "INV-2026-005".to_string()];
        assert_eq!(numbering.next(&active, 2026), "INV-2026-006");
    }

    #[test]
    fn test_padding_stops_at_three_digits() {
        let numbering = InvoiceNumbering::new();
        assert_eq!(numbering.format(2026, 7), "INV-2026-007");
        assert_eq!(numbering.format(2026, 999), "INV-2026-999");
        assert_eq!(numbering.format(2026, 1000), "INV-2026-1000");

        let active = vec!["INV-2026-999".to_string()];
        assert_eq!(numbering.next(&active, 2026), "INV-2026-1000");
    }
}
