use crate::record::Record;
use uuid::Uuid;

/// Issues serial numbers for newly registered beneficiaries
pub trait SerialGenerator: Send + Sync {
    /// Produce a serial not present in `existing`
    fn next_serial(&self, existing: &[Record]) -> String;
}

/// `SN-0001`, `SN-0002`, ... continuing after the highest issued number
///
/// The counter stops at `u64::MAX`; past that it hands back the highest
/// serial again and registration rejects it as a duplicate.
#[derive(Debug, Clone)]
pub struct SequentialSerials {
    prefix: String,
    width: usize,
}

impl SequentialSerials {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    fn number_of(&self, serial: &str) -> Option<u64> {
        serial.strip_prefix(&self.prefix)?.parse().ok()
    }
}

impl Default for SequentialSerials {
    fn default() -> Self {
        Self::new("SN-", 4)
    }
}

impl SerialGenerator for SequentialSerials {
    fn next_serial(&self, existing: &[Record]) -> String {
        let highest = existing
            .iter()
            .filter_map(|r| self.number_of(r.serial_no()))
            .max()
            .unwrap_or(0);
        format!(
            "{}{:0width$}",
            self.prefix,
            highest.saturating_add(1),
            width = self.width
        )
    }
}

/// Random UUID v4 serials
#[derive(Debug, Clone, Default)]
pub struct UuidSerials;

impl SerialGenerator for UuidSerials {
    fn next_serial(&self, _existing: &[Record]) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_starts_at_one() {
        let serials = SequentialSerials::default();
        assert_eq!(serials.next_serial(&[]), "SN-0001");
    }

    #[test]
    fn test_sequential_continues_after_highest() {
        let serials = SequentialSerials::default();
        let existing = vec![
            Record::new("SN-0007"),
            Record::new("LEGACY-12"),
            Record::new("SN-0003"),
        ];
        assert_eq!(serials.next_serial(&existing), "SN-0008");
    }

    #[test]
    fn test_sequential_custom_prefix() {
        let serials = SequentialSerials::new("KUSUM/", 6);
        assert_eq!(
            serials.next_serial(&[Record::new("KUSUM/000041")]),
            "KUSUM/000042"
        );
    }

    #[test]
    fn test_sequential_stops_at_counter_limit() {
        let serials = SequentialSerials::default();
        let last = format!("SN-{}", u64::MAX);
        assert_eq!(serials.next_serial(&[Record::new(last.as_str())]), last);
    }

    #[test]
    fn test_uuid_serials_are_unique() {
        let serials = UuidSerials;
        assert_ne!(serials.next_serial(&[]), serials.next_serial(&[]));
    }
}
