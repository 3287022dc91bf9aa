use chrono::{DateTime, Days, Months, Utc};

use crate::types::Recurrence;

/// Next occurrence after `from` for a recurring reminder, or `None` for
/// one-shot reminders and out-of-range results.
///
/// Month and year steps clamp to the last valid day of the target month, so
/// Jan 31 + 1 month is Feb 28 (or 29) and Feb 29 + 1 year is Feb 28. The
/// time of day is always preserved.
pub fn next_occurrence(from: DateTime<Utc>, recurrence: Recurrence) -> Option<DateTime<Utc>> {
    match recurrence {
        Recurrence::None => None,
        Recurrence::Daily => from.checked_add_days(Days::new(1)),
        Recurrence::Weekly => from.checked_add_days(Days::new(7)),
        Recurrence::Monthly => from.checked_add_months(Months::new(1)),
        Recurrence::Yearly => from.checked_add_months(Months::new(12)),
    }
}
