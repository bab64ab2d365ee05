//! DD/MM/YYYY calendar-date handling.
//!
//! Documents render every date in day/month/year order. The serde
//! modules keep that representation on the wire (cache payloads, seed
//! files, CLI output) while the rest of the crate works with
//! [`time::Date`] values.

use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::domain::error::DomainError;

pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[day]/[month]/[year]");

time::serde::format_description!(pub dmy, Date, "[day]/[month]/[year]");

/// Parse a request-supplied date, rejecting anything that is not
/// DD/MM/YYYY.
pub fn parse(raw: &str) -> Result<Date, DomainError> {
    Date::parse(raw, DATE_FORMAT)
        .map_err(|_| DomainError::validation("invalid date format, use DD/MM/YYYY"))
}
