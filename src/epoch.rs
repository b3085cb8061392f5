//! The replayable build timestamp.
//!
//! Per the Design Notes' "Module-level clock" redesign: rather than a
//! process-wide static initialised from the environment, the build epoch is
//! read once by the CLI driver and threaded explicitly into every build
//! call that needs it.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};

/// The build timestamp to stamp into a numeric `soft-version` record.
///
/// `None` means "use the wall clock"; `Some(_)` is the value of
/// `SOURCE_DATE_EPOCH` when that variable is set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BuildEpoch(pub Option<i64>);

impl BuildEpoch {
	pub const WALL_CLOCK: BuildEpoch = BuildEpoch(None);

	/// Read `SOURCE_DATE_EPOCH` from the environment, if present.
	///
	/// A malformed value is a fatal error, not silently ignored.
	pub fn from_env() -> Result<Self> {
		match std::env::var("SOURCE_DATE_EPOCH") {
			Ok(raw) => {
				let epoch: i64 = raw.trim().parse().context(format!(
					"SOURCE_DATE_EPOCH is set to '{}', which is not a valid decimal Unix timestamp",
					raw
				))?;
				Ok(BuildEpoch(Some(epoch)))
			}
			Err(std::env::VarError::NotPresent) => Ok(BuildEpoch::WALL_CLOCK),
			Err(e) => Err(e).context("SOURCE_DATE_EPOCH is set but is not valid Unicode"),
		}
	}

	/// Resolve to a concrete UTC date, either the configured epoch or the
	/// current wall-clock time.
	pub fn resolve(&self) -> DateTime<Utc> {
		match self.0 {
			Some(epoch) => DateTime::from_timestamp(epoch, 0).unwrap_or_else(Utc::now),
			None => Utc::now(),
		}
	}

	/// Year/month/day as BCD bytes, in the packing `soft-version` expects:
	/// `(year_hi, year_lo, month, day)`.
	pub fn to_bcd_date(&self) -> (u8, u8, u8, u8) {
		let date = self.resolve();
		let year = date.year();
		let year_hi = to_bcd((year / 100) as u8);
		let year_lo = to_bcd((year % 100) as u8);
		let month = to_bcd(date.month() as u8);
		let day = to_bcd(date.day() as u8);
		(year_hi, year_lo, month, day)
	}
}

fn to_bcd(value: u8) -> u8 {
	let tens = value / 10;
	let ones = value % 10;
	(tens << 4) | ones
}
