//! Container dialect classification.
//!
//! Four SafeLoader dialects share almost all of their layout; they are
//! distinguished only by a handful of header bytes. Modelling them as a
//! single tagged enum (rather than one parse function per dialect, or a
//! trait-object hierarchy) keeps the shared 99% of the codec in one place
//! and isolates the differences to [`ContainerDialect::payload_offset`].

use anyhow::{bail, Result};

/// Offset, from the start of the image, to the 64-byte window this crate
/// inspects to classify the dialect.
const DIALECT_WINDOW_OFFSET: usize = 0x14;
const DIALECT_WINDOW_LEN: usize = 0x40;

/// Payload offset shared by `Default`, `Vendor` and `Cloud` dialects: the
/// image partition table starts right after the 4096-byte header.
pub const DEFAULT_PAYLOAD_OFFSET: usize = 0x1014 + 0x800;

/// Payload offset for the `QNew` dialect: preamble (0x14) + QNew header
/// (0x3C) + fixed 0x1000 region.
///
/// See the Open Question in `DESIGN.md` — this constant is accepted by the
/// parser but the builder refuses to emit `QNew` containers.
pub const QNEW_PAYLOAD_OFFSET: usize = 0x14 + 0x3C + 0x1000;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum ContainerDialect {
	Default,
	Vendor,
	Cloud,
	QNew,
}

impl ContainerDialect {
	/// Offset, from the start of the image, at which the image partition
	/// table begins.
	pub fn payload_offset(&self) -> usize {
		match self {
			ContainerDialect::QNew => QNEW_PAYLOAD_OFFSET,
			_ => DEFAULT_PAYLOAD_OFFSET,
		}
	}

	/// Classify the dialect of an image from its header bytes.
	pub fn classify(data: &[u8]) -> Result<Self> {
		if data.len() < DIALECT_WINDOW_OFFSET + DIALECT_WINDOW_LEN {
			bail!("Image is too short to contain a SafeLoader header (need at least {} bytes, got {})",
				DIALECT_WINDOW_OFFSET + DIALECT_WINDOW_LEN, data.len());
		}
		let window = &data[DIALECT_WINDOW_OFFSET..DIALECT_WINDOW_OFFSET + DIALECT_WINDOW_LEN];
		if window.starts_with(b"?NEW") {
			return Ok(ContainerDialect::QNew);
		}
		if window.starts_with(b"fw-type:Cloud") {
			return Ok(ContainerDialect::Cloud);
		}
		let candidate_len = u32::from_be_bytes(window[0..4].try_into().unwrap());
		if candidate_len <= 0x1000 {
			return Ok(ContainerDialect::Vendor);
		}
		Ok(ContainerDialect::Default)
	}
}
