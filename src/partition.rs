//! Types describing the geometry of a board's NOR flash and the payloads
//! embedded inside a SafeLoader container.
//!
//! A [`FlashPartition`] is an entry of the on-device *flash partition table*
//! (the `partition-table` record, see [`crate::metapart`]). An
//! [`ImagePartition`] is an entry of the in-container *image partition
//! table* built by [`crate::assemble`] and read back by [`crate::parse`].

use serde::{Deserialize, Serialize};

/// A named byte region on the device's NOR flash.
///
/// Lines of the on-device `partition-table` record translate 1:1 to these.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashPartition {
	pub name: &'static str,
	pub base: u32,
	pub size: u32,
}

impl FlashPartition {
	pub const fn new(name: &'static str, base: u32, size: u32) -> Self {
		FlashPartition { name, base, size }
	}

	pub fn end(&self) -> u32 {
		self.base + self.size
	}
}

/// Whether a meta-framed record carries a single trailing pad byte, and
/// which value that byte takes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingPolicy {
	Pad(u8),
	None,
}

impl PaddingPolicy {
	pub fn pad_byte(&self) -> Option<u8> {
		match self {
			PaddingPolicy::Pad(b) => Some(*b),
			PaddingPolicy::None => None,
		}
	}
}

/// Content of the `soft-version` record, before the build-time fields
/// (date, revision) are filled in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoftwareVersionSpec {
	/// A plain NUL-terminated text record, e.g. `"2.0.0\n"`.
	Text(&'static str),
	/// A packed binary record; `major`/`minor`/`patch` are static, the
	/// build date and revision are supplied at build time.
	Numeric { major: u8, minor: u8, patch: u8 },
}

/// A fully materialised payload embedded in the built image, or read back
/// from a parsed one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePartition {
	pub name: String,
	pub data: Vec<u8>,
}

impl ImagePartition {
	pub fn new<S: Into<String>>(name: S, data: Vec<u8>) -> Self {
		ImagePartition {
			name: name.into(),
			data,
		}
	}
}

/// An entry of the in-container *image partition table*: a name plus its
/// base and size within the payload area, without the payload bytes
/// themselves. Produced by [`crate::parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePartitionEntry {
	pub name: String,
	pub base: u32,
	pub size: u32,
}
