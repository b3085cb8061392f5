//! The container parser: classify an existing image's dialect, locate its
//! image partition table, and on request walk the nested flash partition
//! table.
//!
//! Every function here is bounds-checked against the slice it is handed —
//! a truncated or hostile input is a [`anyhow::Error`], never a panic.

use anyhow::{bail, Context, Result};

use crate::dialect::ContainerDialect;
use crate::metapart::parse_table_lines;
use crate::partition::{FlashPartition, ImagePartitionEntry};

const IMAGE_PARTITION_TABLE_LEN: usize = 2048;

/// An image that has been classified and had its image partition table
/// read, but whose payload bytes have not yet been copied out.
pub struct ParsedImage<'a> {
	pub data: &'a [u8],
	pub dialect: ContainerDialect,
	pub payload_offset: usize,
	pub entries: Vec<ImagePartitionEntry>,
}

impl<'a> ParsedImage<'a> {
	/// Classify `data`'s dialect, then parse its image partition table.
	pub fn parse(data: &'a [u8]) -> Result<Self> {
		let dialect = ContainerDialect::classify(data)?;
		let table_offset = dialect.payload_offset() - IMAGE_PARTITION_TABLE_LEN;
		let table = data
			.get(table_offset..table_offset + IMAGE_PARTITION_TABLE_LEN)
			.context("Image is too short to contain an image partition table")?;
		let entries = parse_image_partition_table(table)?;
		Ok(ParsedImage {
			data,
			dialect,
			payload_offset: dialect.payload_offset(),
			entries,
		})
	}

	/// Look up an embedded partition's bytes by name.
	pub fn partition_bytes(&self, name: &str) -> Option<&'a [u8]> {
		let entry = self.entries.iter().find(|e| e.name == name)?;
		let start = self.payload_offset - IMAGE_PARTITION_TABLE_LEN + entry.base as usize;
		self.data.get(start..start + entry.size as usize)
	}
}

/// Walk `fwup-ptn` lines in a 2048-byte image partition table window.
pub fn parse_image_partition_table(table: &[u8]) -> Result<Vec<ImagePartitionEntry>> {
	let lines = parse_table_lines(table, "fwup-ptn ", b"\t\r\n")?;
	Ok(lines
		.into_iter()
		.map(|(name, base, size)| ImagePartitionEntry { name, base, size })
		.collect())
}

/// Parse the flash partition table nested inside a `partition-table`
/// embedded partition's raw content, skipping its 4-byte magic prefix.
pub fn parse_flash_partition_table(content: &[u8]) -> Result<Vec<FlashPartition>> {
	if content.len() < 4 {
		bail!("partition-table content is too short to contain its magic prefix");
	}
	crate::metapart::parse_partition_table_content(&content[4..])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::assemble::{build_image, BuildMode, BuildOptions};
	use crate::epoch::BuildEpoch;
	use crate::registry;

	#[test]
	fn roundtrip_of_embedded_table_s5() {
		let board = registry::find("CPE510").unwrap();
		let kernel = vec![0xAAu8; 128 * 1024];
		let rootfs = vec![0xBBu8; 1024 * 1024];
		let out = build_image(&BuildOptions {
			board,
			kernel: &kernel,
			rootfs: &rootfs,
			mode: BuildMode::Factory,
			jffs2_eof: false,
			revision: None,
			epoch: BuildEpoch::WALL_CLOCK,
		})
		.unwrap();

		let parsed = ParsedImage::parse(&out).unwrap();
		// CPE510 carries a vendor banner, so the u32 at 0x14 (its length)
		// is small and the image classifies as Vendor, not Default.
		assert_eq!(parsed.dialect, ContainerDialect::Vendor);
		let names: Vec<&str> = parsed.entries.iter().map(|e| e.name.as_str()).collect();
		assert_eq!(names, vec!["partition-table", "soft-version", "support-list", "os-image", "file-system"]);
		assert_eq!(parsed.entries[0].base, 0x800);
		let mut running = parsed.entries[0].base;
		for e in &parsed.entries {
			assert_eq!(e.base, running);
			running += e.size;
		}
	}

	#[test]
	fn extracted_os_image_matches_kernel() {
		let board = registry::find("CPE510").unwrap();
		let kernel = vec![0xAAu8; 128 * 1024];
		let rootfs = vec![0xBBu8; 1024 * 1024];
		let out = build_image(&BuildOptions {
			board,
			kernel: &kernel,
			rootfs: &rootfs,
			mode: BuildMode::Factory,
			jffs2_eof: false,
			revision: None,
			epoch: BuildEpoch::WALL_CLOCK,
		})
		.unwrap();

		let parsed = ParsedImage::parse(&out).unwrap();
		assert_eq!(parsed.partition_bytes("os-image").unwrap(), kernel.as_slice());
	}

	#[test]
	fn rejects_truncated_image() {
		assert!(ParsedImage::parse(&[0u8; 4]).is_err());
	}
}
