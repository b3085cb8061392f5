//! Builders and parsers for the small framed metadata records:
//! `partition-table`, `soft-version`, `support-list` and `extra-para`.
//!
//! Three of the four share a common 8-byte "meta framing" (length prefix,
//! zero word, content, optional pad byte); `partition-table` is the odd one
//! out — it is a fixed 2048-byte raw payload, not meta-framed.

use anyhow::{bail, Context, Result};

use crate::epoch::BuildEpoch;
use crate::partition::{FlashPartition, PaddingPolicy, SoftwareVersionSpec};

/// Fixed size of the `partition-table` embedded partition.
pub const PARTITION_TABLE_SIZE: usize = 2048;

/// Magic prefix of the raw `partition-table` content.
pub const PARTITION_TABLE_MAGIC: [u8; 4] = [0x00, 0x04, 0x00, 0x00];

// ---------------------------------------------------------------------
// Meta framing: {u32 len, u32 zero} + content + optional pad byte.
// ---------------------------------------------------------------------

/// Wrap `content` in the common meta framing used by `soft-version`,
/// `support-list` and `extra-para`.
pub fn frame_meta(content: &[u8], policy: PaddingPolicy) -> Vec<u8> {
	let mut out = Vec::with_capacity(8 + content.len() + 1);
	out.extend_from_slice(&(content.len() as u32).to_be_bytes());
	out.extend_from_slice(&0u32.to_be_bytes());
	out.extend_from_slice(content);
	if let Some(pad) = policy.pad_byte() {
		out.push(pad);
	}
	out
}

/// Extract the content slice from a meta-framed record, ignoring any
/// trailing pad byte. Does not require the caller to know the padding
/// policy up front: the content length is self-describing.
pub fn parse_meta_framing(bytes: &[u8]) -> Result<&[u8]> {
	if bytes.len() < 8 {
		bail!("Meta-framed record is truncated: need at least 8 header bytes, got {}", bytes.len());
	}
	let len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
	let content_end = 8 + len;
	if bytes.len() < content_end {
		bail!(
			"Meta-framed record declares {} content bytes but only {} are available",
			len,
			bytes.len() - 8
		);
	}
	Ok(&bytes[8..content_end])
}

// ---------------------------------------------------------------------
// partition-table
// ---------------------------------------------------------------------

/// Build the raw 2048-byte `partition-table` payload from the board's flash
/// geometry (after the dynamic kernel/rootfs split has been applied).
pub fn build_partition_table(flash: &[FlashPartition]) -> Result<Vec<u8>> {
	let mut body = Vec::new();
	body.extend_from_slice(&PARTITION_TABLE_MAGIC);
	for part in flash {
		body.extend_from_slice(
			format!("partition {} base 0x{:05x} size 0x{:05x}\n", part.name, part.base, part.size)
				.as_bytes(),
		);
	}
	body.push(0);
	if body.len() > PARTITION_TABLE_SIZE {
		bail!(
			"Flash partition table does not fit in {} bytes (needs {})",
			PARTITION_TABLE_SIZE,
			body.len()
		);
	}
	body.resize(PARTITION_TABLE_SIZE, 0xFF);
	Ok(body)
}

/// Parse textual `name base 0x... size 0x...` table lines, starting right
/// after the caller has stripped any magic prefix.
///
/// Stops at the first line that does not begin with `header`, or at the
/// first NUL/non-text byte. Never reads past `bytes`. Names longer than 31
/// bytes are truncated, per the flash-table parsing contract.
pub fn parse_table_lines(bytes: &[u8], header: &str, line_end: &[u8]) -> Result<Vec<(String, u32, u32)>> {
	let mut entries = Vec::new();
	let mut cursor = 0usize;
	let header_bytes = header.as_bytes();
	loop {
		if cursor >= bytes.len() || !bytes[cursor..].starts_with(header_bytes) {
			break;
		}
		let remaining = &bytes[cursor..];
		let end = find_subslice(remaining, line_end)
			.context("Table line is missing its terminator within the window")?;
		let line = std::str::from_utf8(&remaining[..end])
			.context("Table line is not valid UTF-8")?;
		let (name, base, size) = parse_table_line(line, header)?;
		entries.push((name, base, size));
		cursor += end + line_end.len();
	}
	Ok(entries)
}

fn parse_table_line(line: &str, header: &str) -> Result<(String, u32, u32)> {
	let rest = line
		.strip_prefix(header)
		.context("Line does not start with the expected header")?;
	let mut tokens = rest.split_whitespace();
	let name = tokens.next().context("Table line is missing a name")?;
	let base_kw = tokens.next().context("Table line is missing 'base'")?;
	if base_kw != "base" {
		bail!("Expected 'base' keyword, found '{}'", base_kw);
	}
	let base_str = tokens.next().context("Table line is missing a base value")?;
	let size_kw = tokens.next().context("Table line is missing 'size'")?;
	if size_kw != "size" {
		bail!("Expected 'size' keyword, found '{}'", size_kw);
	}
	let size_str = tokens.next().context("Table line is missing a size value")?;
	let base = parse_hex_u32(base_str)?;
	let size = parse_hex_u32(size_str)?;
	let mut name = name.to_owned();
	name.truncate(31);
	Ok((name, base, size))
}

fn parse_hex_u32(field: &str) -> Result<u32> {
	let field = field.strip_prefix("0x").unwrap_or(field);
	u32::from_str_radix(field, 16).context(format!("'{}' is not a valid hex value", field))
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse a `partition-table` embedded partition's raw content (after the
/// caller has skipped its 4-byte magic prefix) into flash partitions.
pub fn parse_partition_table_content(content: &[u8]) -> Result<Vec<FlashPartition>> {
	let lines = parse_table_lines(content, "partition ", b"\n")?;
	Ok(lines
		.into_iter()
		.map(|(name, base, size)| FlashPartition {
			name: Box::leak(name.into_boxed_str()),
			base,
			size,
		})
		.collect())
}

// ---------------------------------------------------------------------
// soft-version
// ---------------------------------------------------------------------

/// Decoded contents of a `soft-version` record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SoftVersion {
	Text(String),
	Numeric {
		major: u8,
		minor: u8,
		patch: u8,
		year: (u8, u8),
		month: u8,
		day: u8,
		revision: u32,
		compat_level: Option<u32>,
	},
}

/// Build the meta-framed `soft-version` content.
pub fn build_soft_version(
	spec: &SoftwareVersionSpec,
	compat_level: u32,
	revision: Option<u32>,
	epoch: BuildEpoch,
	policy: PaddingPolicy,
) -> Vec<u8> {
	let content = match spec {
		SoftwareVersionSpec::Text(s) => {
			let mut c = s.as_bytes().to_vec();
			c.push(0);
			c
		}
		SoftwareVersionSpec::Numeric { major, minor, patch } => {
			let (year_hi, year_lo, month, day) = epoch.to_bcd_date();
			let mut c = vec![0xFF, *major, *minor, *patch, year_hi, year_lo, month, day];
			c.extend_from_slice(&revision.unwrap_or(0).to_be_bytes());
			if compat_level != 0 {
				c.extend_from_slice(&compat_level.to_be_bytes());
			}
			c
		}
	};
	frame_meta(&content, policy)
}

/// Parse a meta-framed `soft-version` record. Follows the info driver's own
/// rule: if every content byte is ASCII printable or whitespace, it is a
/// text record; otherwise it is decoded as the packed numeric record.
pub fn parse_soft_version(meta_bytes: &[u8]) -> Result<SoftVersion> {
	let content = parse_meta_framing(meta_bytes)?;
	if content.iter().all(|&b| b == 0 || b.is_ascii_graphic() || b.is_ascii_whitespace()) {
		let text = content
			.split(|&b| b == 0)
			.next()
			.unwrap_or(content);
		let text = std::str::from_utf8(text).context("soft-version text is not valid UTF-8")?;
		return Ok(SoftVersion::Text(text.to_owned()));
	}
	if content.len() < 12 {
		bail!("Numeric soft-version record is truncated: need at least 12 bytes, got {}", content.len());
	}
	let major = content[1];
	let minor = content[2];
	let patch = content[3];
	let year = (content[4], content[5]);
	let month = content[6];
	let day = content[7];
	let revision = u32::from_be_bytes(content[8..12].try_into().unwrap());
	let compat_level = if content.len() >= 16 {
		Some(u32::from_be_bytes(content[12..16].try_into().unwrap()))
	} else {
		None
	};
	Ok(SoftVersion::Numeric {
		major,
		minor,
		patch,
		year,
		month,
		day,
		revision,
		compat_level,
	})
}

// ---------------------------------------------------------------------
// support-list
// ---------------------------------------------------------------------

pub fn build_support_list(text: &str, policy: PaddingPolicy) -> Vec<u8> {
	frame_meta(text.as_bytes(), policy)
}

pub fn parse_support_list(meta_bytes: &[u8]) -> Result<String> {
	let content = parse_meta_framing(meta_bytes)?;
	std::str::from_utf8(content)
		.map(str::to_owned)
		.context("support-list is not valid UTF-8")
}

// ---------------------------------------------------------------------
// extra-para
// ---------------------------------------------------------------------

pub fn build_extra_para(marker: [u8; 2], policy: PaddingPolicy) -> Vec<u8> {
	frame_meta(&marker, policy)
}

pub fn parse_extra_para(meta_bytes: &[u8]) -> Result<[u8; 2]> {
	let content = parse_meta_framing(meta_bytes)?;
	if content.len() != 2 {
		bail!("extra-para content must be exactly 2 bytes, got {}", content.len());
	}
	Ok([content[0], content[1]])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn meta_framing_roundtrip_text() {
		let framed = frame_meta(b"hello\0", PaddingPolicy::Pad(0xff));
		assert_eq!(framed.len(), 8 + 6 + 1);
		assert_eq!(parse_meta_framing(&framed).unwrap(), b"hello\0");
	}

	#[test]
	fn meta_framing_roundtrip_no_pad() {
		let framed = frame_meta(b"abc", PaddingPolicy::None);
		assert_eq!(framed.len(), 8 + 3);
		assert_eq!(parse_meta_framing(&framed).unwrap(), b"abc");
	}

	#[test]
	fn partition_table_fits_and_parses_back() {
		let flash = vec![
			FlashPartition::new("fs-uboot", 0, 0x20000),
			FlashPartition::new("firmware", 0x20000, 0x7a0000),
		];
		let raw = build_partition_table(&flash).unwrap();
		assert_eq!(raw.len(), PARTITION_TABLE_SIZE);
		assert_eq!(&raw[0..4], &PARTITION_TABLE_MAGIC);
		let parsed = parse_partition_table_content(&raw[4..]).unwrap();
		assert_eq!(parsed.len(), 2);
		assert_eq!(parsed[0].name, "fs-uboot");
		assert_eq!(parsed[1].base, 0x20000);
	}

	#[test]
	fn partition_table_overflow_is_fatal() {
		let huge_name: String = "x".repeat(64);
		let flash: Vec<FlashPartition> = (0..200)
			.map(|i| FlashPartition::new(Box::leak(huge_name.clone().into_boxed_str()), i, 1))
			.collect();
		assert!(build_partition_table(&flash).is_err());
	}

	#[test]
	fn soft_version_text_roundtrip() {
		let spec = SoftwareVersionSpec::Text("2.0.0 Build 20230101\n");
		let framed = build_soft_version(&spec, 0, None, BuildEpoch::WALL_CLOCK, PaddingPolicy::Pad(0xff));
		match parse_soft_version(&framed).unwrap() {
			SoftVersion::Text(s) => assert_eq!(s, "2.0.0 Build 20230101\n"),
			_ => panic!("expected text variant"),
		}
	}

	#[test]
	fn soft_version_numeric_without_compat() {
		let spec = SoftwareVersionSpec::Numeric { major: 1, minor: 2, patch: 3 };
		let epoch = BuildEpoch(Some(1_577_836_800));
		let framed = build_soft_version(&spec, 0, Some(7), epoch, PaddingPolicy::None);
		// content length must be 12 (no compat_level field)
		let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
		assert_eq!(len, 12);
		match parse_soft_version(&framed).unwrap() {
			SoftVersion::Numeric { major, minor, patch, year, month, day, revision, compat_level } => {
				assert_eq!((major, minor, patch), (1, 2, 3));
				assert_eq!(year, (0x20, 0x20));
				assert_eq!(month, 0x01);
				assert_eq!(day, 0x01);
				assert_eq!(revision, 7);
				assert_eq!(compat_level, None);
			}
			_ => panic!("expected numeric variant"),
		}
	}

	#[test]
	fn soft_version_numeric_with_compat() {
		let spec = SoftwareVersionSpec::Numeric { major: 2, minor: 0, patch: 0 };
		let framed = build_soft_version(&spec, 1, None, BuildEpoch::WALL_CLOCK, PaddingPolicy::None);
		let len = u32::from_be_bytes(framed[0..4].try_into().unwrap()) as usize;
		assert_eq!(len, 16);
		match parse_soft_version(&framed).unwrap() {
			SoftVersion::Numeric { compat_level, .. } => assert_eq!(compat_level, Some(1)),
			_ => panic!("expected numeric variant"),
		}
	}

	#[test]
	fn support_list_roundtrip() {
		let framed = build_support_list("SupportList:\nCPE510(TP-LINK|UN|N300-5):1.0\r\n", PaddingPolicy::Pad(0xff));
		assert_eq!(parse_support_list(&framed).unwrap(), "SupportList:\nCPE510(TP-LINK|UN|N300-5):1.0\r\n");
	}

	#[test]
	fn extra_para_roundtrip() {
		let framed = build_extra_para([0x01, 0x00], PaddingPolicy::None);
		assert_eq!(parse_extra_para(&framed).unwrap(), [0x01, 0x00]);
	}
}
