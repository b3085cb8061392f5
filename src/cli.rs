//! Module defining the command line usage.
//!
//! Available subcommands
//! ----------------------
//!
//! ### Inspect an image
//!
//! ```shell
//! $ safeloader-fwtool info -i IMAGE
//! ```
//!
//! ### Extract every embedded partition to a directory
//!
//! ```shell
//! $ safeloader-fwtool extract -x IMAGE -d DIR
//! ```
//!
//! ### Convert a vendor image to a sysupgrade image
//!
//! ```shell
//! $ safeloader-fwtool convert -z IMAGE -o OUTPUT
//! ```
//!
//! ### Build a factory or sysupgrade image for a board
//!
//! ```shell
//! $ safeloader-fwtool build -B BOARD -k KERNEL -r ROOTFS -o OUTPUT [-V r123] [-j] [-S]
//! ```
//!
//! - `-V r123` sets the build revision to `123`.
//! - `-j` appends the jffs2 end-of-filesystem marker to the root filesystem payload.
//! - `-S` builds a sysupgrade image instead of a factory image.
//!
//! ### List registered boards
//!
//! ```shell
//! $ safeloader-fwtool list --format FORMAT
//! ```
//!
//! `FORMAT` is one of `pretty` or `simple`.
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

#[derive(Clone, Copy, Default, ValueEnum)]
pub enum ListFormat {
	#[default]
	Pretty,
	Simple,
}

/// Command line usage
/// ===================
///
/// This tool uses the subcommand approach to specify the action to take.
///
/// ```shell
/// safeloader-fwtool [--debug] <ACTION> [OPTIONS]
/// ```
///
/// Actions
/// -------
///
/// - `info`: Inspect an existing SafeLoader image.
/// - `extract`: Copy every embedded partition of an image to a directory.
/// - `convert`: Rewrite a vendor image into a sysupgrade image.
/// - `build`: Build a factory or sysupgrade image for a named board.
/// - `list`: List every registered board profile.
#[derive(Parser)]
#[command(version, about, long_about = None)]
pub struct Cmdline {
	/// Turns on debug output.
	#[arg(long, action = ArgAction::SetTrue)]
	pub debug: bool,
	/// The action to take.
	#[command(subcommand)]
	pub action: Action,
}

#[derive(Subcommand)]
pub enum Action {
	/// Inspect an existing SafeLoader image.
	Info {
		/// Path to the image to inspect.
		#[arg(short = 'i', long = "input")]
		input: PathBuf,
	},
	/// Copy every embedded partition of an image to a directory.
	Extract {
		/// Path to the image to extract.
		#[arg(short = 'x', long = "input")]
		input: PathBuf,
		/// Destination directory; must already exist.
		#[arg(short = 'd', long = "dir")]
		dir: PathBuf,
	},
	/// Rewrite a vendor image into a sysupgrade image.
	Convert {
		/// Path to the vendor image to convert.
		#[arg(short = 'z', long = "input")]
		input: PathBuf,
		/// Path to write the converted sysupgrade image.
		#[arg(short = 'o', long = "output")]
		output: PathBuf,
	},
	/// Build a factory or sysupgrade image for a named board.
	Build {
		/// Board id or alias, matched case-insensitively against the registry.
		#[arg(short = 'B', long = "board")]
		board: String,
		/// Path to the kernel image.
		#[arg(short = 'k', long = "kernel")]
		kernel: PathBuf,
		/// Path to the root filesystem image.
		#[arg(short = 'r', long = "rootfs")]
		rootfs: PathBuf,
		/// Path to write the built image.
		#[arg(short = 'o', long = "output")]
		output: PathBuf,
		/// Build revision, given as `r<uint>`, e.g. `r123`.
		#[arg(short = 'V', long = "revision", value_parser = parse_revision)]
		revision: Option<u32>,
		/// Append the jffs2 end-of-filesystem marker to the root filesystem payload.
		#[arg(short = 'j', long = "jffs2-eof", action = ArgAction::SetTrue)]
		jffs2_eof: bool,
		/// Build a sysupgrade image instead of a factory image.
		#[arg(short = 'S', long = "sysupgrade", action = ArgAction::SetTrue)]
		sysupgrade: bool,
	},
	/// List every registered board profile.
	List {
		#[arg(short, long, value_enum, default_value_t = ListFormat::Pretty)]
		format: ListFormat,
	},
}

/// Parse a `-V` revision argument of the form `r<uint>`, e.g. `r123`.
fn parse_revision(raw: &str) -> Result<u32, String> {
	let digits = raw
		.strip_prefix('r')
		.ok_or_else(|| format!("revision '{}' must start with 'r', e.g. 'r123'", raw))?;
	digits
		.parse::<u32>()
		.map_err(|e| format!("revision '{}' is not a valid unsigned integer: {}", raw, e))
}
