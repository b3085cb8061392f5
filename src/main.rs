#![allow(clippy::tabs_in_doc_comments)]
mod assemble;
mod cli;
mod dialect;
mod driver;
mod epoch;
mod metapart;
mod parse;
mod partition;
mod registry;
mod tests;

use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Action, Cmdline, ListFormat};
use log::{debug, error, info};
use owo_colors::OwoColorize;

use assemble::{build_image, BuildMode, BuildOptions};
use epoch::BuildEpoch;
use registry::BoardProfile;

fn main() -> Result<()> {
	let cmdline = Cmdline::parse();

	let mut logger = colog::basic_builder();
	if cmdline.debug {
		logger.filter(None, log::LevelFilter::Debug);
	} else {
		logger.filter(None, log::LevelFilter::Info);
	}
	logger.init();
	if cmdline.debug {
		debug!("Debug output enabled.");
	}

	if let Err(e) = try_main(cmdline) {
		let mut buf = String::new();
		error!("Error encountered!\n{}", e);
		let mut indent = 0;
		e.chain().skip(1).for_each(|cause| {
			let prefix = "\t".repeat(indent);
			indent += 1;
			buf += &format!("{0}- Caused by:\n{0}  {1}\n", prefix, cause);
		});
		if !buf.is_empty() {
			error!("{}", buf);
		}
		std::process::exit(1);
	}
	Ok(())
}

fn try_main(cmdline: Cmdline) -> Result<()> {
	match cmdline.action {
		Action::Info { input } => run_info_action(&input),
		Action::Extract { input, dir } => run_extract_action(&input, &dir),
		Action::Convert { input, output } => run_convert_action(&input, &output),
		Action::Build {
			board,
			kernel,
			rootfs,
			output,
			revision,
			jffs2_eof,
			sysupgrade,
		} => run_build_action(&board, &kernel, &rootfs, &output, revision, jffs2_eof, sysupgrade),
		Action::List { format } => run_list_action(format),
	}
}

fn read_regular_file(path: &std::path::Path) -> Result<Vec<u8>> {
	if !path.is_file() {
		anyhow::bail!("Input '{}' does not exist or is not a regular file", path.display());
	}
	fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))
}

fn run_info_action(input: &std::path::Path) -> Result<()> {
	let data = read_regular_file(input)?;
	let info = driver::run_info(&data)?;

	println!("Dialect: {}", info.dialect);
	if let Some(banner) = &info.vendor_banner {
		println!("Vendor banner: {}", banner);
	}
	println!("Embedded partitions:");
	for (name, base, size) in &info.partitions {
		println!("  {:<20} base 0x{:08x} size 0x{:08x}", name, base, size);
	}
	match &info.soft_version {
		Some(metapart::SoftVersion::Text(text)) => println!("soft-version: {}", text.trim_end()),
		Some(metapart::SoftVersion::Numeric { major, minor, patch, year, month, day, revision, compat_level }) => {
			println!(
				"soft-version: {}.{}.{} (build 20{:02x}{:02x}-{:02x}-{:02x}, revision {}{})",
				major,
				minor,
				patch,
				year.0,
				year.1,
				month,
				day,
				revision,
				match compat_level {
					Some(c) => format!(", compat-level {}", c),
					None => String::new(),
				}
			)
		}
		None => {}
	}
	if let Some(support_list) = &info.support_list {
		println!("support-list:\n{}", support_list);
	}
	if let Some(flash) = &info.flash_table {
		println!("Flash partition table:");
		for part in flash {
			println!("  {:<20} base 0x{:08x} size 0x{:08x}", part.name, part.base, part.size);
		}
	}
	Ok(())
}

fn run_extract_action(input: &std::path::Path, dir: &std::path::Path) -> Result<()> {
	if !dir.is_dir() {
		anyhow::bail!("Output directory '{}' does not exist or is not a directory", dir.display());
	}
	let data = read_regular_file(input)?;
	let partitions = driver::run_extract(&data)?;
	for part in &partitions {
		let dest = dir.join(&part.name);
		fs::write(&dest, &part.data).with_context(|| format!("Failed to write '{}'", dest.display()))?;
		info!("Extracted '{}' ({} bytes) to {}", part.name, part.data.len(), dest.display());
	}
	info!("Extracted {} partition(s).", partitions.len());
	Ok(())
}

fn run_convert_action(input: &std::path::Path, output: &std::path::Path) -> Result<()> {
	let data = read_regular_file(input)?;
	let converted = driver::run_convert(&data)?;
	fs::write(output, &converted).with_context(|| format!("Failed to write '{}'", output.display()))?;
	info!("Wrote sysupgrade image ({} bytes) to {}", converted.len(), output.display());
	Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_build_action(
	board_id: &str,
	kernel_path: &std::path::Path,
	rootfs_path: &std::path::Path,
	output: &std::path::Path,
	revision: Option<u32>,
	jffs2_eof: bool,
	sysupgrade: bool,
) -> Result<()> {
	let board = registry::find_or_err(board_id)?;
	let kernel = read_regular_file(kernel_path)?;
	let rootfs = read_regular_file(rootfs_path)?;
	let epoch = BuildEpoch::from_env()?;
	let mode = if sysupgrade { BuildMode::Sysupgrade } else { BuildMode::Factory };

	info!("Building {} image for board '{}' ...", mode_name(mode), board.id);
	let image = build_image(&BuildOptions {
		board,
		kernel: &kernel,
		rootfs: &rootfs,
		mode,
		jffs2_eof,
		revision,
		epoch,
	})?;
	fs::write(output, &image).with_context(|| format!("Failed to write '{}'", output.display()))?;
	info!("Wrote {} bytes to {}", image.len(), output.display());
	Ok(())
}

fn mode_name(mode: BuildMode) -> &'static str {
	match mode {
		BuildMode::Factory => "factory",
		BuildMode::Sysupgrade => "sysupgrade",
	}
}

fn run_list_action(format: ListFormat) -> Result<()> {
	let mut boards: Vec<&BoardProfile> = registry::all().iter().collect();
	boards.sort_by_key(|b| b.id);
	match format {
		ListFormat::Pretty => list_pretty(&boards),
		ListFormat::Simple => list_simple(&boards),
	}
	Ok(())
}

fn list_pretty(boards: &[&BoardProfile]) {
	let idx_width = (boards.len().max(1).ilog10()) as usize + 1;
	println!("{0} {1} Sysupgrade window", " ".repeat(idx_width - 1), format!("{:<24}", "Board ID"));
	println!("{}", "=".repeat(60));
	for (idx, board) in boards.iter().enumerate() {
		println!(
			"{0:>1$} {2:<24} {3} .. {4}",
			(idx + 1).to_string().bright_cyan(),
			idx_width,
			board.id,
			board.first_sysupgrade_partition,
			board.last_sysupgrade_partition,
		);
	}
}

fn list_simple(boards: &[&BoardProfile]) {
	for board in boards {
		println!("{}\t{}\t{}", board.id, board.first_sysupgrade_partition, board.last_sysupgrade_partition);
	}
}
