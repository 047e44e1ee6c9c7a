use std::path::{Path, PathBuf};

use anyhow::Result;
use argp::FromArgs;

pub mod argp_version;
pub mod util;

use crate::util::{
    file::read_lines,
    image::read_image_sections,
    map::{parse_map, ParsedMap, PatchRecord},
    resolve::{resolve_sections, MatchPolicy},
    table::write_table_file,
};

/// Extension of the output table when no explicit path is given.
const TABLE_EXTENSION: &str = "BinaryPcdTable.txt";

#[derive(FromArgs, PartialEq, Debug)]
/// Recovers the file offsets of patchable PCDs from a linker map file and the
/// built executable image, and writes them out as a fixed-width text table.
struct TopLevel {
    #[argp(positional)]
    /// path to the linker map file
    map_file: PathBuf,
    #[argp(positional)]
    /// path to the built executable image
    image_file: PathBuf,
    #[argp(positional)]
    /// path to the output table (default: map file with .BinaryPcdTable.txt)
    output: Option<PathBuf>,
    #[argp(switch)]
    /// resolve sections by name first and position only as a fallback
    strict_match: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: TopLevel = argp_version::from_env();
    if let Err(e) = run(args) {
        eprintln!("Failed: {e:?}");
        std::process::exit(1);
    }
}

fn run(args: TopLevel) -> Result<()> {
    if !args.map_file.exists() || !args.image_file.exists() {
        println!("Failed to generate patch PCD table: map file or image file not found");
        return Ok(());
    }
    let policy =
        if args.strict_match { MatchPolicy::NameThenPosition } else { MatchPolicy::Legacy };
    let Some(records) = recover_records(&args.map_file, &args.image_file, policy)? else {
        println!("Failed to generate patch PCD table from map file and image file");
        return Ok(());
    };
    let out_path = args.output.unwrap_or_else(|| args.map_file.with_extension(TABLE_EXTENSION));
    write_table_file(out_path, &records)
}

/// Runs the map parse and, for the general dialect, the section resolution
/// pass against the image's section layout. `Ok(None)` is the "no result"
/// outcome: nothing to write, but not an error.
fn recover_records(
    map_file: &Path,
    image_file: &Path,
    policy: MatchPolicy,
) -> Result<Option<Vec<PatchRecord>>> {
    let lines = match read_lines(map_file) {
        Ok(lines) => lines,
        Err(e) => {
            log::warn!("Failed to read map file '{}': {}", map_file.display(), e);
            return Ok(None);
        }
    };
    let Some(parsed) = parse_map(&lines)? else {
        return Ok(None);
    };
    match parsed {
        ParsedMap::Gcc(records) => Ok(Some(records)),
        ParsedMap::General(symbols) => {
            let sections = match read_image_sections(image_file) {
                Ok(sections) => sections,
                Err(e) => {
                    log::warn!(
                        "Failed to read sections from '{}': {:#}",
                        image_file.display(),
                        e
                    );
                    return Ok(None);
                }
            };
            if sections.is_empty() {
                return Ok(None);
            }
            Ok(Some(resolve_sections(&symbols, &sections, policy)))
        }
    }
}
