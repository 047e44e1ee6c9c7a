use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

/// Banner emitted by GNU ld ahead of the archive-member listing. Its presence
/// on the first content line is what distinguishes the two map dialects.
const GCC_MAP_BANNER: &str = "Archive member included because of file (symbol)";
const GCC_MEMORY_MAP_START: &str = "Linker script and memory map";
const GCC_GROUP_START: &str = "START GROUP";

lazy_static! {
    static ref GCC_IMAGE_BASE: Regex =
        Regex::new("^[0-9a-fA-FxhH]+ +__image_base__ += +([0-9a-fA-FhxH]+)").unwrap();
    static ref GCC_SECTION_LINE: Regex =
        Regex::new(r"^([\w.]+) +([0-9a-fA-Fx]+) +([0-9a-fA-Fx]+)").unwrap();
    static ref GCC_PATCH_SYMBOL: Regex =
        Regex::new(r"^([0-9a-fA-Fx]+) +_+gPcd_BinaryPatch_(\w+)").unwrap();
    static ref SECTION_TABLE_HEADER: Regex = Regex::new("^Start +Length +Name +Class").unwrap();
    static ref SYMBOL_TABLE_HEADER: Regex =
        Regex::new(r"^Address +Publics by Value +Rva\+Base").unwrap();
    static ref ENTRY_POINT_LINE: Regex = Regex::new("^entry point at").unwrap();
    static ref SECTION_LINE: Regex =
        Regex::new(r"^([0-9a-fA-F]+):([0-9a-fA-F]+) +([0-9a-fA-F]+)[Hh]? +([.\w$]+) +(\w+)")
            .unwrap();
    static ref SYMBOL_LINE: Regex =
        Regex::new(r"^([0-9a-fA-F]+):([0-9a-fA-F]+) +([.:\\\w?@$]+) +([0-9a-fA-F]+)").unwrap();
    static ref PATCH_SYMBOL_NAME: Regex = Regex::new(r"^_+gPcd_BinaryPatch_(\w+)").unwrap();
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MapDialect {
    Gcc,
    General,
}

/// Classifies a map file by its first non-empty line. `None` means the file
/// had no content at all.
pub fn detect_dialect(lines: &[String]) -> Option<MapDialect> {
    let first = lines.iter().map(|l| l.trim()).find(|l| !l.is_empty())?;
    if first == GCC_MAP_BANNER {
        Some(MapDialect::Gcc)
    } else {
        Some(MapDialect::General)
    }
}

/// A row of the general dialect's section table, in appearance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub index: u64,
    pub start: u64,
    pub length: u64,
    pub name: String,
    pub class: String,
}

/// A patchable PCD symbol from the general dialect's public-symbol table,
/// already associated with its section-table row. Final file offsets still
/// require resolution against the image's section layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub section_name: String,
    pub offset: u64,
    pub virtual_address: u64,
    pub section_index: u64,
}

/// One row of the output table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    pub name: String,
    pub offset: u64,
    pub section: String,
}

/// Parse result, tagged by dialect. GNU maps record the image base, so their
/// offsets are final; general maps only associate symbols with sections and
/// need a second pass over the image's section layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedMap {
    Gcc(Vec<PatchRecord>),
    General(Vec<SymbolEntry>),
}

/// Parses a map file. `Ok(None)` is the "no result" outcome: an empty file,
/// or a general-dialect map with no patchable PCD symbols.
pub fn parse_map(lines: &[String]) -> Result<Option<ParsedMap>> {
    match detect_dialect(lines) {
        Some(MapDialect::Gcc) => Ok(Some(ParsedMap::Gcc(parse_gcc_map(lines)?))),
        Some(MapDialect::General) => Ok(parse_general_map(lines)?.map(ParsedMap::General)),
        None => Ok(None),
    }
}

fn parse_hex(value: &str) -> Result<u64> {
    let digits = value.trim_end_matches(|c| c == 'h' || c == 'H');
    let digits = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")).unwrap_or(digits);
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex value '{value}'"))
}

enum GccState {
    Start,
    HeaderScan,
    GroupScan,
}

/// Running context for the GNU dialect. The image base and the most recent
/// section definition both have to survive across many unrelated lines.
#[derive(Default)]
struct GccContext {
    image_base: Option<u64>,
    current_section: Option<String>,
}

/// State machine for GNU ld maps. Scans the memory-map region for the
/// `__image_base__` assignment, then walks the START GROUP block tracking the
/// current section and emitting a record per patch symbol, with the address
/// rebased against the image base.
pub fn parse_gcc_map(lines: &[String]) -> Result<Vec<PatchRecord>> {
    let mut state = GccState::Start;
    let mut ctx = GccContext::default();
    let mut records = Vec::new();
    for raw in lines {
        let line = raw.trim();
        match state {
            GccState::Start => {
                if line == GCC_MEMORY_MAP_START {
                    state = GccState::HeaderScan;
                }
            }
            GccState::HeaderScan => {
                if line == GCC_GROUP_START {
                    state = GccState::GroupScan;
                } else if let Some(captures) = GCC_IMAGE_BASE.captures(line) {
                    // First assignment wins.
                    if ctx.image_base.is_none() {
                        ctx.image_base = Some(parse_hex(&captures[1])?);
                    }
                }
            }
            GccState::GroupScan => {
                if let Some(captures) = GCC_SECTION_LINE.captures(line) {
                    ctx.current_section = Some(captures[1].to_string());
                }
                if let Some(captures) = GCC_PATCH_SYMBOL.captures(line) {
                    let Some(base) = ctx.image_base else {
                        bail!("Found patch symbol '{line}' before any __image_base__ assignment");
                    };
                    let address = parse_hex(&captures[1])?;
                    let offset = address.checked_sub(base).with_context(|| {
                        format!("Symbol address {address:#x} is below image base {base:#x}")
                    })?;
                    records.push(PatchRecord {
                        name: captures[2].to_string(),
                        offset,
                        section: ctx.current_section.clone().unwrap_or_default(),
                    });
                }
            }
        }
    }
    Ok(records)
}

enum GeneralState {
    Start,
    SectionTable,
    SymbolTable,
    Trailer,
}

/// State machine for MSFT/ICC/EBC maps: a fixed-column section table followed
/// by a fixed-column public-symbol table, terminated by the entry-point line.
/// Any non-blank line inside either table that fails its grammar aborts the
/// parse; a map without patchable PCD symbols yields `None`.
pub fn parse_general_map(lines: &[String]) -> Result<Option<Vec<SymbolEntry>>> {
    let mut state = GeneralState::Start;
    let mut sections = Vec::<SectionDescriptor>::new();
    let mut symbols = Vec::<SymbolEntry>::new();
    for raw in lines {
        let line = raw.trim();
        if SECTION_TABLE_HEADER.is_match(line) {
            state = GeneralState::SectionTable;
            continue;
        }
        if SYMBOL_TABLE_HEADER.is_match(line) {
            state = GeneralState::SymbolTable;
            continue;
        }
        if ENTRY_POINT_LINE.is_match(line) {
            state = GeneralState::Trailer;
            continue;
        }
        if line.is_empty() {
            continue;
        }
        match state {
            GeneralState::Start | GeneralState::Trailer => {}
            GeneralState::SectionTable => {
                let captures = SECTION_LINE
                    .captures(line)
                    .with_context(|| format!("Failed to parse section table line '{line}'"))?;
                sections.push(SectionDescriptor {
                    index: parse_hex(&captures[1])?,
                    start: parse_hex(&captures[2])?,
                    length: parse_hex(&captures[3])?,
                    name: captures[4].to_string(),
                    class: captures[5].to_string(),
                });
            }
            GeneralState::SymbolTable => {
                let captures = SYMBOL_LINE
                    .captures(line)
                    .with_context(|| format!("Failed to parse symbol table line '{line}'"))?;
                let section_index = parse_hex(&captures[1])?;
                let address = parse_hex(&captures[2])?;
                let virtual_address = parse_hex(&captures[4])?;
                let Some(pcd) = PATCH_SYMBOL_NAME.captures(&captures[3]) else {
                    continue;
                };
                for section in sections.iter().filter(|s| {
                    s.index == section_index && address >= s.start && address < s.start + s.length
                }) {
                    symbols.push(SymbolEntry {
                        name: pcd[1].to_string(),
                        section_name: section.name.clone(),
                        offset: address - section.start,
                        virtual_address,
                        section_index,
                    });
                }
            }
        }
    }
    if symbols.is_empty() {
        log::debug!("No patchable PCD symbols in symbol table");
        Ok(None)
    } else {
        Ok(Some(symbols))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> { text.lines().map(|l| l.to_string()).collect() }

    const GCC_MAP: &str = "\
Archive member included because of file (symbol)

libfoo.a(foo.o)  (FooEntryPoint)

Linker script and memory map

0x0000000000400000 __image_base__ = 0x400000
START GROUP
.text           0x0000000000401000     0x1000
.data           0x0000000000402000      0x200
0x0000000000402010 ___gPcd_BinaryPatch_PcdSerialBaudRate
0x0000000000402018 __gPcd_BinaryPatch_PcdDebugPrintLevel
";

    #[test]
    fn test_detect_dialect() {
        assert_eq!(detect_dialect(&lines(GCC_MAP)), Some(MapDialect::Gcc));
        assert_eq!(detect_dialect(&lines(" Start Length Name Class")), Some(MapDialect::General));
        assert_eq!(detect_dialect(&lines("\n\n  \n")), None);
        assert_eq!(detect_dialect(&[]), None);
    }

    #[test]
    fn test_parse_gcc_map() {
        let Some(ParsedMap::Gcc(records)) = parse_map(&lines(GCC_MAP)).unwrap() else {
            panic!("expected GCC records");
        };
        assert_eq!(records, vec![
            PatchRecord {
                name: "PcdSerialBaudRate".to_string(),
                offset: 0x2010,
                section: ".data".to_string(),
            },
            PatchRecord {
                name: "PcdDebugPrintLevel".to_string(),
                offset: 0x2018,
                section: ".data".to_string(),
            },
        ]);
    }

    #[test]
    fn test_gcc_symbol_before_image_base() {
        let map = "\
Archive member included because of file (symbol)
Linker script and memory map
START GROUP
0x0000000000402010 ___gPcd_BinaryPatch_PcdSerialBaudRate
";
        let result = parse_gcc_map(&lines(map));
        assert!(result.is_err());
        assert!(format!("{:?}", result.unwrap_err()).contains("__image_base__"));
    }

    #[test]
    fn test_gcc_map_without_symbols() {
        let map = "\
Archive member included because of file (symbol)
Linker script and memory map
0x0000000000400000 __image_base__ = 0x400000
START GROUP
.data           0x0000000000402000      0x200
";
        // A GNU map with no patch symbols still yields a (header-only) table.
        assert_eq!(parse_map(&lines(map)).unwrap(), Some(ParsedMap::Gcc(vec![])));
    }

    const GENERAL_MAP: &str = "\
 module.dll

 Start         Length     Name                   Class
 0001:00001000 00000100H .data                   DATA

  Address         Publics by Value              Rva+Base               Lib:Object
 0001:00001050       _gPcd_BinaryPatch_Foo      0000000000001050     module.obj

 entry point at        0001:00000000
";

    #[test]
    fn test_parse_general_map() {
        let Some(ParsedMap::General(symbols)) = parse_map(&lines(GENERAL_MAP)).unwrap() else {
            panic!("expected general-dialect symbols");
        };
        assert_eq!(symbols, vec![SymbolEntry {
            name: "Foo".to_string(),
            section_name: ".data".to_string(),
            offset: 0x50,
            virtual_address: 0x1050,
            section_index: 1,
        }]);
    }

    #[test]
    fn test_general_symbol_outside_section_range() {
        let map = "\
 Start         Length     Name                   Class
 0001:00001000 00000100H .data                   DATA

  Address         Publics by Value              Rva+Base               Lib:Object
 0001:00002000       _gPcd_BinaryPatch_Foo      0000000000002000     module.obj
";
        // The symbol's address falls outside every section range, so no entry
        // is recorded and the parse reports no data.
        assert_eq!(parse_general_map(&lines(map)).unwrap(), None);
    }

    #[test]
    fn test_general_map_without_patch_symbols() {
        let map = "\
 Start         Length     Name                   Class
 0001:00000000 00000886H .text                   CODE

  Address         Publics by Value              Rva+Base               Lib:Object
 0001:00000000       _ModuleEntryPoint          0000000000401000     entry.obj
";
        assert_eq!(parse_map(&lines(map)).unwrap(), None);
    }

    #[test]
    fn test_general_malformed_section_line() {
        let map = "\
 Start         Length     Name                   Class
 not a section line
";
        let result = parse_general_map(&lines(map));
        assert!(result.is_err());
        assert!(format!("{:?}", result.unwrap_err()).contains("not a section line"));
    }

    #[test]
    fn test_general_malformed_symbol_line() {
        let map = "\
 Start         Length     Name                   Class
 0001:00000000 00000886H .text                   CODE

  Address         Publics by Value              Rva+Base               Lib:Object
 garbage
";
        assert!(parse_general_map(&lines(map)).is_err());
    }

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(parse_hex("0x400000").unwrap(), 0x400000);
        assert_eq!(parse_hex("00001000").unwrap(), 0x1000);
        assert_eq!(parse_hex("100H").unwrap(), 0x100);
        assert!(parse_hex("zz").is_err());
    }
}
