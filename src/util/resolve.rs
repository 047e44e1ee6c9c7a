use crate::util::{
    image::ImageSection,
    map::{PatchRecord, SymbolEntry},
};

/// How a symbol's map section is matched against the image's section layout.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MatchPolicy {
    /// Historical resolution: trimmed name equality and 1-based positional
    /// equality are evaluated independently against every image section, and
    /// each rule hit emits its own record. A symbol can therefore produce
    /// more than one record; duplicates are preserved.
    Legacy,
    /// First section matching by name wins; position is only a fallback when
    /// no name matches. At most one record per symbol.
    NameThenPosition,
}

/// Computes final file offsets by cross-referencing the map's symbol entries
/// against the image's ordered section list. Output keeps symbol encounter
/// order and is never deduplicated.
pub fn resolve_sections(
    symbols: &[SymbolEntry],
    sections: &[ImageSection],
    policy: MatchPolicy,
) -> Vec<PatchRecord> {
    match policy {
        MatchPolicy::Legacy => resolve_legacy(symbols, sections),
        MatchPolicy::NameThenPosition => resolve_name_first(symbols, sections),
    }
}

fn patch_record(symbol: &SymbolEntry, section: &ImageSection) -> PatchRecord {
    PatchRecord {
        name: symbol.name.clone(),
        offset: section.raw_offset + symbol.offset,
        section: section.name.clone(),
    }
}

fn resolve_legacy(symbols: &[SymbolEntry], sections: &[ImageSection]) -> Vec<PatchRecord> {
    let mut records = Vec::new();
    for symbol in symbols {
        for (idx, section) in sections.iter().enumerate() {
            if symbol.section_name.trim() == section.name.trim() {
                records.push(patch_record(symbol, section));
            }
            if symbol.section_index == idx as u64 + 1 {
                records.push(patch_record(symbol, section));
            }
        }
    }
    records
}

fn resolve_name_first(symbols: &[SymbolEntry], sections: &[ImageSection]) -> Vec<PatchRecord> {
    let mut records = Vec::new();
    for symbol in symbols {
        let by_name = sections.iter().find(|s| s.name.trim() == symbol.section_name.trim());
        let by_position = || {
            (symbol.section_index as usize).checked_sub(1).and_then(|idx| sections.get(idx))
        };
        if let Some(section) = by_name.or_else(by_position) {
            records.push(patch_record(symbol, section));
        } else {
            log::warn!("No image section matches symbol '{}'", symbol.name);
        }
    }
    records
}
