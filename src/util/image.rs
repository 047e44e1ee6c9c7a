use std::{fs, path::Path};

use anyhow::{Context, Result};
use object::{Object, ObjectSection};

/// A section of the built image as exposed by the image reader: its name and
/// the file offset of its raw data. List order is header order, which the
/// resolver's positional match rule depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSection {
    pub name: String,
    pub raw_offset: u64,
}

/// Reads the ordered section list from an executable image. Sections without
/// raw data in the file (uninitialized data) report offset 0.
pub fn read_image_sections<P>(path: P) -> Result<Vec<ImageSection>>
where P: AsRef<Path> {
    let path = path.as_ref();
    let data = fs::read(path)
        .with_context(|| format!("Failed to read image file '{}'", path.display()))?;
    let file = object::File::parse(data.as_slice())
        .with_context(|| format!("Failed to parse image file '{}'", path.display()))?;
    let mut sections = Vec::new();
    for section in file.sections() {
        let name = section.name().unwrap_or("").to_string();
        let raw_offset = section.file_range().map_or(0, |(offset, _)| offset);
        sections.push(ImageSection { name, raw_offset });
    }
    Ok(sections)
}
