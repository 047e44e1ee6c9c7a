use std::{
    fs::{DirBuilder, File},
    io,
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

use anyhow::{Context, Result};

/// Creates a buffered writer around a file, creating parent directories as
/// needed.
pub fn buf_writer<P>(path: P) -> Result<BufWriter<File>>
where P: AsRef<Path> {
    if let Some(parent) = path.as_ref().parent() {
        DirBuilder::new().recursive(true).create(parent)?;
    }
    let file = File::create(&path)
        .with_context(|| format!("Failed to create file '{}'", path.as_ref().display()))?;
    Ok(BufWriter::new(file))
}

/// Reads an entire text file into memory as a line vector. Parsing never
/// streams; the whole map is read up front.
pub fn read_lines<P>(path: P) -> io::Result<Vec<String>>
where P: AsRef<Path> {
    let file = File::open(path)?;
    BufReader::new(file).lines().collect()
}
