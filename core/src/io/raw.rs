//! Headerless little-endian `f32` volumes, x varying fastest.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use ndarray::ArrayD;

pub fn write(data: impl Iterator<Item = f32>, path: &Path) -> std::io::Result<()> {
    let mut buf = BufWriter::new(File::create(path)?);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}

type IORes<T> = std::io::Result<T>;

pub fn read(path: &Path) -> IORes<impl Iterator<Item = IORes<f32>>> {
    let mut buf = BufReader::new(File::open(path)?);
    let mut buffer = [0; 4];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f32::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Writes `data` in NIfTI voxel order, i.e. the first axis varies fastest.
pub fn write_array(data: &ArrayD<f64>, path: &Path) -> IORes<()> {
    write(data.t().iter().map(|&v| v as f32), path)
}
