use crate::prelude::{StageError, StageResult};
use crate::volume::{Geometry, Volume};
use log::debug;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// Axis carrying echoes in a 4-D acquisition.
pub const ECHO_AXIS: usize = 3;

fn conversion_failure(path: &Path, detail: impl std::fmt::Display) -> StageError {
    StageError::ConversionFailure(format!("{}: {}", path.display(), detail))
}

/// Reads a `.nii` or `.nii.gz` file.
///
/// Three or fewer dimensions give an echo-free volume; a fourth dimension is
/// taken to be the echo axis.
pub fn read_volume(path: &Path) -> StageResult<Volume> {
    let object = ReaderOptions::new()
        .read_file(path)
        .map_err(|err| conversion_failure(path, err))?;
    let geometry = geometry_from_header(object.header());
    let data = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|err| conversion_failure(path, err))?;
    debug!("read {} with shape {:?}", path.display(), data.shape());

    match data.ndim() {
        1..=3 => Ok(Volume::new(data, geometry)),
        4 => Volume::with_echo_axis(data, geometry, ECHO_AXIS),
        n => Err(conversion_failure(
            path,
            format!("unsupported {}-dimensional image", n),
        )),
    }
}

/// Writes `volume` as single-precision NIfTI; a `.gz` suffix compresses it.
pub fn write_volume(volume: &Volume, path: &Path) -> StageResult<()> {
    let header = header_from_geometry(volume.geometry());
    let data = volume.data().mapv(|v| v as f32);
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&data)
        .map_err(|err| match err {
            nifti::NiftiError::Io(io) => StageError::Io(io),
            other => StageError::Internal(format!("writing {}: {}", path.display(), other)),
        })?;
    debug!("wrote {} with shape {:?}", path.display(), data.shape());
    Ok(())
}

fn geometry_from_header(header: &NiftiHeader) -> Geometry {
    let pixdim = header.pixdim;
    let voxel_size = [1, 2, 3].map(|i| {
        let size = f64::from(pixdim[i]).abs();
        if size > 0.0 {
            size
        } else {
            1.0
        }
    });
    let sform = (header.sform_code > 0).then(|| {
        [header.srow_x, header.srow_y, header.srow_z].map(|row| row.map(f64::from))
    });
    Geometry { voxel_size, sform }
}

fn header_from_geometry(geometry: &Geometry) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    for (i, size) in geometry.voxel_size.iter().enumerate() {
        header.pixdim[i + 1] = *size as f32;
    }
    match geometry.sform {
        Some([x, y, z]) => {
            header.sform_code = 1;
            header.srow_x = x.map(|v| v as f32);
            header.srow_y = y.map(|v| v as f32);
            header.srow_z = z.map(|v| v as f32);
        }
        None => header.sform_code = 0,
    }
    header
}
