use crate::error::DecompressError;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Streams the gzip file at `source` into `target`, creating the target's
/// parent directories. Returns the decompressed byte count.
pub fn gunzip(source: &Path, target: &Path) -> Result<u64, DecompressError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| DecompressError::Io { path, source }
    };

    let reader = File::open(source).map_err(io_err(source))?;
    let mut archive = MultiGzDecoder::new(BufReader::new(reader));

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let mut writer = BufWriter::new(File::create(target).map_err(io_err(target))?);

    let n = io::copy(&mut archive, &mut writer).map_err(|e| classify(source, target, e))?;
    writer.flush().map_err(io_err(target))?;

    info!("copied {} bytes to {}", n, target.display());
    Ok(n)
}

// flate2 reports bad headers and bad deflate data as InvalidInput/InvalidData.
fn classify(source: &Path, target: &Path, err: io::Error) -> DecompressError {
    match err.kind() {
        io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
            DecompressError::CorruptStream {
                path: source.to_path_buf(),
                source: err,
            }
        }
        _ => DecompressError::Io {
            path: target.to_path_buf(),
            source: err,
        },
    }
}
