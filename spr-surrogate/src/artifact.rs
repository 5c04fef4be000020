//! Durable storage of a [`Surrogate`] as gzip-compressed JSON.
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::interpolation::NB_AXES;
use crate::{Surrogate, SurrogateError, SurrogateParams};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Artifact {
    version: u32,
    params: SurrogateParams,
    shape: [usize; NB_AXES],
    table: Vec<f64>,
}

impl Surrogate {
    pub fn save(&self, path: &Path, verbosity: u8) -> Result<(), SurrogateError> {
        //! Write the surrogate to `path`, replacing any previous artifact
        //! only once the new one is complete.
        if verbosity > 0 {
            println!("Saving surrogate to {:#?}", path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let artifact = Artifact {
            version: FORMAT_VERSION,
            params: self.params().clone(),
            shape: self.shape(),
            table: self.table().to_vec(),
        };
        let tmp = path.with_extension("part");
        let mut encoder =
            GzEncoder::new(BufWriter::new(File::create(&tmp)?), Compression::default());
        serde_json::to_writer(&mut encoder, &artifact).map_err(io::Error::from)?;
        encoder.finish()?.flush()?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path, verbosity: u8) -> Result<Self, SurrogateError> {
        if verbosity > 0 {
            println!("Loading surrogate from {:#?}", path);
        }
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SurrogateError::NotFound(path.to_path_buf()),
            _ => SurrogateError::Io(e),
        })?;
        let artifact: Artifact = serde_json::from_reader(GzDecoder::new(BufReader::new(file)))
            .map_err(|e| SurrogateError::CorruptArtifact(e.to_string()))?;
        if artifact.version != FORMAT_VERSION {
            return Err(SurrogateError::CorruptArtifact(format!(
                "unsupported format version {}",
                artifact.version
            )));
        }
        if artifact.shape != artifact.params.shape() {
            return Err(SurrogateError::CorruptArtifact(format!(
                "stored shape {:?} does not match the axes {:?}",
                artifact.shape,
                artifact.params.shape()
            )));
        }
        artifact
            .params
            .validate()
            .map_err(|e| SurrogateError::CorruptArtifact(e.to_string()))?;
        let surrogate = Surrogate::from_table(artifact.params, artifact.table)?;
        if verbosity > 1 {
            println!("{:#?}", surrogate.params());
        }
        Ok(surrogate)
    }
}
