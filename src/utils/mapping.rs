// src/utils/mapping.rs: Per-sample input/output file mapping

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::defs::PipelineError;
use crate::config::{RunConfig, Sample};
use crate::utils::file::{append_to_path, dot_extension};


/// Input and output paths for one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePaths<T> {
    pub label: String,
    pub input: PathBuf,
    pub output: T,
}


/// Lazily maps every configured sample's fastq to one output path
/// `<output dir>/<label>/<label>.<ext>`.
///
/// The sample's output directory is created (with parents) as each item is
/// produced. Samples come out in configuration order; each call starts a
/// fresh sequence.
///
/// # Arguments
///
/// * `config` - Run configuration; needs `samples` and `output dir`.
/// * `ext` - Extension with or without its leading dot.
///
/// # Returns
/// Iterator of per-sample paths, or MissingConfig if a required key is absent.
pub fn fastq_to_file<'a>(
    config: &'a RunConfig,
    ext: &str,
) -> Result<impl Iterator<Item = Result<SamplePaths<PathBuf>, PipelineError>> + 'a, PipelineError> {
    let samples = config.samples()?;
    let output_dir = config.output_dir()?;
    let ext = dot_extension(ext);

    Ok(samples.iter().map(move |sample| -> Result<SamplePaths<PathBuf>, PipelineError> {
        let stub = sample_stub(output_dir, sample)?;
        Ok(SamplePaths {
            label: sample.label.clone(),
            input: sample.fastq.clone(),
            output: append_to_path(&stub, &ext),
        })
    }))
}


/// Like `fastq_to_file`, but yields one output path per requested extension,
/// in the order requested.
pub fn fastq_to_files<'a>(
    config: &'a RunConfig,
    exts: &[&str],
) -> Result<impl Iterator<Item = Result<SamplePaths<Vec<PathBuf>>, PipelineError>> + 'a, PipelineError> {
    let samples = config.samples()?;
    let output_dir = config.output_dir()?;
    let exts: Vec<String> = exts.iter().map(|ext| dot_extension(ext)).collect();

    Ok(samples.iter().map(move |sample| -> Result<SamplePaths<Vec<PathBuf>>, PipelineError> {
        let stub = sample_stub(output_dir, sample)?;
        Ok(SamplePaths {
            label: sample.label.clone(),
            input: sample.fastq.clone(),
            output: exts.iter().map(|ext| append_to_path(&stub, ext)).collect(),
        })
    }))
}


fn sample_stub(output_dir: &Path, sample: &Sample) -> Result<PathBuf, PipelineError> {
    let outdir = output_dir.join(&sample.label);
    fs::create_dir_all(&outdir).map_err(|e| {
        PipelineError::IOError(format!("Failed to create output directory {}: {}", outdir.display(), e))
    })?;
    Ok(outdir.join(&sample.label))
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_for(out: &Path, labels: &[&str]) -> RunConfig {
        RunConfig {
            samples: Some(
                labels
                    .iter()
                    .map(|label| Sample {
                        label: label.to_string(),
                        fastq: PathBuf::from(format!("reads/{}.fastq", label)),
                    })
                    .collect(),
            ),
            output_dir: Some(out.to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_one_pair_per_sample_in_order() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path(), &["s1", "s2", "s3"]);

        let pairs: Vec<_> = fastq_to_file(&config, "sam")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(pairs.len(), 3);
        for (pair, label) in pairs.iter().zip(["s1", "s2", "s3"]) {
            assert_eq!(pair.label, label);
            assert_eq!(pair.input, PathBuf::from(format!("reads/{}.fastq", label)));
            assert_eq!(pair.output, dir.path().join(label).join(format!("{}.sam", label)));
            assert!(dir.path().join(label).is_dir());
        }
    }

    #[test]
    fn test_dot_prefix_is_optional() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path(), &["s1"]);

        let bare: Vec<_> = fastq_to_file(&config, "sam").unwrap().map(|p| p.unwrap().output).collect();
        let dotted: Vec<_> = fastq_to_file(&config, ".sam").unwrap().map(|p| p.unwrap().output).collect();
        assert_eq!(bare, dotted);
    }

    #[test]
    fn test_directory_creation_is_idempotent() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path(), &["s1"]);

        for _ in 0..2 {
            let pairs: Vec<_> = fastq_to_file(&config, "counts").unwrap().collect();
            assert_eq!(pairs.len(), 1);
            assert!(pairs[0].is_ok());
        }
        assert!(dir.path().join("s1").is_dir());
    }

    #[test]
    fn test_multiple_extensions() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path(), &["s1"]);

        let pairs: Vec<_> = fastq_to_files(&config, &["clipped.fastq", ".sam"])
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let stub = dir.path().join("s1").join("s1");
        assert_eq!(
            pairs[0].output,
            vec![append_to_path(&stub, ".clipped.fastq"), append_to_path(&stub, ".sam")]
        );
    }

    #[test]
    fn test_lazy_until_iterated() {
        let dir = tempdir().unwrap();
        let config = config_for(dir.path(), &["lazy"]);

        let iter = fastq_to_file(&config, "sam").unwrap();
        assert!(!dir.path().join("lazy").exists());
        let _ = iter.count();
        assert!(dir.path().join("lazy").exists());
    }

    #[test]
    fn test_missing_output_dir_is_config_error() {
        let config = RunConfig {
            samples: Some(vec![]),
            ..Default::default()
        };
        assert!(matches!(fastq_to_file(&config, "sam"), Err(PipelineError::MissingConfig(_))));
    }
}
