use anyhow::{Context, Result};
use human_data::{
    config::{Config, DataSplit},
    dataset::Sample,
    DatasetError, HumanDataset,
};
use log::{info, warn};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use std::{env, path::PathBuf, sync::Arc};
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
/// Load a HumanData dataset and inspect its samples
struct Args {
    #[structopt(long, default_value = "human-data.json5")]
    /// configuration file
    pub config_file: PathBuf,
    #[structopt(long, default_value = "4")]
    /// number of samples to fetch
    pub num_samples: usize,
    #[structopt(long, default_value = "0")]
    /// seed of the augmentation randomness
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize)]
struct SampleSummary {
    index: usize,
    image_path: PathBuf,
    input_shape: [usize; 3],
    do_flip: bool,
    rot: f32,
    num_valid_joints: Option<usize>,
    num_inside_joints: Option<usize>,
    hand_face_valid: Option<[bool; 3]>,
}

impl SampleSummary {
    fn new(index: usize, image_path: PathBuf, sample: &Sample) -> Self {
        let Sample {
            inputs,
            meta_info,
            state,
            ..
        } = sample;
        let count = |flags: &ndarray::Array1<f32>| flags.iter().filter(|&&flag| flag > 0.0).count();
        let (channels, height, width) = inputs.image.dim();

        Self {
            index,
            image_path,
            input_shape: [channels, height, width],
            do_flip: state.do_flip,
            rot: state.rot,
            num_valid_joints: meta_info.as_ref().map(|meta| count(&meta.joint_valid)),
            num_inside_joints: meta_info.as_ref().map(|meta| count(&meta.joint_trunc)),
            hand_face_valid: meta_info.as_ref().map(|meta| {
                [
                    meta.lhand_bbox_valid > 0.0,
                    meta.rhand_bbox_valid > 0.0,
                    meta.face_bbox_valid > 0.0,
                ]
            }),
        }
    }
}

pub fn main() -> Result<()> {
    // setup logging, default to info level
    pretty_env_logger::formatted_builder()
        .parse_filters(&env::var("RUST_LOG").unwrap_or_else(|_| "info".into()))
        .init();

    // parse arguments
    let Args {
        config_file,
        num_samples,
        seed,
    } = Args::from_args();
    let config = Arc::new(
        Config::open(&config_file)
            .with_context(|| format!("failed to load config file '{}'", config_file.display()))?,
    );

    // prefer the training split
    let split = [DataSplit::Train, DataSplit::Test]
        .into_iter()
        .find(|split| config.dataset.splits.contains(split))
        .context("no split is configured")?;
    let dataset = HumanDataset::load(config, split)?;
    info!(
        "{} split: {} samples from {} rows, {} dropped",
        split,
        dataset.len(),
        dataset.num_rows(),
        dataset.num_dropped()
    );

    let num_samples = num_samples.min(dataset.len());
    let summaries: Vec<_> = (0..num_samples)
        .into_par_iter()
        .map(|index| -> Result<_> {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
            let image_path = dataset.record(index)?.image_path.clone();

            match dataset.get(index, &mut rng) {
                Ok(sample) => Ok(Some(SampleSummary::new(index, image_path, &sample))),
                Err(err) => match err.downcast_ref::<DatasetError>() {
                    Some(DatasetError::MissingImage { .. } | DatasetError::MalformedSample { .. }) => {
                        warn!("skip sample {}: {:#}", index, err);
                        Ok(None)
                    }
                    _ => Err(err),
                },
            }
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    summaries.iter().try_for_each(|summary| -> Result<_> {
        println!("{}", serde_json::to_string(summary)?);
        Ok(())
    })?;

    Ok(())
}
