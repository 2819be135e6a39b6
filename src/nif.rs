//! NIF surface for driving detection pipelines from Elixir
//!
//! Pipelines live in a global slab and are addressed by integer handle.
//! Training calls run on dirty CPU schedulers.

use std::str::FromStr;

use rustler::NifStruct;

use crate::config::{AugmenterType, ChannelType, DetectorType, ModulationType, SimConfig};
use crate::error::SimError;
use crate::pipeline::{BlockResult, DetectionPipeline};
use crate::slab::PipelineSlab;

lazy_static::lazy_static! {
    static ref PIPELINES: PipelineSlab<DetectionPipeline> = PipelineSlab::new(64);
}

mod atoms {
    rustler::atoms! {
        ok,
    }
}

/// Pipeline options from Elixir
#[derive(NifStruct, Debug, Clone)]
#[module = "AugmentedSic.Types.PipelineParams"]
pub struct PipelineParams {
    pub channel_type: String,
    pub memory_length: u64,
    pub n_user: u64,
    pub n_ant: u64,
    pub modulation_type: String,
    pub pilot_size: u64,
    pub val_block_length: u64,
    pub blocks_num: u64,
    pub val_snr: f64,
    pub fading_in_channel: bool,
    pub from_scratch_flag: bool,
    pub seed: u64,
    pub detector_type: String,
    pub augmenter_type: String,
    pub aug_factor: u64,
    pub alpha1: f64,
    pub alpha2: f64,
    pub iterations: u64,
    pub epochs: u64,
    pub vnet_epochs: u64,
    pub learning_rate: f64,
    pub parallel_training: bool,
}

impl TryFrom<PipelineParams> for SimConfig {
    type Error = SimError;

    fn try_from(p: PipelineParams) -> Result<Self, Self::Error> {
        Ok(SimConfig {
            channel_type: ChannelType::from_str(&p.channel_type)?,
            memory_length: p.memory_length as usize,
            n_user: p.n_user as usize,
            n_ant: p.n_ant as usize,
            modulation_type: ModulationType::from_str(&p.modulation_type)?,
            pilot_size: p.pilot_size as usize,
            val_block_length: p.val_block_length as usize,
            blocks_num: p.blocks_num as usize,
            val_snr: p.val_snr,
            fading_in_channel: p.fading_in_channel,
            from_scratch_flag: p.from_scratch_flag,
            seed: p.seed,
            detector_type: DetectorType::from_str(&p.detector_type)?,
            augmenter_type: AugmenterType::from_str(&p.augmenter_type)?,
            aug_factor: p.aug_factor as usize,
            alpha1: p.alpha1,
            alpha2: p.alpha2,
            iterations: p.iterations as usize,
            epochs: p.epochs as usize,
            vnet_epochs: p.vnet_epochs as usize,
            learning_rate: p.learning_rate,
            parallel_training: p.parallel_training,
        })
    }
}

/// Per-block score returned to Elixir
#[derive(NifStruct, Debug, Clone, PartialEq)]
#[module = "AugmentedSic.Types.BlockResult"]
pub struct BlockReport {
    pub block_index: u64,
    pub ber: f64,
    pub errors: u64,
    pub data_bits: u64,
}

impl From<BlockResult> for BlockReport {
    fn from(r: BlockResult) -> Self {
        Self {
            block_index: r.block_index as u64,
            ber: r.ber,
            errors: r.errors as u64,
            data_bits: r.data_bits as u64,
        }
    }
}

fn term_error(e: SimError) -> rustler::Error {
    rustler::Error::Term(Box::new(e.to_string()))
}

fn not_found() -> rustler::Error {
    rustler::Error::Term(Box::new("pipeline_not_found"))
}

/// Validates the options, builds a pipeline and returns its handle.
#[rustler::nif]
fn create_pipeline(params: PipelineParams) -> rustler::NifResult<(rustler::Atom, u64)> {
    let config = SimConfig::try_from(params).map_err(term_error)?;
    let pipeline = DetectionPipeline::new(config).map_err(term_error)?;

    match PIPELINES.insert(pipeline) {
        Some(id) => Ok((atoms::ok(), id)),
        None => Err(rustler::Error::Term(Box::new("slab_full"))),
    }
}

/// Runs one block: sample, augment, train, detect, score.
#[rustler::nif(schedule = "DirtyCpu")]
fn run_block(pipeline_id: u64, block_index: u64) -> rustler::NifResult<(rustler::Atom, BlockReport)> {
    let result = PIPELINES
        .with_mut(pipeline_id, |p| p.run_block(block_index as usize))
        .ok_or_else(not_found)?
        .map_err(term_error)?;
    Ok((atoms::ok(), result.into()))
}

/// Runs every configured block; returns the pooled BER and per-block scores.
#[rustler::nif(schedule = "DirtyCpu")]
fn evaluate(pipeline_id: u64) -> rustler::NifResult<(rustler::Atom, f64, Vec<BlockReport>)> {
    let evaluation = PIPELINES
        .with_mut(pipeline_id, |p| p.evaluate())
        .ok_or_else(not_found)?
        .map_err(term_error)?;
    let blocks = evaluation.blocks.into_iter().map(BlockReport::from).collect();
    Ok((atoms::ok(), evaluation.ber, blocks))
}

#[rustler::nif]
fn destroy_pipeline(pipeline_id: u64) -> rustler::NifResult<rustler::Atom> {
    PIPELINES.remove(pipeline_id);
    Ok(atoms::ok())
}

#[rustler::nif]
fn pipeline_count() -> rustler::NifResult<u64> {
    Ok(PIPELINES.count() as u64)
}
