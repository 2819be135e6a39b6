//! End-to-end detection scenarios

use ndarray::s;

use super::{bit_errors, DetectionPipeline};
use crate::channel::ChannelModel;
use crate::config::{AugmenterType, ChannelType, DetectorType, SimConfig};
use crate::detectors::{DeepSicTrainer, Detector, TrainingWord};

fn siso_static() -> SimConfig {
    SimConfig {
        channel_type: ChannelType::Siso,
        memory_length: 2,
        pilot_size: 50,
        val_block_length: 1050,
        blocks_num: 1,
        val_snr: 10.0,
        fading_in_channel: false,
        seed: 11,
        ..Default::default()
    }
}

fn mimo_fading() -> SimConfig {
    SimConfig {
        channel_type: ChannelType::Mimo,
        n_user: 2,
        n_ant: 2,
        pilot_size: 50,
        val_block_length: 250,
        blocks_num: 3,
        fading_in_channel: true,
        iterations: 3,
        epochs: 50,
        seed: 5,
        ..Default::default()
    }
}

#[test]
fn trained_detector_beats_untrained_on_static_isi() {
    let config = siso_static();

    let mut pipeline = DetectionPipeline::new(config.clone()).unwrap();
    let trained = pipeline.run_block(0).unwrap();
    assert_eq!(trained.data_bits, 1000);

    // Same seed, same block
    let mut model = ChannelModel::new(&config);
    let block = model.sample_block(0, config.val_snr).unwrap();
    let untrained = DeepSicTrainer::new(&config, 3);
    let detected = untrained.forward(&block.rx).unwrap();
    let (untrained_errors, _) = bit_errors(
        &detected.slice(s![config.pilot_size.., ..]).to_owned(),
        &block.tx.slice(s![config.pilot_size.., ..]).to_owned(),
    )
    .unwrap();

    assert!(
        trained.errors < untrained_errors,
        "trained {} errors vs untrained {}",
        trained.errors,
        untrained_errors
    );
    assert!(trained.ber < 0.3, "trained BER {}", trained.ber);
}

#[test]
fn fading_channel_reuses_grid_across_blocks() {
    let config = mimo_fading();
    let mut model = ChannelModel::new(&config);
    let mut trainer = DeepSicTrainer::new(&config, 8);

    let mut previous = None;
    for index in 0..3 {
        let block = model.sample_block(index, config.val_snr).unwrap();
        let (pilot, _) = block.split(config.pilot_size);

        let before = trainer.grid().clone();
        trainer.prepare_grid();
        assert_eq!(trainer.grid(), &before, "grid reallocated at block {}", index);
        if let Some(prev) = &previous {
            assert_eq!(&before, prev);
        }

        trainer.online_training(&[TrainingWord::new(pilot.tx, pilot.rx)]).unwrap();
        assert_ne!(trainer.grid(), &before, "block {} did not fine-tune", index);
        previous = Some(trainer.grid().clone());
    }
}

#[test]
fn pipeline_parameters_persist_only_when_fading() {
    let frozen = |fading: bool| SimConfig {
        epochs: 0,
        fading_in_channel: fading,
        augmenter_type: AugmenterType::None,
        ..mimo_fading()
    };

    let mut fading = DetectionPipeline::new(frozen(true)).unwrap();
    let initial = fading.detector().parameter_snapshot();
    for index in 0..3 {
        fading.run_block(index).unwrap();
        assert_eq!(fading.detector().parameter_snapshot(), initial);
    }

    let mut static_channel = DetectionPipeline::new(frozen(false)).unwrap();
    let initial = static_channel.detector().parameter_snapshot();
    static_channel.run_block(0).unwrap();
    let after_first = static_channel.detector().parameter_snapshot();
    static_channel.run_block(1).unwrap();
    assert_ne!(after_first, initial);
    assert_ne!(static_channel.detector().parameter_snapshot(), after_first);
}

#[test]
fn detection_starts_from_uniform_priors_every_block() {
    let config = mimo_fading();
    let mut model = ChannelModel::new(&config);
    let mut trainer = DeepSicTrainer::new(&config, 21);

    let block0 = model.sample_block(0, config.val_snr).unwrap();
    let block1 = model.sample_block(1, config.val_snr).unwrap();
    let (pilot, _) = block0.split(config.pilot_size);
    trainer.online_training(&[TrainingWord::new(pilot.tx, pilot.rx)]).unwrap();

    let alone = trainer.soft_forward(&block1.rx).unwrap();
    trainer.soft_forward(&block0.rx).unwrap();
    let after_other_block = trainer.soft_forward(&block1.rx).unwrap();
    assert_eq!(alone, after_other_block);
}

#[test]
fn mimo_fading_detection_is_reasonable() {
    let config = SimConfig {
        epochs: 250,
        ..mimo_fading()
    };
    let mut pipeline = DetectionPipeline::new(config).unwrap();
    let evaluation = pipeline.evaluate().unwrap();
    assert_eq!(evaluation.blocks.len(), 3);
    assert!(evaluation.ber < 0.25, "pooled BER {}", evaluation.ber);
}

#[test]
fn viterbinet_detects_static_isi_at_high_snr() {
    let config = SimConfig {
        channel_type: ChannelType::Siso,
        memory_length: 2,
        pilot_size: 200,
        val_block_length: 1200,
        blocks_num: 1,
        val_snr: 20.0,
        fading_in_channel: false,
        detector_type: DetectorType::ViterbiNet,
        augmenter_type: AugmenterType::Adaptive,
        seed: 3,
        ..Default::default()
    };
    let mut pipeline = DetectionPipeline::new(config).unwrap();
    let result = pipeline.run_block(0).unwrap();
    assert_eq!(result.data_bits, 1000);
    assert!(result.ber < 0.02, "ViterbiNet BER {}", result.ber);
}
