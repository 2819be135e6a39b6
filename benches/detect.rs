//! Detector training and inference benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use augmented_sic::*;

fn mimo_config() -> SimConfig {
    SimConfig {
        channel_type: ChannelType::Mimo,
        n_user: 4,
        n_ant: 4,
        fading_in_channel: false,
        epochs: 50,
        ..Default::default()
    }
}

fn benchmark_deepsic_training(c: &mut Criterion) {
    let config = mimo_config();
    let mut model = ChannelModel::new(&config);
    let block = model.sample_block(0, config.val_snr).unwrap();
    let (pilot, _) = block.split(config.pilot_size);
    let words = [TrainingWord::new(pilot.tx, pilot.rx)];
    let mut detector = DeepSicTrainer::new(&config, 0);

    c.bench_function("deepsic_online_training_4x4_50_epochs", |b| {
        b.iter(|| detector.online_training(black_box(&words)).unwrap())
    });
}

fn benchmark_deepsic_forward(c: &mut Criterion) {
    let config = mimo_config();
    let mut model = ChannelModel::new(&config);
    let block = model.sample_block(0, config.val_snr).unwrap();
    let detector = DeepSicTrainer::new(&config, 0);

    c.bench_function("deepsic_forward_5050x4", |b| {
        b.iter(|| black_box(detector.forward(&block.rx).unwrap()))
    });
}

fn benchmark_viterbinet_forward(c: &mut Criterion) {
    let config = SimConfig {
        detector_type: DetectorType::ViterbiNet,
        fading_in_channel: false,
        ..Default::default()
    };
    let mut model = ChannelModel::new(&config);
    let block = model.sample_block(0, config.val_snr).unwrap();
    let detector = ViterbiNetTrainer::new(&config, 0).unwrap();

    c.bench_function("viterbinet_forward_5050_memory_4", |b| {
        b.iter(|| black_box(detector.forward(&block.rx).unwrap()))
    });
}

criterion_group!(benches, benchmark_deepsic_training, benchmark_deepsic_forward, benchmark_viterbinet_forward);
criterion_main!(benches);
