//! Channel simulation
//!
//! `ChannelSimulator` dispatches response computation and transmission on
//! the configured topology. `ChannelModel` draws the random bit words of a
//! transmission block and pushes them through the simulator.

pub mod fading;
pub mod isi_awgn;
pub mod modulator;
pub mod noise;
pub mod sed;

use ndarray::{concatenate, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{SimConfig, Topology};
use crate::error::{Result, SimError};

pub use isi_awgn::IsiAwgnChannel;
pub use modulator::{Bpsk, Modulator};
pub use noise::NoiseGenerator;
pub use sed::SedChannel;

/// Seeded channel simulator for one topology
pub struct ChannelSimulator {
    topology: Topology,
    noise: NoiseGenerator,
}

impl ChannelSimulator {
    pub fn new(topology: Topology, seed: u64) -> Self {
        Self {
            topology,
            noise: NoiseGenerator::from_seed(1.0, seed),
        }
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Channel response for block `index`
    pub fn calculate_response(&self, fading: bool, index: usize) -> Result<Array2<f64>> {
        match self.topology {
            Topology::Siso { memory_length } => {
                IsiAwgnChannel::calculate_response(memory_length, fading, index)
            }
            Topology::Mimo { n_user, n_ant } => SedChannel::calculate_response(n_ant, n_user, fading, index),
        }
    }

    /// Pass modulated symbols through the channel
    ///
    /// SISO input must carry `memory_length` trailing padding symbols; the
    /// output is that many rows shorter.
    pub fn transmit(&mut self, symbols: &Array2<f64>, h: &Array2<f64>, snr_db: f64) -> Result<Array2<f64>> {
        match self.topology {
            Topology::Siso { memory_length } => {
                IsiAwgnChannel::transmit(symbols, h, snr_db, memory_length, &mut self.noise)
            }
            Topology::Mimo { .. } => SedChannel::transmit(symbols, h, snr_db, &mut self.noise),
        }
    }

    /// Pad, modulate and transmit a bit word so the output has one row per bit row
    pub fn transmit_bits(
        &mut self,
        bits: &Array2<u8>,
        h: &Array2<f64>,
        snr_db: f64,
        modulator: &dyn Modulator,
    ) -> Result<Array2<f64>> {
        let symbols = match self.topology {
            Topology::Siso { memory_length } => {
                let padding = Array2::<u8>::zeros((memory_length, bits.ncols()));
                let padded = concatenate(Axis(0), &[bits.view(), padding.view()])
                    .map_err(|_| SimError::shape("padding streams", bits.ncols(), padding.ncols()))?;
                modulator.modulate(&padded)
            }
            Topology::Mimo { .. } => modulator.modulate(bits),
        };
        self.transmit(&symbols, h, snr_db)
    }
}

/// One simulated transmission block
#[derive(Debug, Clone)]
pub struct Block {
    pub index: usize,
    /// Transmitted bits `[block_len, n_user]`
    pub tx: Array2<u8>,
    /// Received samples `[block_len, n_streams]`
    pub rx: Array2<f64>,
    /// Channel response used for the block
    pub h: Array2<f64>,
}

impl Block {
    /// Split into (pilot, data) row ranges
    pub fn split(&self, pilot_size: usize) -> (Block, Block) {
        let pilot = Block {
            index: self.index,
            tx: self.tx.slice(ndarray::s![..pilot_size, ..]).to_owned(),
            rx: self.rx.slice(ndarray::s![..pilot_size, ..]).to_owned(),
            h: self.h.clone(),
        };
        let data = Block {
            index: self.index,
            tx: self.tx.slice(ndarray::s![pilot_size.., ..]).to_owned(),
            rx: self.rx.slice(ndarray::s![pilot_size.., ..]).to_owned(),
            h: self.h.clone(),
        };
        (pilot, data)
    }
}

/// Random block source over a configured channel
pub struct ChannelModel {
    simulator: ChannelSimulator,
    modulator: Box<dyn Modulator>,
    bit_rng: ChaCha8Rng,
    block_length: usize,
    fading: bool,
}

impl ChannelModel {
    pub fn new(config: &SimConfig) -> Self {
        let mut seed_rng = ChaCha8Rng::seed_from_u64(config.seed);
        let noise_seed: u64 = seed_rng.gen();
        let bit_seed: u64 = seed_rng.gen();

        Self {
            simulator: ChannelSimulator::new(config.topology(), noise_seed),
            modulator: modulator::modulator_for(config.modulation_type),
            bit_rng: ChaCha8Rng::seed_from_u64(bit_seed),
            block_length: config.val_block_length,
            fading: config.fading_in_channel,
        }
    }

    pub fn response(&self, index: usize) -> Result<Array2<f64>> {
        self.simulator.calculate_response(self.fading, index)
    }

    /// Draw uniform random bits and transmit them for block `index`
    pub fn sample_block(&mut self, index: usize, snr_db: f64) -> Result<Block> {
        let n_user = self.simulator.topology().n_user();
        let rng = &mut self.bit_rng;
        let tx = Array2::from_shape_simple_fn((self.block_length, n_user), || u8::from(rng.gen_bool(0.5)));
        let h = self.response(index)?;
        let rx = self
            .simulator
            .transmit_bits(&tx, &h, snr_db, self.modulator.as_ref())?;
        Ok(Block { index, tx, rx, h })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelType;

    fn siso_config() -> SimConfig {
        SimConfig {
            memory_length: 3,
            pilot_size: 20,
            val_block_length: 120,
            fading_in_channel: false,
            seed: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_siso_block_shapes() {
        let mut model = ChannelModel::new(&siso_config());
        let block = model.sample_block(0, 10.0).unwrap();
        assert_eq!(block.tx.dim(), (120, 1));
        assert_eq!(block.rx.dim(), (120, 1));
        assert_eq!(block.h.dim(), (1, 3));

        let (pilot, data) = block.split(20);
        assert_eq!(pilot.rx.nrows(), 20);
        assert_eq!(data.tx.nrows(), 100);
    }

    #[test]
    fn test_mimo_block_shapes() {
        let config = SimConfig {
            channel_type: ChannelType::Mimo,
            n_user: 2,
            n_ant: 3,
            ..siso_config()
        };
        let mut model = ChannelModel::new(&config);
        let block = model.sample_block(2, 10.0).unwrap();
        assert_eq!(block.tx.dim(), (120, 2));
        assert_eq!(block.rx.dim(), (120, 3));
    }

    #[test]
    fn test_same_seed_replays() {
        let mut a = ChannelModel::new(&siso_config());
        let mut b = ChannelModel::new(&siso_config());
        for index in 0..3 {
            let block_a = a.sample_block(index, 8.0).unwrap();
            let block_b = b.sample_block(index, 8.0).unwrap();
            assert_eq!(block_a.tx, block_b.tx);
            assert_eq!(block_a.rx, block_b.rx);
        }
    }

    #[test]
    fn test_noiseless_siso_block_matches_states() {
        let mut model = ChannelModel::new(&siso_config());
        let block = model.sample_block(0, f64::INFINITY).unwrap();
        let h = &block.h;
        // y[t] = h0 s[t+2] + h1 s[t+1] + h2 s[t], with zero bits (s = +1) past the end
        let symbol = |t: usize| {
            if t < block.tx.nrows() {
                1.0 - 2.0 * f64::from(block.tx[[t, 0]])
            } else {
                1.0
            }
        };
        for t in 0..block.rx.nrows() {
            let expected = h[[0, 0]] * symbol(t + 2) + h[[0, 1]] * symbol(t + 1) + h[[0, 2]] * symbol(t);
            assert!((block.rx[[t, 0]] - expected).abs() < 1e-12);
        }
    }
}
