//! Feed-forward controller decoded from a genome.

use crate::compute::{Policy, PolicyError};
use crate::schema::{Activation, Genome};

/// Dense feed-forward network with one activation for every layer.
#[derive(Debug, Clone)]
pub struct FeedForwardNetwork {
    genome: Genome,
    activation: Activation,
    /// Scratch buffers reused between calls.
    current: Vec<f32>,
    next: Vec<f32>,
}

impl FeedForwardNetwork {
    /// Build a network from a genome, rejecting inconsistent layouts.
    pub fn new(genome: &Genome, activation: Activation) -> Result<Self, PolicyError> {
        if !genome.is_consistent() {
            return Err(PolicyError::Failed(format!(
                "genome with layers {:?} has {} weights and {} biases",
                genome.layers,
                genome.weights.len(),
                genome.biases.len()
            )));
        }
        let widest = genome.layers.iter().copied().max().unwrap_or(0);
        Ok(Self {
            genome: genome.clone(),
            activation,
            current: Vec::with_capacity(widest),
            next: Vec::with_capacity(widest),
        })
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    /// Forward pass.
    pub fn activate(&mut self, inputs: &[f32]) -> Result<Vec<f32>, PolicyError> {
        let expected = self.genome.num_inputs();
        if inputs.len() != expected {
            return Err(PolicyError::InputArity {
                expected,
                got: inputs.len(),
            });
        }

        self.current.clear();
        self.current.extend_from_slice(inputs);
        let mut weight_offset = 0;
        let mut bias_offset = 0;

        for pair in self.genome.layers.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            self.next.clear();
            for o in 0..fan_out {
                let row = &self.genome.weights[weight_offset + o * fan_in..][..fan_in];
                let sum: f32 = row.iter().zip(&self.current).map(|(w, x)| w * x).sum();
                let z = sum + self.genome.biases[bias_offset + o];
                self.next.push(self.activation.apply(z));
            }
            weight_offset += fan_in * fan_out;
            bias_offset += fan_out;
            std::mem::swap(&mut self.current, &mut self.next);
        }

        Ok(self.current.clone())
    }
}

impl Policy for FeedForwardNetwork {
    fn decide(&mut self, inputs: &[f32]) -> Result<Vec<f32>, PolicyError> {
        self.activate(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_genome_outputs_zero() {
        let genome = Genome::zeros(&[3, 4, 2]);
        let mut net = FeedForwardNetwork::new(&genome, Activation::Tanh).unwrap();
        let out = net.decide(&[1.0, -2.0, 0.5]).unwrap();
        assert_eq!(out, vec![0.0, 0.0]);
    }

    #[test]
    fn test_hand_computed_forward_pass() {
        // 2 inputs -> 1 output: tanh(0.5*1 + -1*2 + 0.25)
        let genome = Genome {
            layers: vec![2, 1],
            weights: vec![0.5, -1.0],
            biases: vec![0.25],
        };
        let mut net = FeedForwardNetwork::new(&genome, Activation::Tanh).unwrap();
        let out = net.activate(&[1.0, 2.0]).unwrap();
        assert!((out[0] - (-1.25f32).tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_weight_layout_row_per_output() {
        // Output 1 reads only input 0.
        let genome = Genome {
            layers: vec![2, 2],
            weights: vec![0.0, 0.0, 1.0, 0.0],
            biases: vec![0.0, 0.0],
        };
        let mut net = FeedForwardNetwork::new(&genome, Activation::Relu).unwrap();
        assert_eq!(net.activate(&[3.0, 7.0]).unwrap(), vec![0.0, 3.0]);
    }

    #[test]
    fn test_input_arity_checked() {
        let genome = Genome::zeros(&[8, 6, 2]);
        let mut net = FeedForwardNetwork::new(&genome, Activation::Tanh).unwrap();
        assert!(matches!(
            net.decide(&[0.0; 5]),
            Err(PolicyError::InputArity { expected: 8, got: 5 })
        ));
    }

    #[test]
    fn test_inconsistent_genome_rejected() {
        let mut genome = Genome::zeros(&[2, 2]);
        genome.biases.clear();
        assert!(FeedForwardNetwork::new(&genome, Activation::Tanh).is_err());
    }
}
