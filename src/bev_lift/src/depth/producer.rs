//! Depth-weight producers: turn the depth head output into per-bin weights.
//!
//! The external feature network emits one packed tensor per camera image,
//! `(B*N, channels, H, W)`. Each producer knows its channel layout:
//!
//! | Producer         | Layout                                  | Weights                      |
//! |------------------|-----------------------------------------|------------------------------|
//! | [`SoftmaxDepth`]  | `D` depth logits, `C` context           | softmax over the `D` logits  |
//! | [`GaussianDepth`] | mean logit, log-variance, `C` context   | discretized Gaussian over `D` |

use ndarray::{s, Array3, Array4, ArrayView4, Axis};
use rayon::prelude::*;

use super::gaussian::{depth_distribution_from_gaussian, LOGVAR_FLOOR};
use crate::error::{LiftError, Result};

/// Depth weights and context features for one forward pass.
#[derive(Debug, Clone)]
pub struct DepthWeights {
    /// `(B*N, D, H, W)`.
    pub weights: Array4<f32>,
    /// `(B*N, C, H, W)`.
    pub context: Array4<f32>,
    /// Present for Gaussian producers.
    pub uncertainty: Option<DepthUncertainty>,
}

/// Per-pixel Gaussian parameters, both `(B*N, H, W)`.
#[derive(Debug, Clone)]
pub struct DepthUncertainty {
    /// Sigmoid of the mean logit, in `(0, 1)`.
    pub mean: Array3<f32>,
    /// Log-variance clamped to at least -10.
    pub logvar: Array3<f32>,
}

/// Strategy that converts a packed depth head into pooling weights.
pub trait DepthWeightProducer: Send + Sync + std::fmt::Debug {
    /// Number of channels expected in the head tensor.
    fn head_channels(&self) -> usize;

    /// Number of depth bins `D` produced.
    fn num_bins(&self) -> usize;

    fn produce(&self, head: ArrayView4<'_, f32>) -> Result<DepthWeights>;
}

fn check_head(head: &ArrayView4<'_, f32>, expected: usize) -> Result<()> {
    let shape = head.shape();
    if shape[1] != expected {
        return Err(LiftError::ShapeMismatch {
            what: "depth head",
            expected: vec![shape[0], expected, shape[2], shape[3]],
            found: shape.to_vec(),
        });
    }
    Ok(())
}

/// Softmax over `D` depth logits (plain lift-splat).
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxDepth {
    pub num_bins: usize,
    pub context_channels: usize,
}

impl DepthWeightProducer for SoftmaxDepth {
    fn head_channels(&self) -> usize {
        self.num_bins + self.context_channels
    }

    fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn produce(&self, head: ArrayView4<'_, f32>) -> Result<DepthWeights> {
        check_head(&head, self.head_channels())?;
        let d = self.num_bins;
        let mut weights = head.slice(s![.., ..d, .., ..]).to_owned();
        weights
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .for_each(|mut logits| {
                for mut lane in logits.lanes_mut(Axis(0)) {
                    let peak = lane.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    lane.mapv_inplace(|v| (v - peak).exp());
                    let total = lane.sum();
                    lane.mapv_inplace(|v| v / total);
                }
            });
        Ok(DepthWeights {
            weights,
            context: head.slice(s![.., d.., .., ..]).to_owned(),
            uncertainty: None,
        })
    }
}

/// Discretized Gaussian from a predicted mean and log-variance.
#[derive(Debug, Clone, Copy)]
pub struct GaussianDepth {
    pub num_bins: usize,
    pub context_channels: usize,
}

impl DepthWeightProducer for GaussianDepth {
    fn head_channels(&self) -> usize {
        2 + self.context_channels
    }

    fn num_bins(&self) -> usize {
        self.num_bins
    }

    fn produce(&self, head: ArrayView4<'_, f32>) -> Result<DepthWeights> {
        check_head(&head, self.head_channels())?;
        let mean = head
            .index_axis(Axis(1), 0)
            .mapv(|v| 1.0 / (1.0 + (-v).exp()));
        let logvar = head.index_axis(Axis(1), 1).mapv(|v| v.max(LOGVAR_FLOOR));
        let weights = depth_distribution_from_gaussian(mean.view(), logvar.view(), self.num_bins)?;
        Ok(DepthWeights {
            weights,
            context: head.slice(s![.., 2.., .., ..]).to_owned(),
            uncertainty: Some(DepthUncertainty { mean, logvar }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array4;

    #[test]
    fn test_softmax_layout() {
        let producer = SoftmaxDepth {
            num_bins: 3,
            context_channels: 2,
        };
        assert_eq!(producer.head_channels(), 5);
        let mut head = Array4::zeros((2, 5, 1, 2));
        head[[0, 1, 0, 0]] = 10.0;
        head[[1, 3, 0, 1]] = 7.0;
        head[[1, 4, 0, 1]] = -1.5;

        let out = producer.produce(head.view()).unwrap();
        assert_eq!(out.weights.shape(), &[2, 3, 1, 2]);
        assert_eq!(out.context.shape(), &[2, 2, 1, 2]);
        assert!(out.uncertainty.is_none());

        let sums = out.weights.sum_axis(Axis(1));
        assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-6));
        assert!(out.weights[[0, 1, 0, 0]] > 0.99);
        // equal logits give a uniform distribution
        assert_relative_eq!(out.weights[[0, 0, 0, 1]], 1.0 / 3.0, epsilon = 1e-6);
        assert_eq!(out.context[[1, 0, 0, 1]], 7.0);
        assert_eq!(out.context[[1, 1, 0, 1]], -1.5);
    }

    #[test]
    fn test_gaussian_layout() {
        let producer = GaussianDepth {
            num_bins: 10,
            context_channels: 1,
        };
        let mut head = Array4::zeros((1, 3, 1, 1));
        head[[0, 0, 0, 0]] = 0.0; // sigmoid -> 0.5 -> bin 5
        head[[0, 1, 0, 0]] = -20.0; // clamped
        head[[0, 2, 0, 0]] = 4.0;

        let out = producer.produce(head.view()).unwrap();
        let unc = out.uncertainty.unwrap();
        assert_relative_eq!(unc.mean[[0, 0, 0]], 0.5);
        assert_eq!(unc.logvar[[0, 0, 0]], LOGVAR_FLOOR);
        assert_relative_eq!(out.weights[[0, 5, 0, 0]], 1.0, epsilon = 1e-5);
        assert_eq!(out.context[[0, 0, 0, 0]], 4.0);
    }

    #[test]
    fn test_wrong_channel_count() {
        let producer = GaussianDepth {
            num_bins: 10,
            context_channels: 4,
        };
        let head = Array4::zeros((1, 5, 2, 2));
        assert!(matches!(
            producer.produce(head.view()),
            Err(LiftError::ShapeMismatch { what: "depth head", .. })
        ));
    }
}
