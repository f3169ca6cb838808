//! Causal multi-head self-attention.
//!
//! The token mixer of the decision-transformer blocks. Scaled dot-product
//! attention over a fused query/key/value projection, with an upper-
//! triangular score mask so a position can only attend to itself and
//! earlier positions — the autoregressive constraint the rollout driver
//! depends on.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Large negative score for masked positions; softmax sends them to ~0.
const MASKED_SCORE: f32 = -1.0e9;

/// Configuration for [`CausalSelfAttention`].
#[derive(Debug, Clone)]
pub struct CausalSelfAttentionConfig {
    /// Model dimension (must be divisible by `n_heads`).
    pub d_model: usize,
    /// Number of attention heads.
    pub n_heads: usize,
    /// Dropout on attention weights.
    pub dropout: f64,
}

impl CausalSelfAttentionConfig {
    /// Create a new configuration.
    ///
    /// # Panics
    ///
    /// Panics if `d_model` is not divisible by `n_heads`.
    pub fn new(d_model: usize, n_heads: usize) -> Self {
        assert!(
            d_model % n_heads == 0,
            "d_model ({}) must be divisible by n_heads ({})",
            d_model,
            n_heads
        );
        Self {
            d_model,
            n_heads,
            dropout: 0.0,
        }
    }

    /// Set the attention-weight dropout probability.
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Initialize the attention module.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CausalSelfAttention<B> {
        let d_head = self.d_model / self.n_heads;
        CausalSelfAttention {
            qkv: LinearConfig::new(self.d_model, 3 * self.d_model).init(device),
            proj: LinearConfig::new(self.d_model, self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            n_heads: self.n_heads,
            d_model: self.d_model,
            d_head,
            scale: (d_head as f32).sqrt(),
        }
    }
}

/// Multi-head self-attention with a built-in causal mask.
#[derive(Module, Debug)]
pub struct CausalSelfAttention<B: Backend> {
    /// Fused query/key/value projection `[d_model, 3 * d_model]`.
    qkv: Linear<B>,
    /// Output projection `[d_model, d_model]`.
    proj: Linear<B>,
    /// Dropout on attention weights.
    dropout: Dropout,
    n_heads: usize,
    d_model: usize,
    d_head: usize,
    scale: f32,
}

impl<B: Backend> CausalSelfAttention<B> {
    /// Attend over a token sequence.
    ///
    /// Input and output are `[batch, seq, d_model]`; position `i` of the
    /// output depends only on positions `0..=i` of the input.
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch, seq, _] = x.dims();
        let device = x.device();
        let d = self.d_model;

        let qkv = self.qkv.forward(x);
        let split = |from: usize| {
            qkv.clone()
                .slice([0..batch, 0..seq, from * d..(from + 1) * d])
                .reshape([batch, seq, self.n_heads, self.d_head])
                .swap_dims(1, 2)
        };
        let q = split(0);
        let k = split(1);
        let v = split(2);

        // [batch, heads, seq, seq]
        let scores = q.matmul(k.swap_dims(2, 3)).div_scalar(self.scale);
        let scores = scores + causal_mask::<B>(seq, &device);

        let weights = self.dropout.forward(softmax(scores, 3));

        let attended = weights
            .matmul(v)
            .swap_dims(1, 2)
            .reshape([batch, seq, self.d_model]);
        self.proj.forward(attended)
    }

    /// Model dimension.
    pub fn d_model(&self) -> usize {
        self.d_model
    }

    /// Number of heads.
    pub fn n_heads(&self) -> usize {
        self.n_heads
    }
}

/// Additive causal mask `[1, 1, seq, seq]`: zero on and below the diagonal,
/// a large negative value above it.
fn causal_mask<B: Backend>(seq: usize, device: &B::Device) -> Tensor<B, 4> {
    let mut values = vec![0.0f32; seq * seq];
    for i in 0..seq {
        for j in (i + 1)..seq {
            values[i * seq + j] = MASKED_SCORE;
        }
    }
    Tensor::<B, 1>::from_floats(values.as_slice(), device).reshape([1, 1, seq, seq])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TB = burn::backend::NdArray<f32>;

    fn get_device() -> <TB as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_forward_shape() {
        let device = get_device();
        let attention: CausalSelfAttention<TB> =
            CausalSelfAttentionConfig::new(32, 4).init(&device);

        let x = Tensor::random([2, 6, 32], Distribution::Normal(0.0, 1.0), &device);
        let out = attention.forward(x);
        assert_eq!(out.dims(), [2, 6, 32]);
    }

    #[test]
    fn test_causality() {
        // Changing the last token must not change earlier outputs.
        let device = get_device();
        let attention: CausalSelfAttention<TB> =
            CausalSelfAttentionConfig::new(16, 2).init(&device);

        let x = Tensor::<TB, 3>::random([1, 5, 16], Distribution::Normal(0.0, 1.0), &device);
        let mut perturbed = x
            .clone()
            .into_data()
            .as_slice::<f32>()
            .unwrap()
            .to_vec();
        for value in perturbed[4 * 16..].iter_mut() {
            *value += 10.0;
        }
        let perturbed =
            Tensor::<TB, 1>::from_floats(perturbed.as_slice(), &device).reshape([1, 5, 16]);

        let base = attention.forward(x).into_data();
        let base = base.as_slice::<f32>().unwrap();
        let changed = attention.forward(perturbed).into_data();
        let changed = changed.as_slice::<f32>().unwrap();

        for position in 0..4 {
            for dim in 0..16 {
                let idx = position * 16 + dim;
                assert!(
                    (base[idx] - changed[idx]).abs() < 1e-5,
                    "position {} leaked future information",
                    position
                );
            }
        }
    }

    #[test]
    fn test_mask_layout() {
        let mask = causal_mask::<TB>(3, &get_device()).into_data();
        let mask = mask.as_slice::<f32>().unwrap().to_vec();
        // Row-major [i, j]: zero for j <= i, masked for j > i.
        assert_eq!(mask[0 * 3 + 0], 0.0);
        assert_eq!(mask[0 * 3 + 1], MASKED_SCORE);
        assert_eq!(mask[1 * 3 + 1], 0.0);
        assert_eq!(mask[2 * 3 + 0], 0.0);
        assert_eq!(mask[2 * 3 + 2], 0.0);
    }

    #[test]
    #[should_panic(expected = "must be divisible")]
    fn test_invalid_config() {
        let _ = CausalSelfAttentionConfig::new(30, 4);
    }
}
