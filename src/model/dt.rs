//! Decision-transformer policy.
//!
//! Sequence model over interleaved (return, state, action) tokens with
//! learned timestep and task embeddings. Action predictions are read from
//! the state-token positions, so the prediction at position `t` conditions
//! on the return and state of step `t` but only on actions up to `t - 1`.

use burn::nn::{
    Dropout, DropoutConfig, Embedding, EmbeddingConfig, Gelu, LayerNorm, LayerNormConfig, Linear,
    LinearConfig,
};
use burn::prelude::*;

use crate::model::attention::{CausalSelfAttention, CausalSelfAttentionConfig};
use crate::policy::{ActionBundle, Policy, PolicyOutput};

/// Configuration for [`DecisionTransformer`].
#[derive(Debug, Clone)]
pub struct DecisionTransformerConfig {
    /// Flattened state dimensionality.
    pub state_dim: usize,
    /// Action vector dimensionality.
    pub action_dim: usize,
    /// Number of task ids the task embedding covers.
    pub n_tasks: usize,
    /// Token embedding width.
    pub hidden_size: usize,
    /// Number of transformer blocks.
    pub n_layers: usize,
    /// Attention heads per block.
    pub n_heads: usize,
    /// Timestep-embedding capacity; absolute step indices must stay below
    /// this.
    pub max_timesteps: usize,
    /// Dropout probability throughout the model.
    pub dropout: f64,
}

impl DecisionTransformerConfig {
    /// Create a configuration with the default architecture.
    pub fn new(state_dim: usize, action_dim: usize, n_tasks: usize) -> Self {
        Self {
            state_dim,
            action_dim,
            n_tasks,
            hidden_size: 128,
            n_layers: 3,
            n_heads: 4,
            max_timesteps: 31,
            dropout: 0.1,
        }
    }

    /// Set the embedding width.
    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    /// Set the number of transformer blocks.
    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    /// Set the number of attention heads.
    pub fn with_n_heads(mut self, n_heads: usize) -> Self {
        self.n_heads = n_heads;
        self
    }

    /// Set the timestep-embedding capacity.
    pub fn with_max_timesteps(mut self, max_timesteps: usize) -> Self {
        self.max_timesteps = max_timesteps;
        self
    }

    /// Set the dropout probability.
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> DecisionTransformer<B> {
        let hidden = self.hidden_size;
        let blocks = (0..self.n_layers)
            .map(|_| TransformerBlockConfig::new(hidden, self.n_heads, self.dropout).init(device))
            .collect();

        DecisionTransformer {
            embed_timestep: EmbeddingConfig::new(self.max_timesteps, hidden).init(device),
            embed_task: EmbeddingConfig::new(self.n_tasks, hidden).init(device),
            embed_return: LinearConfig::new(1, hidden).init(device),
            embed_state: LinearConfig::new(self.state_dim, hidden).init(device),
            embed_action: LinearConfig::new(self.action_dim, hidden).init(device),
            embed_norm: LayerNormConfig::new(hidden).init(device),
            blocks,
            head_norm: LayerNormConfig::new(hidden).init(device),
            predict_action: LinearConfig::new(hidden, self.action_dim).init(device),
            hidden_size: hidden,
            action_dim: self.action_dim,
        }
    }
}

/// Configuration for one transformer block.
#[derive(Debug, Clone)]
struct TransformerBlockConfig {
    hidden_size: usize,
    n_heads: usize,
    dropout: f64,
}

impl TransformerBlockConfig {
    fn new(hidden_size: usize, n_heads: usize, dropout: f64) -> Self {
        Self {
            hidden_size,
            n_heads,
            dropout,
        }
    }

    fn init<B: Backend>(&self, device: &B::Device) -> TransformerBlock<B> {
        let hidden = self.hidden_size;
        TransformerBlock {
            norm_attn: LayerNormConfig::new(hidden).init(device),
            attn: CausalSelfAttentionConfig::new(hidden, self.n_heads)
                .with_dropout(self.dropout)
                .init(device),
            norm_mlp: LayerNormConfig::new(hidden).init(device),
            mlp_expand: LinearConfig::new(hidden, 4 * hidden).init(device),
            mlp_project: LinearConfig::new(4 * hidden, hidden).init(device),
            activation: Gelu::new(),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Pre-norm transformer block: causal attention followed by a GELU MLP,
/// both residual.
#[derive(Module, Debug)]
pub struct TransformerBlock<B: Backend> {
    norm_attn: LayerNorm<B>,
    attn: CausalSelfAttention<B>,
    norm_mlp: LayerNorm<B>,
    mlp_expand: Linear<B>,
    mlp_project: Linear<B>,
    activation: Gelu,
    dropout: Dropout,
}

impl<B: Backend> TransformerBlock<B> {
    fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let x = x.clone() + self.attn.forward(self.norm_attn.forward(x));
        let mlp = self.mlp_project.forward(
            self.activation
                .forward(self.mlp_expand.forward(self.norm_mlp.forward(x.clone()))),
        );
        x + self.dropout.forward(mlp)
    }
}

/// Decision transformer over (return, state, action) token triples.
#[derive(Module, Debug)]
pub struct DecisionTransformer<B: Backend> {
    embed_timestep: Embedding<B>,
    embed_task: Embedding<B>,
    embed_return: Linear<B>,
    embed_state: Linear<B>,
    embed_action: Linear<B>,
    embed_norm: LayerNorm<B>,
    blocks: Vec<TransformerBlock<B>>,
    head_norm: LayerNorm<B>,
    predict_action: Linear<B>,
    hidden_size: usize,
    action_dim: usize,
}

impl<B: Backend> Policy<B> for DecisionTransformer<B> {
    fn forward(
        &self,
        returns: Tensor<B, 3>,
        states: Tensor<B, 3>,
        timesteps: Tensor<B, 2, Int>,
        actions: Option<Tensor<B, 3>>,
        tasks: Tensor<B, 2, Int>,
    ) -> PolicyOutput<B> {
        let [batch, seq, _] = states.dims();
        let device = states.device();
        let hidden = self.hidden_size;

        // Every token of a step shares its timestep and task embedding.
        let position = self.embed_timestep.forward(timesteps) + self.embed_task.forward(tasks);

        let actions =
            actions.unwrap_or_else(|| Tensor::zeros([batch, seq, self.action_dim], &device));

        let r = self.embed_return.forward(returns) + position.clone();
        let s = self.embed_state.forward(states) + position.clone();
        let a = self.embed_action.forward(actions) + position;

        // Interleave to [R_0, S_0, A_0, R_1, S_1, A_1, ...].
        let tokens = Tensor::cat(
            vec![
                r.reshape([batch, seq, 1, hidden]),
                s.reshape([batch, seq, 1, hidden]),
                a.reshape([batch, seq, 1, hidden]),
            ],
            2,
        )
        .reshape([batch, 3 * seq, hidden]);

        let mut x = self.embed_norm.forward(tokens);
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.head_norm.forward(x);

        // Read predictions from the state-token positions.
        let state_tokens = x
            .reshape([batch, seq, 3, hidden])
            .slice([0..batch, 0..seq, 1..2, 0..hidden])
            .reshape([batch, seq, hidden]);

        let action_preds = self.predict_action.forward(state_tokens);
        PolicyOutput {
            bundle: ActionBundle::from_preds(&action_preds),
            action_preds,
        }
    }
}
