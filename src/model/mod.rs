//! The decision-transformer policy model.
//!
//! Everything outside this module consumes the model through the
//! [`crate::policy::Policy`] trait; the architecture is an implementation
//! detail.

pub mod attention;
pub mod dt;

pub use attention::{CausalSelfAttention, CausalSelfAttentionConfig};
pub use dt::{DecisionTransformer, DecisionTransformerConfig};
