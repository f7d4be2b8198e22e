//! itd-strategy
//!
//! Decision model adapter: turns one symbol's tick plus the shared market
//! context into a [`TradeSignal`].
//!
//! - [`assemble_features`] builds the fixed-order [`FeatureVector`] and fails
//!   hard on missing inputs.
//! - [`DecisionModel::decide`] never fails. It prefers the injected
//!   [`InferenceModel`] and degrades to [`rule_decision`] when the model is
//!   absent, errors or times out.
//! - [`explain`] renders the one-line rationale sent to approvers and alerts.

mod adapter;
mod explain;
mod features;
mod linear;
mod model;
mod rule;

pub use adapter::DecisionModel;
pub use explain::explain;
pub use features::{assemble_features, FeatureError};
pub use linear::{FeatureScaler, LinearPolicyModel};
pub use model::{signal_from_inference, Inference, InferenceError, InferenceModel};
pub use rule::rule_decision;

pub use itd_schemas::{FeatureVector, TradeSignal};
