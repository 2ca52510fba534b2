//! Convolutional model builders.
//!
//! All three experiment variants share the Shallow ConvNet trunk
//! (Schirrmeister et al. 2017); they differ only in the output head:
//!
//! - [`scn::ShallowConvNet`] — dense head, categorical cross-entropy
//!   (plain training and Deep Ensembles);
//! - [`duq::ShallowConvNetDuq`] — dense + RBF output layer, per-class
//!   binary cross-entropy (Deterministic Uncertainty Quantification).

pub mod duq;
pub mod scn;

pub use duq::{duq_confidence, RbfOutput, RbfOutputConfig, ShallowConvNetDuq};
pub use scn::{ScnTrunk, ShallowConvNet, ShallowConvNetConfig};
