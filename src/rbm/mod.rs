//! Restricted Boltzmann Machine variants and their shared training contract.
//!
//! All variants are trained with the same Contrastive Divergence engine;
//! only the activation and sampling rules differ:
//! - [`BernoulliRbm`]: binary visible and hidden units
//! - [`GaussianRbm`]: real-valued visible units, binary hidden units
//! - [`MultinomialRbm`]: K-ary categorical visible and hidden units

mod bernoulli;
mod cd;
mod gaussian;
mod multinomial;
mod storage;
mod unit;

pub use bernoulli::*;
pub use gaussian::*;
pub use multinomial::*;
pub use storage::*;
pub use unit::*;
