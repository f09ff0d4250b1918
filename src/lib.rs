pub mod binder;
pub mod error;
pub mod kernel;
pub mod model;
pub mod normalizer;
pub mod proof_step;
pub mod site;
pub mod vc;
