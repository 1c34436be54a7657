// One module per processing stage, leaf-first.

pub mod raw_image;
pub mod pixel;
pub mod validator;
pub mod quality;
pub mod enhancer;
pub mod normalizer;
pub mod features;
pub mod classifier;
pub mod confidence;
pub mod aggregator;
