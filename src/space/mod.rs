pub mod term;
pub mod passage;
pub mod dictionary;
pub mod params;
pub mod weighting;
pub mod dimension;
pub mod solver;
pub mod cache;
pub mod semantic;
pub mod source;
pub mod corpus;
pub mod projection;
