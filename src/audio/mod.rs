// Audio processing
// Modules: decoder, probe

pub mod decoder;
pub mod probe;
