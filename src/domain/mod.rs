// Domain layer: core models, intents and ports (interfaces).

pub mod intent;
pub mod model;
pub mod ports;
