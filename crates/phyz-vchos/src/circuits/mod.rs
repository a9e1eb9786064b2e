//! Reference circuits implementing [`CircuitModel`](crate::CircuitModel).

mod flux_qubit;
mod transmon;

pub use flux_qubit::FluxQubit;
pub use transmon::Transmon;
