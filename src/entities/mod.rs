// Entity Models - grains and parties
// "Identity persists, values change": a CUIT is the party, a grain alias is
// just another spelling of the same GrainType.

pub mod grain;
pub mod party;

pub use grain::GrainType;
pub use party::{cuit_is_valid, Party, PartyRole};
