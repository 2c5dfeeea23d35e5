// File: `crates/trellis-core/src/lib.rs`
pub mod clock;
pub mod lattice;
pub mod lwwreg;
pub mod seen;
pub mod version_vector;

pub use clock::{ClientId, LamportClock, SeqNo, Stamp};
pub use lattice::Lattice;
pub use lwwreg::LWWRegister;
pub use seen::SeenSet;
pub use version_vector::VersionVector;
