//! Contact records, the minimal collision oracle, constraint rows and the
//! boxed-LCP solver contract for the gradyn simulator.

pub mod constraint;
pub mod contact;
pub mod lcp;
pub mod shape;

pub use constraint::{ContactConstraint, FRICTION_BASIS_DIMS};
pub use contact::{BodyRef, Contact, ContactEdges, ContactKind};
pub use lcp::{BoxedLcpSolver, PgsSolver};
pub use shape::{detect_contacts, Collider, Shape};
