//! DOF-contact classification.
//!
//! For every (DOF, contact) pair, decide which geometric feature the DOF
//! rigidly owns. This single classification drives every derivative in the
//! contact differentiator: it decides which terms of the position, normal
//! and force gradients are zero and which are screw-axis expressions.

use gradyn_contact::{Contact, ContactKind};
use gradyn_world::{World, WorldDof};

/// How one DOF relates to one contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DofContactType {
    /// The DOF moves neither body.
    None,
    /// The DOF rigidly carries the face side of a vertex-face contact.
    Face,
    /// The DOF rigidly carries the vertex side of a vertex-face contact.
    Vertex,
    /// The DOF rigidly carries edge A of an edge-edge contact.
    EdgeA,
    /// The DOF rigidly carries edge B of an edge-edge contact.
    EdgeB,
    /// The DOF is an ancestor of both sides of a vertex-face contact.
    VertexFaceSelfCollision,
    /// The DOF is an ancestor of both sides of an edge-edge contact.
    EdgeEdgeSelfCollision,
    /// The contact geometry admits no feature attribution.
    Unsupported,
}

/// Classify how `dof` relates to `contact`.
///
/// Two ancestor walks (one per body) feed a flat truth table. Note the
/// swap in the edge-edge rows: the contact record labels its edges crossed
/// (edge B is the edge carried by body A), so a DOF that only carries body
/// A must differentiate record edge B, and vice versa. Getting this
/// backwards silently zeroes half the Jacobian.
pub fn classify_dof_contact(world: &World, dof: WorldDof, contact: &Contact) -> DofContactType {
    let parent_a = world.is_ancestor_of_body(dof, contact.body_a);
    let parent_b = world.is_ancestor_of_body(dof, contact.body_b);

    match (parent_a, parent_b) {
        (true, true) => match contact.kind {
            ContactKind::VertexFace | ContactKind::FaceVertex => {
                DofContactType::VertexFaceSelfCollision
            }
            ContactKind::EdgeEdge => DofContactType::EdgeEdgeSelfCollision,
            ContactKind::Unsupported => DofContactType::Unsupported,
        },
        (false, false) => DofContactType::None,
        (true, false) => match contact.kind {
            ContactKind::VertexFace => DofContactType::Vertex,
            ContactKind::FaceVertex => DofContactType::Face,
            ContactKind::EdgeEdge => DofContactType::EdgeB,
            ContactKind::Unsupported => DofContactType::Unsupported,
        },
        (false, true) => match contact.kind {
            ContactKind::VertexFace => DofContactType::Face,
            ContactKind::FaceVertex => DofContactType::Vertex,
            ContactKind::EdgeEdge => DofContactType::EdgeA,
            ContactKind::Unsupported => DofContactType::Unsupported,
        },
    }
}
