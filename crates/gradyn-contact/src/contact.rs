//! Contact records.

use gradyn_math::Vec3;

/// Reference to a body by (skeleton index, body index) within a world.
///
/// Contacts carry indices rather than handles so that a value-copied record
/// stays valid no matter what happens to the world afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyRef {
    /// Skeleton index in the world's registration order.
    pub skeleton: usize,
    /// Body index within the skeleton.
    pub body: usize,
}

/// Geometric classification of a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    /// A vertex of body A against a face of body B.
    VertexFace,
    /// A face of body A against a vertex of body B.
    FaceVertex,
    /// An edge of body A against an edge of body B.
    EdgeEdge,
    /// Geometry the differentiator cannot attribute to a feature; simulated
    /// but with suppressed sensitivities.
    Unsupported,
}

/// Edge-edge witness data, in world coordinates.
///
/// The labels are crossed relative to the contact's bodies: edge A is the
/// edge carried by body B, and edge B the edge carried by body A. Direction
/// signs are chosen so that `a_dir × b_dir` equals the contact normal.
#[derive(Debug, Clone, Copy)]
pub struct ContactEdges {
    /// A point on edge A (carried by body B).
    pub a_fixed_point: Vec3,
    /// Unit direction of edge A.
    pub a_dir: Vec3,
    /// A point on edge B (carried by body A).
    pub b_fixed_point: Vec3,
    /// Unit direction of edge B.
    pub b_dir: Vec3,
}

/// One contact reported by the collision oracle.
///
/// Immutable snapshot captured at the instant of detection; the
/// differentiator copies it by value so later world mutation cannot alias
/// it. The normal points from body B into body A.
#[derive(Debug, Clone)]
pub struct Contact {
    /// Geometric classification.
    pub kind: ContactKind,
    /// Contact point in world coordinates.
    pub point: Vec3,
    /// Unit contact normal in world coordinates, pointing from B into A.
    pub normal: Vec3,
    /// Penetration depth (>= 0).
    pub depth: f64,
    /// Body A, or `None` for static world geometry.
    pub body_a: Option<BodyRef>,
    /// Body B, or `None` for static world geometry.
    pub body_b: Option<BodyRef>,
    /// Edge witness data, present exactly for `EdgeEdge` contacts.
    pub edges: Option<ContactEdges>,
    /// Combined friction coefficient of the pair.
    pub friction: f64,
    /// Combined restitution coefficient of the pair.
    pub restitution: f64,
}
