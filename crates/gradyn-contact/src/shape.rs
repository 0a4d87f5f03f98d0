//! Collision shapes and the minimal narrow phase used by the simulator.
//!
//! The narrow phase only needs to produce classified `Contact` records for
//! the feature pairs the differentiator understands: point clouds and
//! spheres against half-spaces (vertex-face), and segments against segments
//! (edge-edge). Anything richer is an external collaborator.

use crate::{BodyRef, Contact, ContactEdges, ContactKind};
use gradyn_math::{skew_line_contact, Pose, Vec3};

/// Collision geometry, in the owning body's local frame.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Half-space with outward unit `normal`; the surface satisfies
    /// normal·x = offset in the local frame.
    HalfSpace { normal: Vec3, offset: f64 },
    /// A cloud of candidate contact vertices.
    Vertices { points: Vec<Vec3> },
    /// A sphere centered at the local origin.
    Sphere { radius: f64 },
    /// A line segment between two local points.
    Segment { a: Vec3, b: Vec3 },
}

/// A shape attached to a body (or to the static world when `body` is None).
#[derive(Debug, Clone)]
pub struct Collider {
    /// Owning body, or `None` for static world geometry.
    pub body: Option<BodyRef>,
    /// Geometry in the owning body's local frame.
    pub shape: Shape,
    /// Friction coefficient of this surface.
    pub friction: f64,
    /// Restitution coefficient of this surface.
    pub restitution: f64,
}

impl Collider {
    /// Attach a shape to a body with the given surface parameters.
    pub fn new(body: Option<BodyRef>, shape: Shape, friction: f64, restitution: f64) -> Self {
        Self { body, shape, friction, restitution }
    }
}

fn pair_friction(a: &Collider, b: &Collider) -> f64 {
    (a.friction * b.friction).sqrt()
}

fn pair_restitution(a: &Collider, b: &Collider) -> f64 {
    (a.restitution * b.restitution).sqrt()
}

/// World-frame half-space of a collider: (outward unit normal, point on surface).
fn world_half_space(pose: &Pose, normal: &Vec3, offset: f64) -> (Vec3, Vec3) {
    let n = pose.rotate(normal);
    let p0 = pose.transform_point(&(normal * offset));
    (n, p0)
}

/// Run the narrow phase over all collider pairs.
///
/// `pose_of` supplies the current placement of each body; static colliders
/// use the identity placement. `margin` is the touch tolerance for
/// edge-edge pairs. Contacts are emitted in pair-iteration order; ordering
/// across steps is not part of the contract.
pub fn detect_contacts<F>(colliders: &[Collider], pose_of: F, margin: f64) -> Vec<Contact>
where
    F: Fn(Option<BodyRef>) -> Pose,
{
    let mut contacts = Vec::new();
    for i in 0..colliders.len() {
        for j in (i + 1)..colliders.len() {
            collide_pair(&colliders[i], &colliders[j], &pose_of, margin, &mut contacts);
        }
    }
    contacts
}

fn collide_pair<F>(
    ca: &Collider,
    cb: &Collider,
    pose_of: &F,
    margin: f64,
    out: &mut Vec<Contact>,
) where
    F: Fn(Option<BodyRef>) -> Pose,
{
    let pose_a = pose_of(ca.body);
    let pose_b = pose_of(cb.body);

    match (&ca.shape, &cb.shape) {
        // Vertex owner first: vertex-face contacts.
        (Shape::Vertices { points }, Shape::HalfSpace { normal, offset }) => {
            let (n, p0) = world_half_space(&pose_b, normal, *offset);
            vertices_vs_plane(
                points, &pose_a, &n, &p0, ca, cb, ContactKind::VertexFace, false, out,
            );
        }
        // Face owner first: the mirrored record.
        (Shape::HalfSpace { normal, offset }, Shape::Vertices { points }) => {
            let (n, p0) = world_half_space(&pose_a, normal, *offset);
            vertices_vs_plane(
                points, &pose_b, &n, &p0, ca, cb, ContactKind::FaceVertex, true, out,
            );
        }
        (Shape::Sphere { radius }, Shape::HalfSpace { normal, offset }) => {
            let (n, p0) = world_half_space(&pose_b, normal, *offset);
            let deepest = pose_a.pos - n * *radius;
            let d = n.dot(&(deepest - p0));
            if d <= 0.0 {
                out.push(Contact {
                    kind: ContactKind::VertexFace,
                    point: deepest,
                    normal: n,
                    depth: -d,
                    body_a: ca.body,
                    body_b: cb.body,
                    edges: None,
                    friction: pair_friction(ca, cb),
                    restitution: pair_restitution(ca, cb),
                });
            }
        }
        (Shape::HalfSpace { normal, offset }, Shape::Sphere { radius }) => {
            let (n, p0) = world_half_space(&pose_a, normal, *offset);
            let deepest = pose_b.pos - n * *radius;
            let d = n.dot(&(deepest - p0));
            if d <= 0.0 {
                out.push(Contact {
                    kind: ContactKind::FaceVertex,
                    point: deepest,
                    // The normal points from the vertex owner (B) into the
                    // face owner (A).
                    normal: -n,
                    depth: -d,
                    body_a: ca.body,
                    body_b: cb.body,
                    edges: None,
                    friction: pair_friction(ca, cb),
                    restitution: pair_restitution(ca, cb),
                });
            }
        }
        (Shape::Segment { a: a0, b: a1 }, Shape::Segment { a: b0, b: b1 }) => {
            segment_vs_segment(
                &pose_a.transform_point(a0),
                &pose_a.transform_point(a1),
                &pose_b.transform_point(b0),
                &pose_b.transform_point(b1),
                ca,
                cb,
                margin,
                out,
            );
        }
        // Pairs with no differentiable feature attribution.
        _ => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn vertices_vs_plane(
    points: &[Vec3],
    vertex_pose: &Pose,
    n: &Vec3,
    p0: &Vec3,
    ca: &Collider,
    cb: &Collider,
    kind: ContactKind,
    plane_is_a: bool,
    out: &mut Vec<Contact>,
) {
    for p in points {
        let world = vertex_pose.transform_point(p);
        let d = n.dot(&(world - p0));
        if d <= 0.0 {
            out.push(Contact {
                kind,
                point: world,
                // From B into A: the plane's outward normal when the vertex
                // owner is A, its negation when the plane owner is A.
                normal: if plane_is_a { -n } else { *n },
                depth: -d,
                body_a: ca.body,
                body_b: cb.body,
                edges: None,
                friction: pair_friction(ca, cb),
                restitution: pair_restitution(ca, cb),
            });
        }
    }
}

/// Closest points of two segments, clamped to the segment extents.
fn closest_segment_points(a0: &Vec3, a1: &Vec3, b0: &Vec3, b1: &Vec3) -> (Vec3, Vec3) {
    let da = a1 - a0;
    let db = b1 - b0;
    let r = a0 - b0;
    let aa = da.norm_squared();
    let bb = db.norm_squared();
    let f = db.dot(&r);
    let c = da.dot(&r);
    let b = da.dot(&db);
    let denom = aa * bb - b * b;

    let mut s = if denom.abs() > 1e-14 {
        ((b * f - c * bb) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = if bb > 1e-14 { (b * s + f) / bb } else { 0.0 };
    if t < 0.0 {
        t = 0.0;
        s = (-c / aa).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / aa).clamp(0.0, 1.0);
    }
    (a0 + da * s, b0 + db * t)
}

#[allow(clippy::too_many_arguments)]
fn segment_vs_segment(
    a0: &Vec3,
    a1: &Vec3,
    b0: &Vec3,
    b1: &Vec3,
    ca: &Collider,
    cb: &Collider,
    margin: f64,
    out: &mut Vec<Contact>,
) {
    let (pa, pb) = closest_segment_points(a0, a1, b0, b1);
    let dist = (pa - pb).norm();
    if dist > margin {
        return;
    }

    // Witness edges use the crossed labeling: edge A of the record is the
    // edge carried by body B and vice versa.
    let mut edge_a_dir = (b1 - b0).normalize();
    let edge_b_dir = (a1 - a0).normalize();
    let cross = edge_a_dir.cross(&edge_b_dir);
    if cross.norm_squared() < 1e-12 {
        // Parallel edges have no unique witness; not a supported feature.
        return;
    }
    let mut normal = cross.normalize();
    // Orient from B into A, flipping the sign of edge A's direction along
    // with the normal so that normal == a_dir × b_dir keeps holding; exact
    // touching keeps the cross-product sign.
    if normal.dot(&(pa - pb)) < -1e-12 {
        normal = -normal;
        edge_a_dir = -edge_a_dir;
    }

    out.push(Contact {
        kind: ContactKind::EdgeEdge,
        point: skew_line_contact(&pb, &edge_a_dir, &pa, &edge_b_dir),
        normal,
        depth: margin - dist,
        body_a: ca.body,
        body_b: cb.body,
        edges: Some(ContactEdges {
            a_fixed_point: pb,
            a_dir: edge_a_dir,
            b_fixed_point: pa,
            b_dir: edge_b_dir,
        }),
        friction: pair_friction(ca, cb),
        restitution: pair_restitution(ca, cb),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use gradyn_math::Mat3;

    fn static_ground() -> Collider {
        Collider::new(
            None,
            Shape::HalfSpace { normal: Vec3::y(), offset: 0.0 },
            0.5,
            0.0,
        )
    }

    fn pose_at(p: Vec3) -> Pose {
        Pose { rot: Mat3::identity(), pos: p }
    }

    #[test]
    fn vertex_below_plane_is_vertex_face() {
        let body = BodyRef { skeleton: 0, body: 0 };
        let cube = Collider::new(
            Some(body),
            Shape::Vertices { points: vec![Vec3::new(0.0, -0.5, 0.0)] },
            0.5,
            0.0,
        );
        let colliders = [cube, static_ground()];
        let contacts = detect_contacts(
            &colliders,
            |b| match b {
                Some(_) => pose_at(Vec3::new(0.0, 0.4, 0.0)),
                None => Pose::identity(),
            },
            1e-4,
        );
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert_eq!(c.kind, ContactKind::VertexFace);
        assert_eq!(c.body_a, Some(body));
        assert_eq!(c.body_b, None);
        assert_relative_eq!(c.normal, Vec3::y(), epsilon = 1e-12);
        assert_relative_eq!(c.depth, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn reversed_pair_is_face_vertex_with_flipped_normal() {
        let body = BodyRef { skeleton: 0, body: 0 };
        let cube = Collider::new(
            Some(body),
            Shape::Vertices { points: vec![Vec3::new(0.0, -0.5, 0.0)] },
            0.5,
            0.0,
        );
        let colliders = [static_ground(), cube];
        let contacts = detect_contacts(
            &colliders,
            |b| match b {
                Some(_) => pose_at(Vec3::new(0.0, 0.4, 0.0)),
                None => Pose::identity(),
            },
            1e-4,
        );
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert_eq!(c.kind, ContactKind::FaceVertex);
        assert_eq!(c.body_a, None);
        assert_eq!(c.body_b, Some(body));
        // From B (vertex owner) into A (plane owner).
        assert_relative_eq!(c.normal, -Vec3::y(), epsilon = 1e-12);
    }

    #[test]
    fn crossing_segments_produce_edge_edge() {
        let a = BodyRef { skeleton: 0, body: 0 };
        let b = BodyRef { skeleton: 1, body: 0 };
        let seg_a = Collider::new(
            Some(a),
            Shape::Segment { a: Vec3::new(-1.0, 0.0, 0.0), b: Vec3::new(1.0, 0.0, 0.0) },
            0.5,
            0.0,
        );
        let seg_b = Collider::new(
            Some(b),
            Shape::Segment { a: Vec3::new(0.0, -1.0, 0.0), b: Vec3::new(0.0, 1.0, 0.0) },
            0.5,
            0.0,
        );
        let colliders = [seg_a, seg_b];
        let contacts = detect_contacts(&colliders, |_| Pose::identity(), 1e-4);
        assert_eq!(contacts.len(), 1);
        let c = &contacts[0];
        assert_eq!(c.kind, ContactKind::EdgeEdge);
        assert_relative_eq!(c.point, Vec3::zeros(), epsilon = 1e-12);
        let edges = c.edges.as_ref().unwrap();
        // Crossed labeling: record edge A is body B's edge (along y) and
        // record edge B is body A's edge (along x).
        assert_relative_eq!(edges.a_dir, Vec3::y(), epsilon = 1e-12);
        assert_relative_eq!(edges.b_dir, Vec3::x(), epsilon = 1e-12);
        // The normal is the recorded cross product ŷ × x̂ = -ẑ.
        assert_relative_eq!(c.normal, -Vec3::z(), epsilon = 1e-12);
        assert_relative_eq!(c.normal, edges.a_dir.cross(&edges.b_dir), epsilon = 1e-12);
    }

    #[test]
    fn separated_segments_do_not_collide() {
        let a = BodyRef { skeleton: 0, body: 0 };
        let seg_a = Collider::new(
            Some(a),
            Shape::Segment { a: Vec3::new(-1.0, 0.0, 1.0), b: Vec3::new(1.0, 0.0, 1.0) },
            0.5,
            0.0,
        );
        let seg_b = Collider::new(
            None,
            Shape::Segment { a: Vec3::new(0.0, -1.0, 0.0), b: Vec3::new(0.0, 1.0, 0.0) },
            0.5,
            0.0,
        );
        let colliders = [seg_a, seg_b];
        let contacts = detect_contacts(&colliders, |_| Pose::identity(), 1e-4);
        assert!(contacts.is_empty());
    }
}
