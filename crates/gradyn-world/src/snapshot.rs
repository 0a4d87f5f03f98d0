//! Scoped save/restore of world state across perturbations.

use crate::World;
use gradyn_math::DVec;

/// A captured (q, q̇, τ) triple with explicit restoration.
///
/// Restore is explicit rather than scope-based so nested perturbations can
/// compose: capture once, perturb and re-run forward any number of times,
/// restore when done.
#[derive(Debug, Clone)]
pub struct RestorableSnapshot {
    positions: DVec,
    velocities: DVec,
    forces: DVec,
}

impl RestorableSnapshot {
    /// Capture the world's current state vectors.
    pub fn capture(world: &World) -> Self {
        Self {
            positions: world.positions(),
            velocities: world.velocities(),
            forces: world.forces(),
        }
    }

    /// Write the captured vectors back into the world.
    pub fn restore(&self, world: &mut World) {
        world.set_positions(&self.positions);
        world.set_velocities(&self.velocities);
        world.set_forces(&self.forces);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StepConfig;
    use approx::assert_relative_eq;
    use gradyn_math::SpatialInertia;
    use gradyn_model::SkeletonBuilder;

    #[test]
    fn restore_undoes_mutation() {
        let mut world = World::new(StepConfig::default());
        world.add_skeleton(
            SkeletonBuilder::new("ball")
                .add_free_body("ball", SpatialInertia::sphere(1.0, 0.1))
                .build(),
        );
        let mut q = world.positions();
        q[4] = 3.0;
        world.set_positions(&q);

        let snapshot = RestorableSnapshot::capture(&world);
        let mut q2 = world.positions();
        q2[4] = -7.0;
        world.set_positions(&q2);
        snapshot.restore(&mut world);

        assert_relative_eq!(world.positions()[4], 3.0, epsilon = 1e-15);
    }

    #[test]
    fn nested_snapshots_compose() {
        let mut world = World::new(StepConfig::default());
        world.add_skeleton(
            SkeletonBuilder::new("ball")
                .add_free_body("ball", SpatialInertia::sphere(1.0, 0.1))
                .build(),
        );
        let outer = RestorableSnapshot::capture(&world);

        let mut q = world.positions();
        q[3] = 1.0;
        world.set_positions(&q);
        let inner = RestorableSnapshot::capture(&world);

        let mut q2 = world.positions();
        q2[3] = 2.0;
        world.set_positions(&q2);

        inner.restore(&mut world);
        assert_relative_eq!(world.positions()[3], 1.0, epsilon = 1e-15);
        outer.restore(&mut world);
        assert_relative_eq!(world.positions()[3], 0.0, epsilon = 1e-15);
    }
}
