//! Criterion benchmarks comparing finite-difference and analytical step
//! Jacobians.

use criterion::{criterion_group, criterion_main, Criterion};
use gradyn_contact::{BodyRef, Collider, Shape};
use gradyn_diff::{fd, forward_pass};
use gradyn_math::{Mat3, Pose, SpatialInertia, Vec3, GRAVITY};
use gradyn_model::SkeletonBuilder;
use gradyn_world::{StepConfig, World};

fn rod_inertia() -> SpatialInertia {
    SpatialInertia::new(
        1.0,
        Vec3::new(0.0, -0.5, 0.0),
        Mat3::from_diagonal(&Vec3::new(1.0 / 12.0, 0.0, 1.0 / 12.0)),
    )
}

/// Chain of `n` revolute links with the tip resting on a floor.
fn chain_on_floor(n: usize) -> World {
    let mut world = World::new(StepConfig { dt: 1e-3, ..StepConfig::default() });
    world.set_gravity(Vec3::new(0.0, -GRAVITY, 0.0));

    let mut builder = SkeletonBuilder::new("chain").add_revolute_body(
        "link1",
        -1,
        Pose::identity(),
        Vec3::z(),
        rod_inertia(),
    );
    for i in 1..n {
        builder = builder.add_revolute_body(
            &format!("link{}", i + 1),
            (i - 1) as i32,
            Pose::translation(Vec3::new(0.0, -1.0, 0.0)),
            Vec3::z(),
            rod_inertia(),
        );
    }
    let s = world.add_skeleton(builder.build());
    {
        let state = world.state_mut(s);
        state.q[0] = std::f64::consts::FRAC_PI_2;
        for i in 1..n {
            state.q[i] = -0.4 / n as f64;
        }
    }

    let tip_local = Vec3::new(0.0, -1.0, 0.0);
    let kins = world.kinematics();
    let tip_world = kins[s].poses[n - 1].transform_point(&tip_local);

    world.add_collider(Collider::new(
        Some(BodyRef { skeleton: s, body: n - 1 }),
        Shape::Vertices { points: vec![tip_local] },
        1.0,
        0.0,
    ));
    world.add_collider(Collider::new(
        None,
        Shape::HalfSpace { normal: Vec3::y(), offset: tip_world.y + 1e-5 },
        1.0,
        0.0,
    ));
    world
}

fn bench_step_jacobians(c: &mut Criterion) {
    for &n in &[2, 4, 8] {
        let mut group = c.benchmark_group(format!("chain_{}", n));

        group.bench_function("forward_pass", |b| {
            b.iter(|| {
                let mut world = chain_on_floor(n);
                std::hint::black_box(forward_pass(&mut world));
            });
        });

        group.bench_function("analytical_pos_vel", |b| {
            let mut world = chain_on_floor(n);
            let snapshot = forward_pass(&mut world);
            b.iter(|| std::hint::black_box(snapshot.pos_vel_jacobian(&mut world)));
        });

        group.bench_function("fd_pos_vel", |b| {
            let mut world = chain_on_floor(n);
            let snapshot = forward_pass(&mut world);
            b.iter(|| {
                std::hint::black_box(fd::finite_difference_pos_vel_jacobian(
                    &mut world, &snapshot,
                ))
            });
        });

        group.bench_function("analytical_vel_vel", |b| {
            let mut world = chain_on_floor(n);
            let snapshot = forward_pass(&mut world);
            b.iter(|| std::hint::black_box(snapshot.vel_vel_jacobian(&mut world)));
        });

        group.finish();
    }
}

criterion_group!(benches, bench_step_jacobians);
criterion_main!(benches);
