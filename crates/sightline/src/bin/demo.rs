//! # SIGHTLINE Demo
//!
//! Runs the scene monitor against a synthetic scene: a courtyard with one
//! wall, a handful of entities, and the camera at the observer's head. One
//! entity walks behind the wall partway through.
//!
//! ```bash
//! ./sightline_demo                 # default settings
//! ./sightline_demo sightline.toml  # settings from file
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sightline::core::sim::{EntitySpec, SceneBuilder, StandardScene};
use sightline::core::{CacheSettings, Settings};
use sightline::shared::{CFrame, Vec3};
use sightline::SceneMonitor;

const FRAMES: u16 = 12;
const FRAME_TIME: Duration = Duration::from_millis(120);

fn load_settings() -> Settings {
    match std::env::args().nth(1) {
        Some(path) => match Settings::load(&path) {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("   ✗ {e}");
                std::process::exit(1);
            }
        },
        None => Settings {
            cache: CacheSettings {
                refresh_interval_ms: 50,
                ..CacheSettings::default()
            },
            ..Settings::default()
        },
    }
}

fn main() {
    println!("═══════════════════════════════════════════════════════════════════");
    println!("                    SIGHTLINE DEMO v{}", env!("CARGO_PKG_VERSION"));
    println!("═══════════════════════════════════════════════════════════════════");

    let settings = load_settings();
    let mut scene = SceneBuilder::with_layout(settings.layout.clone());
    let layout = StandardScene::build(&mut scene);

    scene.block(layout.world, "Floor", Vec3::new(0.0, -0.5, 0.0), Vec3::new(200.0, 1.0, 200.0));
    scene.block(layout.world, "Wall", Vec3::new(0.0, 5.0, 25.0), Vec3::new(16.0, 10.0, 1.0));

    let me = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::new(0.0, 3.0, 0.0)).named("observer"));
    scene.set_local_entity(layout.container, me.entity);
    scene.set_camera_position(layout.camera, Vec3::new(0.0, 4.5, 0.0));

    let walker = scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::new(20.0, 3.0, 40.0)).named("walker"));
    let mut guard = EntitySpec::classic(Vec3::new(-15.0, 3.0, 10.0)).named("guard");
    guard.health = 40.0;
    scene.spawn_entity(&layout, &guard);
    scene.spawn_entity(&layout, &EntitySpec::modern(Vec3::new(2.0, 3.0, 45.0)).named("hidden"));

    let monitor = SceneMonitor::new(scene.memory(), Arc::new(layout.root_ref()), &settings);

    for frame in 1..=FRAMES {
        // The walker crosses behind the wall.
        let x = 20.0 - f32::from(frame) * 3.5;
        scene.set_part_cframe(walker.anchor, CFrame::from_position(Vec3::new(x, 3.0, 40.0)));
        scene.set_part_cframe(walker.head, CFrame::from_position(Vec3::new(x, 4.5, 40.0)));

        let tick = monitor.tick();
        let report = monitor.frame();

        println!();
        println!(
            "frame {frame:>2}  refresh: {:?}  geometry gen: {}",
            tick.refresh, tick.geometry_generation
        );
        for target in &report.targets {
            println!(
                "   {:<8} {:>6.1} studs  hp {:>3.0}%  {}",
                target.entity.name,
                target.distance,
                target.health_fraction * 100.0,
                if target.visible { "VISIBLE" } else { "occluded" },
            );
        }
        thread::sleep(FRAME_TIME);
    }

    let stats = monitor.engine().stats();
    println!();
    println!("═══════════════════════════════════════════════════════════════════");
    println!(
        "  queries: {}  memo hits: {}  rays: {}  box tests: {}  slab tests: {}",
        stats.queries, stats.memo_hits, stats.rays_cast, stats.box_tests, stats.slab_tests
    );
    println!("═══════════════════════════════════════════════════════════════════");
}
